//! Dequeue rate limiting for queue lanes.
//!
//! Coarse admission control: each lane allows at most N dequeues per fixed
//! time window, independently of its concurrency limit.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed-window rate limiter.
///
/// Permits up to `max_per_window` acquisitions per window; once the window
/// is exhausted, `acquire` suspends until the next window opens. A limit of
/// 0 disables limiting entirely.
pub struct FixedWindowLimiter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    window_start: Instant,
    used: u32,
}

impl FixedWindowLimiter {
    /// Create a new limiter allowing `max_per_window` acquisitions per `window`.
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Acquire a permit, waiting for the next window if the current one is
    /// exhausted.
    pub async fn acquire(&self) {
        if self.max_per_window == 0 {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if now.duration_since(state.window_start) >= self.window {
                    state.window_start = now;
                    state.used = 0;
                }
                if state.used < self.max_per_window {
                    state.used += 1;
                    return;
                }
                self.window - now.duration_since(state.window_start)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_limit_without_waiting() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(1));

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_next_window() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // Third acquisition must wait for the window to roll over
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_elapse() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(100));

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // New window, no waiting
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_disables_limiting() {
        let limiter = FixedWindowLimiter::new(0, Duration::from_secs(1));

        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
