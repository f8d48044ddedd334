//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all jobs-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use reqwest::Response;
use serde_json::Value as JsonValue;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// GET /health
    pub async fn health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Request failed")
    }

    /// POST /jobs with an arbitrary JSON body
    pub async fn create_job(&self, body: &JsonValue) -> Response {
        self.client
            .post(format!("{}/jobs", self.base_url))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// GET /jobs/{id}
    pub async fn get_job(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/jobs/{}", self.base_url, id))
            .send()
            .await
            .expect("Request failed")
    }

    /// GET /stats
    pub async fn stats(&self) -> Response {
        self.client
            .get(format!("{}/stats", self.base_url))
            .send()
            .await
            .expect("Request failed")
    }

    /// POST /jobs, asserting creation succeeds, and return the new job id.
    pub async fn submit_job(&self, body: &JsonValue) -> String {
        let response = self.create_job(body).await;
        assert_eq!(response.status(), 201, "Job creation failed");
        let body: JsonValue = response.json().await.expect("Invalid JSON response");
        body.get("jobId")
            .and_then(|id| id.as_str())
            .expect("Response missing jobId")
            .to_string()
    }

    /// Polls a job until its status reaches a terminal state, then returns
    /// the job JSON. Panics if the deadline passes first.
    pub async fn wait_for_terminal(&self, id: &str, timeout: Duration) -> JsonValue {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let response = self.get_job(id).await;
            assert_eq!(response.status(), 200);
            let job: JsonValue = response.json().await.expect("Invalid JSON response");

            let status = job.get("status").and_then(|s| s.as_str()).unwrap_or("");
            if status == "completed" || status == "failed" {
                return job;
            }

            if tokio::time::Instant::now() > deadline {
                panic!("Job {} did not reach a terminal state in time: {}", id, job);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Polls a job until it has made at least `attempts` attempts, then
    /// returns the job JSON.
    pub async fn wait_for_attempts(&self, id: &str, attempts: i64, timeout: Duration) -> JsonValue {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let response = self.get_job(id).await;
            assert_eq!(response.status(), 200);
            let job: JsonValue = response.json().await.expect("Invalid JSON response");

            if job.get("attempts").and_then(|a| a.as_i64()).unwrap_or(0) >= attempts {
                return job;
            }

            if tokio::time::Instant::now() > deadline {
                panic!("Job {} did not reach {} attempts in time: {}", id, attempts, job);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
