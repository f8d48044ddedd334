use axum::extract::FromRef;

use crate::job_store::JobStore;
use crate::queue::Dispatcher;
use std::sync::Arc;

use super::ServerConfig;

pub type GuardedJobStore = Arc<dyn JobStore>;
pub type GuardedDispatcher = Arc<Dispatcher>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub job_store: GuardedJobStore,
    pub dispatcher: GuardedDispatcher,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        job_store: GuardedJobStore,
        dispatcher: GuardedDispatcher,
    ) -> Self {
        Self {
            config,
            job_store,
            dispatcher,
        }
    }
}

impl FromRef<ServerState> for GuardedJobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.job_store.clone()
    }
}

impl FromRef<ServerState> for GuardedDispatcher {
    fn from_ref(input: &ServerState) -> Self {
        input.dispatcher.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
