pub mod agents;
pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod job_client;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod redis_client;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
