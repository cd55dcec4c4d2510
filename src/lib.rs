pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod request;
pub mod routes;
pub mod storage;
pub mod telemetry;
pub mod workspace;

pub use config::Config;

use std::sync::Arc;

use pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}
