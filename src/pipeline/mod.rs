pub mod assemble;
pub mod dispatch;
pub mod orchestrator;
pub mod publish;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::db::DatasetStore;
use crate::engine::Engine;
use crate::notify::Notifier;
use crate::report::Renderer;
use crate::storage::BlobStore;

pub use orchestrator::spawn;

/// The slice of [`Config`] the background pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub download_container: String,
    pub admin_email: String,
    pub email_subject: String,
    pub email_body: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            download_container: config.download_container.clone(),
            admin_email: config.admin_email.clone(),
            email_subject: config.email_subject.clone(),
            email_body: config.email_body.clone(),
        }
    }
}

/// Everything one analysis run talks to. Built once at start-up and shared
/// by every request.
pub struct Pipeline {
    pub settings: PipelineSettings,
    pub store: Arc<dyn BlobStore>,
    pub datasets: Arc<dyn DatasetStore>,
    pub notifier: Arc<dyn Notifier>,
    pub renderer: Arc<dyn Renderer>,
    pub ann: Arc<dyn Engine>,
    pub eo: Arc<dyn Engine>,
}

#[cfg(test)]
pub(crate) mod testing;
