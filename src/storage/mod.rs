pub mod azure;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;

pub use azure::AzureBlobStore;

/// Durable blob storage the pipeline downloads inputs from and publishes to.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads `local_file` to `container/blob_path` and returns its locator.
    async fn save(
        &self,
        container: &str,
        blob_path: &str,
        local_file: &Path,
    ) -> Result<String, AppError>;

    async fn download(
        &self,
        container: &str,
        blob_name: &str,
        local_path: &Path,
    ) -> Result<(), AppError>;
}

/// A file that has been moved to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub container: String,
    pub blob_path: String,
    pub local_path: PathBuf,
    pub locator: String,
}
