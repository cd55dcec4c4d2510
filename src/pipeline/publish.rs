use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use opentelemetry::KeyValue;

use crate::db::DatasetStore;
use crate::engine::EngineRuns;
use crate::error::AppError;
use crate::request::AnalysisRequest;
use crate::storage::{BlobStore, PublishedArtifact};
use crate::telemetry::metrics::ARTIFACTS_UPLOADED;

/// One local file and the blob path it is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Upload {
    blob_path: String,
    local_path: PathBuf,
}

/// Uploads the document and the output of every engine that succeeded, then
/// records the document's location on the dataset. All uploads are listed up
/// front and joined before the database is touched.
#[tracing::instrument(name = "pipeline_stage publish", skip_all, fields(upload_count))]
pub async fn publish(
    store: &dyn BlobStore,
    datasets: &dyn DatasetStore,
    request: &AnalysisRequest,
    document: &Path,
    runs: &EngineRuns,
) -> Result<PublishedArtifact, AppError> {
    let prefix = request.analysis_prefix();
    let container = request.country.as_str();

    let document_name = file_name(document)?;
    let document_upload = Upload {
        blob_path: format!("{prefix}/{document_name}"),
        local_path: document.to_path_buf(),
    };

    let mut uploads = Vec::new();
    for run in runs.iter().filter(|r| r.succeeded()) {
        for local_path in list_files(&run.output_dir).await? {
            let name = file_name(&local_path)?;
            uploads.push(Upload {
                blob_path: format!("{prefix}/{}/{name}", run.engine.slug()),
                local_path,
            });
        }
    }
    tracing::Span::current().record("upload_count", uploads.len() + 1);

    let document_locator = store
        .save(container, &document_upload.blob_path, &document_upload.local_path)
        .await?;
    try_join_all(
        uploads
            .iter()
            .map(|u| store.save(container, &u.blob_path, &u.local_path)),
    )
    .await?;
    ARTIFACTS_UPLOADED.add(
        (uploads.len() + 1) as u64,
        &[KeyValue::new("container", container.to_string())],
    );

    let artifact = PublishedArtifact {
        container: container.to_string(),
        blob_path: document_upload.blob_path,
        local_path: document_upload.local_path,
        locator: document_locator,
    };
    datasets.record_report(&request.dataset_id, &artifact).await?;

    tracing::info!(locator = %artifact.locator, "Report published");
    Ok(artifact)
}

/// Regular files directly inside `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> Result<String, AppError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Pipeline(format!("{} has no file name", path.display())))
}
