use std::path::Path;

use reqwest::{Client, StatusCode, Url};

use super::BlobStore;
use crate::error::AppError;

/// Azure Blob Storage over its REST API, authorised by a SAS token.
pub struct AzureBlobStore {
    client: Client,
    account_url: Url,
    sas_token: String,
}

impl AzureBlobStore {
    pub fn new(account_url: &str, sas_token: &str) -> Result<Self, AppError> {
        let account_url = Url::parse(account_url)
            .map_err(|e| AppError::Config(format!("invalid blob account URL {account_url}: {e}")))?;
        if account_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "blob account URL has no path: {account_url}"
            )));
        }

        Ok(Self {
            client: Client::new(),
            account_url,
            sas_token: sas_token.trim_start_matches('?').to_string(),
        })
    }

    /// Account URL extended by percent-encoded path segments.
    fn resource_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> String {
        let mut url = self.account_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }

    /// Public locator of a blob (no credentials).
    pub fn blob_url(&self, container: &str, blob_path: &str) -> String {
        self.resource_url(std::iter::once(container).chain(blob_path.split('/')))
    }

    fn signed(&self, url: &str, extra_query: &str) -> String {
        let mut query = String::new();
        if !extra_query.is_empty() {
            query.push_str(extra_query);
        }
        if !self.sas_token.is_empty() {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&self.sas_token);
        }
        if query.is_empty() {
            url.to_string()
        } else {
            format!("{url}?{query}")
        }
    }

    async fn ensure_container(&self, container: &str) -> Result<(), AppError> {
        let url = self.resource_url([container]);
        let response = self
            .client
            .put(self.signed(&url, "restype=container"))
            .header("x-ms-version", "2021-08-06")
            .header("x-ms-blob-public-access", "blob")
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("create container {container}: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            status => Err(AppError::Storage(format!(
                "create container {container}: unexpected status {status}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for AzureBlobStore {
    #[tracing::instrument(name = "storage.save", skip(self, local_file), fields(bytes))]
    async fn save(
        &self,
        container: &str,
        blob_path: &str,
        local_file: &Path,
    ) -> Result<String, AppError> {
        self.ensure_container(container).await?;

        let body = tokio::fs::read(local_file).await.map_err(|e| {
            AppError::Storage(format!("read {}: {e}", local_file.display()))
        })?;
        tracing::Span::current().record("bytes", body.len());

        let url = self.blob_url(container, blob_path);
        let response = self
            .client
            .put(self.signed(&url, ""))
            .header("x-ms-version", "2021-08-06")
            .header("x-ms-blob-type", "BlockBlob")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("upload {blob_path}: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "upload {container}/{blob_path}: unexpected status {}",
                response.status()
            )));
        }

        tracing::info!(container, blob_path, "Blob uploaded");
        Ok(url)
    }

    #[tracing::instrument(name = "storage.download", skip(self, local_path))]
    async fn download(
        &self,
        container: &str,
        blob_name: &str,
        local_path: &Path,
    ) -> Result<(), AppError> {
        let url = self.blob_url(container, blob_name);
        let response = self
            .client
            .get(self.signed(&url, ""))
            .header("x-ms-version", "2021-08-06")
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("download {blob_name}: {e}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(format!("blob {container}/{blob_name}")));
            }
            status => {
                return Err(AppError::Storage(format!(
                    "download {container}/{blob_name}: unexpected status {status}"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Storage(format!("download {blob_name}: {e}")))?;
        tokio::fs::write(local_path, &bytes).await.map_err(|e| {
            AppError::Storage(format!("write {}: {e}", local_path.display()))
        })?;

        tracing::info!(container, blob_name, bytes = bytes.len(), "Blob downloaded");
        Ok(())
    }
}
