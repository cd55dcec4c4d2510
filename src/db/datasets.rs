use serde_json::Value;
use sqlx::PgPool;

use crate::error::AppError;
use crate::report::SkippedRow;
use crate::storage::PublishedArtifact;

/// The dataset records kept by the upload front end. The pipeline reads the
/// rows excluded at upload time and writes back where the report landed.
#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    async fn skipped_rows(&self, dataset_id: &str) -> Result<Vec<SkippedRow>, AppError>;

    async fn record_report(
        &self,
        dataset_id: &str,
        report: &PublishedArtifact,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgDatasetStore {
    pool: PgPool,
}

impl PgDatasetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DatasetStore for PgDatasetStore {
    #[tracing::instrument(name = "db.datasets.skipped_rows", skip(self), fields(row_count))]
    async fn skipped_rows(&self, dataset_id: &str) -> Result<Vec<SkippedRow>, AppError> {
        let row: Option<(Option<Value>,)> =
            sqlx::query_as("SELECT skipped_rows FROM datasets WHERE id = $1")
                .bind(dataset_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((value,)) = row else {
            return Err(AppError::NotFound(format!("dataset {dataset_id}")));
        };

        let rows = rows_from_json(value.as_ref());
        tracing::Span::current().record("row_count", rows.len());
        Ok(rows)
    }

    #[tracing::instrument(name = "db.datasets.record_report", skip(self, report))]
    async fn record_report(
        &self,
        dataset_id: &str,
        report: &PublishedArtifact,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE datasets \
             SET container_name = $2, blob_name = $3, report_url = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(dataset_id)
        .bind(&report.container)
        .bind(&report.blob_path)
        .bind(&report.locator)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("dataset {dataset_id}")));
        }
        Ok(())
    }
}

/// `skipped_rows` is a JSON array of row objects; anything else holds no rows.
fn rows_from_json(value: Option<&Value>) -> Vec<SkippedRow> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(SkippedRow::from_json).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            tracing::warn!(kind = %json_kind(other), "Unexpected skipped_rows shape, treating as empty");
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
