use std::path::PathBuf;
use std::sync::Arc;

use opentelemetry::KeyValue;

use super::Pipeline;
use crate::engine::{Engine, EngineRun, EngineRuns};
use crate::error::AppError;
use crate::notify::{self, Notifier};
use crate::request::AnalysisRequest;
use crate::storage::BlobStore;
use crate::telemetry::metrics::ENGINE_FAILURES;
use crate::workspace::Workspace;

/// Downloads the raw dataset into the request's staging area.
#[tracing::instrument(name = "pipeline_stage stage_input", skip_all, fields(blob = %request.filename))]
pub async fn stage_input(
    store: &dyn BlobStore,
    container: &str,
    request: &AnalysisRequest,
    workspace: &Workspace,
) -> Result<PathBuf, AppError> {
    workspace.prepare().await?;
    let input = workspace.input_path();
    store.download(container, &request.filename, &input).await?;
    Ok(input)
}

/// Runs both engines concurrently, each in its own task. A failed engine is
/// recorded on its run and reported to the administrator as soon as it
/// happens; this never fails as a whole.
#[tracing::instrument(name = "pipeline_stage run_engines", skip_all)]
pub async fn run_engines(pipeline: &Pipeline, workspace: &Workspace) -> EngineRuns {
    let ann = spawn_engine(pipeline, pipeline.ann.clone(), workspace);
    let eo = spawn_engine(pipeline, pipeline.eo.clone(), workspace);

    let (ann, eo) = tokio::join!(ann, eo);
    EngineRuns { ann, eo }
}

async fn spawn_engine(
    pipeline: &Pipeline,
    engine: Arc<dyn Engine>,
    workspace: &Workspace,
) -> EngineRun {
    let kind = engine.kind();
    let run = EngineRun::pending(kind, workspace.input_path(), workspace.engine_dir(kind));
    let notifier = pipeline.notifier.clone();
    let admin_email = pipeline.settings.admin_email.clone();
    let output_name = workspace.staged_filename().to_string();

    let task = {
        let run = run.clone();
        let notifier = notifier.clone();
        let admin_email = admin_email.clone();
        tokio::spawn(async move {
            execute_engine(engine, run, &output_name, notifier.as_ref(), &admin_email).await
        })
    };

    match task.await {
        Ok(run) => run,
        Err(e) => {
            let cause = format!("{kind} engine task aborted: {e}");
            tracing::error!(engine = %kind, error = %e, "Engine task did not complete");
            ENGINE_FAILURES.add(1, &[KeyValue::new("engine", kind.slug())]);
            notify::notify_admin(notifier.as_ref(), &admin_email, &cause).await;
            run.fail(cause)
        }
    }
}

async fn execute_engine(
    engine: Arc<dyn Engine>,
    run: EngineRun,
    output_name: &str,
    notifier: &dyn Notifier,
    admin_email: &str,
) -> EngineRun {
    let kind = run.engine;

    if let Err(e) = tokio::fs::create_dir_all(&run.output_dir).await {
        let cause = format!("could not create output directory {}: {e}", run.output_dir.display());
        return record_failure(run, cause, notifier, admin_email).await;
    }

    match engine.run(&run.input_path, &run.output_dir, output_name).await {
        Ok(diagnostic) => {
            tracing::info!(engine = %kind, "Engine finished");
            run.succeed(diagnostic)
        }
        Err(failure) => {
            let cause = failure.to_string();
            record_failure(run, cause, notifier, admin_email).await
        }
    }
}

async fn record_failure(
    run: EngineRun,
    cause: String,
    notifier: &dyn Notifier,
    admin_email: &str,
) -> EngineRun {
    let kind = run.engine;
    tracing::error!(engine = %kind, error = %cause, "Engine failed");
    ENGINE_FAILURES.add(1, &[KeyValue::new("engine", kind.slug())]);

    let input = run
        .input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    notify::notify_admin(
        notifier,
        admin_email,
        &format!("Error occurred during {kind} analysis of {input}: {cause}"),
    )
    .await;

    run.fail(cause)
}
