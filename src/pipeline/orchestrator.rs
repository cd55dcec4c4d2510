use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::assemble::{AssemblyInput, assemble, count_samples};
use super::dispatch::{run_engines, stage_input};
use super::publish::publish;
use super::Pipeline;
use crate::error::AppError;
use crate::notify;
use crate::request::AnalysisRequest;
use crate::storage::PublishedArtifact;
use crate::telemetry::metrics::{ANALYSIS_REQUESTS, PIPELINE_DURATION};
use crate::workspace::Workspace;

/// Runs an admitted request in the background. The returned handle belongs
/// to a supervisor that reports a crashed pipeline to the administrator.
pub fn spawn(pipeline: Arc<Pipeline>, request: AnalysisRequest) -> JoinHandle<()> {
    let span = tracing::info_span!(
        "analysis",
        analysis.id = %Uuid::new_v4(),
        dataset.id = %request.dataset_id,
        dataset.file = %request.staged_filename(),
    );
    let supervisor = pipeline.clone();
    let summary = format!("{request:?}");
    let task = tokio::spawn(process(pipeline, request).instrument(span.clone()));

    tokio::spawn(
        async move {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Analysis task crashed");
                ANALYSIS_REQUESTS.add(1, &[KeyValue::new("outcome", "crashed")]);
                notify::notify_admin(
                    supervisor.notifier.as_ref(),
                    &supervisor.settings.admin_email,
                    &format!("Analysis crashed ({e}). Request: {summary}"),
                )
                .await;
            }
        }
        .instrument(span),
    )
}

/// One request end to end. Every outcome is reported through mail, and the
/// staging area is removed before this returns.
#[tracing::instrument(
    name = "pipeline analysis",
    skip_all,
    fields(analysis.outcome, analysis.duration_ms)
)]
pub async fn process(
    pipeline: Arc<Pipeline>,
    request: AnalysisRequest,
) -> Result<PublishedArtifact, AppError> {
    let start = Instant::now();
    let settings = &pipeline.settings;
    let workspace = Workspace::new(&settings.work_dir, &request.staged_filename());
    let _cleanup = workspace.cleanup_guard();

    let result = execute(&pipeline, &request, &workspace).await;

    let outcome = match &result {
        Ok(artifact) => {
            let delivered = notify::notify_user(
                pipeline.notifier.as_ref(),
                &request.recipient,
                &settings.email_subject,
                &settings.email_body,
                Some(&artifact.local_path),
            )
            .await;
            if delivered { "succeeded" } else { "undelivered" }
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Analysis failed");
            notify::notify_user(
                pipeline.notifier.as_ref(),
                &request.recipient,
                &format!("{} - ERROR", settings.email_subject),
                &failure_body(&request, &settings.admin_email),
                None,
            )
            .await;
            notify::notify_admin(
                pipeline.notifier.as_ref(),
                &settings.admin_email,
                &format!("Error occurred while producing the analysis report: {e}. Request: {request:?}"),
            )
            .await;
            e.kind()
        }
    };

    let elapsed = start.elapsed();
    let span = tracing::Span::current();
    span.record("analysis.outcome", outcome);
    span.record("analysis.duration_ms", elapsed.as_millis() as u64);
    ANALYSIS_REQUESTS.add(1, &[KeyValue::new("outcome", outcome)]);
    PIPELINE_DURATION.record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", outcome)]);

    result
}

async fn execute(
    pipeline: &Pipeline,
    request: &AnalysisRequest,
    workspace: &Workspace,
) -> Result<PublishedArtifact, AppError> {
    // Stage 1: Stage the raw dataset locally
    let input = stage_input(
        pipeline.store.as_ref(),
        &pipeline.settings.download_container,
        request,
        workspace,
    )
    .await?;

    // Stage 2: Both engines, concurrently
    let runs = run_engines(pipeline, workspace).await;

    // Stage 3: Reconcile engine outputs with the upload-time exclusions
    let web_skipped = pipeline.datasets.skipped_rows(&request.dataset_id).await?;
    let staged_rows = count_samples(&input).await?;
    let assembly = AssemblyInput {
        request: request.clone(),
        workspace: workspace.clone(),
        runs: runs.clone(),
        web_skipped,
        staged_rows,
        report_date: chrono::Local::now().date_naive(),
    };
    let model = tokio::task::spawn_blocking(move || assemble(assembly))
        .await
        .map_err(|e| AppError::Pipeline(format!("assembly task failed: {e}")))??;

    // Stage 4: Render the document next to the staged input
    let bytes = pipeline.renderer.render(&model).await?;
    let document = workspace.document_path(pipeline.renderer.extension());
    tokio::fs::write(&document, bytes).await?;

    // Stage 5: Publish document and engine outputs
    publish(
        pipeline.store.as_ref(),
        pipeline.datasets.as_ref(),
        request,
        &document,
        &runs,
    )
    .await
}

fn failure_body(request: &AnalysisRequest, admin_email: &str) -> String {
    format!(
        "There was an error with the analysis of a dataset you recently uploaded ({}). \
         Please contact the administrator ({admin_email}) for more information.",
        request.staged_filename()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;
    use crate::pipeline::testing::{ADMIN, FakeEngine, Harness, SUBJECT};
    use crate::request::AnalysisQuery;

    const USER: &str = "user@example.org";

    fn request(filename: &str, dataset: &str) -> AnalysisRequest {
        AnalysisRequest::try_from(AnalysisQuery {
            filename: Some(filename.to_string()),
            recipient: Some(USER.to_string()),
            country: Some("sudan".to_string()),
            project: Some("Water-3".to_string()),
            fieldsite: Some("Camp-9".to_string()),
            dataset: Some(dataset.to_string()),
            prefix: None,
        })
        .unwrap()
    }

    fn default_request() -> AnalysisRequest {
        request("Camp1__TS__168__maxDecay.csv", "ds1")
    }

    fn assert_failure_reported(harness: &Harness) {
        let user = harness.notifier.sent_to(USER);
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].subject, format!("{SUBJECT} - ERROR"));
        assert!(user[0].body.contains("Camp1__TS__168__maxDecay.csv"));
        assert!(!user[0].body.contains("Error occurred"));
        assert!(user[0].attachment.is_none());
        assert!(!harness.notifier.sent_to(ADMIN).is_empty());
        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_success_publishes_notifies_and_cleans_up() {
        let harness = Harness::healthy();

        let artifact =
            tokio_test::assert_ok!(process(harness.pipeline.clone(), default_request()).await);

        assert_eq!(artifact.container, "sudan");
        assert_eq!(artifact.blob_path, "Water-3/Camp-9/ds1/analysis/Camp1__TS__168__maxDecay.html");

        let saved: Vec<String> = harness.store.saved().into_iter().map(|(_, p)| p).collect();
        assert!(saved.contains(&"Water-3/Camp-9/ds1/analysis/ann/Camp1__TS__168__maxDecay.html".to_string()));
        assert!(saved.contains(&"Water-3/Camp-9/ds1/analysis/eo/Camp1__TS__168__maxDecay_SkippedRows.csv".to_string()));
        assert_eq!(harness.datasets.recorded().len(), 1);

        let mail = harness.notifier.sent_to(USER);
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].subject, SUBJECT);
        assert!(mail[0].attachment_existed);
        assert!(harness.notifier.sent_to(ADMIN).is_empty());

        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_ann_failure_still_publishes_with_eo_data() {
        let harness = Harness::new(FakeEngine::failing(EngineKind::Ann), FakeEngine::eo_ok());

        process(harness.pipeline.clone(), default_request()).await.unwrap();

        let model = &harness.renderer.models()[0];
        assert_eq!(model.ann.diagnostic, None);
        assert_eq!(model.eo.frc, 0.8);
        assert!(harness.store.saved().iter().all(|(_, p)| !p.contains("/analysis/ann/")));
        assert_eq!(harness.notifier.sent_to(ADMIN).len(), 1);
        assert_eq!(harness.notifier.sent_to(USER)[0].subject, SUBJECT);
        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_eo_failure_still_publishes_with_ann_data() {
        let harness = Harness::new(FakeEngine::ann_ok(), FakeEngine::failing(EngineKind::Eo));

        process(harness.pipeline.clone(), default_request()).await.unwrap();

        let model = &harness.renderer.models()[0];
        assert_eq!(model.eo.diagnostic, None);
        assert_eq!(model.eo.frc, 0.0);
        assert_eq!(model.ann.skipped_count, 1);
        assert_eq!(harness.notifier.sent_to(USER)[0].subject, SUBJECT);
        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_download_failure() {
        let harness = Harness::healthy();
        harness.store.fail_download();

        tokio_test::assert_err!(process(harness.pipeline.clone(), default_request()).await);
        assert_eq!(harness.ann.calls(), 0);
        assert_eq!(harness.eo.calls(), 0);
        assert_failure_reported(&harness);
    }

    #[tokio::test]
    async fn test_dataset_lookup_failure() {
        let harness = Harness::healthy();
        harness.datasets.forget_datasets();

        assert!(matches!(
            process(harness.pipeline.clone(), default_request()).await,
            Err(AppError::NotFound(_))
        ));
        assert_failure_reported(&harness);
    }

    #[tokio::test]
    async fn test_assembly_failure() {
        let harness = Harness::new(FakeEngine::ann_ok(), FakeEngine::eo_skipping(40));

        assert!(matches!(
            process(harness.pipeline.clone(), default_request()).await,
            Err(AppError::Assembly(_))
        ));
        assert!(harness.renderer.models().is_empty());
        assert_failure_reported(&harness);
    }

    #[tokio::test]
    async fn test_render_failure() {
        let harness = Harness::healthy();
        harness.renderer.fail();

        assert!(process(harness.pipeline.clone(), default_request()).await.is_err());
        assert!(harness.store.saved().is_empty());
        assert_failure_reported(&harness);
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let harness = Harness::healthy();
        harness.store.fail_saves();

        assert!(matches!(
            process(harness.pipeline.clone(), default_request()).await,
            Err(AppError::Storage(_))
        ));
        assert!(harness.datasets.recorded().is_empty());
        assert_failure_reported(&harness);
    }

    #[tokio::test]
    async fn test_record_failure() {
        let harness = Harness::healthy();
        harness.datasets.fail_record();

        tokio_test::assert_err!(process(harness.pipeline.clone(), default_request()).await);
        assert_failure_reported(&harness);
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_distinct_datasets() {
        let harness = Harness::healthy();
        let first = request("Alpha__12__minDecay.csv", "ds-a");
        let second = request("Beta__24__maxDecay.csv", "ds-b");

        let (a, b) = tokio::join!(
            process(harness.pipeline.clone(), first),
            process(harness.pipeline.clone(), second),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.blob_path, "Water-3/Camp-9/ds-a/analysis/Alpha__12__minDecay.html");
        assert_eq!(b.blob_path, "Water-3/Camp-9/ds-b/analysis/Beta__24__maxDecay.html");

        let mut names: Vec<String> = harness
            .renderer
            .models()
            .into_iter()
            .map(|m| format!("{}:{}:{}", m.dataset_name, m.num_samples, m.flowchart.remaining_after_ann))
            .collect();
        names.sort();
        assert_eq!(names, vec!["Alpha:20:16", "Beta:20:16"]);

        let saved = harness.store.saved();
        assert!(saved.iter().filter(|(_, p)| p.contains("/ds-a/")).all(|(_, p)| !p.contains("Beta")));
        assert!(saved.iter().filter(|(_, p)| p.contains("/ds-b/")).all(|(_, p)| !p.contains("Alpha")));
        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_request_cannot_touch_paths_outside_work_dir() {
        let harness = Harness::healthy();
        let outside = tempfile::tempdir().unwrap();
        let outside_name = outside.path().file_name().unwrap().to_str().unwrap().to_string();
        let victim = outside.path().join("x-victim.csv");
        std::fs::create_dir_all(&victim).unwrap();
        std::fs::write(victim.join("keep.txt"), "keep").unwrap();

        // built directly, as admission would reject the prefix
        let mut escaping = request("victim.csv", "ds1");
        escaping.debug_prefix = Some(format!("../{outside_name}/x"));

        tokio_test::assert_err!(process(harness.pipeline.clone(), escaping).await);

        assert_eq!(harness.store.downloads(), 0);
        assert_eq!(harness.ann.calls(), 0);
        assert!(victim.join("keep.txt").is_file());
        assert!(harness.work_dir_is_empty());
        assert_eq!(harness.notifier.sent_to(USER)[0].subject, format!("{SUBJECT} - ERROR"));
    }

    #[tokio::test]
    async fn test_supervisor_reports_completion_quietly() {
        let harness = Harness::healthy();
        spawn(harness.pipeline.clone(), default_request()).await.unwrap();
        assert!(harness.notifier.sent_to(ADMIN).is_empty());
        assert_eq!(harness.notifier.sent_to(USER).len(), 1);
    }
}
