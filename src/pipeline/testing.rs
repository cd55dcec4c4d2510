//! In-memory collaborators for exercising the pipeline without network,
//! database or real engines.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use super::{Pipeline, PipelineSettings};
use crate::db::DatasetStore;
use crate::engine::{Engine, EngineFailure, EngineKind};
use crate::error::AppError;
use crate::notify::Notifier;
use crate::report::{HtmlRenderer, Renderer, ReportModel, SkippedRow};
use crate::storage::{BlobStore, PublishedArtifact};
use crate::workspace::Workspace;

pub const ADMIN: &str = "admin@example.org";
pub const SUBJECT: &str = "SWOT report";

/// Header plus 20 samples.
pub fn sample_input() -> String {
    let mut csv = String::from("ts_datetime,ts_frc,hh_datetime,hh_frc,ts_wattemp,ts_cond\n");
    for i in 0..20 {
        csv.push_str(&format!("2021-01-{:02}T08:00,0.{i},2021-01-{:02}T20:00,0.3,25,100\n", i + 1, i + 1));
    }
    csv
}

enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

pub struct FakeEngine {
    kind: EngineKind,
    behaviour: Behaviour,
    calls: AtomicUsize,
    eo_skipped_rows: usize,
}

impl FakeEngine {
    pub fn ann_ok() -> Self {
        Self::new(EngineKind::Ann, Behaviour::Succeed)
    }

    pub fn eo_ok() -> Self {
        Self::new(EngineKind::Eo, Behaviour::Succeed)
    }

    pub fn failing(kind: EngineKind) -> Self {
        Self::new(kind, Behaviour::Fail)
    }

    pub fn panicking(kind: EngineKind) -> Self {
        Self::new(kind, Behaviour::Panic)
    }

    /// EO engine that reports `rows` excluded samples.
    pub fn eo_skipping(rows: usize) -> Self {
        Self {
            eo_skipped_rows: rows,
            ..Self::eo_ok()
        }
    }

    fn new(kind: EngineKind, behaviour: Behaviour) -> Self {
        Self {
            kind,
            behaviour,
            calls: AtomicUsize::new(0),
            eo_skipped_rows: 3,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn write_outputs(&self, output_dir: &Path, stem: &str) -> std::io::Result<String> {
        match self.kind {
            EngineKind::Ann => {
                std::fs::write(
                    output_dir.join(format!("{stem}.html")),
                    r#"<html><body>
                    <p class="swot_version">ANN test</p>
                    <span class="time_difference">6 hours</span>
                    <table id="annTable"><tr><td>Optimum</td><td>0.6</td></tr></table>
                    <div id="pythonSkipped"><table><tr><td>row 2</td></tr></table></div>
                    <span id="pythonSkipped_count">1</span>
                    <table id="ann_ruleset"><tr><td>hh_frc missing</td><td>1</td></tr><tr><td>late</td><td>0</td></tr></table>
                    </body></html>"#,
                )?;
                std::fs::write(output_dir.join(format!("{stem}-frc.jpg")), [0xff, 0xd8, 0xff])?;
                Ok(String::new())
            }
            EngineKind::Eo => {
                let mut skipped = String::from("ts_datetime,ts_frc,reason\n");
                for i in 0..self.eo_skipped_rows {
                    skipped.push_str(&format!("2021-02-{:02}T08:00,,ts_frc missing\n", i + 1));
                }
                std::fs::write(output_dir.join(format!("{stem}_SkippedRows.csv")), skipped)?;
                std::fs::write(
                    output_dir.join(format!("{stem}_Ruleset.csv")),
                    "rule,count\nts_frc missing,3\nduplicate,0\n",
                )?;
                std::fs::write(output_dir.join(format!("{stem}_Contour.png")), b"\x89PNG")?;
                Ok("simulation complete\nFRC=0.8;".to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl Engine for FakeEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn run(
        &self,
        _input: &Path,
        output_dir: &Path,
        output_name: &str,
    ) -> Result<String, EngineFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = |stderr: String| EngineFailure {
            engine: self.kind,
            exit_code: Some(1),
            stderr,
        };

        match self.behaviour {
            Behaviour::Succeed => {
                let stem = output_name.strip_suffix(".csv").unwrap_or(output_name);
                self.write_outputs(output_dir, stem)
                    .map_err(|e| failure(e.to_string()))
            }
            Behaviour::Fail => Err(failure("Traceback: model diverged".to_string())),
            Behaviour::Panic => panic!("engine adapter bug"),
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    missing_input: AtomicBool,
    fail_saves: AtomicBool,
    downloads: AtomicUsize,
    saved: Mutex<Vec<(String, String)>>,
}

impl FakeStore {
    pub fn fail_download(&self) {
        self.missing_input.store(true, Ordering::SeqCst);
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<(String, String)> {
        let mut saved = self.saved.lock().unwrap().clone();
        saved.sort();
        saved
    }
}

#[async_trait::async_trait]
impl BlobStore for FakeStore {
    async fn save(&self, container: &str, blob_path: &str, local_file: &Path) -> Result<String, AppError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::Storage("storage unavailable".to_string()));
        }
        if !local_file.is_file() {
            return Err(AppError::Storage(format!("{} is not a file", local_file.display())));
        }
        self.saved
            .lock()
            .unwrap()
            .push((container.to_string(), blob_path.to_string()));
        Ok(format!("memory://{container}/{blob_path}"))
    }

    async fn download(&self, container: &str, blob_name: &str, local_path: &Path) -> Result<(), AppError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.missing_input.load(Ordering::SeqCst) {
            return Err(AppError::NotFound(format!("blob {container}/{blob_name}")));
        }
        tokio::fs::write(local_path, sample_input()).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDatasets {
    unknown: AtomicBool,
    fail_record: AtomicBool,
    recorded: Mutex<Vec<(String, PublishedArtifact)>>,
}

impl FakeDatasets {
    pub fn forget_datasets(&self) {
        self.unknown.store(true, Ordering::SeqCst);
    }

    pub fn fail_record(&self) {
        self.fail_record.store(true, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<(String, PublishedArtifact)> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DatasetStore for FakeDatasets {
    async fn skipped_rows(&self, dataset_id: &str) -> Result<Vec<SkippedRow>, AppError> {
        if self.unknown.load(Ordering::SeqCst) {
            return Err(AppError::NotFound(format!("dataset {dataset_id}")));
        }
        Ok(vec![
            SkippedRow { reason: "duplicate".into(), ..Default::default() },
            SkippedRow { reason: "bad date".into(), ..Default::default() },
        ])
    }

    async fn record_report(&self, dataset_id: &str, report: &PublishedArtifact) -> Result<(), AppError> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(AppError::NotFound(format!("dataset {dataset_id}")));
        }
        self.recorded
            .lock()
            .unwrap()
            .push((dataset_id.to_string(), report.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
    pub attachment_existed: bool,
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<SentMail>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMail> {
        self.sent().into_iter().filter(|m| m.recipient == recipient).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for FakeNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            attachment: attachment.map(Path::to_path_buf),
            attachment_existed: attachment.is_some_and(Path::is_file),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    fail: AtomicBool,
    models: Mutex<Vec<ReportModel>>,
}

impl FakeRenderer {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn models(&self) -> Vec<ReportModel> {
        self.models.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Renderer for FakeRenderer {
    fn extension(&self) -> &'static str {
        "html"
    }

    async fn render(&self, model: &ReportModel) -> Result<Vec<u8>, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Render("template error".to_string()));
        }
        self.models.lock().unwrap().push(model.clone());
        HtmlRenderer.render(model).await
    }
}

pub struct Harness {
    pub work_dir: TempDir,
    pub pipeline: Arc<Pipeline>,
    pub ann: Arc<FakeEngine>,
    pub eo: Arc<FakeEngine>,
    pub store: Arc<FakeStore>,
    pub datasets: Arc<FakeDatasets>,
    pub notifier: Arc<FakeNotifier>,
    pub renderer: Arc<FakeRenderer>,
}

impl Harness {
    pub fn new(ann: FakeEngine, eo: FakeEngine) -> Self {
        let work_dir = tempfile::tempdir().unwrap();
        let ann = Arc::new(ann);
        let eo = Arc::new(eo);
        let store = Arc::new(FakeStore::default());
        let datasets = Arc::new(FakeDatasets::default());
        let notifier = Arc::new(FakeNotifier::default());
        let renderer = Arc::new(FakeRenderer::default());

        let pipeline = Arc::new(Pipeline {
            settings: PipelineSettings {
                work_dir: work_dir.path().to_path_buf(),
                download_container: "uploads".to_string(),
                admin_email: ADMIN.to_string(),
                email_subject: SUBJECT.to_string(),
                email_body: "Your report is attached.".to_string(),
            },
            store: store.clone(),
            datasets: datasets.clone(),
            notifier: notifier.clone(),
            renderer: renderer.clone(),
            ann: ann.clone(),
            eo: eo.clone(),
        });

        Self {
            work_dir,
            pipeline,
            ann,
            eo,
            store,
            datasets,
            notifier,
            renderer,
        }
    }

    pub fn healthy() -> Self {
        Self::new(FakeEngine::ann_ok(), FakeEngine::eo_ok())
    }

    pub fn workspace(&self, staged_filename: &str) -> Workspace {
        Workspace::new(self.work_dir.path(), staged_filename)
    }

    pub fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir.path()).unwrap().next().is_none()
    }
}
