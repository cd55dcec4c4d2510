pub mod command;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub use command::CommandEngine;

/// The two analysis engines. `Ann` is the statistical/learning engine,
/// `Eo` the decay-simulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Ann,
    Eo,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Ann, EngineKind::Eo];

    /// Directory and blob-path component for this engine's artifacts.
    pub fn slug(self) -> &'static str {
        match self {
            EngineKind::Ann => "ann",
            EngineKind::Eo => "eo",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::Ann => "ANN",
            EngineKind::Eo => "EO",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{engine} engine failed (exit code {exit_code:?}): {stderr}")]
pub struct EngineFailure {
    pub engine: EngineKind,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Narrow contract around one external engine: analyse `input` into
/// `output_dir`, naming outputs after `output_name`, and return the engine's
/// free-text diagnostic. Exactly one call per request; no retries.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        output_name: &str,
    ) -> Result<String, EngineFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Pending,
    Succeeded { diagnostic: String },
    Failed { cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One engine invocation for one request. Owned and completed by the dispatcher.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub engine: EngineKind,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    outcome: EngineOutcome,
}

impl EngineRun {
    pub fn pending(engine: EngineKind, input_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            engine,
            input_path,
            output_dir,
            outcome: EngineOutcome::Pending,
        }
    }

    pub fn succeed(mut self, diagnostic: String) -> Self {
        self.outcome = EngineOutcome::Succeeded { diagnostic };
        self
    }

    pub fn fail(mut self, cause: String) -> Self {
        self.outcome = EngineOutcome::Failed { cause };
        self
    }

    pub fn status(&self) -> EngineStatus {
        match self.outcome {
            EngineOutcome::Pending => EngineStatus::Pending,
            EngineOutcome::Succeeded { .. } => EngineStatus::Succeeded,
            EngineOutcome::Failed { .. } => EngineStatus::Failed,
        }
    }

    pub fn outcome(&self) -> &EngineOutcome {
        &self.outcome
    }

    /// Diagnostic text of a successful run; `None` is the "no result" sentinel.
    pub fn diagnostic(&self) -> Option<&str> {
        match &self.outcome {
            EngineOutcome::Succeeded { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status() == EngineStatus::Succeeded
    }
}

/// Both runs of one request, as handed from the dispatcher to the assembler.
#[derive(Debug, Clone)]
pub struct EngineRuns {
    pub ann: EngineRun,
    pub eo: EngineRun,
}

impl EngineRuns {
    pub fn iter(&self) -> impl Iterator<Item = &EngineRun> {
        [&self.ann, &self.eo].into_iter()
    }
}
