use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::process::Command;

use super::{Engine, EngineFailure, EngineKind};
use crate::config::EngineCommandConfig;
use crate::telemetry::metrics::ENGINE_RUN_DURATION;

/// Runs an engine as an external process. Stdout is the diagnostic text;
/// a non-zero exit or a spawn error is an [`EngineFailure`] carrying stderr.
pub struct CommandEngine {
    kind: EngineKind,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandEngine {
    pub fn new(kind: EngineKind, config: &EngineCommandConfig) -> Self {
        Self {
            kind,
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    fn expand_args(&self, input: &Path, output_dir: &Path, output_name: &str) -> Vec<String> {
        let stem = output_name.strip_suffix(".csv").unwrap_or(output_name);
        let input = input.display().to_string();
        let output_dir = output_dir.display().to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output_dir}", &output_dir)
                    .replace("{output_name}", output_name)
                    .replace("{stem}", stem)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Engine for CommandEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    #[tracing::instrument(
        name = "engine.run",
        skip(self),
        fields(engine = %self.kind, engine.exit_code)
    )]
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        output_name: &str,
    ) -> Result<String, EngineFailure> {
        let args = self.expand_args(input, output_dir, output_name);
        tracing::info!(program = %self.program, ?args, "Running engine");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let output = command.output().await.map_err(|e| EngineFailure {
            engine: self.kind,
            exit_code: None,
            stderr: format!("failed to start {}: {e}", self.program),
        })?;

        ENGINE_RUN_DURATION.record(
            start.elapsed().as_secs_f64(),
            &[KeyValue::new("engine", self.kind.slug())],
        );
        tracing::Span::current().record("engine.exit_code", output.status.code().unwrap_or(-1));

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(EngineFailure {
                engine: self.kind,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
