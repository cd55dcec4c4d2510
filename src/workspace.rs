//! Per-request staging area on the local filesystem.
//!
//! Every request owns `<work_dir>/<staged filename>/`, holding the downloaded
//! input, one output directory per engine and the rendered document. Isolation
//! between requests comes from that namespacing alone; two in-flight requests
//! for the identical filename would share a directory.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::engine::EngineKind;
use crate::telemetry::metrics::CLEANUP_FAILURES;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    staged_filename: String,
    stem: String,
}

impl Workspace {
    pub fn new(work_dir: &Path, staged_filename: &str) -> Self {
        let stem = staged_filename
            .strip_suffix(".csv")
            .unwrap_or(staged_filename)
            .to_string();

        Self {
            root: work_dir.join(staged_filename),
            staged_filename: staged_filename.to_string(),
            stem,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staged_filename(&self) -> &str {
        &self.staged_filename
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn input_path(&self) -> PathBuf {
        self.root.join(&self.staged_filename)
    }

    pub fn engine_dir(&self, engine: EngineKind) -> PathBuf {
        self.root.join(engine.slug())
    }

    pub fn document_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{extension}", self.stem))
    }

    /// True when the root is a direct child of the work dir.
    fn is_contained(&self) -> bool {
        let mut components = Path::new(&self.staged_filename).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }

    pub async fn prepare(&self) -> io::Result<()> {
        if !self.is_contained() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("staged filename escapes the work dir: {}", self.staged_filename),
            ));
        }
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Every path this request may have created, children before the root.
    fn staged_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.input_path()];
        paths.extend(EngineKind::ALL.iter().map(|&e| self.engine_dir(e)));
        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths.push(self.root.clone());
        paths
    }

    /// Removes all staged paths. Each removal is attempted independently; the
    /// paths that could not be removed are returned.
    pub fn cleanup(&self) -> Vec<PathBuf> {
        if !self.is_contained() {
            tracing::error!(root = %self.root.display(), "Refusing to clean a path outside the work dir");
            return Vec::new();
        }
        let mut failed = Vec::new();

        for path in self.staged_paths() {
            if let Err(e) = remove_path(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete staged path");
                CLEANUP_FAILURES.add(1, &[]);
                failed.push(path);
            }
        }

        if failed.is_empty() {
            tracing::debug!(root = %self.root.display(), "Staging area removed");
        }
        failed
    }

    /// Guard that cleans the workspace when dropped, whichever way the request ends.
    pub fn cleanup_guard(&self) -> CleanupGuard {
        CleanupGuard {
            workspace: self.clone(),
        }
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[must_use = "the workspace is cleaned when the guard is dropped"]
pub struct CleanupGuard {
    workspace: Workspace,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.workspace.cleanup();
    }
}
