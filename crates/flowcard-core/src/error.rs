//! Error types shared by parsing, graph building, flow detection, git
//! signals and stack profiling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("workspace root does not exist: {0}")]
    MissingWorkspaceRoot(PathBuf),

    #[error("repo root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest parse error in {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("git invocation failed: {0}")]
    Git(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Per-file parse failures are never fatal; they are collected here and
/// surfaced as a counter alongside the parsed output.
#[derive(Debug, Default, Clone)]
pub struct ParseStats {
    pub parsed: usize,
    pub unreadable: usize,
    pub unparseable: usize,
}

impl ParseStats {
    pub fn merge(&mut self, other: &ParseStats) {
        self.parsed += other.parsed;
        self.unreadable += other.unreadable;
        self.unparseable += other.unparseable;
    }

    /// Matches the phase-log line format surfaced by the CLI / reindex status.
    pub fn summary_line(&self) -> String {
        format!(
            "Parsed {} files · {} unreadable · {} unparseable",
            self.parsed, self.unreadable, self.unparseable
        )
    }
}
