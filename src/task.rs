use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One comparison unit, immutable once built. The identifier doubles as the
/// ledger's primary key and must stay unique for the lifetime of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub report_path: PathBuf,
    pub identifier: String,
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub base_files: Vec<PathBuf>,
    pub lang: String,
    #[serde(default)]
    pub display_prefix: String,
}

impl Task {
    pub fn new(
        report_path: PathBuf,
        identifier: String,
        files: Vec<PathBuf>,
        base_files: Vec<PathBuf>,
        lang: String,
        display_prefix: String,
    ) -> Result<Self> {
        if files.is_empty() {
            bail!("task {identifier} has no input files");
        }
        Ok(Self {
            report_path,
            identifier,
            files,
            base_files,
            lang,
            display_prefix,
        })
    }

    /// Uploaded label for an input file: its path with the display prefix
    /// removed, so reports stay short and stable across machines.
    pub fn display_name(&self, file: &Path) -> String {
        let raw = file.display().to_string();
        match raw.strip_prefix(&self.display_prefix) {
            Some(stripped) if !self.display_prefix.is_empty() => stripped.to_string(),
            _ => raw,
        }
    }
}

/// Result of one execution attempt, consumed immediately by the queue runner.
/// Never persisted.
#[derive(Debug)]
pub struct TaskOutcome {
    pub succeeded: bool,
    pub error: Option<anyhow::Error>,
}

impl TaskOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(error: anyhow::Error) -> Self {
        Self {
            succeeded: false,
            error: Some(error),
        }
    }
}
