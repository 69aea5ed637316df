use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub groups: Groups,
    #[serde(default)]
    pub base: Base,
    #[serde(default)]
    pub moss: MossOptions,
    #[serde(default)]
    pub gitlab: Gitlab,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch: Default::default(),
            paths: Default::default(),
            groups: Default::default(),
            base: Default::default(),
            moss: Default::default(),
            gitlab: Default::default(),
            logging: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// MOSS tokenizer tag ("c", "cc", "java", ...).
    pub lang: String,
    /// Enforced pause between consecutive tasks, in seconds.
    pub cooldown_seconds: u64,
    /// Per-submission file-count ceiling imposed by the service.
    pub file_limit: usize,
    /// Minimum previous-group chunk size when splitting large groups.
    pub chunk_floor: usize,
    /// Concurrent connections used while downloading one report.
    pub download_connections: usize,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            lang: "c".into(),
            cooldown_seconds: 60,
            file_limit: 300,
            chunk_floor: 50,
            download_connections: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    /// Where reports and the ledger land.
    pub output: String,
    /// Where cloned group repositories live.
    pub files: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            output: "output".into(),
            files: "files".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Groups {
    /// Cohort under scrutiny; compared against itself and every previous group.
    pub current: Vec<String>,
    /// Prior cohorts used only as comparison material.
    pub previous: Vec<String>,
    /// Branch to clone; falls back to the repository default when missing.
    pub branch: String,
    /// Sub-path inside each repository where assignment files live.
    pub assignment_path: String,
    /// Glob patterns selecting input files, relative to the assignment path.
    pub assignment_files: Vec<String>,
}
impl Default for Groups {
    fn default() -> Self {
        Self {
            current: Vec::new(),
            previous: Vec::new(),
            branch: "main".into(),
            assignment_path: "".into(),
            assignment_files: vec!["*/*.c".into(), "*/*.cpp".into(), "*/*.cc".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base {
    /// Repositories holding instructor-provided starter code.
    pub repos: Vec<String>,
    /// Glob patterns selecting baseline files inside the base checkouts.
    pub files: Vec<String>,
}
impl Default for Base {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            files: vec!["*.*".into()],
        }
    }
}

/// Options forwarded verbatim to the MOSS query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MossOptions {
    /// Maximum times a passage may appear before it is ignored.
    pub m: u32,
    /// Directory-submission mode.
    pub d: u32,
    /// Experimental-server flag.
    pub x: u32,
    /// Free-text comment attached to the query.
    pub c: String,
    /// Maximum matches shown in the report.
    pub n: u32,
}
impl Default for MossOptions {
    fn default() -> Self {
        Self {
            m: 20,
            d: 0,
            x: 0,
            c: "".into(),
            n: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gitlab {
    /// API base URL; when empty, GITLAB_URL from the environment is used.
    pub url: String,
}
impl Default for Gitlab {
    fn default() -> Self {
        Self { url: "".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
