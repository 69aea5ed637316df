pub mod client;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use client::MossClient;

use crate::config::MossOptions;

/// Everything the service needs for a single query.
#[derive(Debug, Clone)]
pub struct Submission {
    pub lang: String,
    pub options: MossOptions,
    /// Reference material; matches against these are not reported.
    pub base_files: Vec<PathBuf>,
    /// Input files paired with the display name shown in the report.
    pub files: Vec<(PathBuf, String)>,
}

/// URL-like handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHandle(pub String);

/// Seam to the external similarity service. The real client lives in
/// [`client`]; tests substitute fakes.
pub trait MossService {
    /// Upload a submission and block until the service hands back a result.
    /// Long-running; may take minutes.
    fn submit(&self, req: &Submission) -> Result<ReportHandle>;

    /// Save the single-page result summary to `dest`.
    fn fetch_summary(&self, handle: &ReportHandle, dest: &Path) -> Result<()>;

    /// Download every comparison artifact reachable from `handle` into
    /// `dest`, using up to `connections` concurrent fetches.
    fn fetch_report(&self, handle: &ReportHandle, dest: &Path, connections: usize) -> Result<()>;
}
