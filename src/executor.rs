use crate::config::MossOptions;
use crate::service::{MossService, Submission};
use crate::task::{Task, TaskOutcome};
use crate::util::{clear_dir, ensure_dir};
use anyhow::Result;
use tracing::info;

/// Drives one task through the full submit / wait / download sequence.
///
/// No failure escapes [`Executor::execute`]; everything is folded into the
/// returned [`TaskOutcome`] so the queue runner can keep draining.
pub struct Executor<S: MossService> {
    service: S,
    options: MossOptions,
    download_connections: usize,
}

impl<S: MossService> Executor<S> {
    pub fn new(service: S, options: MossOptions, download_connections: usize) -> Self {
        Self {
            service,
            options,
            download_connections,
        }
    }

    pub fn execute(&self, task: &Task) -> TaskOutcome {
        // Stale output from an earlier failed attempt must never be mistaken
        // for this attempt's result.
        if let Err(err) = clear_output(task) {
            return TaskOutcome::failure(err);
        }
        match self.run(task) {
            Ok(()) => TaskOutcome::success(),
            Err(err) => TaskOutcome::failure(err),
        }
    }

    fn run(&self, task: &Task) -> Result<()> {
        let submission = Submission {
            lang: task.lang.clone(),
            options: self.options.clone(),
            base_files: task.base_files.clone(),
            files: task
                .files
                .iter()
                .map(|f| (f.clone(), task.display_name(f)))
                .collect(),
        };

        info!(
            "uploading {} files ({} base) for {}",
            submission.files.len(),
            submission.base_files.len(),
            task.identifier
        );
        let handle = self.service.submit(&submission)?;
        info!("report url for {}: {}", task.identifier, handle.0);

        ensure_dir(&task.report_path)?;
        self.service
            .fetch_summary(&handle, &task.report_path.join("report.html"))?;
        self.service.fetch_report(
            &handle,
            &task.report_path.join("report"),
            self.download_connections,
        )?;
        Ok(())
    }
}

/// Remove a task's output directory. Runs before every attempt, and again
/// after a failure so a retried task starts clean.
pub fn clear_output(task: &Task) -> Result<()> {
    clear_dir(&task.report_path)
}
