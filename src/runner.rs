use crate::executor::{Executor, clear_output};
use crate::ledger::Ledger;
use crate::service::MossService;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drains the ledger's pending queue in FIFO order, one task at a time.
///
/// A fixed cooldown is slept after every iteration regardless of outcome,
/// including skips; the delay paces the whole batch against the service's
/// request-rate policy, not individual executions.
pub struct QueueRunner<S: MossService> {
    ledger: Ledger,
    executor: Executor<S>,
    cooldown: Duration,
    stop: Arc<AtomicBool>,
}

impl<S: MossService> QueueRunner<S> {
    pub fn new(ledger: Ledger, executor: Executor<S>, cooldown: Duration) -> Self {
        Self {
            ledger,
            executor,
            cooldown,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked at the top of every iteration; set it from another
    /// thread to stop the runner between tasks. In-flight tasks are never
    /// interrupted.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!(
                    "stop requested; {} tasks left pending",
                    self.ledger.pending_len()
                );
                break;
            }
            let Some(task) = self.ledger.pop_pending() else {
                break;
            };

            if self.ledger.is_done(&task.identifier) {
                // Resume runs re-enqueue finished tasks; this is the second
                // defense layer that keeps them from executing again.
                debug!("skipping finished task {}", task.identifier);
                summary.skipped += 1;
            } else {
                info!("running task {}", task.identifier);
                let outcome = self.executor.execute(&task);
                if outcome.succeeded {
                    self.ledger.mark_done(&task.identifier)?;
                    info!("task {} done", task.identifier);
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                    match outcome.error {
                        Some(err) => error!("task {} failed: {:#}", task.identifier, err),
                        None => error!("task {} failed", task.identifier),
                    }
                    // A retried task must start from a clean directory.
                    if let Err(err) = clear_output(&task) {
                        warn!(
                            "could not clear output of failed task {}: {:#}",
                            task.identifier, err
                        );
                    }
                }
            }

            if !self.cooldown.is_zero() {
                debug!("cooling down for {:?}", self.cooldown);
            }
            std::thread::sleep(self.cooldown);
        }

        if self.ledger.pending_len() == 0 {
            info!("all tasks done");
        }
        Ok(summary)
    }
}
