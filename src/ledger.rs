use crate::task::Task;
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub done: bool,
    pub task: Task,
}

#[derive(Serialize)]
struct PersistOut<'a> {
    tasks: &'a IndexMap<String, LedgerEntry>,
}

#[derive(Deserialize)]
struct PersistIn {
    tasks: IndexMap<String, LedgerEntry>,
}

/// Durable record of every known task and its completion flag, plus the
/// derived FIFO queue of work still to run.
///
/// The file on disk is the single source of truth; the queue is rebuilt from
/// it on resume and never carries state across runs. Entries keep insertion
/// order so a resumed batch executes in the original relative order.
pub struct Ledger {
    path: PathBuf,
    entries: IndexMap<String, LedgerEntry>,
    pending: VecDeque<Task>,
}

impl Ledger {
    /// Start a fresh ledger, deleting any file left over from an unrelated
    /// batch at the same location.
    pub fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing stale ledger: {}", path.display()))?;
        }
        Ok(Self {
            path,
            entries: IndexMap::new(),
            pending: VecDeque::new(),
        })
    }

    /// Rebuild a ledger from disk. Every stored task is re-enqueued, done or
    /// not, in stored order; the runner's skip check is what prevents
    /// re-execution. The two layers together tolerate a flag/queue mismatch
    /// left by a crash between a ledger write and a queue mutation.
    pub fn load(path: PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading ledger: {}", path.display()))?;
        let persisted: PersistIn =
            serde_json::from_str(&raw).with_context(|| "parsing ledger JSON")?;
        let pending = persisted
            .tasks
            .values()
            .map(|entry| entry.task.clone())
            .collect();
        Ok(Self {
            path,
            entries: persisted.tasks,
            pending,
        })
    }

    /// Register a new task and persist. Duplicate identifiers are a caller
    /// error.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.entries.contains_key(&task.identifier) {
            bail!("duplicate task identifier: {}", task.identifier);
        }
        self.entries.insert(
            task.identifier.clone(),
            LedgerEntry {
                done: false,
                task: task.clone(),
            },
        );
        self.pending.push_back(task);
        self.persist()
    }

    /// Flip `done` for an existing, not-yet-done entry and persist. Missing
    /// or already-done entries are integrity errors, checked before any
    /// mutation so persisted state stays intact.
    pub fn mark_done(&mut self, identifier: &str) -> Result<()> {
        match self.entries.get_mut(identifier) {
            None => bail!("mark_done on unknown task: {identifier}"),
            Some(entry) if entry.done => bail!("task marked done twice: {identifier}"),
            Some(entry) => entry.done = true,
        }
        self.persist()
    }

    pub fn is_done(&self, identifier: &str) -> bool {
        self.entries
            .get(identifier)
            .map(|entry| entry.done)
            .unwrap_or(false)
    }

    pub fn pop_pending(&mut self) -> Option<Task> {
        self.pending.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full rewrite via write-temp-then-rename, so a reader never observes a
    /// partially written ledger.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            crate::util::ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&PersistOut {
            tasks: &self.entries,
        })
        .with_context(|| "serializing ledger")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        Ok(())
    }
}
