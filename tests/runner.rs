use anyhow::{Result, bail};
use moss_batch::config::MossOptions;
use moss_batch::executor::Executor;
use moss_batch::ledger::Ledger;
use moss_batch::runner::QueueRunner;
use moss_batch::service::{MossService, ReportHandle, Submission};
use moss_batch::task::Task;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Service double: records the identifier baked into each submission's first
/// display name and fails on demand. Writes the same artifacts the real
/// client would, minus the network.
struct FakeService {
    log: Arc<Mutex<Vec<String>>>,
    fail_markers: Vec<String>,
}

impl FakeService {
    fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            fail_markers: Vec::new(),
        }
    }

    fn failing_on(log: Arc<Mutex<Vec<String>>>, markers: &[&str]) -> Self {
        Self {
            log,
            fail_markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl MossService for FakeService {
    fn submit(&self, req: &Submission) -> Result<ReportHandle> {
        let marker = req
            .files
            .first()
            .map(|(_, display)| display.clone())
            .unwrap_or_default();
        self.log.lock().unwrap().push(marker.clone());
        if self.fail_markers.iter().any(|m| marker.contains(m.as_str())) {
            bail!("simulated service outage");
        }
        Ok(ReportHandle(format!("http://moss.example/results/{marker}")))
    }

    fn fetch_summary(&self, _handle: &ReportHandle, dest: &Path) -> Result<()> {
        std::fs::write(dest, "summary")?;
        Ok(())
    }

    fn fetch_report(&self, _handle: &ReportHandle, dest: &Path, _connections: usize) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        std::fs::write(dest.join("index.html"), "index")?;
        Ok(())
    }
}

fn task(out: &Path, id: &str) -> Task {
    Task::new(
        out.join(format!("{id}_reports")),
        id.to_string(),
        vec![PathBuf::from(format!("/data/{id}/main.c"))],
        Vec::new(),
        "c".into(),
        "/data/".into(),
    )
    .unwrap()
}

fn runner_with(
    ledger: Ledger,
    service: FakeService,
) -> QueueRunner<FakeService> {
    let executor = Executor::new(service, MossOptions::default(), 2);
    QueueRunner::new(ledger, executor, Duration::ZERO)
}

#[test]
fn drains_the_queue_and_records_completion() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();
    let ledger_path = out.join("state.json");

    let mut ledger = Ledger::create(ledger_path.clone()).unwrap();
    ledger.add_task(task(out, "t1")).unwrap();
    ledger.add_task(task(out, "t2")).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let summary = runner_with(ledger, FakeService::new(log.clone()))
        .run()
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(log.lock().unwrap().as_slice(), ["t1/main.c", "t2/main.c"]);
    assert!(out.join("t1_reports/report.html").exists());
    assert!(out.join("t2_reports/report/index.html").exists());

    let loaded = Ledger::load(ledger_path).unwrap();
    assert!(loaded.is_done("t1") && loaded.is_done("t2"));
}

#[test]
fn rerunning_a_finished_batch_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();
    let ledger_path = out.join("state.json");

    let mut ledger = Ledger::create(ledger_path.clone()).unwrap();
    ledger.add_task(task(out, "t1")).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    runner_with(ledger, FakeService::new(log.clone()))
        .run()
        .unwrap();

    // Immediately reload and re-run: idempotent resume.
    let resumed = Ledger::load(ledger_path).unwrap();
    let log2 = Arc::new(Mutex::new(Vec::new()));
    let summary = runner_with(resumed, FakeService::new(log2.clone()))
        .run()
        .unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.skipped, 1);
    assert!(log2.lock().unwrap().is_empty());
}

#[test]
fn failed_task_stays_pending_and_its_output_is_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();
    let ledger_path = out.join("state.json");

    let mut ledger = Ledger::create(ledger_path.clone()).unwrap();
    ledger.add_task(task(out, "t1")).unwrap();
    ledger.add_task(task(out, "t2")).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let summary = runner_with(ledger, FakeService::failing_on(log, &["t2"]))
        .run()
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!out.join("t2_reports").exists());

    let loaded = Ledger::load(ledger_path).unwrap();
    assert!(loaded.is_done("t1"));
    assert!(!loaded.is_done("t2"));
}

#[test]
fn always_failing_task_never_becomes_done() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();
    let ledger_path = out.join("state.json");

    for _ in 0..3 {
        let ledger = if ledger_path.exists() {
            Ledger::load(ledger_path.clone()).unwrap()
        } else {
            let mut fresh = Ledger::create(ledger_path.clone()).unwrap();
            fresh.add_task(task(out, "t1")).unwrap();
            fresh
        };
        let log = Arc::new(Mutex::new(Vec::new()));
        let summary = runner_with(ledger, FakeService::failing_on(log, &["t1"]))
            .run()
            .unwrap();
        assert_eq!(summary.failed, 1);
    }

    assert!(!Ledger::load(ledger_path).unwrap().is_done("t1"));
}

#[test]
fn resume_after_interruption_runs_the_rest_in_original_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();
    let ledger_path = out.join("state.json");

    // Simulate a process killed after task 1 completed: the ledger on disk
    // says t1 is done, t2 and t3 were never started.
    let mut ledger = Ledger::create(ledger_path.clone()).unwrap();
    ledger.add_task(task(out, "t1")).unwrap();
    ledger.add_task(task(out, "t2")).unwrap();
    ledger.add_task(task(out, "t3")).unwrap();
    ledger.mark_done("t1").unwrap();
    drop(ledger);

    let resumed = Ledger::load(ledger_path.clone()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let summary = runner_with(resumed, FakeService::new(log.clone()))
        .run()
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(log.lock().unwrap().as_slice(), ["t2/main.c", "t3/main.c"]);
    let loaded = Ledger::load(ledger_path).unwrap();
    assert!(loaded.is_done("t2") && loaded.is_done("t3"));
}

#[test]
fn stop_flag_halts_between_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();

    let mut ledger = Ledger::create(out.join("state.json")).unwrap();
    ledger.add_task(task(out, "t1")).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut runner = runner_with(ledger, FakeService::new(log.clone()));
    runner
        .stop_handle()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let summary = runner.run().unwrap();
    assert_eq!(summary.succeeded, 0);
    assert!(log.lock().unwrap().is_empty());
}
