use std::process::Command;

fn moss_batch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_moss-batch"))
}

#[test]
fn a_missing_config_file_is_reported_on_stderr() {
    let out = moss_batch()
        .args(["--config", "/nonexistent/batch.toml", "--run"])
        .output()
        .expect("spawn moss-batch");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("reading config"), "stderr was: {stderr}");
}

#[test]
fn an_invocation_without_clone_or_run_is_refused() {
    let out = moss_batch()
        .args(["--config", "batch.toml"])
        .output()
        .expect("spawn moss-batch");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("nothing to do"), "stderr was: {stderr}");
}
