use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn demo_processes_every_batch() {
    let mut cmd = Command::cargo_bin("workpool").unwrap();
    cmd.args([
        "--threads", "2", "--capacity", "4", "--batches", "2", "--delay-ms", "0",
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("batch 0: 4 items enqueued"))
    .stderr(predicate::str::contains("batch 1: 4 items enqueued"))
    .stderr(predicate::str::contains("item"));
}

#[test]
fn demo_rejects_bad_flag_value() {
    let mut cmd = Command::cargo_bin("workpool").unwrap();
    cmd.args(["--threads", "lots"]).assert().failure();
}
