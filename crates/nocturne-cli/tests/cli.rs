//! CLI command integration tests.
//! Each test uses a temp directory via NOCTURNE_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// 2026-02-21 14:00:00 UTC
const AFTERNOON: &str = "1771682400";

fn noct_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("noct").unwrap();
    cmd.env("NOCTURNE_DATA_DIR", data_dir.path());
    cmd
}

#[test]
fn compile_fresh_db_is_deep_night() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .args(["compile", "--session", "s1", "--recipient", "ana", "--at", AFTERNOON])
        .assert()
        .success()
        .stdout(predicate::str::contains("It is deep night at the bar."))
        .stdout(predicate::str::contains("The room is steady."))
        .stdout(predicate::str::contains("14:00"));
}

#[test]
fn compile_explain_reports_sections() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .args(["compile", "--explain", "--at", AFTERNOON])
        .assert()
        .success()
        .stderr(predicate::str::contains("setting"))
        .stderr(predicate::str::contains("degraded=false"));
}

#[test]
fn atmosphere_partial_update() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .args(["atmosphere", "--recipient", "ana", "--drink", "Vinho Verde"])
        .assert()
        .success();
    noct_cmd(&dir)
        .args(["atmosphere", "--recipient", "ana", "--music", "Fado"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"musicPreference\": \"Fado\""))
        .stdout(predicate::str::contains("\"drink\": \"Vinho Verde\""));

    noct_cmd(&dir)
        .args(["compile", "--recipient", "ana", "--at", AFTERNOON])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fado plays softly"));
}

#[test]
fn remember_then_compile_mentions_note() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .args(["remember", "--recipient", "ana", "Collects old train tickets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remembered for ana"));

    noct_cmd(&dir)
        .args(["compile", "--recipient", "ana", "--at", AFTERNOON])
        .assert()
        .success()
        .stdout(predicate::str::contains("Collects old train tickets"));
}

#[test]
fn turns_move_state() {
    let dir = TempDir::new().unwrap();
    for _ in 0..3 {
        noct_cmd(&dir)
            .args(["turn", "--session", "s1", "--engagement", "2.0", "--at", AFTERNOON])
            .assert()
            .success()
            .stdout(predicate::str::contains("entropy="));
    }

    let output = noct_cmd(&dir)
        .args(["state", "--session", "s1", "--at", AFTERNOON])
        .output()
        .unwrap();
    assert!(output.status.success());
    let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(snapshot["entropy"].as_f64().unwrap() > 0.0);
    assert_eq!(snapshot["arc_phase"], "impact");
    assert_eq!(snapshot["trust_level"], "stranger");
}

#[test]
fn turn_rejects_out_of_range_drift() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .args(["turn", "--drift", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--drift must be between 0 and 1"));
}

#[test]
fn close_credits_trust() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .args(["close", "--recipient", "ana", "--at", AFTERNOON])
        .assert()
        .success()
        .stdout(predicate::str::contains("trust=0.020"));
}

#[test]
fn seed_builtin_and_file() {
    let dir = TempDir::new().unwrap();
    noct_cmd(&dir)
        .arg("seed")
        .assert()
        .success()
        .stdout(predicate::str::contains("seeded"));

    let pool = dir.path().join("pool.toml");
    std::fs::write(
        &pool,
        r#"
        [[entry]]
        category = "ambient"
        template = "A cat sleeps on the piano lid."

        [[entry]]
        category = "sensory"
        template = "The room smells of rain."
        "#,
    )
    .unwrap();
    noct_cmd(&dir)
        .arg("seed")
        .arg("--file")
        .arg(&pool)
        .assert()
        .success()
        .stdout(predicate::str::contains("seeded 2 pool entries"));

    noct_cmd(&dir)
        .args(["compile", "--at", AFTERNOON])
        .assert()
        .success()
        .stdout(predicate::str::contains("A cat sleeps on the piano lid."))
        .stdout(predicate::str::contains("The room smells of rain."));
}

#[test]
fn invalid_config_fails_loudly() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("nocturne.toml"), "token_budget = 0\n").unwrap();
    noct_cmd(&dir)
        .args(["compile", "--at", AFTERNOON])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
