//! Command-line behavior that needs no gateway.

use assert_cmd::Command;
use predicates::prelude::*;

fn shop_assist() -> Command {
    let mut cmd = Command::cargo_bin("shop-assist").unwrap_or_else(|e| unreachable!("{e}"));
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("SHOP_API_KEY")
        .env_remove("SHOP_PROMPT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    shop_assist()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("turn"))
        .stdout(predicate::str::contains("prompts"));
}

#[test]
fn prompts_init_writes_then_skips() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("{e}"));
    let target = dir.path().join("prompts");

    shop_assist()
        .args(["prompts", "init", "--dir"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 9 prompt template(s)"));
    assert!(target.join("classifier.md").exists());

    shop_assist()
        .args(["prompts", "init", "--dir"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("All prompt templates already exist"));
}

#[test]
fn turn_without_api_key_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("{e}"));
    let catalog = dir.path().join("cars.json");
    std::fs::write(&catalog, "[]").unwrap_or_else(|e| unreachable!("{e}"));
    let state = dir.path().join("state.json");

    shop_assist()
        .arg("turn")
        .arg("--catalog")
        .arg(&catalog)
        .arg("--state")
        .arg(&state)
        .arg("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent configuration error"));
    assert!(!state.exists());
}

#[test]
fn unknown_command_is_rejected() {
    shop_assist()
        .arg("checkout")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
