//! CLI surface tests: flags, exit codes and the session subcommands.
//! No network: anything beyond configuration validation is not exercised.

use assert_cmd::Command;
use predicates::prelude::*;

fn seeker() -> Command {
    Command::cargo_bin("seeker").unwrap()
}

#[test]
fn help_lists_the_documented_flags() {
    seeker()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--query"))
        .stdout(predicate::str::contains("--model"))
        .stdout(predicate::str::contains("--max-workers"))
        .stdout(predicate::str::contains("--vault"))
        .stdout(predicate::str::contains("--session"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn missing_api_keys_exit_with_configuration_error() {
    let home = tempfile::tempdir().unwrap();
    seeker()
        .arg("--query")
        .arg("anything")
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("LLM_API_KEY"));
}

#[test]
fn missing_search_key_is_also_a_configuration_error() {
    let home = tempfile::tempdir().unwrap();
    seeker()
        .arg("--query")
        .arg("anything")
        .env_clear()
        .env("HOME", home.path())
        .env("LLM_API_KEY", "test-key")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SEARCH_API_KEY"));
}

#[test]
fn session_list_on_fresh_state_dir_is_empty() {
    let home = tempfile::tempdir().unwrap();
    seeker()
        .args(["session", "list"])
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("no sessions"));
}

#[test]
fn session_show_rejects_a_malformed_id() {
    let home = tempfile::tempdir().unwrap();
    seeker()
        .args(["session", "show", "not-a-uuid"])
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid session id"));
}

#[test]
fn legacy_migration_then_show_round_trips() {
    let home = tempfile::tempdir().unwrap();
    let session_id = uuid::Uuid::new_v4();
    let legacy = serde_json::json!({
        "id": session_id,
        "query": "zeppelin history",
        "status": "complete",
        "workers": [{
            "objective": "Basic fact writer",
            "status": "complete",
            "output": "answer",
            "sources": ["https://example.com/z"],
            "facts": [{"content": "LZ 1 flew in 1900", "source_url": "https://example.com/z", "confidence": 0.9}]
        }],
        "cost": {"input_tokens": 10, "output_tokens": 2, "total_usd": 0.0001}
    });
    let legacy_path = home.path().join("legacy.json");
    std::fs::write(&legacy_path, legacy.to_string()).unwrap();

    seeker()
        .args(["session", "migrate"])
        .arg(&legacy_path)
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("migrated"));

    seeker()
        .args(["session", "show", &session_id.to_string()])
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("zeppelin history"))
        .stdout(predicate::str::contains("complete"));

    // Second migration is refused, exit code reflects the failure.
    seeker()
        .args(["session", "migrate"])
        .arg(&legacy_path)
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("migration refused"));
}

#[test]
fn session_list_shows_migrated_sessions_as_json() {
    let home = tempfile::tempdir().unwrap();
    let legacy = serde_json::json!({
        "id": uuid::Uuid::new_v4(),
        "query": "json listing",
        "status": "complete",
        "workers": []
    });
    let legacy_path = home.path().join("legacy.json");
    std::fs::write(&legacy_path, legacy.to_string()).unwrap();

    seeker()
        .args(["session", "migrate"])
        .arg(&legacy_path)
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .success();

    seeker()
        .args(["session", "list", "--format", "json"])
        .env_clear()
        .env("HOME", home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("json listing"));
}
