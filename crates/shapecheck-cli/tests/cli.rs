use predicates::prelude::*;
use std::fs;

fn shapecheck() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("shapecheck").into()
}

fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

// ── human output ────────────────────────────────────────────

#[test]
fn check_clean_tree_exits_zero() {
    shapecheck()
        .args(["check", &fixture_path("clean.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: 2 functions, 1 records"));
}

#[test]
fn check_sample_reports_each_violation() {
    shapecheck()
        .args(["check", &fixture_path("sample.json")])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("type error: type mismatch: expected bytes, found bool"))
        .stderr(predicate::str::contains("at argument 0: expected str, found int"))
        .stderr(predicate::str::contains("missing required key \"a\""))
        .stderr(predicate::str::contains("3 type error(s) found"));
}

#[test]
fn check_with_source_renders_labels() {
    shapecheck()
        .args([
            "check",
            &fixture_path("sample.json"),
            "--source",
            &fixture_path("sample.py"),
        ])
        .env("NO_COLOR", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("shapecheck::mismatch"))
        .stderr(predicate::str::contains("sample.py"));
}

// ── json output ─────────────────────────────────────────────

#[test]
fn check_json_lists_diagnostics() {
    let output = shapecheck()
        .args(["check", &fixture_path("sample.json"), "--format", "json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let diagnostics = value.as_array().unwrap();
    assert_eq!(diagnostics.len(), 3);

    assert_eq!(diagnostics[0]["expected"], "bytes");
    assert_eq!(diagnostics[0]["actual"], "bool");
    assert!(diagnostics[0].get("path").is_none());

    assert_eq!(diagnostics[1]["path"], "argument 0");
    assert_eq!(diagnostics[1]["start"], 64);
    assert_eq!(diagnostics[1]["end"], 65);

    assert_eq!(diagnostics[2]["code"], "shapecheck::mismatch");
    assert_eq!(diagnostics[2]["path"], "argument 0, field \"a\"");
    assert_eq!(diagnostics[2]["actual"], "{\"bar\": int}");
}

#[test]
fn check_json_clean_tree_prints_empty_list() {
    shapecheck()
        .args(["check", &fixture_path("clean.json"), "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

// ── options ─────────────────────────────────────────────────

#[test]
fn widen_admits_registered_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("widen.json");
    fs::write(
        &file,
        r#"{"items": [
            {"Function": {
                "name": {"name": "inc", "span": [4, 7]},
                "params": [{"name": {"name": "n", "span": [8, 9]},
                            "ty": {"Named": {"name": "int", "span": [11, 14]}},
                            "span": [8, 14]}],
                "returns": {"Named": {"name": "int", "span": [19, 22]}},
                "body": [],
                "span": [0, 22]}},
            {"Stmt": {"Expr": {"Call": [{"name": "inc", "span": [24, 27]},
                                        [{"Scalar": ["bool", [28, 32]]}],
                                        [24, 33]]}}}
        ]}"#,
    )
    .unwrap();

    shapecheck()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected int, found bool"));

    shapecheck()
        .args(["check", file.to_str().unwrap(), "--widen", "bool=int"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: 1 functions, 0 records"));
}

#[test]
fn widen_rejects_unknown_kind() {
    shapecheck()
        .args(["check", &fixture_path("clean.json"), "--widen", "bool=decimal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown scalar kind 'decimal'"));
}

// ── failures ────────────────────────────────────────────────

#[test]
fn invalid_tree_is_reported() {
    shapecheck()
        .args(["check", &fixture_path("invalid.json")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid syntax tree"));
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("absent.json");

    shapecheck()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}
