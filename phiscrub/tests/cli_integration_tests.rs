// phiscrub/tests/cli_integration_tests.rs
//! Command-line integration tests for the `phiscrub` binary.
//!
//! Each test runs the compiled binary with `assert_cmd`, feeds a short note via
//! stdin or a temporary file, and checks the JSON written to stdout or the
//! error written to stderr. `RUST_LOG` is pinned so stray log lines never end
//! up interleaved with assertions on stderr.

use anyhow::Result;
#[allow(unused_imports)] // This is often used by `predicates::str::contains`
use predicates::prelude::*;
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

#[allow(unused_imports)] // Used for `Command::cargo_bin` and `assert` method
use assert_cmd::prelude::*;
use assert_cmd::Command;

fn phiscrub() -> Command {
    let mut cmd = Command::cargo_bin("phiscrub").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd.env_remove("PHISCRUB_PROTECTED_TERMS");
    cmd
}

/// Runs `phiscrub` on `input` and parses the JSON it prints.
fn run_json(input: &str, args: &[&str]) -> Value {
    let assert = phiscrub().args(args).write_stdin(input).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    serde_json::from_str(stdout.trim()).unwrap()
}

fn covered<'a>(json: &'a Value, text: &'a str) -> Vec<(&'a str, &'a str)> {
    json["detections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| {
            let start = d["start"].as_u64().unwrap() as usize;
            let end = d["end"].as_u64().unwrap() as usize;
            (&text[start..end], d["label"].as_str().unwrap())
        })
        .collect()
}

#[test]
fn test_stdin_note_produces_patient_and_skips_station() {
    let text = "Patient: Smith, John\nStation 7 was inspected.\n";
    let json = run_json(text, &["--quiet"]);
    let found = covered(&json, text);
    assert!(found.contains(&("Smith, John", "PATIENT")), "got {:?}", found);
    assert!(found.iter().all(|(s, _)| !s.contains("Station")));
    assert_eq!(json["report"]["mergeMode"], "union");
    assert_eq!(json["report"]["cancelled"], false);
}

#[test]
fn test_input_file_and_mrn() -> Result<()> {
    let text = "Procedure note.\nMRN: A92 555\n";
    let mut file = NamedTempFile::new()?;
    file.write_all(text.as_bytes())?;
    let path = file.path().to_str().unwrap().to_string();

    let json = run_json("", &["--input", &path, "--quiet"]);
    assert_eq!(covered(&json, text), vec![("A92 555", "ID")]);
    assert_eq!(json["detections"][0]["source"], "mrn");
    assert_eq!(json["detections"][0]["score"], 0.95);
    Ok(())
}

#[test]
fn test_entities_file_does_not_redact_provider() -> Result<()> {
    let text = "Attending: Dr. Laura Brennan performed the procedure.\nJane Roe tolerated it well.";
    let mut entities = NamedTempFile::new()?;
    entities.write_all(
        br#"[{"text": "Laura Brennan", "label": "PER", "score": 0.97},
             {"text": "Jane Roe", "label": "B-PER"}]"#,
    )?;
    let path = entities.path().to_str().unwrap().to_string();

    let json = run_json(text, &["--entities", &path, "--quiet"]);
    let found = covered(&json, text);
    assert!(found.contains(&("Jane Roe", "PATIENT")), "got {:?}", found);
    assert!(found.iter().all(|(s, _)| !s.contains("Brennan")), "got {:?}", found);
    assert_eq!(json["report"]["taggerAvailable"], true);
    Ok(())
}

#[test]
fn test_manual_spans_are_added() {
    let text = "Patient: Smith, John\n";
    let json = run_json(text, &["--manual", "0:7:id", "--quiet"]);
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0]["source"], "manual");
    assert_eq!(detections[0]["label"], "ID");
    assert_eq!(detections[0]["score"], 1.0);
}

#[test]
fn test_best_of_mode_is_reported() {
    let json = run_json("MRN: A92 555\n", &["--merge-mode", "best_of", "--quiet"]);
    assert_eq!(json["report"]["mergeMode"], "best_of");
}

#[test]
fn test_pretty_output() {
    phiscrub()
        .args(["--pretty", "--quiet"])
        .write_stdin("MRN: A92 555\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{\n  \"detections\""));
}

#[test]
fn test_summary_goes_to_stderr() {
    phiscrub()
        .write_stdin("MRN: A92 555\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("phiscrub: 1 detections"));
}

#[test]
fn test_invalid_manual_span_is_rejected() {
    phiscrub()
        .args(["--manual", "7:3"])
        .write_stdin("text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("START:END:LABEL"));
}

#[test]
fn test_unknown_merge_mode_is_rejected() {
    phiscrub()
        .args(["--merge-mode", "newest"])
        .write_stdin("text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown merge mode"));
}

#[test]
fn test_missing_protected_terms_file_fails() {
    phiscrub()
        .args(["--protected-terms", "/definitely/not/here.yaml", "--quiet"])
        .write_stdin("MRN: A92 555\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Initialization failed"));
}

#[test]
fn test_invalid_window_geometry_fails() {
    phiscrub()
        .args(["--window-width", "100", "--window-overlap", "100", "--quiet"])
        .write_stdin("MRN: A92 555\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid window configuration"));
}
