use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use tempfile::tempdir;

fn sarifkit() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("sarifkit").unwrap()
}

fn legacy_log() -> Value {
    json!({
        "version": "2.0.0-csd.1.0.0",
        "runs": [{
            "tool": { "driver": { "name": "lint" } },
            "architecture": "x64",
            "invocations": [{ "workingDirectory": "/home/ci", "startTime": "2018-01-01T00:00:00Z" }],
            "artifacts": [{ "location": { "uri": "a.c" }, "hashes": [{ "algorithm": "sha-256", "value": "abc" }] }],
            "results": [{ "ruleId": "R1" }]
        }]
    })
}

fn current_log() -> Value {
    let step = json!({ "location": { "physicalLocation": {
        "artifactLocation": { "uri": "a.c" }, "region": { "startLine": 3, "endLine": 3 }
    } } });
    json!({
        "version": "2.1.0",
        "runs": [{
            "tool": { "driver": { "name": "lint", "rules": [{ "id": "R1" }, { "id": "R2" }] } },
            "artifacts": [{ "location": { "uri": "a.c" } }, { "location": { "uri": "b.c" } }],
            "results": [
                {
                    "ruleId": "R1", "ruleIndex": 0, "level": "error",
                    "message": { "text": "first" },
                    "locations": [
                        { "physicalLocation": { "artifactLocation": { "uri": "a.c", "index": 0 } } },
                        { "physicalLocation": { "artifactLocation": { "uri": "a.c", "index": 0 } } }
                    ],
                    "codeFlows": [{ "threadFlows": [{ "locations": [step.clone(), step.clone()] }] }]
                },
                {
                    "ruleId": "R2", "ruleIndex": 1,
                    "message": { "text": "second" },
                    "locations": [{ "physicalLocation": { "artifactLocation": { "index": 1 } } }],
                    "codeFlows": [{ "threadFlows": [{ "locations": [step] }] }]
                }
            ]
        }]
    })
}

fn write_json(dir: &std::path::Path, name: &str, value: &Value) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).unwrap()
}

#[test]
fn upgrade_rewrites_legacy_log() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "old.sarif", &legacy_log());
    let output = dir.path().join("new.sarif");

    sarifkit()
        .args(["upgrade", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let log: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let run = &log["runs"][0];
    assert_eq!(log["version"], "2.1.0");
    assert_eq!(run["invocations"][0]["workingDirectory"], json!({ "uri": "/home/ci" }));
    assert_eq!(run["invocations"][0]["startTimeUtc"], "2018-01-01T00:00:00Z");
    assert_eq!(run["artifacts"][0]["hashes"], json!({ "sha-256": "abc" }));
    assert_eq!(run["results"][0]["message"]["text"], "[No message provided].");
    assert!(run.get("architecture").is_none());
}

#[test]
fn upgrade_current_log_is_unchanged() {
    let dir = tempdir().unwrap();
    let text = serde_json::to_string_pretty(&current_log()).unwrap();
    let input = dir.path().join("current.sarif");
    fs::write(&input, &text).unwrap();

    sarifkit()
        .args(["upgrade", "-i"])
        .arg(&input)
        .assert()
        .success()
        .stdout(format!("{}\n", text));
}

#[test]
fn upgrade_diff_shows_changes() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "old.sarif", &legacy_log());

    sarifkit()
        .args(["--pretty", "upgrade", "--diff", "-i"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("--- original"))
        .stdout(predicate::str::contains("+  \"version\": \"2.1.0\""))
        .stdout(predicate::str::contains("-      \"architecture\": \"x64\","));
}

#[test]
fn upgrade_reads_stdin() {
    sarifkit()
        .args(["upgrade", "-i", "-"])
        .write_stdin(legacy_log().to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""version":"2.1.0""#));
}

#[test]
fn upgrade_rejects_malformed_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bad.sarif");
    fs::write(&input, "{ not json").unwrap();

    sarifkit()
        .args(["upgrade", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to upgrade"));
}

#[test]
fn missing_input_file_fails() {
    sarifkit()
        .args(["validate", "-i", "/nonexistent/log.sarif"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn consolidate_deduplicates_and_trims() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());

    let assert = sarifkit()
        .args(["consolidate", "-i"])
        .arg(&input)
        .assert()
        .success();
    let log = stdout_json(&assert);
    let run = &log["runs"][0];

    assert_eq!(run["threadFlowLocations"].as_array().unwrap().len(), 1);
    assert_eq!(run["results"][0]["locations"].as_array().unwrap().len(), 1);
    assert_eq!(
        run["results"][0]["locations"][0]["physicalLocation"]["artifactLocation"],
        json!({ "index": 0 })
    );
    let steps = &run["results"][1]["codeFlows"][0]["threadFlows"][0]["locations"];
    assert_eq!(steps, &json!([{ "index": 0 }]));
    assert_eq!(
        run["threadFlowLocations"][0]["location"]["physicalLocation"]["region"],
        json!({ "startLine": 3 })
    );
}

#[test]
fn consolidate_with_removal_flags() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());
    let output = dir.path().join("out.sarif");

    sarifkit()
        .args(["consolidate", "--remove-code-flows", "--message-limit", "3", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let log: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let run = &log["runs"][0];
    assert!(run["results"][0].get("codeFlows").is_none());
    assert!(run.get("threadFlowLocations").is_none());
    assert_eq!(run["results"][0]["message"]["text"], "fir");
}

#[test]
fn consolidate_with_policy_file() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());
    let policy = write_json(dir.path(), "policy.json", &json!({ "removeCodeFlows": true }));

    let assert = sarifkit()
        .args(["consolidate", "-i"])
        .arg(&input)
        .arg("--policy")
        .arg(&policy)
        .assert()
        .success();
    let log = stdout_json(&assert);
    assert!(log["runs"][0]["results"][1].get("codeFlows").is_none());
}

#[test]
fn filter_by_rule_compacts_tables() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());

    let assert = sarifkit()
        .args(["filter", "--rule-id", "R2", "-i"])
        .arg(&input)
        .assert()
        .success();
    let log = stdout_json(&assert);
    let run = &log["runs"][0];

    assert_eq!(run["results"].as_array().unwrap().len(), 1);
    assert_eq!(run["results"][0]["ruleIndex"], 0);
    assert_eq!(run["tool"]["driver"]["rules"], json!([{ "id": "R2" }]));
    assert_eq!(run["artifacts"], json!([{ "location": { "uri": "b.c" } }]));
    assert_eq!(
        run["results"][0]["locations"][0]["physicalLocation"]["artifactLocation"]["index"],
        0
    );
}

#[test]
fn filter_by_level_uses_warning_default() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());

    let assert = sarifkit()
        .args(["filter", "--level", "warning", "-i"])
        .arg(&input)
        .assert()
        .success();
    let log = stdout_json(&assert);
    let results = log["runs"][0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["ruleId"], "R2");
}

#[test]
fn filter_reads_checkpoint_log_with_dictionaries() {
    let dir = tempdir().unwrap();
    let log = json!({
        "version": "2.0.0-csd.2.beta.2018-10-10",
        "runs": [{
            "tool": { "name": "lint" },
            "files": { "a.c": {}, "b.c": {} },
            "logicalLocations": { "ns::f": { "name": "f" } },
            "resources": { "rules": { "R1": {}, "R2": {} } },
            "results": [
                { "ruleId": "R1", "message": { "text": "one" },
                  "locations": [{ "physicalLocation": { "fileLocation": { "uri": "a.c" } } }] },
                { "ruleId": "R2", "message": { "text": "two" },
                  "locations": [{
                      "physicalLocation": { "fileLocation": { "uri": "b.c" } },
                      "fullyQualifiedLogicalName": "ns::f"
                  }] }
            ]
        }]
    });
    let input = write_json(dir.path(), "checkpoint.sarif", &log);

    let assert = sarifkit()
        .args(["filter", "--rule-id", "R2", "-i"])
        .arg(&input)
        .assert()
        .success();
    let log = stdout_json(&assert);
    let run = &log["runs"][0];

    assert_eq!(log["version"], "2.1.0");
    assert_eq!(run["tool"]["driver"]["rules"], json!([{ "id": "R2" }]));
    assert_eq!(run["artifacts"], json!([{ "location": { "uri": "b.c", "index": 0 } }]));
    let result = &run["results"][0];
    assert_eq!(result["ruleIndex"], 0);
    let location = &result["locations"][0];
    assert_eq!(location["physicalLocation"]["artifactLocation"]["index"], 0);
    assert_eq!(location["logicalLocations"][0]["index"], 0);
}

#[test]
fn partition_writes_one_file_per_rule() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());
    let out = dir.path().join("parts");

    let assert = sarifkit()
        .args(["partition", "--by", "rule-id", "-i"])
        .arg(&input)
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();

    let summary = stdout_json(&assert);
    let keys: Vec<&str> = summary
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["R1", "R2"]);

    let r1: Value = serde_json::from_str(&fs::read_to_string(out.join("R1.sarif")).unwrap()).unwrap();
    assert_eq!(r1["runs"][0]["results"].as_array().unwrap().len(), 1);
    assert_eq!(r1["runs"][0]["artifacts"], json!([{ "location": { "uri": "a.c" } }]));
    assert!(out.join("R2.sarif").exists());
}

#[test]
fn partition_by_level() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());
    let out = dir.path().join("levels");

    sarifkit()
        .args(["partition", "--by", "level", "-i"])
        .arg(&input)
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();

    assert!(out.join("error.sarif").exists());
    assert!(out.join("warning.sarif").exists());
}

#[test]
fn validate_accepts_consistent_log() {
    let dir = tempdir().unwrap();
    let input = write_json(dir.path(), "log.sarif", &current_log());

    sarifkit()
        .args(["validate", "-i"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 run(s), 2 result(s)"));
}

#[test]
fn validate_rejects_dangling_index() {
    let dir = tempdir().unwrap();
    let mut log = current_log();
    log["runs"][0]["results"][1]["ruleIndex"] = json!(9);
    let input = write_json(dir.path(), "log.sarif", &log);

    sarifkit()
        .args(["validate", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dangling rules index 9"));
}
