//! Integration tests for the lambdaflow binary.
// `Command::cargo_bin` is deprecated in favour of the `cargo_bin!` macro; both work.
#![allow(deprecated)]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const GREETING_WORKFLOW: &str = r#"{
  "nodes": [
    { "id": "start", "type": "manualtrigger" },
    { "id": "greet", "type": "texttemplate", "data": { "config": { "template": "Hello {{ name }}" } } }
  ],
  "edges": [{ "source": "start", "target": "greet" }]
}"#;

const LOOP_WORKFLOW: &str = r#"{
  "nodes": [
    { "id": "hook", "type": "apigatewaytrigger" },
    { "id": "each", "type": "loopforeach", "data": { "config": { "iterator": "file" } } },
    { "id": "name", "type": "extractfield", "data": { "config": { "fieldPath": "file" } } }
  ],
  "edges": [
    { "source": "hook", "target": "each" },
    { "source": "each", "target": "name" }
  ]
}"#;

const MERGE_WORKFLOW: &str = r#"{
  "nodes": [
    { "id": "start", "type": "manualtrigger" },
    { "id": "each", "type": "loopforeach", "data": { "config": { "iterator": "json" } } },
    { "id": "merge", "type": "mergejson", "data": { "config": { "expectedCount": 2 } } }
  ],
  "edges": [
    { "source": "start", "target": "each" },
    { "source": "each", "target": "merge" }
  ]
}"#;

fn write_workflow(content: &str) -> (TempDir, std::path::PathBuf) {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("workflow.json");
  fs::write(&path, content).unwrap();
  (temp, path)
}

fn lambdaflow() -> Command {
  Command::cargo_bin("lambdaflow").unwrap()
}

#[test]
fn test_run_workflow_prints_results() {
  let (_temp, path) = write_workflow(GREETING_WORKFLOW);

  let output = lambdaflow()
    .args(["run", "workflow"])
    .arg(&path)
    .write_stdin(r#"{"name": "ada"}"#)
    .output()
    .unwrap();

  assert!(output.status.success());
  let rendered: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(rendered["nodes"]["greet"]["output"]["text"], "Hello ada");
  assert!(rendered["executionId"].is_string());
}

#[test]
fn test_run_workflow_fans_out_per_item() {
  let (_temp, path) = write_workflow(LOOP_WORKFLOW);

  let output = lambdaflow()
    .args(["run", "workflow", "--trigger", "apigatewaytrigger"])
    .arg(&path)
    .write_stdin(r#"{"body": "{\"list\": [\"a.csv\", \"b.csv\"]}"}"#)
    .output()
    .unwrap();

  assert!(output.status.success());
  let rendered: Value = serde_json::from_slice(&output.stdout).unwrap();
  let mut branches: Vec<(String, Value)> = rendered["paths"]
    .as_array()
    .unwrap()
    .iter()
    .filter(|path| path["nodeId"] == "name")
    .map(|path| {
      (
        path["branchPath"].as_str().unwrap().to_string(),
        path["result"]["output"].clone(),
      )
    })
    .collect();
  branches.sort_by(|a, b| a.0.cmp(&b.0));

  assert_eq!(branches, vec![
    ("each#0".to_string(), Value::from("a.csv")),
    ("each#1".to_string(), Value::from("b.csv")),
  ]);
}

#[test]
fn test_run_workflow_merges_branch_objects() {
  let (_temp, path) = write_workflow(MERGE_WORKFLOW);

  let output = lambdaflow()
    .args(["run", "workflow"])
    .arg(&path)
    .write_stdin(r#"{"list": [{"a": 1}, {"b": 2}]}"#)
    .output()
    .unwrap();

  assert!(output.status.success());
  let rendered: Value = serde_json::from_slice(&output.stdout).unwrap();
  let outputs: Vec<Value> = rendered["paths"]
    .as_array()
    .unwrap()
    .iter()
    .filter(|path| path["nodeId"] == "merge")
    .map(|path| path["result"]["output"].clone())
    .collect();

  assert_eq!(outputs.len(), 2);
  assert!(outputs.contains(&serde_json::json!({"json": {"a": 1, "b": 2}})));
  assert!(outputs.contains(&Value::Null));
}

#[test]
fn test_run_single_step() {
  let (_temp, path) = write_workflow(GREETING_WORKFLOW);

  lambdaflow()
    .args(["run", "step", "--node", "greet"])
    .arg(&path)
    .write_stdin(r#"{"name": "bob"}"#)
    .assert()
    .success()
    .stdout(predicate::str::contains("Hello bob"));
}

#[test]
fn test_unknown_trigger_fails() {
  let (_temp, path) = write_workflow(GREETING_WORKFLOW);

  lambdaflow()
    .args(["run", "workflow", "--trigger", "s3trigger"])
    .arg(&path)
    .write_stdin("{}")
    .assert()
    .failure()
    .stderr(predicate::str::contains("no node of kind 's3trigger'"));
}

#[test]
fn test_validate() {
  let (_temp, path) = write_workflow(GREETING_WORKFLOW);
  lambdaflow()
    .arg("validate")
    .arg(&path)
    .assert()
    .success()
    .stdout(predicate::str::contains("2 nodes, 1 edges, sources: start"));

  let (_temp, dangling) = write_workflow(
    r#"{ "nodes": [{ "id": "a", "type": "delay" }], "edges": [{ "source": "a", "target": "ghost" }] }"#,
  );
  lambdaflow()
    .arg("validate")
    .arg(&dangling)
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid workflow"));
}

#[test]
fn test_kinds_lists_builtins() {
  lambdaflow()
    .arg("kinds")
    .assert()
    .success()
    .stdout(predicate::str::contains("loopforeach").and(predicate::str::contains("s3trigger")));
}
