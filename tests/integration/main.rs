//! Integration tests for depgraph
//!
//! These drive the built binary: the request server over pipes and the
//! parse worker through the worker client.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use depgraph_indexer::WorkerClient;
use serde_json::{Value, json};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_depgraph");

fn write(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, contents).unwrap();
}

/// A small mixed project: Python services over models, and a TS front end.
fn mixed_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "models.py",
        "class User:\n    def __init__(self, name):\n        self.name = name\n",
    );
    write(
        dir.path(),
        "services.py",
        "from models import User\n\ndef create_user(name):\n    return User(name)\n",
    );
    write(
        dir.path(),
        "tests/test_services.py",
        "from services import create_user\n\ndef test_create():\n    create_user(\"a\")\n",
    );
    write(
        dir.path(),
        "web/api.ts",
        "export function fetchUser(id: string) {\n  return load(id);\n}\n",
    );
    write(
        dir.path(),
        "web/profile.ts",
        "import { fetchUser } from './api';\n\nexport function show() {\n  return fetchUser('1');\n}\n",
    );
    dir
}

/// Run `depgraph <args>` with `input` on stdin and wait for it to exit.
fn run(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(BIN)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn depgraph");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn responses(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn request(id: u64, method: &str, params: Value) -> String {
    format!("{}\n", json!({"id": id, "method": method, "params": params}))
}

fn node_ids(graph: &Value) -> Vec<String> {
    graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap().to_string())
        .collect()
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(BIN).arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("parse-worker"));

    let output = Command::new(BIN).arg("version").output().unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

/// The server answers every line, survives bad input and exits on EOF.
#[test]
fn test_serve_over_pipes() {
    let repo = mixed_project();
    let root = repo.path().to_string_lossy().to_string();

    let mut input = String::new();
    input.push_str(&request(1, "get_status", Value::Null));
    input.push_str("this is not json\n");
    input.push_str(&request(2, "analyse_project", json!({"root": root})));
    input.push_str(&request(3, "get_impact", json!({"file": "models.py"})));
    input.push_str(&request(4, "get_callers", json!({"node_id": "web/api:fetchUser"})));
    input.push_str(&request(5, "no_such_method", Value::Null));
    let output = run(&["serve"], &input);

    assert!(output.status.success());
    let responses = responses(&output);
    assert_eq!(responses.len(), 6);

    assert_eq!(responses[0]["result"]["status"], "ready");
    assert_eq!(responses[1]["id"], 0);
    assert_eq!(responses[1]["error"]["code"], -32700);

    let graph = &responses[2]["result"];
    assert_eq!(graph["summary"]["files"], 5);
    let ids = node_ids(graph);
    assert!(ids.contains(&"models:User".to_string()));
    assert!(ids.contains(&"web/api:fetchUser".to_string()));

    let impact = &responses[3]["result"];
    assert!(impact["affected_files"]
        .as_array()
        .unwrap()
        .contains(&json!("services")));
    assert_eq!(impact["suggested_tests"], json!(["tests/test_services"]));

    assert_eq!(responses[4]["result"], json!(["web/profile:show"]));
    assert_eq!(responses[5]["error"]["code"], -32601);
}

/// `serve --brace-worker` parses TS through a child `parse-worker`.
#[test]
fn test_serve_with_brace_worker() {
    let repo = mixed_project();
    let root = repo.path().to_string_lossy().to_string();

    let input = request(1, "analyse_project", json!({"root": root}));
    let output = run(&["serve", "--brace-worker"], &input);

    assert!(output.status.success());
    let responses = responses(&output);
    let graph = &responses[0]["result"];
    let ids = node_ids(graph);
    assert!(ids.contains(&"web/api:fetchUser".to_string()));
    assert!(ids.contains(&"web/profile:show".to_string()));
    assert!(ids.contains(&"models:User".to_string()));

    let api_path = repo.path().canonicalize().unwrap().join("web/api.ts");
    let fetch = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == "web/api:fetchUser")
        .unwrap();
    assert_eq!(fetch["file_path"], api_path.display().to_string());
}

/// The worker client talks to the real `parse-worker` subcommand.
#[test]
fn test_parse_worker_via_client() {
    let repo = mixed_project();
    let file = repo.path().join("web/api.ts");

    let mut client = WorkerClient::new(
        vec![BIN.to_string(), "parse-worker".to_string()],
        Duration::from_secs(30),
    );
    let analysis = client.parse(&file.display().to_string(), "web/api").unwrap();
    assert_eq!(analysis.nodes[0].id, "web/api");
    assert!(analysis.nodes.iter().any(|n| n.id == "web/api:fetchUser"));
    assert!(client.is_running());

    let missing = client.parse(&repo.path().join("gone.ts").display().to_string(), "gone");
    assert!(missing.is_err());
    assert!(!client.is_faulted());
}

#[test]
fn test_analyse_and_impact_commands() {
    let repo = mixed_project();
    let root = repo.path().to_string_lossy().to_string();

    let output = Command::new(BIN).args(["analyse", &root]).output().unwrap();
    assert!(output.status.success());
    let graph: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(graph["version"], "1.0");
    assert_eq!(graph["summary"]["files"], 5);

    let output = Command::new(BIN)
        .args(["impact", &root, "web/api.ts", "--function", "fetchUser"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["changed_file"], "web/api");
    assert_eq!(report["changed_function"], "fetchUser");
    assert_eq!(report["affected_files"], json!(["web/profile"]));
}

#[test]
fn test_config_file_is_applied() {
    let repo = mixed_project();
    let root = repo.path().to_string_lossy().to_string();
    let config = repo.path().join("depgraph.toml");
    std::fs::write(&config, "skip_dirs = [\"web\", \"tests\"]\n").unwrap();

    let output = Command::new(BIN)
        .args(["--config", &config.display().to_string(), "analyse", &root])
        .output()
        .unwrap();
    assert!(output.status.success());
    let graph: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(graph["summary"]["files"], 2);

    let output = Command::new(BIN)
        .args(["--config", "/no/such/depgraph.toml", "version"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
