//! Unit tests for depgraph-indexer

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use depgraph_core::{
    Confidence, EdgeType, EngineConfig, FileAnalysis, GraphEdge, NodeType, Severity, warning_kind,
};

use crate::extractor::{LanguageExtractor, SourceFile};
use crate::frontend::Frontends;
use crate::languages::{PythonExtractor, TypeScriptExtractor};
use crate::parser_pool::ParserPool;
use crate::worker::{WorkerClient, WorkerError, WorkerResponse, serve_worker};

fn extract(path: &str, source: &str) -> FileAnalysis {
    let pool = ParserPool::new(1);
    let file = SourceFile::new(Path::new(""), Path::new(path)).unwrap();
    let result = match file.language.family() {
        depgraph_core::LanguageFamily::Script => PythonExtractor::new(pool).extract(&file, source),
        depgraph_core::LanguageFamily::Brace => TypeScriptExtractor::new(pool).extract(&file, source),
    };
    result.unwrap()
}

fn edge<'a>(analysis: &'a FileAnalysis, from: &str, to: &str) -> Option<&'a GraphEdge> {
    analysis
        .edges
        .iter()
        .find(|e| e.from_node == from && e.to_node == to)
}

fn node_type(analysis: &FileAnalysis, id: &str) -> Option<NodeType> {
    analysis.nodes.iter().find(|n| n.id == id).map(|n| n.node_type)
}

#[test]
fn test_python_services_example() {
    let source = r#"
from models import User

class UserService:
    def create(self, n):
        return User(n)
"#;
    let analysis = extract("services.py", source);

    let files: Vec<_> = analysis
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::File)
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, "services");

    assert_eq!(node_type(&analysis, "services:UserService"), Some(NodeType::Class));
    assert_eq!(node_type(&analysis, "services:UserService.create"), Some(NodeType::Method));

    let imports: Vec<_> = analysis
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Import)
        .collect();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].from_node, "services");
    assert_eq!(imports[0].to_node, "models");
    assert_eq!(imports[0].confidence, Confidence::High);

    let call = edge(&analysis, "services:UserService.create", "models:User").unwrap();
    assert_eq!(call.edge_type, EdgeType::Call);
    assert_eq!(call.confidence, Confidence::High);
    assert_eq!(call.label, "calls User");
    assert!(analysis.edges.iter().all(|e| e.edge_type != EdgeType::Inherit));
    assert!(analysis.warnings.is_empty());
}

#[test]
fn test_python_computed_call_is_unsafe() {
    let source = "def run(obj, method_name):\n    obj[method_name]()\n";
    let analysis = extract("runner.py", source);

    let call = edge(&analysis, "runner:run", "obj[method_name]").unwrap();
    assert_eq!(call.confidence, Confidence::Unsafe);
    assert_eq!(call.edge_type, EdgeType::Call);

    let warning = analysis
        .warnings
        .iter()
        .find(|w| w.kind == warning_kind::DYNAMIC_CALL)
        .unwrap();
    assert_eq!(warning.line, 2);
}

#[test]
fn test_python_definitions_and_scopes() {
    let source = r#"
"""Helpers for users."""
import os.path as osp
from . import base
from .storage import Repo as Store

LIMIT = 10
square = lambda x: x * x

@register
class Admin(base.User):
    """An administrator."""

    def save(self, force: bool = False) -> None:
        self.validate()
        Store().put(self)
        osp.join("a", "b")

    def validate(self):
        print("ok")

def outer():
    def inner():
        helper()
    return inner
"#;
    let analysis = extract("pkg/users.py", source);

    let file = &analysis.nodes[0];
    assert_eq!(file.id, "pkg/users");
    assert_eq!(file.docstring.as_deref(), Some("Helpers for users."));

    assert_eq!(node_type(&analysis, "pkg/users:LIMIT"), Some(NodeType::Variable));
    assert_eq!(node_type(&analysis, "pkg/users:square"), Some(NodeType::Function));
    assert_eq!(node_type(&analysis, "pkg/users:Admin.save"), Some(NodeType::Method));
    assert_eq!(node_type(&analysis, "pkg/users:outer.inner"), Some(NodeType::Function));

    let save = analysis
        .nodes
        .iter()
        .find(|n| n.id == "pkg/users:Admin.save")
        .unwrap();
    let names: Vec<_> = save.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["self", "force"]);
    assert_eq!(save.parameters[1].type_annotation.as_deref(), Some("bool"));
    assert_eq!(save.return_type.as_deref(), Some("None"));

    let admin = analysis.nodes.iter().find(|n| n.id == "pkg/users:Admin").unwrap();
    assert_eq!(admin.docstring.as_deref(), Some("An administrator."));

    assert!(edge(&analysis, "pkg/users", "os/path").is_some());
    assert!(edge(&analysis, "pkg/users", "pkg").is_some());
    assert!(edge(&analysis, "pkg/users", "pkg/storage").is_some());

    let inherit = edge(&analysis, "pkg/users:Admin", "pkg:base.User").unwrap();
    assert_eq!(inherit.edge_type, EdgeType::Inherit);
    assert_eq!(inherit.confidence, Confidence::High);

    let decorator = edge(&analysis, "pkg/users:Admin", "pkg/users:register").unwrap();
    assert_eq!(decorator.edge_type, EdgeType::Call);
    assert_eq!(decorator.confidence, Confidence::Medium);

    let this_call = edge(&analysis, "pkg/users:Admin.save", "pkg/users:Admin.validate").unwrap();
    assert_eq!(this_call.confidence, Confidence::Medium);
    let store = edge(&analysis, "pkg/users:Admin.save", "pkg/storage:Repo").unwrap();
    assert_eq!(store.confidence, Confidence::High);
    assert!(edge(&analysis, "pkg/users:Admin.save", "os/path:join").is_some());

    let print = edge(&analysis, "pkg/users:Admin.validate", "print").unwrap();
    assert_eq!(print.confidence, Confidence::High);

    // Calls inside nested functions attach to the innermost named one.
    assert!(edge(&analysis, "pkg/users:outer.inner", "pkg/users:helper").is_some());
}

#[test]
fn test_python_from_import_of_submodule() {
    let dir = tempfile::tempdir().unwrap();
    let write = |path: &str, contents: &str| {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, contents).unwrap();
        full
    };
    write("pkg/__init__.py", "");
    write("pkg/base.py", "class Model:\n    pass\n\ndef helper():\n    pass\n");
    let source = r#"
from pkg import base, Missing
from . import base as sibling

class Admin(base.Model):
    def save(self):
        sibling.helper()
        Missing()
"#;
    let admin = write("pkg/admin.py", source);
    let file = SourceFile::new(dir.path(), &admin).unwrap();
    assert_eq!(file.project_root().as_deref(), Some(dir.path()));
    let analysis = PythonExtractor::new(ParserPool::new(1)).extract(&file, source).unwrap();

    let submodule = edge(&analysis, "pkg/admin", "pkg/base").unwrap();
    assert_eq!(submodule.edge_type, EdgeType::Import);
    assert_eq!(submodule.confidence, Confidence::High);
    assert!(edge(&analysis, "pkg/admin", "pkg").is_some());

    let inherit = edge(&analysis, "pkg/admin:Admin", "pkg/base:Model").unwrap();
    assert_eq!(inherit.edge_type, EdgeType::Inherit);
    assert!(edge(&analysis, "pkg/admin:Admin.save", "pkg/base:helper").is_some());

    // Names that are not modules stay members of the package.
    assert!(edge(&analysis, "pkg/admin:Admin.save", "pkg:Missing").is_some());
    assert!(edge(&analysis, "pkg/admin", "pkg/Missing").is_none());
}

#[test]
fn test_python_dotted_import_binds_top_package() {
    let source = "import os.path\n\ndef where():\n    os.getcwd()\n    os.path.join('a')\n";
    let analysis = extract("where.py", source);

    let top = edge(&analysis, "where:where", "os:getcwd").unwrap();
    assert_eq!(top.confidence, Confidence::High);
    assert!(edge(&analysis, "where:where", "os/path:join").is_some());
    assert!(edge(&analysis, "where:where", "where:os.getcwd").is_none());

    let aliased = extract("alias.py", "import os.path as p\n\ndef f():\n    os.getcwd()\n");
    assert!(edge(&aliased, "alias:f", "os:getcwd").is_none());
}

#[test]
fn test_python_dynamic_and_wildcard_imports() {
    let source = r#"
import importlib
from helpers import *

def load(name):
    importlib.import_module(name)
    importlib.import_module("plugins.core")
    return getattr(name, "upper")
"#;
    let analysis = extract("loader.py", source);

    let dynamic = edge(&analysis, "loader", "name").unwrap();
    assert_eq!(dynamic.edge_type, EdgeType::Import);
    assert_eq!(dynamic.confidence, Confidence::Unsafe);
    let literal = edge(&analysis, "loader", "plugins/core").unwrap();
    assert_eq!(literal.confidence, Confidence::High);

    let kinds: Vec<_> = analysis.warnings.iter().map(|w| w.kind.as_str()).collect();
    assert!(kinds.contains(&warning_kind::DYNAMIC_IMPORT));
    assert!(kinds.contains(&warning_kind::WILDCARD_IMPORT));
    let wildcard = analysis
        .warnings
        .iter()
        .find(|w| w.kind == warning_kind::WILDCARD_IMPORT)
        .unwrap();
    assert_eq!(wildcard.severity, Severity::Low);

    // A literal getattr is a plain attribute reference.
    let attribute = edge(&analysis, "loader:load", "loader:name.upper")
        .or_else(|| edge(&analysis, "loader:load", "name.upper"))
        .unwrap();
    assert_eq!(attribute.edge_type, EdgeType::Reference);
    assert_eq!(attribute.confidence, Confidence::Medium);
}

#[test]
fn test_python_reflection_is_unsafe() {
    let source = "def run(obj, attr):\n    getattr(obj, attr)()\n    eval('1')\n";
    let analysis = extract("reflect.py", source);
    let reflective: Vec<_> = analysis
        .warnings
        .iter()
        .filter(|w| w.kind == warning_kind::REFLECTION_CALL || w.kind == warning_kind::DYNAMIC_CALL)
        .collect();
    assert!(reflective.len() >= 2);
    let eval = edge(&analysis, "reflect:run", "eval").unwrap();
    assert_eq!(eval.confidence, Confidence::Unsafe);
}

#[test]
fn test_python_syntax_error_keeps_partial_results() {
    let source = "def ok():\n    pass\n\ndef broken(:\n    pass\n";
    let analysis = extract("broken.py", source);

    assert_eq!(analysis.nodes[0].node_type, NodeType::File);
    let warning = analysis
        .warnings
        .iter()
        .find(|w| w.kind == warning_kind::PARSE_ERROR)
        .unwrap();
    assert_eq!(warning.severity, Severity::High);
    assert!(node_type(&analysis, "broken:ok").is_some());
}

#[test]
fn test_typescript_imports_and_classes() {
    let source = r#"
import { fetchUser as load } from "./api";
import * as utils from "../lib/utils.js";
import React from "react";

/** Renders the profile. */
export class Profile extends React.Component implements Widget {
    render(): string {
        this.update();
        utils.format(load(1));
        return "";
    }

    update = () => {
        console.log("updated");
    };
}
"#;
    let analysis = extract("src/ui/profile.ts", source);

    assert!(edge(&analysis, "src/ui/profile", "src/ui/api").is_some());
    assert!(edge(&analysis, "src/ui/profile", "src/lib/utils").is_some());
    assert!(edge(&analysis, "src/ui/profile", "react").is_some());

    let class = analysis
        .nodes
        .iter()
        .find(|n| n.id == "src/ui/profile:Profile")
        .unwrap();
    assert_eq!(class.node_type, NodeType::Class);
    assert_eq!(class.docstring.as_deref(), Some("Renders the profile."));

    let render = analysis
        .nodes
        .iter()
        .find(|n| n.id == "src/ui/profile:Profile.render")
        .unwrap();
    assert_eq!(render.node_type, NodeType::Method);
    assert_eq!(render.return_type.as_deref(), Some("string"));
    assert_eq!(node_type(&analysis, "src/ui/profile:Profile.update"), Some(NodeType::Method));

    let inherit = edge(&analysis, "src/ui/profile:Profile", "react:Component").unwrap();
    assert_eq!(inherit.edge_type, EdgeType::Inherit);
    assert_eq!(inherit.confidence, Confidence::High);

    let implements = edge(&analysis, "src/ui/profile:Profile", "src/ui/profile:Widget").unwrap();
    assert_eq!(implements.edge_type, EdgeType::Reference);

    let this_call = edge(&analysis, "src/ui/profile:Profile.render", "src/ui/profile:Profile.update").unwrap();
    assert_eq!(this_call.confidence, Confidence::Medium);

    let aliased = edge(&analysis, "src/ui/profile:Profile.render", "src/ui/api:fetchUser").unwrap();
    assert_eq!(aliased.confidence, Confidence::High);
    assert!(edge(&analysis, "src/ui/profile:Profile.render", "src/lib/utils:format").is_some());

    let log = edge(&analysis, "src/ui/profile:Profile.update", "console.log").unwrap();
    assert_eq!(log.confidence, Confidence::High);
}

#[test]
fn test_javascript_require_and_dynamic_access() {
    let source = r#"
const { save } = require("./store");
const path = require("path");

function handle(obj, methodName) {
    obj[methodName]();
    obj["close"]();
    save(path.join("a"));
    return new Worker();
}

async function lazy(name) {
    await import(name);
}
"#;
    let analysis = extract("lib/handler.js", source);

    assert!(edge(&analysis, "lib/handler", "lib/store").is_some());
    assert!(edge(&analysis, "lib/handler", "path").is_some());
    // Loader bindings are not variables.
    assert!(node_type(&analysis, "lib/handler:save").is_none());

    let computed = edge(&analysis, "lib/handler:handle", "obj[methodName]").unwrap();
    assert_eq!(computed.confidence, Confidence::Unsafe);
    let warning = analysis
        .warnings
        .iter()
        .find(|w| w.kind == warning_kind::DYNAMIC_CALL)
        .unwrap();
    assert_eq!(warning.line, 6);

    let literal_key = edge(&analysis, "lib/handler:handle", "obj.close").unwrap();
    assert_eq!(literal_key.confidence, Confidence::Medium);

    assert_eq!(
        edge(&analysis, "lib/handler:handle", "lib/store:save").unwrap().confidence,
        Confidence::High
    );
    assert_eq!(
        edge(&analysis, "lib/handler:handle", "path:join").unwrap().confidence,
        Confidence::High
    );

    let instantiation = edge(&analysis, "lib/handler:handle", "lib/handler:Worker").unwrap();
    assert_eq!(instantiation.label, "instantiates Worker");

    let dynamic = edge(&analysis, "lib/handler", "name").unwrap();
    assert_eq!(dynamic.edge_type, EdgeType::Import);
    assert_eq!(dynamic.confidence, Confidence::Unsafe);
    assert!(analysis.warnings.iter().any(|w| w.kind == warning_kind::DYNAMIC_IMPORT));
}

#[test]
fn test_anonymous_callbacks_attach_to_enclosing_function() {
    let source = r#"
export function boot(items) {
    items.forEach(function (item) {
        register(item);
    });
}
"#;
    let analysis = extract("boot.ts", source);
    assert!(edge(&analysis, "boot:boot", "boot:register").is_some());
    let callables = analysis
        .nodes
        .iter()
        .filter(|n| n.node_type.is_callable())
        .count();
    assert_eq!(callables, 1);
}

#[test]
fn test_serve_worker_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("api.ts");
    std::fs::write(&file, "export function fetchUser() { return load(); }\n").unwrap();

    let input = format!(
        "{}\nnot json\n{}\n",
        serde_json::json!({"id": 7, "file": file.display().to_string(), "module": "src/api"}),
        serde_json::json!({"id": 8, "file": dir.path().join("missing.ts").display().to_string()}),
    );
    let mut output = Vec::new();
    let extractor = TypeScriptExtractor::new(ParserPool::new(1));
    serve_worker(Cursor::new(input), &mut output, &extractor).unwrap();

    let responses: Vec<WorkerResponse> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(responses.len(), 3);

    assert_eq!(responses[0].id, 7);
    let result = responses[0].result.as_ref().unwrap();
    assert_eq!(result.nodes[0].id, "src/api");
    assert!(result.nodes.iter().any(|n| n.id == "src/api:fetchUser"));

    assert_eq!(responses[1].id, 0);
    assert!(responses[1].error.as_ref().unwrap().contains("malformed"));

    assert_eq!(responses[2].id, 8);
    assert!(responses[2].result.is_none());
    assert!(responses[2].error.is_some());
}

#[test]
fn test_worker_client_faults_until_reset() {
    let mut client = WorkerClient::new(
        vec!["depgraph-no-such-worker-binary".to_string()],
        Duration::from_millis(200),
    );
    let first = client.parse("a.ts", "a").unwrap_err();
    assert!(matches!(first, WorkerError::Spawn(_)));
    assert!(client.is_faulted());
    assert!(!client.is_running());

    assert!(matches!(client.parse("b.ts", "b").unwrap_err(), WorkerError::Faulted));

    client.reset_fault();
    assert!(matches!(client.parse("c.ts", "c").unwrap_err(), WorkerError::Spawn(_)));

    let mut empty = WorkerClient::new(Vec::new(), Duration::from_millis(200));
    assert!(matches!(empty.parse("a.ts", "a").unwrap_err(), WorkerError::EmptyCommand));
    assert!(!WorkerError::Remote("x".into()).is_fault());
}

/// A client for a shell-script worker.
fn scripted_worker(script: &str, timeout: Duration) -> WorkerClient {
    WorkerClient::new(
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        timeout,
    )
}

#[test]
fn test_worker_exit_mid_request_is_a_closed_pipe() {
    let mut client = scripted_worker("read line", Duration::from_secs(5));
    let err = client.parse("a.ts", "a").unwrap_err();
    assert!(matches!(err, WorkerError::Closed), "{:?}", err);
    assert!(client.is_faulted());
    assert!(!client.is_running());
    assert!(matches!(client.parse("b.ts", "b").unwrap_err(), WorkerError::Faulted));
}

#[test]
fn test_worker_garbage_output_is_malformed() {
    let mut client = scripted_worker("read line; echo 'not a response'; sleep 5", Duration::from_secs(5));
    let err = client.parse("a.ts", "a").unwrap_err();
    assert!(matches!(err, WorkerError::Malformed(_)), "{:?}", err);
    assert!(err.is_fault());
    assert!(client.is_faulted());
    assert!(!client.is_running());
}

#[test]
fn test_silent_worker_times_out_and_faults() {
    let mut client = scripted_worker("read line; sleep 5", Duration::from_millis(300));
    let err = client.parse("a.ts", "a").unwrap_err();
    assert!(matches!(err, WorkerError::Timeout(_)), "{:?}", err);
    assert!(client.is_faulted());
    assert!(!client.is_running());

    // The rest of the batch fails fast instead of waiting again.
    let started = std::time::Instant::now();
    assert!(matches!(client.parse("b.ts", "b").unwrap_err(), WorkerError::Faulted));
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[test]
fn test_worker_fault_mid_batch_keeps_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.parse_threads = 1;
    config.brace_parser.backend = depgraph_core::BraceBackend::Worker;
    // Answers the first request, then exits while the second is pending.
    config.brace_parser.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        r#"read line; echo '{"id":1,"result":{"nodes":[],"edges":[]}}'; read line"#.to_string(),
    ];
    let frontends = Frontends::new(&config);

    let files: Vec<SourceFile> = ["a.ts", "b.ts", "c.ts"]
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, "export const x = 1;\n").unwrap();
            SourceFile::new(dir.path(), &path).unwrap()
        })
        .collect();

    frontends.begin_batch();
    let results: Vec<FileAnalysis> = files.iter().map(|f| frontends.analyse(f)).collect();
    assert!(results[0].warnings.is_empty());
    for (file, analysis) in files.iter().zip(&results).skip(1) {
        assert_eq!(analysis.nodes.len(), 1);
        assert_eq!(analysis.nodes[0].id, file.module);
        assert_eq!(analysis.warnings[0].kind, warning_kind::WORKER_FAULT);
        assert_eq!(analysis.warnings[0].severity, Severity::High);
    }
}

#[test]
fn test_path_keyed_entry_files_resolve_from_their_directory() {
    let pool = ParserPool::new(1);
    let source = "import { api } from './api';\nexport function show() { return api(); }\n";

    let entry = SourceFile::with_module(Path::new("web/index.js"), "web/index.js").unwrap();
    assert!(!entry.is_package());
    let analysis = TypeScriptExtractor::new(pool.clone()).extract(&entry, source).unwrap();
    assert!(edge(&analysis, "web/index.js", "web/api").is_some());

    let package = SourceFile::with_module(Path::new("web/index.ts"), "web").unwrap();
    assert!(package.is_package());
    let analysis = TypeScriptExtractor::new(pool).extract(&package, source).unwrap();
    assert!(edge(&analysis, "web", "web/api").is_some());

    let root_index = SourceFile::with_module(Path::new("index.ts"), "index").unwrap();
    assert!(!root_index.is_package());
}

#[test]
fn test_frontends_downgrade_failures_to_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.parse_threads = 1;
    let frontends = Frontends::new(&config);

    let missing = SourceFile::new(dir.path(), &dir.path().join("gone.py")).unwrap();
    let analysis = frontends.analyse(&missing);
    assert_eq!(analysis.nodes.len(), 1);
    assert_eq!(analysis.nodes[0].id, "gone");
    assert_eq!(analysis.warnings[0].kind, warning_kind::READ_ERROR);
    assert_eq!(analysis.warnings[0].severity, Severity::High);

    config.brace_parser.backend = depgraph_core::BraceBackend::Worker;
    config.brace_parser.command = vec!["depgraph-no-such-worker-binary".to_string()];
    let frontends = Frontends::new(&config);
    let script = dir.path().join("app.ts");
    std::fs::write(&script, "export const x = 1;\n").unwrap();
    let file = SourceFile::new(dir.path(), &script).unwrap();

    frontends.begin_batch();
    let analysis = frontends.analyse(&file);
    assert_eq!(analysis.nodes[0].id, "app");
    assert_eq!(analysis.warnings[0].kind, warning_kind::WORKER_FAULT);

    // Python files never touch the worker.
    let py = dir.path().join("ok.py");
    std::fs::write(&py, "x = 1\n").unwrap();
    let analysis = frontends.analyse(&SourceFile::new(dir.path(), &py).unwrap());
    assert!(analysis.warnings.is_empty());
    assert!(analysis.nodes.iter().any(|n| n.id == "ok:x"));
}

#[test]
fn test_python_node_outline_snapshot() {
    let analysis = extract(
        "pkg/shapes.py",
        "class Square:\n    def area(self):\n        return 4\n\ndef unit():\n    return Square()\n",
    );
    let outline: Vec<(String, NodeType)> = analysis
        .nodes
        .iter()
        .map(|n| (n.id.clone(), n.node_type))
        .collect();
    insta::assert_json_snapshot!(outline, @r#"
    [
      [
        "pkg/shapes",
        "file"
      ],
      [
        "pkg/shapes:Square",
        "class"
      ],
      [
        "pkg/shapes:Square.area",
        "method"
      ],
      [
        "pkg/shapes:unit",
        "function"
      ]
    ]
    "#);
}
