//! Unit tests for depgraph-core

use crate::*;

fn node(id: &str, node_type: NodeType) -> GraphNode {
    let (module, symbol) = module_id::split_node_id(id);
    GraphNode {
        node_type,
        name: symbol.unwrap_or(module).to_string(),
        ..GraphNode::file(id, format!("{}.py", module), module)
    }
}

fn edge(from: &str, to: &str, edge_type: EdgeType, confidence: Confidence) -> GraphEdge {
    GraphEdge {
        from_node: from.to_string(),
        to_node: to.to_string(),
        edge_type,
        confidence,
        line_number: 1,
        label: format!("{:?} {}", edge_type, to),
    }
}

/// models <- services <- api, plus a test module and a low-confidence caller.
fn sample_graph() -> Graph {
    let nodes = vec![
        node("models", NodeType::File),
        node("models:User", NodeType::Class),
        node("services", NodeType::File),
        node("services:UserService", NodeType::Class),
        node("services:UserService.create", NodeType::Method),
        node("api", NodeType::File),
        node("api:handle", NodeType::Function),
        node("tests/test_services", NodeType::File),
        node("scripts/legacy", NodeType::File),
    ];
    let edges = vec![
        edge("services", "models", EdgeType::Import, Confidence::High),
        edge("services:UserService.create", "models:User", EdgeType::Call, Confidence::High),
        edge("api", "services", EdgeType::Import, Confidence::High),
        edge("api:handle", "services:UserService.create", EdgeType::Call, Confidence::Medium),
        edge("tests/test_services", "services", EdgeType::Import, Confidence::High),
        edge("scripts/legacy", "models", EdgeType::Import, Confidence::Unsafe),
    ];
    GraphBuilder::build(nodes, edges)
}

fn indicators() -> Vec<String> {
    EngineConfig::default().test_indicators
}

#[test]
fn test_impact_of_file_is_transitive() {
    let graph = sample_graph();
    let report = ImpactAnalyzer::new(&graph, &indicators()).get_impact("models", ImpactOptions::default());

    assert_eq!(report.changed_file, "models");
    assert_eq!(report.changed_function, None);
    assert_eq!(
        report.affected_files,
        vec!["api", "scripts/legacy", "services", "tests/test_services"]
    );
    assert_eq!(report.suggested_tests, vec!["tests/test_services"]);
    assert_eq!(report.impact_depth, 2);
    assert!(!report.has_circular_dependencies);
    // Only the two direct importers count.
    assert_eq!(report.confidence_breakdown.get(&Confidence::High), Some(&1));
    assert_eq!(report.confidence_breakdown.get(&Confidence::Unsafe), Some(&1));
    assert_eq!(report.confidence_breakdown.get(&Confidence::Medium), None);
}

#[test]
fn test_impact_of_function_adds_owning_files() {
    let graph = sample_graph();
    let report = ImpactAnalyzer::new(&graph, &indicators()).get_impact("models:User", ImpactOptions::default());

    assert_eq!(report.changed_file, "models");
    assert_eq!(report.changed_function.as_deref(), Some("User"));
    assert_eq!(
        report.affected_functions,
        vec!["api:handle", "services:UserService.create"]
    );
    assert_eq!(report.affected_files, vec!["api", "services"]);
}

#[test]
fn test_impact_options_limit_traversal() {
    let graph = sample_graph();
    let analyzer = ImpactAnalyzer::new(&graph, &indicators());

    let shallow = analyzer.get_impact(
        "models",
        ImpactOptions {
            max_depth: Some(1),
            ..Default::default()
        },
    );
    assert_eq!(shallow.affected_files, vec!["scripts/legacy", "services"]);
    assert_eq!(shallow.impact_depth, 1);

    let trusted = analyzer.get_impact(
        "models",
        ImpactOptions {
            min_confidence: Confidence::High,
            ..Default::default()
        },
    );
    assert!(!trusted.affected_files.contains(&"scripts/legacy".to_string()));
    assert!(trusted.affected_files.contains(&"api".to_string()));
}

#[test]
fn test_impact_of_unknown_node_is_empty() {
    let graph = sample_graph();
    let report = ImpactAnalyzer::new(&graph, &indicators()).get_impact("nope:missing", ImpactOptions::default());

    assert_eq!(report, ImpactReport::empty("nope:missing"));
    assert!(report.affected_files.is_empty());
    assert!(report.confidence_breakdown.is_empty());
}

#[test]
fn test_impact_terminates_on_cycles() {
    let nodes = vec![node("a", NodeType::File), node("b", NodeType::File)];
    let edges = vec![
        edge("a", "b", EdgeType::Import, Confidence::High),
        edge("b", "a", EdgeType::Import, Confidence::High),
    ];
    let graph = GraphBuilder::build(nodes, edges);
    let analyzer = ImpactAnalyzer::new(&graph, &indicators());

    for (start, other) in [("a", "b"), ("b", "a")] {
        let report = analyzer.get_impact(start, ImpactOptions::default());
        assert_eq!(report.affected_files, vec![other.to_string()]);
        assert!(report.has_circular_dependencies);
    }
}

#[test]
fn test_callers_and_callees() {
    let graph = sample_graph();
    let analyzer = ImpactAnalyzer::new(&graph, &indicators());

    assert_eq!(
        analyzer.callers("services"),
        vec!["api", "tests/test_services"]
    );
    assert_eq!(analyzer.callees("services:UserService.create"), vec!["models:User"]);
    assert!(analyzer.callers("missing").is_empty());
}

#[test]
fn test_snapshot_is_ordered_by_file() {
    let graph = sample_graph();
    let project = snapshot(&graph, "/repo", "2024-01-01T00:00:00Z", &[], Some(5));

    let files: Vec<&str> = project
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::File)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(
        files,
        vec!["api", "models", "scripts/legacy", "services", "tests/test_services"]
    );
    assert_eq!(project.version, "1.0");
    assert_eq!(project.summary.files, 5);
    assert_eq!(project.summary.functions, 2);
    assert_eq!(project.summary.classes, 2);
    assert_eq!(project.summary.edges, 6);
    assert_eq!(project.summary.analysis_time_ms, Some(5));
}

#[test]
fn test_wire_names() {
    let json = serde_json::to_value(edge("a", "b", EdgeType::Inherit, Confidence::Unsafe)).unwrap();
    assert_eq!(json["edge_type"], "inherit");
    assert_eq!(json["confidence"], "unsafe");

    let mut func = node("a:f", NodeType::Function);
    func.parameters = vec![Parameter::new("x", Some("int".into())), Parameter::new("y", None)];
    insta::assert_json_snapshot!(func, @r#"
    {
      "id": "a:f",
      "type": "function",
      "file_path": "a.py",
      "line_number": 1,
      "name": "f",
      "parameters": [
        {
          "name": "x",
          "type": "int"
        },
        {
          "name": "y"
        }
      ]
    }
    "#);
}

#[test]
fn test_config_defaults_and_overrides() {
    let config = EngineConfig::from_toml(
        r#"
        test_indicators = ["spec", "test"]
        max_cycle_warnings = 3

        [brace_parser]
        backend = "worker"
        "#,
    )
    .unwrap();

    assert_eq!(config.test_indicators, vec!["spec", "test"]);
    assert_eq!(config.max_cycle_warnings, 3);
    assert_eq!(config.brace_parser.backend, BraceBackend::Worker);
    assert_eq!(config.brace_parser.timeout_ms, 30_000);
    assert!(config.skip_dirs.iter().any(|d| d == "node_modules"));
    assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
}

#[test]
fn test_config_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("depgraph.toml");
    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(ConfigError::Read { .. })
    ));

    std::fs::write(&path, "parse_threads = \"many\"").unwrap();
    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(ConfigError::Parse { .. })
    ));
}
