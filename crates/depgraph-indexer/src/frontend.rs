//! Front-end dispatch: picks the parser for a file by language family.
//!
//! Callers only ever see [`Frontends::analyse`]; whether a brace-language
//! file is parsed in-process or handed to the worker is a configuration
//! detail. Every failure comes back as a warning on the file's result.

use std::sync::Mutex;
use std::time::Duration;

use depgraph_core::{
    AnalysisWarning, BraceBackend, EngineConfig, FileAnalysis, GraphNode, LanguageFamily,
    warning_kind,
};
use tracing::{debug, warn};

use crate::extractor::{LanguageExtractor, SourceFile};
use crate::languages::{PythonExtractor, TypeScriptExtractor};
use crate::parser_pool::ParserPool;
use crate::worker::WorkerClient;

enum BraceParser {
    InProcess(TypeScriptExtractor),
    Worker(Mutex<WorkerClient>),
}

pub struct Frontends {
    python: PythonExtractor,
    brace: BraceParser,
}

impl Frontends {
    pub fn new(config: &EngineConfig) -> Self {
        let pool = ParserPool::new(config.threads());
        let brace = match config.brace_parser.backend {
            BraceBackend::InProcess => BraceParser::InProcess(TypeScriptExtractor::new(pool.clone())),
            BraceBackend::Worker => BraceParser::Worker(Mutex::new(WorkerClient::new(
                config.brace_parser.command.clone(),
                Duration::from_millis(config.brace_parser.timeout_ms),
            ))),
        };
        Frontends {
            python: PythonExtractor::new(pool),
            brace,
        }
    }

    /// Start of a batch: a worker that faulted during an earlier batch may
    /// be respawned.
    pub fn begin_batch(&self) {
        if let BraceParser::Worker(client) = &self.brace {
            if let Ok(mut client) = client.lock() {
                client.reset_fault();
            }
        }
    }

    /// Read and parse one file. Never fails; problems become warnings.
    pub fn analyse(&self, file: &SourceFile) -> FileAnalysis {
        debug!("Analysing {}", file.file_path);
        match (&self.brace, file.language.family()) {
            (BraceParser::Worker(client), LanguageFamily::Brace) => self.analyse_in_worker(client, file),
            (BraceParser::InProcess(extractor), LanguageFamily::Brace) => {
                self.analyse_in_process(extractor, file)
            }
            (_, LanguageFamily::Script) => self.analyse_in_process(&self.python, file),
        }
    }

    fn analyse_in_process(&self, extractor: &dyn LanguageExtractor, file: &SourceFile) -> FileAnalysis {
        let content = match std::fs::read(&file.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("Cannot read {}: {}", file.file_path, e);
                return fault(file, warning_kind::READ_ERROR, format!("cannot read file: {}", e));
            }
        };
        match extractor.extract(file, &content) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Cannot parse {}: {}", file.file_path, e);
                fault(file, warning_kind::PARSE_ERROR, format!("cannot parse file: {}", e))
            }
        }
    }

    fn analyse_in_worker(&self, client: &Mutex<WorkerClient>, file: &SourceFile) -> FileAnalysis {
        let outcome = match client.lock() {
            Ok(mut client) => client.parse(&file.file_path, &file.module),
            Err(_) => return fault(file, warning_kind::WORKER_FAULT, "worker client lock poisoned".to_string()),
        };
        match outcome {
            Ok(mut analysis) => {
                // The worker reports paths as it was asked; keep ownership keyed on ours.
                for node in &mut analysis.nodes {
                    node.file_path = file.file_path.clone();
                }
                analysis
            }
            Err(e) if e.is_fault() => fault(file, warning_kind::WORKER_FAULT, e.to_string()),
            Err(e) => fault(file, warning_kind::PARSE_ERROR, e.to_string()),
        }
    }
}

/// A file that produced nothing but its own node and a warning.
fn fault(file: &SourceFile, kind: &str, description: String) -> FileAnalysis {
    FileAnalysis {
        nodes: vec![GraphNode::file(
            file.module.clone(),
            file.file_path.clone(),
            file.file_name(),
        )],
        edges: Vec::new(),
        warnings: vec![AnalysisWarning::file_fault(kind, file.file_path.clone(), description)],
    }
}
