//! Shared tree-sitter parsing threads
//!
//! `tree_sitter::Parser` is not `Sync`, so parsers live on dedicated threads
//! and jobs reach them over one shared channel. Each thread keeps one parser
//! per grammar it has seen. Callers block on a private reply channel, which
//! lets any number of rayon tasks share the pool.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use depgraph_core::Language;
use tracing::{debug, warn};
use tree_sitter::{Parser, Tree};

/// Tree-sitter grammar for a source language.
pub fn grammar(language: Language) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
    }
}

#[derive(Debug)]
pub struct ParseRequest {
    pub language: Language,
    pub content: String,
    /// Only used in error messages.
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ParseResult {
    pub tree: Tree,
    pub language: Language,
}

struct Job {
    request: ParseRequest,
    reply: Sender<Result<ParseResult>>,
}

type JobQueue = Arc<Mutex<Receiver<Job>>>;

/// Handle to the parsing threads. Cloning shares the same threads; they
/// exit once every handle is dropped.
#[derive(Clone)]
pub struct ParserPool {
    jobs: Sender<Job>,
}

impl ParserPool {
    pub fn new(threads: usize) -> Self {
        let (jobs, queue) = channel::<Job>();
        let queue: JobQueue = Arc::new(Mutex::new(queue));

        for index in 0..threads.max(1) {
            let queue = Arc::clone(&queue);
            let spawned = std::thread::Builder::new()
                .name(format!("depgraph-parser-{}", index))
                .spawn(move || run_parser_thread(index, queue));
            if let Err(e) = spawned {
                warn!("Could not start parser thread {}: {}", index, e);
            }
        }

        Self { jobs }
    }

    /// Parse on a pool thread and wait for the tree.
    pub fn parse(&self, request: ParseRequest) -> Result<ParseResult> {
        let (reply, answer) = channel();
        self.jobs
            .send(Job { request, reply })
            .map_err(|_| anyhow!("parser pool has no running threads"))?;
        answer.recv().map_err(|_| anyhow!("parser thread exited mid-parse"))?
    }
}

fn run_parser_thread(index: usize, queue: JobQueue) {
    debug!("Parser thread {} started", index);
    let mut parsers: HashMap<Language, Parser> = HashMap::new();

    loop {
        // The lock is released before parsing starts.
        let next = match queue.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };
        let Ok(Job { request, reply }) = next else {
            break;
        };
        let outcome = parse_with(&mut parsers, request);
        if reply.send(outcome).is_err() {
            debug!("Parse caller went away before the result was ready");
        }
    }

    debug!("Parser thread {} stopped", index);
}

fn parse_with(parsers: &mut HashMap<Language, Parser>, request: ParseRequest) -> Result<ParseResult> {
    let language = request.language;
    let parser = match parsers.entry(language) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let mut parser = Parser::new();
            parser
                .set_language(&grammar(language))
                .map_err(|e| anyhow!("cannot load {:?} grammar: {}", language, e))?;
            entry.insert(parser)
        }
    };
    let tree = parser
        .parse(&request.content, None)
        .ok_or_else(|| anyhow!("tree-sitter gave up on {}", request.path.display()))?;
    Ok(ParseResult { tree, language })
}

/// Pool sized to the machine, at least two threads.
pub fn create_parser_pool() -> ParserPool {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2);
    ParserPool::new(threads)
}
