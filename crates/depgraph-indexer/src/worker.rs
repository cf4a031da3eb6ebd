//! Out-of-process brace-language parsing.
//!
//! The worker reads newline-delimited JSON requests `{id, file, module?}`
//! on stdin and answers each with `{id, result}` or `{id, error}` on stdout.
//! [`WorkerClient`] owns one long-lived worker, spawned on first use. Any
//! transport failure (closed pipe, garbled line, timeout) kills the worker
//! and faults the client until [`WorkerClient::reset_fault`] is called, so
//! the rest of a batch fails fast instead of waiting on a dead process.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::{Duration, Instant};

use depgraph_core::FileAnalysis;
use depgraph_core::module_id::module_id_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::extractor::{LanguageExtractor, SourceFile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: u64,
    pub file: String,
    /// Module id for the file node; derived from the path when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FileAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker command is empty")]
    EmptyCommand,
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker pipe failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker closed its output")]
    Closed,
    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed worker response: {0}")]
    Malformed(String),
    #[error("worker faulted earlier in this batch")]
    Faulted,
    /// The worker is healthy but could not handle this one file.
    #[error("worker could not parse file: {0}")]
    Remote(String),
}

impl WorkerError {
    /// Whether the failure took the worker process down with it.
    pub fn is_fault(&self) -> bool {
        !matches!(self, WorkerError::Remote(_))
    }
}

/// Serve worker requests until `reader` is exhausted.
pub fn serve_worker<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    extractor: &dyn LanguageExtractor,
) -> std::io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(request) => handle_request(request, extractor),
            Err(e) => WorkerResponse {
                id: 0,
                result: None,
                error: Some(format!("malformed request: {}", e)),
            },
        };
        let encoded = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        writeln!(writer, "{}", encoded)?;
        writer.flush()?;
    }
    Ok(())
}

fn handle_request(request: WorkerRequest, extractor: &dyn LanguageExtractor) -> WorkerResponse {
    let path = Path::new(&request.file);
    let module = request
        .module
        .unwrap_or_else(|| module_id_for(Path::new(""), path));
    let outcome = SourceFile::with_module(path, module)
        .ok_or_else(|| format!("unsupported file type: {}", request.file))
        .and_then(|source| {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", request.file, e))?;
            extractor
                .extract(&source, &content)
                .map_err(|e| format!("cannot parse {}: {}", request.file, e))
        });
    match outcome {
        Ok(analysis) => WorkerResponse {
            id: request.id,
            result: Some(analysis),
            error: None,
        },
        Err(error) => WorkerResponse {
            id: request.id,
            result: None,
            error: Some(error),
        },
    }
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

impl WorkerProcess {
    fn spawn(command: &[String]) -> Result<Self, WorkerError> {
        let (program, args) = command.split_first().ok_or(WorkerError::EmptyCommand)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WorkerError::Closed);
        };

        let (sender, lines) = channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        info!("Spawned brace parser worker (pid {})", child.id());
        Ok(WorkerProcess { child, stdin, lines })
    }

    fn shutdown(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Client side of the worker protocol.
pub struct WorkerClient {
    command: Vec<String>,
    timeout: Duration,
    process: Option<WorkerProcess>,
    next_id: u64,
    faulted: bool,
}

impl WorkerClient {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        WorkerClient {
            command,
            timeout,
            process: None,
            next_id: 1,
            faulted: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Allow the next request to respawn a worker after a fault.
    pub fn reset_fault(&mut self) {
        self.faulted = false;
    }

    /// Parse one file in the worker.
    pub fn parse(&mut self, file: &str, module: &str) -> Result<FileAnalysis, WorkerError> {
        if self.faulted {
            return Err(WorkerError::Faulted);
        }
        match self.round_trip(file, module) {
            Err(e) if e.is_fault() => {
                warn!("Brace parser worker fault on {}: {}", file, e);
                self.fault();
                Err(e)
            }
            other => other,
        }
    }

    fn round_trip(&mut self, file: &str, module: &str) -> Result<FileAnalysis, WorkerError> {
        if self.process.is_none() {
            self.process = Some(WorkerProcess::spawn(&self.command)?);
        }
        let Some(process) = self.process.as_mut() else {
            return Err(WorkerError::Closed);
        };

        let id = self.next_id;
        self.next_id += 1;
        let request = WorkerRequest {
            id,
            file: file.to_string(),
            module: Some(module.to_string()),
        };
        let encoded =
            serde_json::to_string(&request).map_err(|e| WorkerError::Malformed(e.to_string()))?;
        writeln!(process.stdin, "{}", encoded)?;
        process.stdin.flush()?;
        debug!("Sent worker request {} for {}", id, file);

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match process.lines.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => return Err(WorkerError::Timeout(self.timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(WorkerError::Closed),
            };
            let response: WorkerResponse = serde_json::from_str(&line)
                .map_err(|e| WorkerError::Malformed(format!("{}: {}", e, line)))?;
            if response.id != id {
                debug!("Skipping worker response {} while waiting for {}", response.id, id);
                continue;
            }
            return match (response.result, response.error) {
                (Some(result), _) => Ok(result),
                (None, Some(error)) => Err(WorkerError::Remote(error)),
                (None, None) => Err(WorkerError::Malformed(format!("empty response {}", id))),
            };
        }
    }

    fn fault(&mut self) {
        self.faulted = true;
        if let Some(process) = self.process.take() {
            process.shutdown();
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        if let Some(process) = self.process.take() {
            debug!("Stopping brace parser worker");
            process.shutdown();
        }
    }
}
