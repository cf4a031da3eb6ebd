//! Line-delimited JSON request server over any byte stream

pub mod handlers;
pub mod protocol;
pub mod router;


use depgraph_engine::AnalysisCache;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub use protocol::{ErrorObject, ProtocolError, Request, Response};

/// Owns the analysis cache and answers one request at a time.
pub struct Server {
    cache: AnalysisCache,
}

impl Server {
    pub fn new(cache: AnalysisCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Answer one raw line. Blank lines produce no response.
    pub fn handle_line(&mut self, line: &str) -> Option<Response> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparseable request line: {}", e);
                return Some(Response::failure(0, &ProtocolError::Parse(e.to_string())));
            }
        };

        let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => Some(self.handle(request)),
            Err(e) => Some(Response::failure(id, &ProtocolError::InvalidRequest(e.to_string()))),
        }
    }

    pub fn handle(&mut self, request: Request) -> Response {
        debug!("Request {} {}", request.id, request.method);
        match router::dispatch(&mut self.cache, &request.method, request.params) {
            Ok(result) => Response::success(request.id, result),
            Err(e) => {
                warn!("Request {} ({}) failed: {}", request.id, request.method, e);
                Response::failure(request.id, &e)
            }
        }
    }
}

/// Read requests from `reader` until EOF, writing one response line per
/// request to `writer`. Handlers run on the current worker thread via
/// `block_in_place`, so this needs the multi-threaded runtime.
pub async fn serve<R, W>(server: &mut Server, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Serving requests");
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(response) = tokio::task::block_in_place(|| server.handle_line(&line)) else {
            continue;
        };
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
    info!("Input closed, shutting down");
    Ok(())
}

/// Serve over this process's stdin and stdout.
pub async fn serve_stdio(server: &mut Server) -> std::io::Result<()> {
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    serve(server, reader, tokio::io::stdout()).await
}
