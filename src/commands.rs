//! CLI command implementations

use depgraph_core::{BraceBackend, Confidence, EngineConfig, ImpactOptions};
use depgraph_engine::AnalysisCache;
use depgraph_indexer::{TypeScriptExtractor, create_parser_pool, serve_worker};
use depgraph_server::{Server, serve_stdio};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            Ok(EngineConfig::from_file(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

pub async fn serve(mut config: EngineConfig, brace_worker: bool) -> anyhow::Result<()> {
    if brace_worker {
        let exe = std::env::current_exe()?;
        config.brace_parser.backend = BraceBackend::Worker;
        config.brace_parser.command = vec![exe.display().to_string(), "parse-worker".to_string()];
    }
    tracing::info!(
        "depgraph v{} serving on stdio (brace backend: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.brace_parser.backend
    );

    let mut server = Server::new(AnalysisCache::new(config)?);
    serve_stdio(&mut server).await?;
    Ok(())
}

pub fn analyse(config: EngineConfig, root: PathBuf, pretty: bool) -> anyhow::Result<()> {
    let mut cache = AnalysisCache::new(config)?;
    let graph = cache.analyse_project(&root)?;
    tracing::info!(
        "Analysed {} files, {} edges, {} warnings",
        graph.summary.files,
        graph.summary.edges,
        graph.warnings.len()
    );
    print_json(&graph, pretty)
}

pub fn impact(
    config: EngineConfig,
    root: PathBuf,
    file: String,
    function: Option<String>,
    max_depth: Option<usize>,
    min_confidence: Option<Confidence>,
) -> anyhow::Result<()> {
    let mut cache = AnalysisCache::new(config)?;
    cache.analyse_project(&root)?;

    let options = ImpactOptions {
        max_depth,
        min_confidence: min_confidence.unwrap_or(Confidence::Unsafe),
    };
    let report = cache.get_impact(&file, function.as_deref(), options);
    print_json(&report, true)
}

/// Serve parse requests for JS/TS files until stdin closes.
pub fn parse_worker() -> anyhow::Result<()> {
    tracing::debug!("Parse worker started");
    let extractor = TypeScriptExtractor::new(create_parser_pool());
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    tokio::task::block_in_place(|| serve_worker(stdin.lock(), stdout.lock(), &extractor))?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let encoded = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", encoded)?;
    Ok(())
}
