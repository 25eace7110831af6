use oracle::cli::{Cli, Commands, ConfigAction, IndexAction};
use oracle::config::Config;
use oracle::embedding::FastEmbedProvider;
use oracle::error::{OracleError, Result};
use oracle::indexer::{IndexOptions, IndexPaths, IndexStats, Indexer};
use oracle::retrieval::{
    LocalReranker, RemoteReranker, RerankCandidate, RerankMode, RerankerStack, RetrievedChunk,
    Retriever,
};
use oracle::store::ChunkStore;
use oracle::walker::WalkOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXIT_FAILURE: i32 = 1;
const EXIT_SIGINT: i32 = 130;
const EXIT_SIGTERM: i32 = 143;

fn main() {
    init_logging();

    let cli = Cli::parse_args();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oracle=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<i32> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| OracleError::io(e, "Failed to create tokio runtime"))?;

    rt.block_on(async {
        tokio::select! {
            result = dispatch(cli) => result.map(|()| 0),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                Ok(EXIT_SIGINT)
            }
            _ = terminate_signal() => {
                tracing::info!("Terminated");
                Ok(EXIT_SIGTERM)
            }
        }
    })
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending().await
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Index { action } => match action {
            IndexAction::Full {
                path,
                db,
                max_size,
                scope,
            } => cmd_index(cli.config, path, db, max_size, scope, true).await,
            IndexAction::Update { path, db, scope } => {
                cmd_index(cli.config, path, db, None, scope, false).await
            }
        },
        Commands::Ask {
            question,
            top_k,
            no_rerank,
            dry_run,
            no_cache: _,
        } => cmd_ask(cli.config, &question, top_k, no_rerank, dry_run).await,
        Commands::Config { action } => cmd_config(cli.config, action),
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    let repo = resolve_repo(None)?;
    match action {
        ConfigAction::Init { force } => {
            let path = Config::index_dir(&repo).join("config.toml");
            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }
            Config::default().save(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path.as_deref(), &repo)?;
            let rendered = toml::to_string_pretty(&config)?;
            println!("{rendered}");
        }
    }
    Ok(())
}

fn resolve_repo(path: Option<PathBuf>) -> Result<PathBuf> {
    let repo = match path {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|e| OracleError::io(e, "Cannot determine current directory"))?,
    };
    if !repo.is_dir() {
        return Err(OracleError::InvalidRoot { path: repo });
    }
    repo.canonicalize()
        .map_err(|e| OracleError::io(e, format!("Cannot canonicalize {repo:?}")))
}

fn index_paths(repo: &Path, db: Option<PathBuf>) -> IndexPaths {
    let index_dir = Config::index_dir(repo);
    match db {
        Some(db) => IndexPaths::with_db(&index_dir, db),
        None => IndexPaths::new(&index_dir),
    }
}

async fn cmd_index(
    config_path: Option<PathBuf>,
    path: Option<PathBuf>,
    db: Option<PathBuf>,
    max_size_kb: Option<u64>,
    scope: Option<PathBuf>,
    full: bool,
) -> Result<()> {
    let repo = resolve_repo(path)?;
    let config = Config::load_or_default(config_path.as_deref(), &repo)?;
    let paths = index_paths(&repo, db);

    let mut walk = WalkOptions {
        max_bytes: config.walker.max_file_bytes,
        extra_ignore_dirs: config.walker.extra_ignore_dirs.clone(),
    };
    if let Some(kb) = max_size_kb {
        walk.max_bytes = kb * 1024;
    }

    let embedder = Arc::new(FastEmbedProvider::new(Some(Config::models_dir(&repo)))?);
    let indexer = Indexer::new(embedder, config.vector.params())?;

    let options = IndexOptions {
        walk,
        scope,
        progress: Some(Arc::new(|current, total| {
            if current == total || current % 100 == 0 {
                tracing::info!("Embedded {current}/{total} chunks");
            }
        })),
    };

    let stats = tokio::task::spawn_blocking(move || {
        if full {
            indexer.full_index(&repo, &paths, &options)
        } else {
            indexer.update_index(&repo, &paths, &options)
        }
    })
    .await
    .map_err(|e| OracleError::InternalInvariant(format!("Index task failed: {e}")))??;

    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &IndexStats) {
    println!("Indexing complete");
    println!("  Files discovered: {}", stats.files_discovered);
    println!("  Files processed:  {}", stats.files_processed);
    println!("  Files failed:     {}", stats.files_failed);
    println!("  Chunks created:   {}", stats.chunks_created);
    println!("  Duration:         {}ms", stats.duration_ms);
}

async fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    top_k: Option<usize>,
    no_rerank: bool,
    dry_run: bool,
) -> Result<()> {
    let repo = resolve_repo(None)?;
    let config = Config::load_or_default(config_path.as_deref(), &repo)?;
    let paths = index_paths(&repo, None);
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let store = Arc::new(ChunkStore::open(&paths.db)?);
    let embedder = Arc::new(FastEmbedProvider::new(Some(Config::models_dir(&repo)))?);
    let retriever = Retriever::open(
        &paths.lexical,
        &paths.vector,
        config.vector.params(),
        Arc::clone(&store),
        embedder,
    )?;

    let results = retriever
        .hybrid_search(question, &config.retrieval.search_options())
        .await?;

    if results.is_empty() {
        println!("No matching code found.");
        return Ok(());
    }

    let results = if no_rerank || !config.reranker.enabled {
        let mut results = results;
        results.truncate(top_k);
        results
    } else {
        rerank(&config, &repo, question, results, top_k).await
    };

    render_results(&results, dry_run);
    Ok(())
}

/// Apply the reranking stack and reorder hydrated results accordingly.
async fn rerank(
    config: &Config,
    repo: &Path,
    question: &str,
    results: Vec<RetrievedChunk>,
    top_k: usize,
) -> Vec<RetrievedChunk> {
    let mut modes = Vec::new();
    match RemoteReranker::new(config.reranker.remote.clone()) {
        Ok(remote) => modes.push(RerankMode::Remote(remote)),
        Err(e) => tracing::debug!("Remote reranker unavailable: {e}"),
    }
    if config.reranker.use_local {
        match LocalReranker::new(Some(Config::models_dir(repo))) {
            Ok(local) => modes.push(RerankMode::Local(local)),
            Err(e) => tracing::warn!("Local reranker unavailable: {e}"),
        }
    }
    modes.push(RerankMode::Passthrough);
    let stack = RerankerStack::new(modes);

    let candidates: Vec<RerankCandidate> = results
        .iter()
        .map(|r| RerankCandidate {
            id: r.id,
            content: r.content.clone(),
        })
        .collect();

    let reranked = stack.rerank(question, &candidates, top_k).await;

    let by_id: std::collections::HashMap<i64, RetrievedChunk> =
        results.into_iter().map(|r| (r.id, r)).collect();
    reranked
        .into_iter()
        .filter_map(|r| {
            by_id.get(&r.id).map(|chunk| {
                let mut chunk = chunk.clone();
                chunk.score = r.score as f64;
                chunk
            })
        })
        .collect()
}

fn render_results(results: &[RetrievedChunk], dry_run: bool) {
    for (rank, result) in results.iter().enumerate() {
        let symbol = if result.symbol_name.is_empty() {
            String::new()
        } else {
            format!("  {}", result.symbol_name)
        };
        println!(
            "{}. {}:{}-{}{}  (score {:.4})",
            rank + 1,
            result.file_path,
            result.start_line,
            result.end_line,
            symbol,
            result.score
        );
        if dry_run {
            for line in result.content.lines() {
                println!("   | {line}");
            }
        }
    }
}
