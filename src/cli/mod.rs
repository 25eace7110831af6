//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "oracle",
    version,
    about = "Ask natural-language questions about a source repository",
    long_about = "Oracle ingests a repository into a dual lexical/semantic index and answers \
                  questions through a two-stage hybrid retrieval pipeline with cross-encoder \
                  reranking."
)]
pub struct Cli {
    /// Config file path (defaults to <repo>/.oracle/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or update the repository index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Ask a question against the indexed repository
    Ask {
        /// Question text
        question: String,

        /// Number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,

        /// Print the retrieved context instead of handing off to the
        /// answer layer
        #[arg(long)]
        dry_run: bool,

        /// Bypass the response cache of the answer layer
        #[arg(long)]
        no_cache: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default config file under <repo>/.oracle/
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Rebuild the index from scratch
    Full {
        /// Repository root (defaults to the current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Chunk store database path (defaults to <repo>/.oracle/index.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Maximum file size to index, in KiB
        #[arg(long, value_name = "KB")]
        max_size: Option<u64>,

        /// Restrict indexing to a subdirectory
        #[arg(long, value_name = "SUBDIR")]
        scope: Option<PathBuf>,
    },

    /// Reindex only files changed since the last version-control checkpoint
    Update {
        /// Repository root (defaults to the current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Chunk store database path (defaults to <repo>/.oracle/index.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Restrict indexing to a subdirectory
        #[arg(long, value_name = "SUBDIR")]
        scope: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
