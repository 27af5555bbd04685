//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "documind",
    version,
    author = "neur0map",
    about = "Exact semantic retrieval over a pre-indexed document corpus",
    long_about = "DocuMind embeds a JSON Lines corpus into an exact flat vector index, \
                  answers nearest-chunk queries against it, and can pass the retrieved \
                  context to an LLM for a generated answer."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/documind/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed the corpus and publish a new index generation
    Build {
        /// Corpus file (JSON Lines); overrides corpus.path
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,

        /// Index directory; overrides index.dir
        #[arg(long, value_name = "DIR")]
        index_dir: Option<PathBuf>,
    },

    /// Search the published index directly
    Query {
        /// Search query text
        query: String,

        /// Number of chunks to return (defaults to retrieval.default_top_k)
        #[arg(short = 'k', long = "top-k")]
        k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the retrieval server in the foreground
    Serve {
        /// Profile to use (e.g., "offline", "accurate")
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Ask the running server a question
    Chat {
        /// Question to ask
        prompt: String,

        /// Number of context chunks to retrieve
        #[arg(short = 'k', long = "top-k")]
        k: Option<usize>,

        /// Show the response in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the running server's index and model
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from(["documind", "query", "what is a cat", "-k", "3", "--json"])
            .unwrap();
        match cli.command {
            Commands::Query { query, k, json } => {
                assert_eq!(query, "what is a cat");
                assert_eq!(k, Some(3));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "documind",
            "status",
            "--verbose",
            "--config",
            "/tmp/c.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
