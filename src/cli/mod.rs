//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ferret",
    version,
    author = "neur0map",
    about = "Query routing and multi-source retrieval for security operations data",
    long_about = "Ferret classifies natural-language questions about alerts, incidents, assets, \
                  indicators and playbooks, picks the cheapest retrieval strategy, fans the query out \
                  across its sources and returns one ranked, de-duplicated result list."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ferret/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a query and show the strategy it would use
    Classify {
        /// Query text
        query: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run a hybrid search over the record store
    Search {
        /// Query text
        query: String,

        /// Organization whose records are searched
        #[arg(short, long)]
        org: String,

        /// Restrict to these sources (alert, incident, asset, indicator, playbook)
        #[arg(short, long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Maximum number of results (5-100)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity for semantic hits (0.1-1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Force a strategy instead of the classifier's suggestion
        #[arg(long)]
        strategy: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find records related to an entity value
    Correlate {
        /// Entity value (IP, domain, hash, ...)
        value: String,

        /// Organization whose records are searched
        #[arg(short, long)]
        org: String,

        /// Entity kind; inferred from the value when omitted
        #[arg(short, long)]
        kind: Option<String>,

        /// Search depth
        #[arg(short, long, value_parser = ["shallow", "medium", "deep"], default_value = "medium")]
        depth: String,

        /// Minimum confidence for a hit (0.0-1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Skip the timeline
        #[arg(long)]
        no_timeline: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Score candidate tools against a query
    Tools {
        /// Query text
        query: String,

        /// Tool names to score
        #[arg(required = true, num_args = 1..)]
        tools: Vec<String>,

        /// Only list recommended tools
        #[arg(short, long)]
        recommended: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Extract typed indicators from text
    Indicators {
        /// Text to scan; reads stdin when omitted
        text: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Import records from a JSON array file
    Import {
        /// Path to the JSON file
        file: PathBuf,

        /// Skip embedding computation
        #[arg(long)]
        no_embed: bool,
    },

    /// Show record store statistics
    Stats {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

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
