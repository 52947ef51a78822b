//! Command-line interface definitions.

use clap::{Parser, Subcommand};

/// Phased multi-agent analysis panel.
#[derive(Parser, Debug)]
#[command(name = "review-panel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the panel on a question or a hypothetical and write the results
    Analyze {
        /// Question to analyse
        #[arg(long, required_unless_present = "hypo", conflicts_with = "hypo")]
        question: Option<String>,

        /// Hypothetical scenario to analyse instead of a question
        #[arg(long)]
        hypo: Option<String>,

        /// Model for the panel pipe, overriding PANEL_MODEL
        #[arg(long)]
        model: Option<String>,
    },

    /// Embed and store a document
    AddDocument {
        #[arg(long)]
        collection: String,

        /// Client namespace, overriding CLIENT_NAME
        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        text: String,

        /// Document id; generated when omitted
        #[arg(long)]
        id: Option<String>,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// ISO-8601 date used to rank query hits
        #[arg(long)]
        case_date: Option<String>,
    },

    /// Similarity query against a collection
    Query {
        #[arg(long)]
        collection: String,

        /// Client namespace, overriding CLIENT_NAME
        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        text: String,

        /// Only documents carrying one of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Minimum similarity in [0, 1]
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum number of candidates
        #[arg(long)]
        limit: Option<usize>,
    },
}
