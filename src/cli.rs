use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "prompthub", about = "Prompt sharing service with similarity search")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP daemon
    Daemon {},

    /// Rebuild the similarity index
    RebuildIndex {},

    /// List prompts similar to the given prompt
    Similar {
        id: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Add a prompt
    Add {
        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,

        /// coding, writing, analysis, creative, learning or other
        #[arg(long, default_value = "other")]
        category: String,

        #[arg(long)]
        description: Option<String>,

        /// Comma separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Hide from listings and similarity matching
        #[arg(long)]
        private: bool,
    },

    /// Search prompts
    Search {
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        tag: Option<String>,

        #[arg(long)]
        keyword: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Generate a short description for prompt content
    Summarize { content: String },
}
