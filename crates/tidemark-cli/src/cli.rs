use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(about = "Offline-first notes that sync when you are back online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Owner whose notes are read and written
    #[arg(long, global = true, value_name = "OWNER")]
    pub owner: Option<String>,

    /// CLI profile name for owner/remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: tidemark "my note here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content; the first line becomes the title unless --title is given
        content: Vec<String>,
        /// Note title
        #[arg(long)]
        title: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// List recent notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter notes by tag name
        #[arg(long)]
        tag: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search notes
    Search {
        /// Search query
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one note
    Show {
        /// Note ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note (opens $EDITOR when no field flags are given)
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New body
        #[arg(long)]
        body: Option<String>,
        /// Replace tags (repeatable)
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Remove all tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Delete an existing note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Export notes
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Sync local notes with the remote notes API
    Sync {
        /// Keep running: sync on reconnect and on a timer until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Show local sync state
    Status {
        /// Retry records parked after repeated remote rejections
        #[arg(long)]
        retry_parked: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Default owner for this profile
        #[arg(long, value_name = "OWNER")]
        owner: Option<String>,
        /// Notes API base URL
        #[arg(long, value_name = "URL")]
        remote_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved configuration
    Show,
}
