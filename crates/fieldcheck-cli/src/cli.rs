use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fieldcheck")]
#[command(about = "Inspect and sync offline checklist drafts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the data directory (database and durable photos)
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show pending count and retry state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List drafts waiting for upload
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload every pending draft now, ignoring the retry cap
    Sync,
    /// Reset a draft's retry budget and upload it
    Retry {
        /// Draft key, e.g. `tower-b_123` or `tower-b_new`
        key: String,
    },
    /// Drop a pending draft without uploading it
    Discard {
        /// Draft key, e.g. `tower-b_123` or `tower-b_new`
        key: String,
    },
    /// Manage the session token stored in the OS keychain
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
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
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store the session token used for uploads
    SetToken {
        /// Bearer token issued by the checklist backend
        token: String,
    },
    /// Remove the stored token
    Clear,
    /// Show whether a token is stored
    Status,
}
