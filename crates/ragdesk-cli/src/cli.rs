//! CLI argument definitions for ragdesk.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ragdesk_client::Role;
use ragdesk_client::config::{ENV_BASE_URL, ENV_CACHE_PATH, ENV_CALLBACK_PORT};

/// ragdesk -- ask questions about your documents.
#[derive(Parser)]
#[command(
    name = "ragdesk",
    version,
    about = "ragdesk -- ask questions about your documents",
    long_about = "Command-line client for the ragdesk backend: sign in, upload PDF and DOCX \
                  documents, and ask questions answered from their contents."
)]
pub struct Cli {
    /// Backend base URL.
    #[arg(long, global = true, env = ENV_BASE_URL)]
    pub base_url: Option<String>,

    /// Where the sign-in is remembered between runs.
    #[arg(long, global = true, env = ENV_CACHE_PATH)]
    pub cache: Option<PathBuf>,

    /// Local port the identity provider redirects back to.
    #[arg(long, global = true, env = ENV_CALLBACK_PORT)]
    pub callback_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in through the identity provider.
    Login {
        /// Provider to use instead of the backend's default.
        #[arg(long, short)]
        provider: Option<String>,
    },

    /// Finish a sign-in from a redirect URL pasted from the browser.
    Callback {
        /// The full URL the browser was sent back to.
        url: String,
    },

    /// Show who is signed in.
    Whoami,

    /// Sign out locally and on the backend.
    Logout,

    /// Trade the current token for a fresh one.
    Refresh,

    /// Manage uploaded documents.
    Files {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Ask a question about the uploaded documents.
    Ask {
        question: String,

        /// Conversation to continue; a new one is started otherwise.
        #[arg(long, short)]
        session: Option<String>,
    },

    /// Ask a recorded question.
    AskVoice {
        /// Audio file with the spoken question.
        file: PathBuf,

        /// Conversation to continue; a new one is started otherwise.
        #[arg(long, short)]
        session: Option<String>,
    },

    /// Show your most recent questions and answers.
    History {
        #[arg(long, short, default_value_t = ragdesk_client::rag::DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },

    /// Show every question asked in one conversation.
    SessionHistory {
        /// The conversation id.
        id: String,
    },

    /// Delete a question and its answer.
    DeleteQuestion {
        id: i64,
    },

    /// Show question statistics.
    Stats,

    /// Manage user accounts (admin only).
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
}

/// Actions for managing documents.
#[derive(Subcommand)]
pub enum FileAction {
    /// List uploaded documents.
    List,
    /// Show one document.
    Show {
        id: i64,
    },
    /// Upload a PDF or DOCX document.
    Upload {
        path: PathBuf,
    },
    /// Download a document.
    Download {
        id: i64,

        /// Destination file; defaults to the original file name.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a document.
    Delete {
        id: i64,
    },
}

/// Actions for managing user accounts.
#[derive(Subcommand)]
pub enum UserAction {
    /// List users.
    List {
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
    /// Show one user.
    Show {
        id: i64,
    },
    /// Create a user.
    Create {
        #[arg(long)]
        email: String,
        /// `user` or `admin`.
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Change a user's email or role.
    Update {
        id: i64,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<Role>,
    },
    /// Delete a user.
    Delete {
        id: i64,
    },
}
