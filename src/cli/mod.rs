//! CLI command parsing and plain-text output.

pub mod auth;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::diff::{ConfigDiff, DiffFormat, DiffTag};
use crate::core::reconcile::ProcessedMessage;
use crate::core::state::{group_todos, TodoItem};
use crate::core::threads::ThreadSummary;

/// Chat with deep agents running on a graph deployment.
#[derive(Parser)]
#[command(name = "dac")]
#[command(about = "Chat with deep agents on a LangGraph deployment")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Assistant to use instead of the configured one.
    #[arg(short, long, global = true)]
    pub assistant: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the chat TUI (default).
    #[command(visible_alias = "c")]
    Chat {
        /// Resume a thread by id.
        #[arg(short, long)]
        thread: Option<String>,

        /// Pause before every tool call.
        #[arg(short, long)]
        debug: bool,
    },

    /// Send one message and print the reply.
    Send {
        /// Message text.
        message: String,

        /// Continue a thread instead of starting a new one.
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// List recent threads.
    Threads {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Limit number of threads shown.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print a thread's messages, todos, and files.
    Show {
        thread_id: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Diff two config files (JSON or YAML).
    Diff {
        old: std::path::PathBuf,
        new: std::path::PathBuf,

        /// Serialization used for the comparison.
        #[arg(short, long, value_enum, default_value_t = DiffFormatArg::Yaml)]
        format: DiffFormatArg,

        /// Emit HTML rows instead of a unified listing.
        #[arg(long)]
        html: bool,
    },

    /// Start the HTTP API server.
    Serve {
        /// Host to bind to (overrides config).
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage stored credentials.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiffFormatArg {
    Json,
    Yaml,
}

impl From<DiffFormatArg> for DiffFormat {
    fn from(arg: DiffFormatArg) -> Self {
        match arg {
            DiffFormatArg::Json => Self::Json,
            DiffFormatArg::Yaml => Self::Yaml,
        }
    }
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an access token in the system keychain.
    Login(LoginArgs),

    /// Remove the stored access token.
    Logout {
        /// Deployment URL (defaults to the configured one).
        #[arg(long)]
        url: Option<String>,
    },

    /// Show which credentials will be used.
    Status,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Deployment URL (prompted if not configured).
    #[arg(long)]
    pub url: Option<String>,

    /// Access token (prompted if not provided).
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration.
    Show,

    /// Show the configuration file path.
    Path,
}

/// Table of thread summaries.
#[must_use]
pub fn format_thread_table(summaries: &[ThreadSummary]) -> String {
    let mut out = format!("{:<36}  {:<11}  {:<16}  Title\n", "ID", "Status", "Updated");
    out.push_str(&"-".repeat(90));
    out.push('\n');
    for summary in summaries {
        let updated = summary.updated_at.map_or_else(
            || "-".to_string(),
            |t| t.format("%Y-%m-%d %H:%M").to_string(),
        );
        out.push_str(&format!(
            "{:<36}  {:<11}  {:<16}  {}\n",
            summary.id,
            summary.status.as_str(),
            updated,
            summary.title
        ));
    }
    out
}

/// Plain-text transcript of processed messages.
#[must_use]
pub fn format_transcript(messages: &[ProcessedMessage]) -> String {
    let mut blocks = Vec::new();
    for processed in messages {
        let message = &processed.message;
        let speaker = if message.is_human() { "you" } else { "agent" };
        let mut block = String::new();
        let text = message.text();
        if !text.is_empty() {
            block.push_str(&format!("{speaker}> {text}"));
        }
        for call in &processed.tool_calls {
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(&format!("  [{}] {}", call.status.as_str(), call.name));
            if let Some(result) = &call.result {
                let first = result.lines().next().unwrap_or_default();
                block.push_str(&format!(" -> {first}"));
            }
        }
        if !block.is_empty() {
            blocks.push(block);
        }
    }
    blocks.join("\n\n")
}

/// Todo list grouped by status.
#[must_use]
pub fn format_todos(todos: &[TodoItem]) -> String {
    let grouped = group_todos(todos);
    let mut out = String::new();
    for (mark, items) in [
        ("~", &grouped.in_progress),
        (" ", &grouped.pending),
        ("x", &grouped.completed),
    ] {
        for item in items {
            out.push_str(&format!("[{mark}] {}\n", item.content));
        }
    }
    out
}

/// Unified listing of a config diff, one `-`/`+`/` ` line per row side.
#[must_use]
pub fn format_diff(diff: &ConfigDiff) -> String {
    let mut out = String::new();
    for row in diff.rows() {
        let text = |tag: DiffTag, segments: &[crate::core::diff::DiffSegment]| {
            let line: String = segments.iter().map(|s| s.text.as_str()).collect();
            let prefix = match tag {
                DiffTag::Delete => '-',
                DiffTag::Add => '+',
                DiffTag::Equal => ' ',
            };
            format!("{prefix}{line}\n")
        };
        if row.has_changes {
            if !row.old.is_empty() {
                out.push_str(&text(DiffTag::Delete, &row.old));
            }
            if !row.new.is_empty() {
                out.push_str(&text(DiffTag::Add, &row.new));
            }
        } else {
            out.push_str(&text(DiffTag::Equal, &row.new));
        }
    }
    out
}
