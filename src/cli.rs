use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// YAML config file, overridden by environment variables
    #[clap(long, global = true, env = "BOOKMARK_AI_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Read browser bookmarks, describe new ones and update the index
    Sync,

    /// Print the bookmarks closest to a query
    Search {
        query: String,

        /// Number of results (defaults to RETRIEVAL_K)
        #[clap(short, long)]
        k: Option<usize>,
    },

    /// Ask a single question about your bookmarks
    Ask {
        question: String,

        /// Bookmarks retrieved for the answer (defaults to RETRIEVAL_K)
        #[clap(short, long)]
        k: Option<usize>,
    },

    /// Interactive chat over your bookmarks.
    /// Type `/k <n>` to change how many bookmarks are retrieved.
    Chat {
        /// Bookmarks retrieved per question (defaults to RETRIEVAL_K)
        #[clap(short, long)]
        k: Option<usize>,
    },
}

/// A line typed in the chat prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput {
    Exit,
    SetK(usize),
    Question(String),
    Invalid(String),
}

pub fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() || line == "/exit" || line == "/quit" {
        return ChatInput::Exit;
    }

    if let Some(rest) = line.strip_prefix("/k") {
        return match rest.trim().parse::<usize>() {
            Ok(k) if k > 0 => ChatInput::SetK(k),
            _ => ChatInput::Invalid("usage: /k <positive number>".to_string()),
        };
    }

    ChatInput::Question(line.to_string())
}
