use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// `Planwise` - AI planning assistant that turns chat into goals, tasks and schedules.
#[derive(Parser, Debug)]
#[command(name = "planwise")]
#[command(version)]
#[command(about = "A streamed AI planning assistant.", long_about = None)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Self::On
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message to the assistant
    Chat {
        /// Message text
        message: String,

        /// Continue an existing conversation (a new one is created otherwise)
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        conversation_command: ConversationCommands,
    },

    /// Inspect or adjust the monthly usage allowance
    Usage {
        #[command(subcommand)]
        usage_command: UsageCommands,
    },

    /// Manage personal documents shared with the assistant
    Docs {
        #[command(subcommand)]
        docs_command: DocsCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConversationCommands {
    /// List conversations, most recently updated first
    List,
    /// Print every message of a conversation
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
    /// Delete every conversation
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum UsageCommands {
    /// Show usage for the current period
    Status,
    /// Reset usage to zero and schedule the next reset
    Reset,
    /// Turn unlimited mode on or off
    Unlimited {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocsCommands {
    /// Add a document from disk
    Add {
        path: PathBuf,

        /// Mark as the app-context document, injected ahead of all others
        #[arg(long)]
        app_context: bool,
    },
    /// List stored documents
    List,
    /// Remove a stored document
    Remove { id: String },
    /// Print the context block sent with each turn
    Context {
        /// Rebuild instead of serving the cached copy
        #[arg(long)]
        refresh: bool,
    },
    /// Turn document sharing on or off
    Sharing {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_accepts_conversation_flag() {
        let cli = Cli::parse_from(["planwise", "chat", "plan my week", "-c", "abc"]);
        match cli.command {
            Commands::Chat {
                message,
                conversation,
            } => {
                assert_eq!(message, "plan my week");
                assert_eq!(conversation.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sharing_parses_toggle() {
        let cli = Cli::parse_from(["planwise", "docs", "sharing", "off"]);
        assert!(matches!(
            cli.command,
            Commands::Docs {
                docs_command: DocsCommands::Sharing { state: Toggle::Off }
            }
        ));
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::parse_from(["planwise", "usage", "status", "--verbose"]);
        assert!(cli.verbose);
    }
}
