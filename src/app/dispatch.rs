use crate::cli::commands::{Cli, Commands, ConversationCommands, DocsCommands, UsageCommands};
use anyhow::{Context, Result, bail};
use planwise::context::{NewDocument, detect_document_type};
use planwise::orchestrator::AssistantReply;
use planwise::{Config, PlanwiseError, Services, TurnObserver};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Writes streamed text to stdout as it arrives. Chunks are cumulative, so
/// only the unseen tail is printed.
#[derive(Default)]
struct StdoutObserver {
    printed: Mutex<String>,
}

impl StdoutObserver {
    fn emit(&self, text: &str) {
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        let tail = text.get(printed.len()..).unwrap_or(text);
        if tail.is_empty() {
            return;
        }
        write_stdout(tail);
        *printed = text.to_string();
    }
}

fn write_stdout(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// What still has to be printed once the final reply is known. Streamed
/// text may carry directive markup the final reply no longer has; in that
/// case the cleaned reply is reprinted after a separator.
fn completion_tail(streamed: &str, final_text: &str) -> Option<String> {
    if streamed.is_empty() {
        return Some(final_text.to_string()).filter(|text| !text.is_empty());
    }
    match final_text.strip_prefix(streamed) {
        Some("") => None,
        Some(rest) => Some(rest.to_string()),
        None if streamed.trim_end().starts_with(final_text.trim_end()) => None,
        None => Some(format!("\n---\n{final_text}")),
    }
}

impl TurnObserver for StdoutObserver {
    fn on_chunk(&self, text: &str) {
        self.emit(text);
    }

    fn on_complete(&self, reply: &AssistantReply) {
        let streamed = self.printed.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(tail) = completion_tail(&streamed, &reply.text) {
            write_stdout(&tail);
        }
        println!();
    }

    fn on_error(&self, error: &PlanwiseError) {
        info!("turn failed: {error}");
    }
}

async fn run_chat(services: &Services, message: &str, conversation: Option<String>) -> Result<()> {
    let conversation_id = match conversation {
        Some(id) => id,
        None => services.conversations.create(None).await?.id,
    };

    services.connect().await;
    let observer = StdoutObserver::default();
    let turn = services
        .orchestrator
        .send_in_conversation(&conversation_id, message, Vec::new(), &observer)
        .await;
    services.shutdown().await;
    let turn = turn?;

    if turn.reply.is_error {
        println!("{}", turn.reply.text);
    }
    if let Some(actions) = &turn.reply.actions {
        println!();
        for action in actions {
            println!("  + {}", action.summary());
        }
    }
    if let Some(title) = &turn.title {
        println!("\n[{}] {title}", turn.conversation_id);
    }
    Ok(())
}

async fn run_conversations(services: &Services, command: ConversationCommands) -> Result<()> {
    match command {
        ConversationCommands::List => {
            let summaries = services.conversations.list().await?;
            if summaries.is_empty() {
                println!("No conversations yet.");
            }
            for summary in summaries {
                println!(
                    "{}  {}  ({} messages, updated {})",
                    summary.id,
                    summary.title,
                    summary.message_count,
                    summary.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ConversationCommands::Show { id } => {
            let conversation = services.conversations.get(&id).await?;
            println!("# {}", conversation.title);
            for message in &conversation.messages {
                println!(
                    "\n[{} {}]\n{}",
                    message.timestamp.format("%Y-%m-%d %H:%M"),
                    message.message_type,
                    message.text
                );
            }
        }
        ConversationCommands::Delete { id } => {
            services.conversations.delete(&id).await?;
            println!("Deleted {id}");
        }
        ConversationCommands::Clear => {
            let removed = services.conversations.clear().await?;
            println!("Deleted {removed} conversations");
        }
    }
    Ok(())
}

async fn run_usage(services: &Services, command: UsageCommands) -> Result<()> {
    match command {
        UsageCommands::Status => {
            services.usage.reset_if_due().await;
            let status = services.usage.status().await;
            println!("Used:        {:.1}%", status.percentage_used);
            println!("Remaining:   {:.1}%", status.remaining_percentage);
            println!(
                "Unlimited:   {}",
                if status.unlimited_mode { "on" } else { "off" }
            );
            println!(
                "Next reset:  {}",
                status.next_reset_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        UsageCommands::Reset => {
            services.usage.reset_now().await?;
            println!("Usage reset.");
        }
        UsageCommands::Unlimited { state } => {
            if state.enabled() {
                services.usage.enable_unlimited_mode().await?;
            } else {
                services.usage.disable_unlimited_mode().await?;
            }
            println!("Unlimited mode {}.", if state.enabled() { "on" } else { "off" });
        }
    }
    Ok(())
}

async fn add_document(services: &Services, path: &Path, app_context: bool) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let (mime, kind) = detect_document_type(&bytes, &name);

    let content = if kind.is_plain_text() {
        String::from_utf8(bytes).with_context(|| format!("{name} is not valid UTF-8"))?
    } else {
        let Some(processor) = &services.processor else {
            bail!("{name} ({mime}) needs conversion but no context.processor_url is configured");
        };
        processor.process(&name, &bytes).await?.text
    };

    let document = services
        .documents
        .save(NewDocument {
            name,
            kind,
            content,
            is_app_context: app_context,
        })
        .await?;
    services.context.invalidate().await;
    println!(
        "Added {} ({}, {} bytes) as {}",
        document.name,
        document.kind,
        document.size_bytes(),
        document.id
    );
    Ok(())
}

async fn run_docs(services: &Services, command: DocsCommands) -> Result<()> {
    match command {
        DocsCommands::Add { path, app_context } => add_document(services, &path, app_context).await?,
        DocsCommands::List => {
            let documents = services.documents.list().await?;
            if documents.is_empty() {
                println!("No documents stored.");
            }
            for document in &documents {
                println!(
                    "{}  {}  {}  {} bytes{}",
                    document.id,
                    document.name,
                    document.kind,
                    document.size_bytes(),
                    if document.is_app_context { "  [app context]" } else { "" }
                );
            }
            let used = services.documents.used_bytes().await?;
            println!("\n{used} of {} bytes used", services.documents.quota_bytes());
        }
        DocsCommands::Remove { id } => {
            let removed = services.documents.remove(&id).await?;
            services.context.invalidate().await;
            println!("Removed {}", removed.name);
        }
        DocsCommands::Context { refresh } => {
            println!("{}", services.context.get_context(refresh).await);
        }
        DocsCommands::Sharing { state } => {
            services.documents.set_sharing_enabled(state.enabled()).await?;
            services.context.invalidate().await;
            println!("Document sharing {}.", if state.enabled() { "on" } else { "off" });
        }
    }
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let services = Services::open(config).await?;

    match cli.command {
        Commands::Chat {
            message,
            conversation,
        } => run_chat(&services, &message, conversation).await,
        Commands::Conversations {
            conversation_command,
        } => run_conversations(&services, conversation_command).await,
        Commands::Usage { usage_command } => run_usage(&services, usage_command).await,
        Commands::Docs { docs_command } => run_docs(&services, docs_command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::completion_tail;

    #[test]
    fn unstreamed_reply_is_printed_whole() {
        assert_eq!(completion_tail("", "Done."), Some("Done.".into()));
        assert_eq!(completion_tail("", ""), None);
    }

    #[test]
    fn streamed_prefix_prints_only_the_rest() {
        assert_eq!(completion_tail("Hello", "Hello"), None);
        assert_eq!(completion_tail("Hel", "Hello"), Some("lo".into()));
    }

    #[test]
    fn streamed_markup_is_followed_by_cleaned_reply() {
        let streamed = "Sure!\n[[CREATE_TODO]]\ntitle: Buy milk\n";
        assert_eq!(
            completion_tail(streamed, "Sure! I added it."),
            Some("\n---\nSure! I added it.".into())
        );
    }

    #[test]
    fn trailing_markup_after_cleaned_text_is_not_reprinted() {
        // Cleaned text is already on screen; only the directive block trailed it.
        assert_eq!(
            completion_tail("Sure!\n[[CREATE_TODO]]\ntitle: Buy milk\n", "Sure!"),
            None
        );
    }
}
