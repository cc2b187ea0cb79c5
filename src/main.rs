//! Terminal chat client
//!
//! Reads one prompt per line from stdin and streams each answer to stdout.
//! Ctrl-C stops the answer in progress; at the prompt it quits, as does
//! end of input. Logs go to stderr.

use chatstream::config::ClientConfig;
use chatstream::runtime::{ChatRuntime, ClientUpdate, HttpTransport, RuntimeHandle};
use chatstream::session::{get_or_create_session_id, MemorySessionStore};
use chatstream::state_machine::ResponseState;
use chatstream::store::ConversationStore;
use std::io::Write;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatstream=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env();
    let session_id = get_or_create_session_id(&MemorySessionStore::new());
    let conversation_id = config
        .conversation_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(
        api = %config.chat_url(),
        session_id = %session_id,
        conversation_id = %conversation_id,
        "Starting chat client"
    );

    let transport = HttpTransport::new(config)?;
    let (handle, runtime) =
        ChatRuntime::spawn(transport, ConversationStore::default(), session_id);
    let mut updates = BroadcastStream::new(handle.subscribe());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(prompt) = next_prompt(&mut lines, tokio::signal::ctrl_c()).await? {
        match handle.submit(conversation_id.as_str(), prompt).await {
            Ok(submitted) => {
                let mut view = ResponseView::new(submitted.assistant_message_id);
                follow_response(&handle, &conversation_id, &mut updates, &mut view).await?;
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    handle.shutdown().await?;
    runtime.await?;
    Ok(())
}

/// Next non-blank line, or `None` at end of input or once `interrupt` fires
///
/// Once a Ctrl-C listener exists SIGINT no longer kills the process, so the
/// prompt has to watch for it too.
async fn next_prompt<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::pin!(interrupt);
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            signal = &mut interrupt => {
                signal?;
                return Ok(None);
            }
        };
        let Some(line) = line else {
            return Ok(None);
        };
        let prompt = line.trim();
        if !prompt.is_empty() {
            return Ok(Some(prompt.to_string()));
        }
    }
}

/// Render updates until the response ends, cancelling it on Ctrl-C
async fn follow_response(
    handle: &RuntimeHandle,
    conversation_id: &str,
    updates: &mut BroadcastStream<ClientUpdate>,
    view: &mut ResponseView,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!(conversation_id = %conversation_id, "Stopping response");
                handle.cancel(conversation_id).await?;
            }
            update = updates.next() => match update {
                Some(Ok(update)) => {
                    if view.render(&update, &mut stdout)? {
                        return Ok(());
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Display fell behind");
                }
                None => return Ok(()),
            }
        }
    }
}

/// Incremental terminal rendering of one assistant message
struct ResponseView {
    message_id: String,
    /// Content already written
    shown: String,
    thinking_shown: bool,
    tool_shown: Option<String>,
}

impl ResponseView {
    fn new(message_id: String) -> Self {
        Self {
            message_id,
            shown: String::new(),
            thinking_shown: false,
            tool_shown: None,
        }
    }

    /// Returns true once the response has ended
    fn render(&mut self, update: &ClientUpdate, out: &mut impl Write) -> std::io::Result<bool> {
        match update {
            ClientUpdate::MessageUpdated { message, .. } if message.id == self.message_id => {
                if let (Some(seconds), false) = (message.thinking_time, self.thinking_shown) {
                    self.thinking_shown = true;
                    writeln!(out, "[thought for {seconds:.1}s]")?;
                }
                match message.content.strip_prefix(self.shown.as_str()) {
                    Some(fresh) => write!(out, "{fresh}")?,
                    // Replaced by the failure text
                    None => write!(out, "\n{}", message.content)?,
                }
                self.shown.clone_from(&message.content);
                out.flush()?;
            }
            ClientUpdate::ToolActivity { activity, .. } => {
                if let Some(tool) = &activity.active {
                    if self.tool_shown.as_ref() != Some(tool) {
                        writeln!(out, "[{tool}...]")?;
                        self.tool_shown = Some(tool.clone());
                    }
                }
            }
            ClientUpdate::TitleChanged { title, .. } => {
                tracing::info!(title = %title, "Conversation titled");
            }
            ClientUpdate::ResponseEnded {
                message_id, state, ..
            } if *message_id == self.message_id => {
                if *state == ResponseState::CompletePartial {
                    write!(out, " [stopped]")?;
                }
                writeln!(out)?;
                out.flush()?;
                return Ok(true);
            }
            _ => {}
        }
        Ok(false)
    }
}
