//! Chat runtime executor

use super::traits::ChatTransport;
use super::{ClientUpdate, Command, Internal, RuntimeHandle, Snapshot, Submitted};

use crate::state_machine::{CancelReason, Effect, Event, ResponseState};
use crate::store::{Applied, ChatRequest, ConversationStore, Submission};
use crate::stream::{parse_record, StreamDecoder, StreamEvent};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const INTERNAL_CHANNEL_CAPACITY: usize = 256;
const UPDATE_CHANNEL_CAPACITY: usize = 512;

/// Owns the conversation store and every in-flight response
pub struct ChatRuntime<T: ChatTransport + 'static> {
    store: ConversationStore,
    transport: Arc<T>,
    session_id: String,
    commands: mpsc::Receiver<Command>,
    internal_rx: mpsc::Receiver<Internal>,
    internal_tx: mpsc::Sender<Internal>,
    updates: broadcast::Sender<ClientUpdate>,
    /// Cancellation for the reader task of each live response
    readers: HashMap<String, CancellationToken>,
    /// Threads with a title fetch in flight
    pending_titles: HashSet<String>,
}

impl<T: ChatTransport + 'static> ChatRuntime<T> {
    pub fn new(
        transport: T,
        store: ConversationStore,
        session_id: impl Into<String>,
    ) -> (Self, RuntimeHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let handle = RuntimeHandle::new(command_tx, updates.clone());
        let runtime = Self {
            store,
            transport: Arc::new(transport),
            session_id: session_id.into(),
            commands,
            internal_rx,
            internal_tx,
            updates,
            readers: HashMap::new(),
            pending_titles: HashSet::new(),
        };
        (runtime, handle)
    }

    /// Start the runtime on the current tokio runtime
    pub fn spawn(
        transport: T,
        store: ConversationStore,
        session_id: impl Into<String>,
    ) -> (RuntimeHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(transport, store, session_id);
        (handle, tokio::spawn(runtime.run()))
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "Chat runtime started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
            }
        }

        self.teardown();
        tracing::info!("Chat runtime stopped");
    }

    // ==================== Commands ====================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit {
                conversation_id,
                text,
                reply,
            } => {
                let result = self.submit(&conversation_id, &text);
                if let Err(e) = &result {
                    tracing::warn!(conversation_id = %conversation_id, error = %e, "Submit rejected");
                    self.publish(ClientUpdate::Rejected {
                        conversation_id,
                        reason: e.to_string(),
                    });
                }
                let _ = reply.send(result);
            }
            Command::Cancel { conversation_id } => {
                self.cancel_response(&conversation_id, CancelReason::User);
            }
            Command::Rename {
                conversation_id,
                title,
                reply,
            } => {
                let result = self.store.rename(&conversation_id, &title);
                if result.is_ok() {
                    self.publish_title(&conversation_id);
                }
                let _ = reply.send(result);
            }
            Command::Feedback {
                conversation_id,
                message_id,
                feedback,
                reply,
            } => {
                let result = self
                    .store
                    .set_feedback(&conversation_id, &message_id, feedback);
                if result.is_ok() {
                    self.publish_message(&conversation_id, &message_id);
                }
                let _ = reply.send(result);
            }
            Command::Snapshot {
                conversation_id,
                reply,
            } => {
                let _ = reply.send(Snapshot {
                    conversations: self.store.conversations().to_vec(),
                    messages: self.store.messages(&conversation_id).to_vec(),
                    streaming: self.store.is_streaming(&conversation_id),
                    tool_activity: self.store.tool_activity(&conversation_id),
                });
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    fn submit(
        &mut self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Submitted, crate::store::StoreError> {
        let submission = self.store.submit(conversation_id, text)?;

        if submission.conversation_created {
            if let Some(conversation) = self.store.conversation(conversation_id) {
                self.publish(ClientUpdate::ConversationAdded {
                    conversation: conversation.clone(),
                });
            }
        }
        self.publish_message(conversation_id, &submission.user_message_id);
        self.publish_message(conversation_id, &submission.assistant_message_id);

        self.spawn_reader(&submission);

        Ok(Submitted {
            conversation_id: submission.conversation_id,
            user_message_id: submission.user_message_id,
            assistant_message_id: submission.assistant_message_id,
        })
    }

    fn cancel_response(&mut self, conversation_id: &str, reason: CancelReason) {
        if let Some(token) = self.readers.remove(conversation_id) {
            token.cancel();
        }
        let Some(message_id) = self
            .store
            .live_message_id(conversation_id)
            .map(str::to_string)
        else {
            tracing::debug!(conversation_id = %conversation_id, "Nothing to cancel");
            return;
        };
        match self.store.cancel(conversation_id, reason) {
            Ok(applied) => self.publish_applied(conversation_id, &message_id, &applied),
            Err(e) => tracing::error!(conversation_id = %conversation_id, error = %e, "Cancel failed"),
        }
    }

    /// Freeze every live response before stopping
    fn teardown(&mut self) {
        for conversation_id in self.store.live_conversations() {
            self.cancel_response(&conversation_id, CancelReason::Teardown);
        }
        for (_, token) in self.readers.drain() {
            token.cancel();
        }
    }

    // ==================== Background Events ====================

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Response {
                conversation_id,
                message_id,
                event,
            } => match self.store.apply(&conversation_id, &message_id, event) {
                Ok(applied) => self.publish_applied(&conversation_id, &message_id, &applied),
                Err(e) => {
                    tracing::error!(conversation_id = %conversation_id, error = %e, "Failed to apply event");
                }
            },
            Internal::TitleFetched {
                conversation_id,
                result,
            } => {
                self.pending_titles.remove(&conversation_id);
                match result {
                    Ok(first_message) => {
                        if self
                            .store
                            .apply_title(&conversation_id, &first_message)
                            .is_some()
                        {
                            self.publish_title(&conversation_id);
                        }
                    }
                    Err(e) => {
                        // Placeholder stays; the next completed response retries
                        tracing::warn!(conversation_id = %conversation_id, error = %e, "Title fetch failed");
                    }
                }
            }
        }
    }

    fn spawn_reader(&mut self, submission: &Submission) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .readers
            .insert(submission.conversation_id.clone(), cancel.clone())
        {
            previous.cancel();
        }

        let reader = ResponseReader {
            conversation_id: submission.conversation_id.clone(),
            message_id: submission.assistant_message_id.clone(),
            tx: self.internal_tx.clone(),
        };
        let transport = self.transport.clone();
        let request = submission.request.clone();
        tokio::spawn(reader.run(transport, request, cancel));
    }

    fn request_title(&mut self, conversation_id: &str) {
        if !self.pending_titles.insert(conversation_id.to_string()) {
            return;
        }
        let transport = self.transport.clone();
        let tx = self.internal_tx.clone();
        let session_id = self.session_id.clone();
        let conversation_id = conversation_id.to_string();

        tokio::spawn(async move {
            tracing::debug!(conversation_id = %conversation_id, "Fetching first message for title");
            let result = transport
                .fetch_first_message(&conversation_id, &session_id)
                .await;
            let _ = tx
                .send(Internal::TitleFetched {
                    conversation_id,
                    result,
                })
                .await;
        });
    }

    // ==================== Updates ====================

    fn publish_applied(&mut self, conversation_id: &str, message_id: &str, applied: &Applied) {
        let effects = applied.effects();
        if effects.is_empty() {
            return;
        }

        let message_changed = effects.iter().any(|e| {
            matches!(
                e,
                Effect::AppendContent { .. }
                    | Effect::SetThinkingTime { .. }
                    | Effect::ReplaceContent { .. }
                    | Effect::ResponseEnded { .. }
            )
        });
        let tools_changed = effects
            .iter()
            .any(|e| matches!(e, Effect::ToolActive { .. } | Effect::ToolCleared { .. }));

        if message_changed {
            self.publish_message(conversation_id, message_id);
        }
        if tools_changed {
            self.publish(ClientUpdate::ToolActivity {
                conversation_id: conversation_id.to_string(),
                activity: self.store.tool_activity(conversation_id),
            });
        }

        if let Some(outcome) = applied.ended() {
            self.readers.remove(conversation_id);
            self.publish(ClientUpdate::ResponseEnded {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                state: outcome.clone(),
            });
            if *outcome == ResponseState::Complete && self.store.needs_title(conversation_id) {
                self.request_title(conversation_id);
            }
        }
    }

    fn publish_message(&self, conversation_id: &str, message_id: &str) {
        if let Some(message) = self.store.message(conversation_id, message_id) {
            self.publish(ClientUpdate::MessageUpdated {
                conversation_id: conversation_id.to_string(),
                message: message.clone(),
            });
        }
    }

    fn publish_title(&self, conversation_id: &str) {
        if let Some(conversation) = self.store.conversation(conversation_id) {
            self.publish(ClientUpdate::TitleChanged {
                conversation_id: conversation_id.to_string(),
                title: conversation.title.clone(),
            });
        }
    }

    fn publish(&self, update: ClientUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}

// ============================================================================
// Response Reader
// ============================================================================

/// Pulls one response body and forwards its events to the runtime
struct ResponseReader {
    conversation_id: String,
    message_id: String,
    tx: mpsc::Sender<Internal>,
}

impl ResponseReader {
    async fn run<T: ChatTransport + ?Sized>(
        self,
        transport: Arc<T>,
        request: ChatRequest,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();

        let opened = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!(conversation_id = %self.conversation_id, "Cancelled before stream opened");
                return;
            }

            result = transport.open_stream(&request) => result,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    error = %error,
                    kind = ?error.kind,
                    "Chat request failed"
                );
                self.send(Event::TransportFailed { error }).await;
                return;
            }
        };

        let mut decoder = StreamDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!(conversation_id = %self.conversation_id, "Stream reader cancelled");
                    return;
                }

                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for record in decoder.push(&bytes) {
                        if !self.forward(&record).await {
                            return;
                        }
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(
                        conversation_id = %self.conversation_id,
                        error = %error,
                        "Stream broke mid-response"
                    );
                    self.send(Event::TransportFailed { error }).await;
                    return;
                }
                None => break,
            }
        }

        let remainder = decoder.finish();
        if !remainder.is_empty() {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                incomplete_record = remainder.incomplete_record.is_some(),
                truncated_bytes = remainder.truncated_bytes,
                "Dropping unterminated tail"
            );
        }

        tracing::info!(
            conversation_id = %self.conversation_id,
            message_id = %self.message_id,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Stream complete"
        );
        self.send(Event::StreamEnded).await;
    }

    /// Parse one record and pass it on. Returns false once the runtime is gone.
    async fn forward(&self, record: &str) -> bool {
        let event = match parse_record(record) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conversation_id = %self.conversation_id, error = %e, "Skipping malformed record");
                return true;
            }
        };

        match &event {
            StreamEvent::ServerError(message) => {
                tracing::warn!(conversation_id = %self.conversation_id, message = %message, "Server reported an error");
            }
            StreamEvent::Finish(meta) => {
                tracing::debug!(
                    conversation_id = %self.conversation_id,
                    finish_reason = meta.finish_reason.as_deref().unwrap_or("unknown"),
                    prompt_tokens = meta.usage.as_ref().map(|u| u.prompt_tokens),
                    completion_tokens = meta.usage.as_ref().map(|u| u.completion_tokens),
                    "Finish metadata"
                );
            }
            StreamEvent::Unknown { discriminator } => {
                tracing::debug!(conversation_id = %self.conversation_id, discriminator = %discriminator, "Ignoring unknown record");
            }
            StreamEvent::TextDelta(_) | StreamEvent::Tool(_) => {}
        }

        match Event::from_stream(event) {
            Some(event) => self.send(event).await,
            None => true,
        }
    }

    async fn send(&self, event: Event) -> bool {
        self.tx
            .send(Internal::Response {
                conversation_id: self.conversation_id.clone(),
                message_id: self.message_id.clone(),
                event,
            })
            .await
            .is_ok()
    }
}
