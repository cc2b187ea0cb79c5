//! Runtime for streaming responses
//!
//! One [`ChatRuntime`] task owns the [`ConversationStore`](crate::store::ConversationStore).
//! User commands and events from background reader tasks arrive on two
//! channels and are handled strictly one at a time.

mod executor;
pub mod http;
pub mod traits;


pub use executor::ChatRuntime;
pub use http::HttpTransport;
pub use traits::*;

use crate::error::TransportError;
use crate::state_machine::{Event, ResponseState};
use crate::store::{Conversation, Feedback, Message, StoreError, StoreResult};
use crate::tool_activity::ToolActivity;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Requests from the UI
#[derive(Debug)]
pub enum Command {
    Submit {
        conversation_id: String,
        text: String,
        reply: oneshot::Sender<StoreResult<Submitted>>,
    },
    Cancel {
        conversation_id: String,
    },
    Rename {
        conversation_id: String,
        title: String,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    Feedback {
        conversation_id: String,
        message_id: String,
        feedback: Feedback,
        reply: oneshot::Sender<StoreResult<Option<Feedback>>>,
    },
    Snapshot {
        conversation_id: String,
        reply: oneshot::Sender<Snapshot>,
    },
    /// Cancel every live response and stop
    Shutdown,
}

/// Produced by background tasks
#[derive(Debug)]
pub(crate) enum Internal {
    /// From a reader task, addressed to one response
    Response {
        conversation_id: String,
        message_id: String,
        event: Event,
    },
    TitleFetched {
        conversation_id: String,
        result: Result<String, TransportError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub conversation_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,
}

/// Point-in-time view of one conversation
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub streaming: bool,
    pub tool_activity: ToolActivity,
}

/// Pushed to UI subscribers
#[derive(Debug, Clone)]
pub enum ClientUpdate {
    ConversationAdded {
        conversation: Conversation,
    },
    /// A message was created or its content, timing or feedback changed
    MessageUpdated {
        conversation_id: String,
        message: Message,
    },
    ToolActivity {
        conversation_id: String,
        activity: ToolActivity,
    },
    ResponseEnded {
        conversation_id: String,
        message_id: String,
        state: ResponseState,
    },
    TitleChanged {
        conversation_id: String,
        title: String,
    },
    /// A command was refused
    Rejected {
        conversation_id: String,
        reason: String,
    },
}

/// The runtime task stopped before answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Chat runtime is not running")]
pub struct RuntimeStopped;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stopped(#[from] RuntimeStopped),
}

/// Cloneable front door to a running [`ChatRuntime`]
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
    updates: broadcast::Sender<ClientUpdate>,
}

impl RuntimeHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>, updates: broadcast::Sender<ClientUpdate>) -> Self {
        Self { tx, updates }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientUpdate> {
        self.updates.subscribe()
    }

    pub async fn submit(
        &self,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Submitted, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            conversation_id: conversation_id.into(),
            text: text.into(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| RuntimeStopped)??)
    }

    /// Stop the live response in a conversation. A no-op if nothing is live.
    pub async fn cancel(&self, conversation_id: impl Into<String>) -> Result<(), RuntimeStopped> {
        self.send(Command::Cancel {
            conversation_id: conversation_id.into(),
        })
        .await
    }

    pub async fn rename(
        &self,
        conversation_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Rename {
            conversation_id: conversation_id.into(),
            title: title.into(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| RuntimeStopped)??)
    }

    pub async fn feedback(
        &self,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        feedback: Feedback,
    ) -> Result<Option<Feedback>, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Feedback {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            feedback,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| RuntimeStopped)??)
    }

    pub async fn snapshot(
        &self,
        conversation_id: impl Into<String>,
    ) -> Result<Snapshot, RuntimeStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot {
            conversation_id: conversation_id.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RuntimeStopped)
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeStopped> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), RuntimeStopped> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RuntimeStopped)
    }
}
