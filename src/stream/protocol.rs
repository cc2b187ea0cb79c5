//! Record classification
//!
//! Known discriminators:
//! - `0` text delta, payload is a JSON string
//! - `9` tool event, payload is `{"type": "tool_start" | "tool_end", "name": ...}`
//! - `3` server-reported error, payload is a JSON string
//! - `e` finish metadata, payload is `{"finishReason": ..., "usage": {...}}`
//!
//! Anything else parses to [`StreamEvent::Unknown`] so newer servers never
//! break older clients. Every failure is local to one record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DISCRIMINATOR_SEPARATOR: char = ':';

/// One classified record
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant text; may be empty
    TextDelta(String),
    Tool(ToolEvent),
    /// Error text the server put in-band; informational only
    ServerError(String),
    Finish(FinishMetadata),
    /// Discriminator this client does not know about
    Unknown { discriminator: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEvent {
    #[serde(rename = "type")]
    pub kind: ToolEventKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolEventKind {
    #[serde(rename = "tool_start")]
    Start,
    #[serde(rename = "tool_end")]
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMetadata {
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// A record that could not be turned into an event. Skip it and carry on.
#[derive(Debug, Error)]
pub enum MalformedRecord {
    #[error("record has no discriminator separator")]
    MissingSeparator,
    #[error("record has an empty discriminator")]
    EmptyDiscriminator,
    #[error("invalid payload for discriminator {discriminator:?}: {source}")]
    InvalidPayload {
        discriminator: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Classify one complete record
pub fn parse_record(record: &str) -> Result<StreamEvent, MalformedRecord> {
    let (discriminator, payload) = record
        .split_once(DISCRIMINATOR_SEPARATOR)
        .ok_or(MalformedRecord::MissingSeparator)?;

    let invalid = |source| MalformedRecord::InvalidPayload {
        discriminator: discriminator.to_string(),
        source,
    };

    match discriminator {
        "" => Err(MalformedRecord::EmptyDiscriminator),
        "0" => serde_json::from_str(payload)
            .map(StreamEvent::TextDelta)
            .map_err(invalid),
        "9" => serde_json::from_str(payload)
            .map(StreamEvent::Tool)
            .map_err(invalid),
        "3" => serde_json::from_str(payload)
            .map(StreamEvent::ServerError)
            .map_err(invalid),
        "e" => serde_json::from_str(payload)
            .map(StreamEvent::Finish)
            .map_err(invalid),
        other => Ok(StreamEvent::Unknown {
            discriminator: other.to_string(),
        }),
    }
}
