//! Wire-level handling of the streaming chat response
//!
//! The response body is a sequence of newline-terminated records, each
//! `<discriminator>:<json payload>`. [`StreamDecoder`] turns arbitrarily
//! sliced bytes into complete records; [`parse_record`] classifies them.

mod decoder;
mod protocol;

#[cfg(test)]
mod proptests;

pub use decoder::{DecoderRemainder, StreamDecoder, RECORD_SEPARATOR};
pub use protocol::{
    parse_record, FinishMetadata, MalformedRecord, StreamEvent, TokenUsage, ToolEvent,
    ToolEventKind,
};
