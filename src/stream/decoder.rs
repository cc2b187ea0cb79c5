//! Byte-chunk to record reassembly

/// Terminates every record on the wire
pub const RECORD_SEPARATOR: char = '\n';
/// Longest record kept, in bytes. Longer ones are dropped whole.
pub const MAX_RECORD_LEN: usize = 1 << 20;

/// Reassembles complete records from a chunked byte stream.
///
/// Output is independent of how the transport sliced the bytes: a
/// multi-byte character split across chunks is held back until its
/// continuation bytes arrive, and a record split across chunks is held
/// back until its separator arrives. A record longer than the limit is
/// dropped however it was sliced, so a peer that never sends a separator
/// cannot grow the buffer without bound.
#[derive(Debug)]
pub struct StreamDecoder {
    /// Trailing bytes that do not yet form a complete character
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a separator
    line_buffer: String,
    max_record_len: usize,
    /// Inside an oversized record; skip to the next separator
    discarding: bool,
    oversized_records: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::with_max_record_len(MAX_RECORD_LEN)
    }
}

/// What was left over when the stream ended
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecoderRemainder {
    /// Unterminated trailing record. Never emitted.
    pub incomplete_record: Option<String>,
    /// Bytes of a character that never completed. Never rendered.
    pub truncated_bytes: usize,
}

impl DecoderRemainder {
    pub fn is_empty(&self) -> bool {
        self.incomplete_record.is_none() && self.truncated_bytes == 0
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_record_len(max_record_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            line_buffer: String::new(),
            max_record_len,
            discarding: false,
            oversized_records: 0,
        }
    }

    /// Records dropped so far for exceeding the length limit
    pub fn oversized_records(&self) -> usize {
        self.oversized_records
    }

    /// Feed one chunk and return the records it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        if self.discarding && !self.skip_oversized() {
            return Vec::new();
        }

        let records = self.drain_records();
        // One byte of slack for a `\r` whose `\n` has not arrived
        if self.line_buffer.len() > self.max_record_len + 1 {
            self.line_buffer.clear();
            self.discarding = true;
        }
        records
    }

    /// End of stream. Whatever is still buffered is incomplete and dropped.
    pub fn finish(self) -> DecoderRemainder {
        DecoderRemainder {
            incomplete_record: Some(self.line_buffer).filter(|s| !s.is_empty()),
            truncated_bytes: self.pending.len(),
        }
    }

    /// Drop text up to the separator ending an oversized record. Returns
    /// false while that separator has not arrived yet.
    fn skip_oversized(&mut self) -> bool {
        let Some(end) = self.line_buffer.find(RECORD_SEPARATOR) else {
            self.line_buffer.clear();
            return false;
        };
        self.line_buffer.drain(..end + RECORD_SEPARATOR.len_utf8());
        self.discarding = false;
        self.note_oversized();
        true
    }

    fn note_oversized(&mut self) {
        self.oversized_records += 1;
        tracing::debug!(
            max_record_len = self.max_record_len,
            "Dropped oversized record"
        );
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    consumed = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&rest[..valid]) {
                        self.line_buffer.push_str(text);
                    }
                    match e.error_len() {
                        // Sequence is cut short by the chunk boundary; wait for more
                        None => {
                            consumed += valid;
                            break;
                        }
                        // Bytes that can never be valid UTF-8
                        Some(bad) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + bad;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    fn drain_records(&mut self) -> Vec<String> {
        let Some(last_separator) = self.line_buffer.rfind(RECORD_SEPARATOR) else {
            return Vec::new();
        };

        let tail = self.line_buffer.split_off(last_separator + RECORD_SEPARATOR.len_utf8());
        let complete = std::mem::replace(&mut self.line_buffer, tail);

        let mut records = Vec::new();
        for record in complete
            .strip_suffix(RECORD_SEPARATOR)
            .unwrap_or(complete.as_str())
            .split(RECORD_SEPARATOR)
        {
            let record = record.strip_suffix('\r').unwrap_or(record);
            if record.len() > self.max_record_len {
                self.note_oversized();
            } else {
                records.push(record.to_string());
            }
        }
        records
    }
}
