//! Conversation title derivation
//!
//! Derives a short sidebar title from the first message of a thread.
//! Pure and deterministic: the same text always yields the same title, so
//! racing fetches for one thread settle on the same value.

/// Title shown until a real one is derived
pub const DEFAULT_TITLE: &str = "New conversation";

const MAX_TITLE_CHARS: usize = 50;
/// A word break is only used if it keeps at least 60% of the allowance
const MIN_WORD_BREAK: usize = MAX_TITLE_CHARS * 3 / 5;
const ELLIPSIS: &str = "...";

/// Derive a title from raw message text.
///
/// Lengths count characters, not bytes.
pub fn title(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }

    let last_space = collapsed
        .chars()
        .take(MAX_TITLE_CHARS)
        .enumerate()
        .filter(|(_, c)| *c == ' ')
        .map(|(i, _)| i)
        .last();

    let keep = match last_space {
        Some(pos) if pos >= MIN_WORD_BREAK => pos,
        _ => MAX_TITLE_CHARS,
    };

    let mut truncated: String = collapsed.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
