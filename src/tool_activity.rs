//! Tool activity display state
//!
//! The running tool is not tracked here: it is the stream's `active_tool`,
//! surfaced as-is. This only keeps a short log of recently finished tools
//! for display, bounded per conversation so a busy conversation cannot
//! push another one's entries out.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How many finished tools are remembered per conversation
pub const MAX_RECENT_TOOLS: usize = 5;
/// How long a finished tool stays visible
pub const RECENT_TOOL_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTool {
    pub conversation_id: String,
    pub name: String,
    pub finished_at: Instant,
}

/// What the UI shows for one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolActivity {
    pub active: Option<String>,
    /// Most recent last
    pub recent: Vec<String>,
}

#[derive(Debug)]
pub struct ToolActivityTracker {
    recent: VecDeque<CompletedTool>,
    capacity: usize,
    window: Duration,
}

impl Default for ToolActivityTracker {
    fn default() -> Self {
        Self::new(MAX_RECENT_TOOLS, RECENT_TOOL_WINDOW)
    }
}

impl ToolActivityTracker {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
            window,
        }
    }

    pub fn record_completion(&mut self, conversation_id: &str, name: &str, at: Instant) {
        self.prune(at);
        if self.capacity == 0 {
            return;
        }
        let mut kept = self
            .recent
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .count();
        while kept >= self.capacity {
            let Some(oldest) = self
                .recent
                .iter()
                .position(|t| t.conversation_id == conversation_id)
            else {
                break;
            };
            self.recent.remove(oldest);
            kept -= 1;
        }
        self.recent.push_back(CompletedTool {
            conversation_id: conversation_id.to_string(),
            name: name.to_string(),
            finished_at: at,
        });
    }

    /// Names of tools finished within the display window, oldest first
    pub fn recent(&self, conversation_id: &str, now: Instant) -> Vec<String> {
        self.recent
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .filter(|t| now.saturating_duration_since(t.finished_at) < self.window)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Drop entries whose display window has passed
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.recent
            .retain(|t| now.saturating_duration_since(t.finished_at) < window);
    }

    pub fn activity(
        &self,
        conversation_id: &str,
        active: Option<&str>,
        now: Instant,
    ) -> ToolActivity {
        ToolActivity {
            active: active.map(str::to_string),
            recent: self.recent(conversation_id, now),
        }
    }
}
