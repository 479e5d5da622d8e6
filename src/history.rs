//! Conversation history storage.
//!
//! The history is an ordered list of [`ChatEntry`] values; insertion order is
//! display order and entries are never reordered. The store exposes
//! read-current / replace-all semantics, and every writer follows
//! read-latest-then-replace so concurrent unrelated updates are not lost.
//! The pending placeholder created at submission time is replaced **in
//! place** (same id, same position) when its turn settles, so scroll and
//! focus state tied to position survive the transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntrySender {
    /// The person typing into the panel.
    User,
    /// Placeholder for an in-flight turn ("thinking" bubble).
    AssistantPending,
    /// A settled assistant answer.
    Assistant,
    /// The seeded welcome message.
    SystemWelcome,
}

/// One item in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Unique id, stable for the lifetime of the entry. A turn's user and
    /// assistant entries share the turn id as a suffix.
    pub id: String,
    pub sender: EntrySender,
    /// Rich-text markup for assistant/welcome entries, plain text for user
    /// entries, empty for pending placeholders.
    pub content: String,
    /// Language the content is expressed in (text direction, narration voice).
    pub language: String,
    /// True only between turn settlement and reveal completion.
    pub animate: bool,
    /// Up to 3 suggested next questions; empty suppresses the affordance.
    pub follow_ups: Vec<String>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    /// Build a user entry for a turn.
    #[must_use]
    pub fn user(turn_id: &str, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: format!("user-{turn_id}"),
            sender: EntrySender::User,
            content: text.into(),
            language: language.into(),
            animate: false,
            follow_ups: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Build the pending placeholder for a turn.
    #[must_use]
    pub fn pending(turn_id: &str, language: impl Into<String>) -> Self {
        Self {
            id: format!("assistant-{turn_id}"),
            sender: EntrySender::AssistantPending,
            content: String::new(),
            language: language.into(),
            animate: false,
            follow_ups: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Build the seeded welcome entry.
    #[must_use]
    pub fn welcome(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: "welcome".to_owned(),
            sender: EntrySender::SystemWelcome,
            content: content.into(),
            language: language.into(),
            animate: false,
            follow_ups: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Conversation history store with read-current / replace-all semantics.
///
/// The engine mutates history exclusively through these two operations;
/// hosts can provide their own implementation backed by whatever state
/// container the surrounding application uses.
pub trait HistoryStore: Send + Sync {
    /// Return a snapshot of the current history, oldest first.
    fn current(&self) -> Vec<ChatEntry>;

    /// Replace the entire history with `entries`.
    fn replace_all(&self, entries: Vec<ChatEntry>);
}

/// In-memory [`HistoryStore`] implementation.
#[derive(Debug, Default)]
pub struct SharedHistory {
    entries: Mutex<Vec<ChatEntry>>,
}

impl SharedHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history seeded with a welcome message.
    #[must_use]
    pub fn with_welcome(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(vec![ChatEntry::welcome(content, language)]),
        }
    }
}

impl HistoryStore for SharedHistory {
    fn current(&self) -> Vec<ChatEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_all(&self, entries: Vec<ChatEntry>) {
        *self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = entries;
    }
}

/// A reaction left on an assistant answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

/// Per-message reactions. Purely presentational; no lifecycle coupling with
/// turns, reveals, or narration sessions.
#[derive(Debug, Default)]
pub struct ReactionMap {
    reactions: Mutex<HashMap<String, Reaction>>,
}

impl ReactionMap {
    /// Create an empty reaction map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle `reaction` on a message: setting the same reaction twice
    /// clears it, a different reaction replaces the previous one.
    pub fn toggle(&self, message_id: &str, reaction: Reaction) {
        let mut reactions = self
            .reactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if reactions.get(message_id).copied() == Some(reaction) {
            reactions.remove(message_id);
        } else {
            reactions.insert(message_id.to_owned(), reaction);
        }
    }

    /// Current reaction for a message, if any.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<Reaction> {
        self.reactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_id)
            .copied()
    }
}
