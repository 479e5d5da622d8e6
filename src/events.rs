//! Events emitted by the engine for the panel UI and observability.
//!
//! This is intentionally lightweight (no heavy payloads) so orchestration
//! code can emit events without blocking. Delivery is lossy: a send with no
//! subscribers, or to a lagging subscriber, is silently dropped.

use crate::narration::NarrationStatus;
use tokio::sync::broadcast;

/// Default capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events that describe what the engine is doing "right now".
#[derive(Debug, Clone)]
pub enum AssistantEvent {
    /// User-facing warning (transient notification, not an error state).
    Warning { message: String },
    /// A turn settled and its answer was written into history.
    TurnSettled {
        /// The turn identifier shared by the user/assistant entry pair.
        turn_id: String,
        /// Whether the answer came from the local generator.
        used_fallback: bool,
    },
    /// Narration status changed for a message.
    NarrationStatus {
        message_id: String,
        status: NarrationStatus,
    },
    /// The typed reveal finished for a message and its animate flag cleared.
    RevealFinished { message_id: String },
}

/// Sender half of the engine event channel.
pub type EventSender = broadcast::Sender<AssistantEvent>;

/// Receiver half of the engine event channel.
pub type EventReceiver = broadcast::Receiver<AssistantEvent>;

/// Create an event channel with the default capacity.
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Emit a user-facing warning.
///
/// Best-effort: dropped when nothing is subscribed.
pub fn warn_user(events: &EventSender, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!(message = message.as_str(), "user-facing warning");
    let _ = events.send(AssistantEvent::Warning { message });
}
