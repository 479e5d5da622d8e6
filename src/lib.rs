//! Sage: conversational assistant engine for a business dashboard chat panel.
//!
//! For every submitted question the engine runs a cancellable remote
//! inference call, falls back to a deterministic local answer generator when
//! the call fails or returns nothing, animates the reveal of the rich-text
//! answer, and, on demand, narrates settled answers aloud sentence by
//! sentence.
//!
//! # Architecture
//!
//! Independent components coordinate over shared per-message keys:
//! - **Turn orchestration**: owns the conversation history; appends the
//!   `user` + pending pair, runs the remote call, settles the placeholder
//!   in place (`turn`)
//! - **Local generation**: pure, guaranteed-non-empty fallback answers from
//!   the business snapshot (`fallback`)
//! - **Typed reveal**: chunked progressive disclosure of the settled answer
//!   into an output surface, with flush-on-dispose (`reveal`)
//! - **Narration**: per-message sessions that synthesize and play answers
//!   sentence by sentence via the speech endpoint (`narration`, `audio`)
//!
//! All asynchronous work is cooperatively cancellable: remote calls carry a
//! token keyed by message id, reveals return a disposer, and narration
//! sessions tear down from any phase.

pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod fallback;
pub mod history;
pub mod inference;
pub mod markup;
pub mod narration;
pub mod reveal;
pub mod turn;

pub use config::AssistantConfig;
pub use context::BusinessSnapshot;
pub use error::{AssistantError, Result};
pub use events::{AssistantEvent, EventReceiver, EventSender};
pub use history::{ChatEntry, EntrySender, HistoryStore, Reaction, ReactionMap, SharedHistory};
pub use narration::{NarrationManager, NarrationStatus};
pub use reveal::{OutputSurface, RevealHandle, RevealOptions, reveal};
pub use turn::TurnOrchestrator;
