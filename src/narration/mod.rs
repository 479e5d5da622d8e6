//! Spoken narration of assistant answers.
//!
//! Narration is orthogonal to turns and reveals: the user can start it on
//! any settled answer, and stop or restart it at any time. Each message has
//! at most one narration session; toggling a message that already has one
//! stops it rather than restarting it.
//!
//! A session moves `loading → playing → idle`: plain text is extracted and
//! split into sentences, audio is synthesized strictly one sentence at a
//! time (bounding concurrent remote calls to one and preserving order), and
//! the decoded clips play strictly back to back. Stopping at any phase
//! cancels outstanding work and releases every clip; no backing resource
//! outlives its session.

pub mod sentence;
pub mod speech;

use crate::audio::{AudioClip, ClipEnd, ClipPlayer};
use crate::events::{AssistantEvent, EventSender, warn_user};
use crate::history::ChatEntry;
use crate::markup::Document;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use sentence::split_sentences;
pub use speech::SpeechClient;

/// Narration state of one message, derived from session presence and
/// playback phase. No session ⇔ `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrationStatus {
    #[default]
    Idle,
    Loading,
    Playing,
}

/// Live state of one message's narration.
struct NarrationSession {
    /// Staleness guard: a restarted session gets a fresh sequence number, so
    /// a task resumed after its session was stopped can tell it no longer
    /// owns the map entry.
    seq: u64,
    cancel: CancellationToken,
    /// Decoded clips in playback order. Dropping the session drops the
    /// clips' backing buffers.
    clips: Vec<Arc<AudioClip>>,
    status: NarrationStatus,
}

/// Manages narration sessions keyed by message id.
pub struct NarrationManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    sessions: Mutex<HashMap<String, NarrationSession>>,
    speech: Option<SpeechClient>,
    player: Arc<dyn ClipPlayer>,
    events: EventSender,
    next_seq: AtomicU64,
}

impl NarrationManager {
    /// Create a manager.
    ///
    /// `speech` is `None` when no endpoint is configured; toggling then
    /// reports a warning instead of starting a session.
    #[must_use]
    pub fn new(
        speech: Option<SpeechClient>,
        player: Arc<dyn ClipPlayer>,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sessions: Mutex::new(HashMap::new()),
                speech,
                player,
                events,
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Create a manager wired from configuration, playing through the
    /// system's audio output.
    #[must_use]
    pub fn from_config(config: &crate::config::AssistantConfig, events: EventSender) -> Self {
        let speech = config.narration.endpoint.as_deref().map(SpeechClient::new);
        let player = Arc::new(crate::audio::CpalPlayer::new(&config.narration));
        Self::new(speech, player, events)
    }

    /// Start narration for a message, or stop it if a session already
    /// exists (toggle semantics).
    ///
    /// The stop branch cancels outstanding work and releases every clip
    /// before returning. The start branch extracts plain text, splits it
    /// into sentences, and drives synthesis and playback on a background
    /// task; content with nothing speakable reports a warning and starts
    /// nothing.
    pub fn toggle_narration(&self, message: &ChatEntry) {
        // Stop branch: an existing session means this toggle is a stop.
        if let Some(session) = self.inner.lock_sessions().remove(&message.id) {
            session.cancel.cancel();
            info!(message = message.id.as_str(), "narration stopped");
            drop(session);
            self.inner.emit_status(&message.id, NarrationStatus::Idle);
            return;
        }

        if self.inner.speech.is_none() {
            warn_user(&self.inner.events, "Narration is not configured.");
            return;
        }

        let plain = Document::parse(&message.content).plain_text();
        let sentences = split_sentences(&plain);
        if sentences.is_empty() {
            warn_user(&self.inner.events, "This message has no text to read aloud.");
            return;
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inner.lock_sessions().insert(
            message.id.clone(),
            NarrationSession {
                seq,
                cancel: cancel.clone(),
                clips: Vec::new(),
                status: NarrationStatus::Loading,
            },
        );
        self.inner
            .emit_status(&message.id, NarrationStatus::Loading);
        info!(
            message = message.id.as_str(),
            sentences = sentences.len(),
            "narration started"
        );

        let inner = self.inner.clone();
        let message_id = message.id.clone();
        let language = message.language.clone();
        tokio::spawn(async move {
            run_session(inner, message_id, language, sentences, seq, cancel).await;
        });
    }

    /// Current narration status for a message.
    #[must_use]
    pub fn status(&self, message_id: &str) -> NarrationStatus {
        self.inner
            .lock_sessions()
            .get(message_id)
            .map(|session| session.status)
            .unwrap_or_default()
    }

    /// Stop every session. Intended for panel teardown; safe to call
    /// repeatedly.
    pub fn stop_all(&self) {
        let stopped: Vec<(String, NarrationSession)> =
            self.inner.lock_sessions().drain().collect();
        for (message_id, session) in stopped {
            session.cancel.cancel();
            drop(session);
            self.inner.emit_status(&message_id, NarrationStatus::Idle);
        }
    }
}

impl ManagerInner {
    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, NarrationSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_status(&self, message_id: &str, status: NarrationStatus) {
        let _ = self.events.send(AssistantEvent::NarrationStatus {
            message_id: message_id.to_owned(),
            status,
        });
    }

    /// Remove the session for `message_id` if it is still the `seq` one.
    /// Returns true when this call removed it.
    fn remove_if_current(&self, message_id: &str, seq: u64) -> bool {
        let mut sessions = self.lock_sessions();
        let is_current = sessions
            .get(message_id)
            .is_some_and(|session| session.seq == seq);
        if is_current && let Some(session) = sessions.remove(message_id) {
            session.cancel.cancel();
        }
        is_current
    }
}

/// Drive one session: synthesize every sentence in order, then play the
/// clips back to back, then stop.
async fn run_session(
    inner: Arc<ManagerInner>,
    message_id: String,
    language: String,
    sentences: Vec<String>,
    seq: u64,
    cancel: CancellationToken,
) {
    let Some(speech) = inner.speech.clone() else {
        return;
    };

    // ── Loading: strictly sequential synthesis ──────────────────────────
    let total = sentences.len();
    for (index, sentence) in sentences.iter().enumerate() {
        let bytes = tokio::select! {
            () = cancel.cancelled() => return,
            result = speech.synthesize(sentence, &language) => match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        message = message_id.as_str(),
                        error = %e,
                        "synthesis failed, stopping narration"
                    );
                    if inner.remove_if_current(&message_id, seq) {
                        warn_user(&inner.events, "Could not generate narration audio.");
                        inner.emit_status(&message_id, NarrationStatus::Idle);
                    }
                    return;
                }
            }
        };

        let clip = match inner.player.prepare(&bytes) {
            Ok(clip) => Arc::new(clip),
            Err(e) => {
                warn!(
                    message = message_id.as_str(),
                    error = %e,
                    "clip decode failed, stopping narration"
                );
                if inner.remove_if_current(&message_id, seq) {
                    warn_user(&inner.events, "Could not generate narration audio.");
                    inner.emit_status(&message_id, NarrationStatus::Idle);
                }
                return;
            }
        };

        // The session may have been stopped while we were synthesizing. Only
        // the session that still owns the map entry may attach the clip;
        // otherwise the clip is discarded here and the task stops.
        let attached = {
            let mut sessions = inner.lock_sessions();
            match sessions.get_mut(&message_id) {
                Some(session) if session.seq == seq => {
                    session.clips.push(clip);
                    true
                }
                _ => false,
            }
        };
        if !attached {
            debug!(message = message_id.as_str(), "session stopped during synthesis");
            return;
        }
        debug!(
            message = message_id.as_str(),
            clip = index + 1,
            total,
            "narration clip ready"
        );
    }

    // ── Playing: strictly sequential playback ───────────────────────────
    let clips = {
        let mut sessions = inner.lock_sessions();
        match sessions.get_mut(&message_id) {
            Some(session) if session.seq == seq => {
                session.status = NarrationStatus::Playing;
                session.clips.clone()
            }
            _ => return,
        }
    };
    if clips.is_empty() {
        if inner.remove_if_current(&message_id, seq) {
            warn_user(&inner.events, "Could not generate narration audio.");
            inner.emit_status(&message_id, NarrationStatus::Idle);
        }
        return;
    }
    inner.emit_status(&message_id, NarrationStatus::Playing);

    for clip in clips {
        match inner.player.play(clip, &cancel).await {
            ClipEnd::Interrupted => return,
            ClipEnd::Completed => {}
            // A failed clip advances to the next one, same as a normal end.
            ClipEnd::Failed(e) => {
                warn!(message = message_id.as_str(), error = e.as_str(), "clip playback failed");
            }
        }
        if cancel.is_cancelled() {
            return;
        }
    }

    // Last clip ended: the session stops itself.
    if inner.remove_if_current(&message_id, seq) {
        info!(message = message_id.as_str(), "narration finished");
        inner.emit_status(&message_id, NarrationStatus::Idle);
    }
}
