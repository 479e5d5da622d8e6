//! Conversational-turn orchestration.
//!
//! [`TurnOrchestrator::submit_question`] owns one question/answer cycle:
//! append the `user` + `assistant-pending` pair, run the cancellable remote
//! inference call, substitute the local generator on failure or empty
//! answer, and replace the placeholder in place when the turn settles.
//!
//! Cancellation is cooperative. Each in-flight turn registers a token under
//! its pending entry's id; superseding a turn cancels that token, and the
//! settle path re-checks it *after* the remote call resolves, so a response
//! that races its own cancellation can never mutate history.

use crate::config::ChatConfig;
use crate::context::BusinessSnapshot;
use crate::error::Result;
use crate::events::{AssistantEvent, EventSender};
use crate::fallback;
use crate::history::{ChatEntry, EntrySender, HistoryStore};
use crate::inference::{HistoryLine, InferenceClient, InferenceRequest};
use crate::markup;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed last-resort body, used only if even the local generator produced
/// empty content.
const CONNECTION_ERROR_BODY: &str =
    "<p>I could not reach the assistant service. Please try again in a moment.</p>";

/// Outstanding-request cancellation handles, keyed by pending entry id.
///
/// An entry exists exactly while its remote call is in flight: registered at
/// dispatch, removed at settlement (success, failure, or cancellation).
#[derive(Debug, Default)]
struct PendingRequestRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl PendingRequestRegistry {
    fn register(&self, message_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(message_id.to_owned(), token.clone());
        token
    }

    fn unregister(&self, message_id: &str) {
        self.lock().remove(message_id);
    }

    /// Cancel the outstanding request for a message, if any.
    fn cancel(&self, message_id: &str) -> bool {
        match self.lock().remove(message_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        for (_, token) in self.lock().drain() {
            token.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Orchestrates question/answer turns over the shared conversation history.
pub struct TurnOrchestrator {
    history: Arc<dyn HistoryStore>,
    pending: PendingRequestRegistry,
    inference: Option<InferenceClient>,
    events: EventSender,
    chat: ChatConfig,
}

impl TurnOrchestrator {
    /// Create an orchestrator.
    ///
    /// `inference` is `None` when no remote endpoint is configured; every
    /// turn then resolves through the local generator.
    #[must_use]
    pub fn new(
        history: Arc<dyn HistoryStore>,
        inference: Option<InferenceClient>,
        events: EventSender,
        chat: ChatConfig,
    ) -> Self {
        Self {
            history,
            pending: PendingRequestRegistry::default(),
            inference,
            events,
            chat,
        }
    }

    /// Create an orchestrator wired from configuration.
    #[must_use]
    pub fn from_config(
        history: Arc<dyn HistoryStore>,
        config: &crate::config::AssistantConfig,
        events: EventSender,
    ) -> Self {
        let inference = config.inference.endpoint.as_deref().map(InferenceClient::new);
        Self::new(history, inference, events, config.chat.clone())
    }

    /// Submit a question and settle the resulting turn.
    ///
    /// Returns the turn id, or `None` if the trimmed question was empty
    /// (a no-op). A superseded turn also returns its id; its entries are
    /// gone from history and no answer is written.
    pub async fn submit_question(
        &self,
        question: &str,
        snapshot: &BusinessSnapshot,
        category: &str,
    ) -> Result<Option<String>> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }

        let turn_id = Uuid::new_v4().to_string();
        let language = self.chat.response_language.clone();
        let user_entry = ChatEntry::user(&turn_id, question, &language);
        let pending_entry = ChatEntry::pending(&turn_id, &language);
        let pending_id = pending_entry.id.clone();

        // Snapshot before the append is the "prior history" sent upstream.
        let prior = self.history.current();
        let mut entries = prior.clone();
        entries.push(user_entry);
        entries.push(pending_entry);
        self.history.replace_all(entries);

        let token = self.pending.register(&pending_id);
        info!(turn = turn_id.as_str(), "turn submitted");

        let mut remote = None;
        if let Some(client) = &self.inference {
            let request = InferenceRequest {
                user_question: question.to_owned(),
                context_data: snapshot.clone(),
                target_language: language.clone(),
                chat_history: chat_history_lines(&prior),
            };
            tokio::select! {
                () = token.cancelled() => {
                    self.pending.unregister(&pending_id);
                    info!(turn = turn_id.as_str(), "turn superseded before settlement");
                    return Ok(Some(turn_id));
                }
                result = client.ask(&request) => match result {
                    Ok(reply) => remote = Some(reply),
                    Err(e) => {
                        warn!(
                            turn = turn_id.as_str(),
                            error = %e,
                            "inference failed, settling with local answer"
                        );
                    }
                }
            }
        }

        // Settlement: unregister first, then re-check cancellation so a
        // response racing its own cancellation is discarded, not applied.
        self.pending.unregister(&pending_id);
        if token.is_cancelled() {
            info!(turn = turn_id.as_str(), "turn cancelled at settlement, result discarded");
            return Ok(Some(turn_id));
        }

        let answer = remote.and_then(|reply| {
            let content = markup::strip_code_fences(&reply.html_response);
            if content.trim().is_empty() {
                debug!(turn = turn_id.as_str(), "remote answer empty after unfencing");
                return None;
            }
            let follow_ups = reply
                .follow_up_questions
                .unwrap_or_default()
                .into_iter()
                .take(fallback::MAX_FOLLOW_UPS)
                .collect();
            Some((content, reply.language.unwrap_or_else(|| language.clone()), follow_ups))
        });

        let used_fallback = answer.is_none();
        let (mut content, answer_language, follow_ups) = answer.unwrap_or_else(|| {
            let generated = fallback::generate(question, snapshot, category);
            (generated.content, language.clone(), generated.follow_ups)
        });
        if content.trim().is_empty() {
            content = CONNECTION_ERROR_BODY.to_owned();
        }

        self.settle(&pending_id, content, answer_language, follow_ups);
        let _ = self.events.send(AssistantEvent::TurnSettled {
            turn_id: turn_id.clone(),
            used_fallback,
        });
        Ok(Some(turn_id))
    }

    /// Replace the pending placeholder in place against the latest history
    /// snapshot, so concurrent unrelated updates are preserved.
    fn settle(&self, pending_id: &str, content: String, language: String, follow_ups: Vec<String>) {
        let mut entries = self.history.current();
        let Some(slot) = entries.iter_mut().find(|e| e.id == pending_id) else {
            warn!(message = pending_id, "pending entry vanished before settlement");
            return;
        };
        slot.sender = EntrySender::Assistant;
        slot.content = content;
        slot.language = language;
        slot.animate = true;
        slot.follow_ups = follow_ups;
        self.history.replace_all(entries);
    }

    /// Cancel an in-flight turn and retract its entry pair from history.
    ///
    /// The abandoned turn produces no answer: even if its remote call later
    /// resolves successfully, the settle path discards the result. Safe to
    /// call for unknown or already-settled turns.
    pub fn cancel_turn(&self, turn_id: &str) {
        let pending_id = format!("assistant-{turn_id}");
        if self.pending.cancel(&pending_id) {
            info!(turn = turn_id, "turn cancelled");
        }

        let user_id = format!("user-{turn_id}");
        let entries = self.history.current();
        if entries
            .iter()
            .any(|e| e.id == pending_id && e.sender == EntrySender::AssistantPending)
        {
            let remaining: Vec<ChatEntry> = entries
                .into_iter()
                .filter(|e| e.id != pending_id && e.id != user_id)
                .collect();
            self.history.replace_all(remaining);
        }
    }

    /// Cancel every in-flight turn. Intended for panel teardown; history is
    /// left as-is.
    pub fn cancel_all(&self) {
        self.pending.cancel_all();
    }

    /// Clear a message's animate flag once its reveal finished.
    pub fn clear_animate(&self, message_id: &str) {
        let mut entries = self.history.current();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == message_id) {
            entry.animate = false;
            self.history.replace_all(entries);
            let _ = self.events.send(AssistantEvent::RevealFinished {
                message_id: message_id.to_owned(),
            });
        }
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Map prior history entries to the wire shape the endpoint expects.
///
/// Pending placeholders are excluded: the prior snapshot is taken before
/// the current turn's pair is appended, and an older pending entry belongs
/// to a turn that has not settled yet, so it has no content to send.
fn chat_history_lines(entries: &[ChatEntry]) -> Vec<HistoryLine> {
    entries
        .iter()
        .filter(|e| e.sender != EntrySender::AssistantPending)
        .map(|e| HistoryLine {
            sender: e.sender,
            content: e.content.clone(),
        })
        .collect()
}
