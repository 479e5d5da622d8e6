//! Remote inference client.
//!
//! One JSON POST per turn carrying the question, a snapshot of business
//! data, the target response language, and the prior conversation. A
//! non-success status is a hard failure with no retry; the turn orchestrator
//! owns recovery (local generator) and cancellation. No client-side timeout
//! is imposed: a stalled call ends only through explicit cancellation.

use crate::context::BusinessSnapshot;
use crate::error::{AssistantError, Result};
use crate::history::EntrySender;
use serde::{Deserialize, Serialize};

/// Request body for the inference endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    pub user_question: String,
    pub context_data: BusinessSnapshot,
    pub target_language: String,
    pub chat_history: Vec<HistoryLine>,
}

/// One prior conversation line, as the endpoint expects it.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryLine {
    pub sender: EntrySender,
    pub content: String,
}

/// Success response body from the inference endpoint.
///
/// `html_response` may arrive wrapped in a code fence; callers strip it with
/// [`crate::markup::strip_code_fences`] before use.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceReply {
    pub html_response: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub follow_up_questions: Option<Vec<String>>,
}

/// HTTP client for the inference endpoint.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: String,
}

impl InferenceClient {
    /// Create a client for the given endpoint URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Send one inference request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or an
    /// unparseable response body.
    pub async fn ask(&self, request: &InferenceRequest) -> Result<InferenceReply> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AssistantError::Inference(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Inference(format!(
                "inference endpoint returned {status}"
            )));
        }

        response
            .json::<InferenceReply>()
            .await
            .map_err(|e| AssistantError::Inference(format!("invalid response body: {e}")))
    }
}
