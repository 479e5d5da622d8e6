//! Remote speech-synthesis client.
//!
//! One JSON POST per sentence; the response carries base64-encoded audio
//! bytes. A non-success status is a hard failure: the session driver aborts
//! the remaining sentence loop and stops the session.

use crate::error::{AssistantError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Request body for the speech endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
}

/// Success response body from the speech endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechReply {
    /// Base64-encoded audio bytes.
    pub audio_content: String,
}

/// HTTP client for the speech endpoint.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SpeechClient {
    /// Create a client for the given endpoint URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Synthesize one sentence, returning decoded audio bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, an
    /// unparseable body, or invalid base64.
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            text: text.to_owned(),
            language: language.to_owned(),
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::Narration(format!("synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Narration(format!(
                "speech endpoint returned {status}"
            )));
        }

        let reply = response
            .json::<SpeechReply>()
            .await
            .map_err(|e| AssistantError::Narration(format!("invalid response body: {e}")))?;

        BASE64
            .decode(reply.audio_content.as_bytes())
            .map_err(|e| AssistantError::Narration(format!("invalid base64 audio: {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn synthesize_decodes_base64_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "text": "Revenue is up.",
                "language": "en"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audioContent": BASE64.encode(b"fake-audio")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SpeechClient::new(server.uri());
        let bytes = client.synthesize("Revenue is up.", "en").await.unwrap();
        assert_eq!(bytes, b"fake-audio");
    }

    #[tokio::test]
    async fn non_success_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = SpeechClient::new(server.uri());
        let err = client.synthesize("text", "en").await.unwrap_err();
        assert!(matches!(err, AssistantError::Narration(_)));
    }

    #[tokio::test]
    async fn invalid_base64_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"audioContent": "!!! not base64 !!!"})),
            )
            .mount(&server)
            .await;

        let client = SpeechClient::new(server.uri());
        assert!(client.synthesize("text", "en").await.is_err());
    }
}
