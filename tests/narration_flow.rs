//! End-to-end narration session tests against a mock speech endpoint.
//!
//! These verify the per-sentence synthesis contract, strict sequencing
//! (clip *n+1* never starts before clip *n* ends), toggle stop semantics
//! from both the loading and playing phases, and resource release.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sage::audio::{AudioClip, ClipEnd, ClipPlayer};
use sage::error::Result;
use sage::events::{AssistantEvent, EventReceiver};
use sage::history::ChatEntry;
use sage::narration::{NarrationManager, NarrationStatus, SpeechClient};
use serde_json::json;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test player that logs playback order and tracks clip references.
struct ScriptedPlayer {
    /// "start:<len>" / "end:<len>" / "interrupted:<len>" in event order.
    log: Mutex<Vec<String>>,
    /// Weak handles to every clip handed to `play`.
    weaks: Mutex<Vec<Weak<AudioClip>>>,
    /// When true, clips never finish on their own; they end only through
    /// cancellation.
    hold: bool,
}

impl ScriptedPlayer {
    fn new(hold: bool) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            weaks: Mutex::new(Vec::new()),
            hold,
        })
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn live_clips(&self) -> usize {
        self.weaks
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.upgrade().is_some())
            .count()
    }
}

#[async_trait]
impl ClipPlayer for ScriptedPlayer {
    fn prepare(&self, bytes: &[u8]) -> Result<AudioClip> {
        // Clip length mirrors the synthesized sentence length, which makes
        // clips distinguishable in the log.
        Ok(AudioClip {
            samples: vec![0.0; bytes.len()],
            sample_rate: 24_000,
        })
    }

    async fn play(&self, clip: Arc<AudioClip>, cancel: &CancellationToken) -> ClipEnd {
        let len = clip.samples.len();
        self.weaks.lock().unwrap().push(Arc::downgrade(&clip));
        self.log.lock().unwrap().push(format!("start:{len}"));

        if self.hold {
            cancel.cancelled().await;
            self.log.lock().unwrap().push(format!("interrupted:{len}"));
            return ClipEnd::Interrupted;
        }

        tokio::select! {
            () = cancel.cancelled() => {
                self.log.lock().unwrap().push(format!("interrupted:{len}"));
                ClipEnd::Interrupted
            }
            () = tokio::time::sleep(Duration::from_millis(20)) => {
                self.log.lock().unwrap().push(format!("end:{len}"));
                ClipEnd::Completed
            }
        }
    }
}

/// Speech endpoint that echoes the requested text back as the audio bytes.
async fn echo_speech_server() -> MockServer {
    let server = MockServer::start().await;
    for sentence in ["Hi.", "Hello there.", "A third sentence?"] {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"text": sentence})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audioContent": BASE64.encode(sentence.as_bytes())
            })))
            .mount(&server)
            .await;
    }
    server
}

fn manager_for(
    server: &MockServer,
    player: Arc<ScriptedPlayer>,
) -> (NarrationManager, EventReceiver) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let (events, rx) = sage::events::channel();
    let manager = NarrationManager::new(Some(SpeechClient::new(server.uri())), player, events);
    (manager, rx)
}

fn message() -> ChatEntry {
    let mut entry = ChatEntry::user("n1", "", "en");
    entry.id = "msg-1".to_owned();
    entry.sender = sage::history::EntrySender::Assistant;
    entry.content = "<p>Hi. Hello there. A third sentence?</p>".to_owned();
    entry
}

/// Await the next narration status event, ignoring everything else.
async fn next_status(rx: &mut EventReceiver) -> NarrationStatus {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for narration status")
            .expect("event channel closed")
        {
            AssistantEvent::NarrationStatus { status, .. } => return status,
            _ => {}
        }
    }
}

/// Poll until `manager` reports `status` for the message, panicking after a
/// bound.
async fn wait_for_status(manager: &NarrationManager, status: NarrationStatus) {
    for _ in 0..500 {
        if manager.status("msg-1") == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("narration never reached {status:?}");
}

// ────────────────────────────────────────────────────────────────────────────
// Happy path: ordered synthesis, sequential playback, self-stop
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_sentences_synthesize_in_order_and_play_back_to_back() {
    let server = echo_speech_server().await;
    let player = ScriptedPlayer::new(false);
    let (manager, mut rx) = manager_for(&server, player.clone());

    manager.toggle_narration(&message());

    assert_eq!(next_status(&mut rx).await, NarrationStatus::Loading);
    assert_eq!(next_status(&mut rx).await, NarrationStatus::Playing);
    assert_eq!(next_status(&mut rx).await, NarrationStatus::Idle);
    assert_eq!(manager.status("msg-1"), NarrationStatus::Idle);

    // Exactly one synthesis call per sentence, in sentence order.
    let requests = server.received_requests().await.unwrap();
    let texts: Vec<String> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["text"].as_str().unwrap().to_owned()
        })
        .collect();
    assert_eq!(texts, vec!["Hi.", "Hello there.", "A third sentence?"]);
    // Narration voice follows the message language.
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["language"], "en");

    // Strict sequencing: each clip ends before the next starts.
    assert_eq!(
        player.log(),
        vec![
            "start:3", "end:3", "start:12", "end:12", "start:17", "end:17"
        ]
    );

    // Session gone, every clip released.
    assert_eq!(player.live_clips(), 0);
}

// ────────────────────────────────────────────────────────────────────────────
// Stop from the playing phase
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_mid_play_goes_idle_and_releases_clips() {
    let server = echo_speech_server().await;
    let player = ScriptedPlayer::new(true);
    let (manager, _rx) = manager_for(&server, player.clone());
    let entry = message();

    manager.toggle_narration(&entry);
    wait_for_status(&manager, NarrationStatus::Playing).await;

    // First clip is playing and pinned open; stop the session.
    manager.toggle_narration(&entry);
    assert_eq!(manager.status("msg-1"), NarrationStatus::Idle);

    // The in-flight play resolves as interrupted and no further clip starts.
    for _ in 0..500 {
        if player.log().contains(&"interrupted:3".to_owned()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let log = player.log();
    assert_eq!(log, vec!["start:3", "interrupted:3"]);

    // All synthesis happened before playback; stopping issued no more.
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    // Backing resources do not outlive the session.
    for _ in 0..500 {
        if player.live_clips() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(player.live_clips(), 0);
}

// ────────────────────────────────────────────────────────────────────────────
// Stop from the loading phase
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_during_loading_halts_the_sentence_loop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({"audioContent": BASE64.encode(b"audio")})),
        )
        .mount(&server)
        .await;

    let player = ScriptedPlayer::new(false);
    let (manager, _rx) = manager_for(&server, player.clone());
    let entry = message();

    manager.toggle_narration(&entry);
    assert_eq!(manager.status("msg-1"), NarrationStatus::Loading);
    // Let the first synthesis request get in flight, then stop.
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.toggle_narration(&entry);
    assert_eq!(manager.status("msg-1"), NarrationStatus::Idle);

    // The in-flight request is abandoned; sentences two and three are never
    // requested and nothing plays.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(player.log().is_empty());
    assert_eq!(player.live_clips(), 0);
}

// ────────────────────────────────────────────────────────────────────────────
// Synthesis failure
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn synthesis_failure_stops_session_with_warning() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": "Hi."})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioContent": BASE64.encode(b"first")
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": "Hello there."})))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let player = ScriptedPlayer::new(false);
    let (manager, mut rx) = manager_for(&server, player.clone());

    manager.toggle_narration(&message());

    // Loading, then straight to idle: the 500 aborts the sentence loop.
    assert_eq!(next_status(&mut rx).await, NarrationStatus::Loading);
    let warned = loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            AssistantEvent::Warning { message } => break message,
            AssistantEvent::NarrationStatus {
                status: NarrationStatus::Idle,
                ..
            } => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    };
    assert!(warned.contains("narration"));

    wait_for_status(&manager, NarrationStatus::Idle).await;
    // Nothing ever played; the one decoded clip was released with the
    // session.
    assert!(player.log().is_empty());
    assert_eq!(player.live_clips(), 0);
    // The third sentence was never requested.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

// ────────────────────────────────────────────────────────────────────────────
// Toggle semantics
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_toggle_is_stop_not_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({"audioContent": BASE64.encode(b"audio")})),
        )
        .mount(&server)
        .await;

    let player = ScriptedPlayer::new(false);
    let (manager, _rx) = manager_for(&server, player.clone());
    let entry = message();

    manager.toggle_narration(&entry);
    manager.toggle_narration(&entry);
    assert_eq!(manager.status("msg-1"), NarrationStatus::Idle);

    // A third toggle starts a fresh session rather than resuming anything.
    manager.toggle_narration(&entry);
    assert_eq!(manager.status("msg-1"), NarrationStatus::Loading);
    manager.stop_all();
    assert_eq!(manager.status("msg-1"), NarrationStatus::Idle);
}
