//! Clip playback to system speakers via cpal.
//!
//! Narration plays clips strictly one at a time: the session driver awaits
//! [`ClipPlayer::play`] for clip *n* before starting clip *n+1*. Playback
//! runs on a dedicated OS thread (cpal streams are not `Send`); the async
//! caller observes completion, failure, or interruption.

use crate::audio::clip::AudioClip;
use crate::config::NarrationConfig;
use crate::error::Result;
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How one clip's playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipEnd {
    /// The clip played to its end.
    Completed,
    /// Playback failed. The session driver treats this like a normal end
    /// and advances to the next clip.
    Failed(String),
    /// Playback was cancelled; the remaining queue is abandoned.
    Interrupted,
}

/// Seam between the narration session driver and actual audio output.
///
/// `prepare` decodes synthesized bytes into a clip; `play` plays exactly one
/// clip and resolves when it ends, fails, or is cancelled.
#[async_trait]
pub trait ClipPlayer: Send + Sync {
    /// Decode synthesized audio bytes into a playable clip.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded.
    fn prepare(&self, bytes: &[u8]) -> Result<AudioClip>;

    /// Play one clip to its end. Cancelling the token stops output and
    /// resolves with [`ClipEnd::Interrupted`].
    async fn play(&self, clip: Arc<AudioClip>, cancel: &CancellationToken) -> ClipEnd;
}

/// Production [`ClipPlayer`] backed by cpal output streams.
#[derive(Debug, Clone, Default)]
pub struct CpalPlayer {
    output_device: Option<String>,
}

impl CpalPlayer {
    /// Create a player for the configured output device (None = default).
    #[must_use]
    pub fn new(config: &NarrationConfig) -> Self {
        Self {
            output_device: config.output_device.clone(),
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.output_devices().map_err(|e| {
            crate::error::AssistantError::Audio(format!("cannot enumerate devices: {e}"))
        })?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl ClipPlayer for CpalPlayer {
    fn prepare(&self, bytes: &[u8]) -> Result<AudioClip> {
        crate::audio::clip::decode_clip(bytes.to_vec())
    }

    async fn play(&self, clip: Arc<AudioClip>, cancel: &CancellationToken) -> ClipEnd {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();

        let thread_stop = stop.clone();
        let device_name = self.output_device.clone();
        std::thread::spawn(move || {
            let end = play_blocking(&clip, device_name.as_deref(), &thread_stop);
            let _ = done_tx.send(end);
        });

        tokio::select! {
            () = cancel.cancelled() => {
                stop.store(true, Ordering::Relaxed);
                // Wait for the stream to tear down before resolving so the
                // device is released and no tail audio escapes.
                let _ = (&mut done_rx).await;
                ClipEnd::Interrupted
            }
            end = &mut done_rx => {
                end.unwrap_or_else(|_| ClipEnd::Failed("playback thread died".into()))
            }
        }
    }
}

/// Shared position buffer between the output callback and the poll loop.
struct PlaybackBuffer {
    clip: Arc<AudioClip>,
    position: usize,
    finished: bool,
}

/// Play one clip on the current thread, blocking until it finishes or the
/// stop flag is raised.
fn play_blocking(clip: &Arc<AudioClip>, device_name: Option<&str>, stop: &AtomicBool) -> ClipEnd {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        let found = host
            .output_devices()
            .ok()
            .and_then(|mut devices| {
                devices.find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
            });
        match found {
            Some(device) => device,
            None => return ClipEnd::Failed(format!("output device '{name}' not found")),
        }
    } else {
        match host.default_output_device() {
            Some(device) => device,
            None => return ClipEnd::Failed("no default output device".into()),
        }
    };

    let device_label = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!(device = device_label.as_str(), "playing narration clip");

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: clip.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        clip: clip.clone(),
        position: 0,
        finished: false,
    }));
    let buffer_clone = buffer.clone();

    let stream = match device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            let mut buf = match buffer_clone.lock() {
                Ok(buf) => buf,
                Err(_) => return,
            };
            for sample in data.iter_mut() {
                if buf.position < buf.clip.samples.len() {
                    *sample = buf.clip.samples[buf.position];
                    buf.position += 1;
                } else {
                    *sample = 0.0;
                    buf.finished = true;
                }
            }
        },
        move |err| {
            error!("audio output stream error: {err}");
        },
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => return ClipEnd::Failed(format!("failed to build output stream: {e}")),
    };

    if let Err(e) = stream.play() {
        return ClipEnd::Failed(format!("failed to start output stream: {e}"));
    }

    loop {
        std::thread::sleep(std::time::Duration::from_millis(10));
        if stop.load(Ordering::Relaxed) {
            // Dropping the stream pauses and resets output immediately.
            drop(stream);
            return ClipEnd::Interrupted;
        }
        let finished = buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished;
        if finished {
            break;
        }
    }

    drop(stream);
    ClipEnd::Completed
}
