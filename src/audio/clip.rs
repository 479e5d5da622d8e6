//! Decoded audio clips.
//!
//! The speech endpoint returns encoded audio bytes (wav or mp3 in
//! practice). [`decode_clip`] decodes them once, up front, into mono f32
//! samples; the decoded buffer is the clip's backing resource and is freed
//! when the narration session drops its last reference.

use crate::error::{AssistantError, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// One decoded, playable audio clip.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Mono f32 samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioClip {
    /// Clip duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode encoded audio bytes into a mono clip.
///
/// Multi-channel sources are downmixed by averaging.
///
/// # Errors
///
/// Returns an error if the container or codec is unrecognized, or if the
/// payload decodes to zero samples.
pub fn decode_clip(bytes: Vec<u8>) -> Result<AudioClip> {
    let stream = MediaSourceStream::new(Box::new(std::io::Cursor::new(bytes)), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AssistantError::Audio(format!("unrecognized audio container: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AssistantError::Audio("no audio track in payload".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(24_000);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AssistantError::Audio(format!("unsupported codec: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AssistantError::Audio(format!("decode failed: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, not fatal.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(AssistantError::Audio(format!("decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        if channels <= 1 {
            samples.extend_from_slice(buffer.samples());
        } else {
            for frame in buffer.samples().chunks(channels) {
                samples.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    if samples.is_empty() {
        return Err(AssistantError::Audio(
            "payload decoded to zero samples".into(),
        ));
    }

    Ok(AudioClip {
        samples,
        sample_rate,
    })
}
