//! Audio clips and playback for spoken narration.

pub mod clip;
pub mod playback;

pub use clip::{AudioClip, decode_clip};
pub use playback::{ClipEnd, ClipPlayer, CpalPlayer};
