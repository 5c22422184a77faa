//! # Audio Module
//!
//! Audio format conversion for the two codec boundaries in the turn
//! pipeline.
//!
//! ## Audio formats in play:
//! - **Inbound**: whatever the browser recorder produces (typically WebM/
//!   Opus), decoded to mono 16 kHz WAV for transcription
//! - **Outbound**: the synthesis provider's stream, re-encoded to mono
//!   24 kHz WAV for playback

pub mod transcoder;

pub use transcoder::{AudioTranscoder, FfmpegTranscoder};
