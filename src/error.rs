//! # Error Handling
//!
//! Defines the failure taxonomy for the voice pipeline and how each kind is
//! surfaced to the two audiences that care about it:
//!
//! - **Operators** get the full diagnostic text via `Display` and the
//!   tracing logs (ffmpeg stderr, HTTP status bodies, and so on).
//! - **Clients** only ever see the terse classification from
//!   [`VoiceError::client_message`], delivered as a single `error` event.
//!
//! ## Propagation policy:
//! Every pipeline-stage failure is caught at the stage boundary and converted
//! to one user-visible `error` event; the session then moves on to the next
//! utterance. Only transport-level disconnects end the session loop.

use std::fmt;

/// Failure kinds for one conversation turn.
#[derive(Debug)]
pub enum VoiceError {
    /// ffmpeg could not be started or exited non-zero. Holds its stderr.
    Transcode(String),

    /// The speech-to-text request failed.
    Transcription(String),

    /// The speech-synthesis request failed.
    Synthesis(String),

    /// No frame arrived within the idle window while collecting an utterance.
    Timeout,

    /// The end marker arrived before any audio data.
    EmptyInput,

    /// Catch-all for failures outside the pipeline stages.
    Unexpected(String),
}

impl VoiceError {
    /// The generic classification shown to the client.
    ///
    /// Raw internal diagnostics (ffmpeg stderr, provider error bodies) must
    /// never cross the wire; they belong in the operator logs only.
    pub fn client_message(&self) -> &'static str {
        match self {
            VoiceError::Transcode(_) => "FFmpeg conversion failed",
            VoiceError::Transcription(_) => "Transcription failed",
            VoiceError::Synthesis(_) => "TTS generation failed",
            VoiceError::Timeout => "Timeout waiting for audio",
            VoiceError::EmptyInput => "No audio received",
            VoiceError::Unexpected(_) => "Server error occurred",
        }
    }
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::Transcode(msg) => write!(f, "transcode error: {}", msg),
            VoiceError::Transcription(msg) => write!(f, "transcription error: {}", msg),
            VoiceError::Synthesis(msg) => write!(f, "synthesis error: {}", msg),
            VoiceError::Timeout => write!(f, "timed out waiting for audio"),
            VoiceError::EmptyInput => write!(f, "no audio received before end marker"),
            VoiceError::Unexpected(msg) => write!(f, "unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for VoiceError {}

impl From<anyhow::Error> for VoiceError {
    fn from(err: anyhow::Error) -> Self {
        VoiceError::Unexpected(err.to_string())
    }
}

impl From<std::io::Error> for VoiceError {
    fn from(err: std::io::Error) -> Self {
        VoiceError::Unexpected(err.to_string())
    }
}

/// Shorthand for results carrying a [`VoiceError`].
pub type VoiceResult<T> = Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_are_terse() {
        let err = VoiceError::Transcode("ffmpeg: pipe:0: Invalid data found".to_string());
        assert_eq!(err.client_message(), "FFmpeg conversion failed");
        // The diagnostic stays operator-facing
        assert!(err.to_string().contains("Invalid data found"));

        assert_eq!(VoiceError::Timeout.client_message(), "Timeout waiting for audio");
        assert_eq!(VoiceError::EmptyInput.client_message(), "No audio received");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: VoiceError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, VoiceError::Unexpected(_)));
        assert_eq!(err.client_message(), "Server error occurred");
    }
}
