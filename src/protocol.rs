//! # Wire Protocol
//!
//! Defines the message vocabulary for the `/ws/voice` endpoint.
//!
//! ## Client → Server:
//! Binary frames only. A frame is either raw encoded audio for the current
//! utterance, or one of two reserved sentinel byte sequences:
//! - `__END__`: the utterance is complete, run a conversation turn
//! - `__CLOSE__`: tear the session down immediately
//!
//! Sentinels are matched by exact byte content; any other binary frame is
//! audio payload regardless of its size.
//!
//! ## Server → Client:
//! Text frames carry JSON objects with exactly one top-level key
//! (`status`, `debug`, `error`, `progress`, `transcript`, `audio_done`).
//! Binary frames carry synthesized audio in fixed 4096-byte chunks.

use serde::Serialize;

/// Sentinel frame marking the end of one utterance recording.
pub const END_OF_UTTERANCE: &[u8] = b"__END__";

/// Sentinel frame requesting immediate session shutdown.
pub const CLOSE_SESSION: &[u8] = b"__CLOSE__";

/// Size of each outbound binary audio frame in bytes.
pub const AUDIO_CHUNK_SIZE: usize = 4096;

/// Status message sent after a successful WebSocket handshake.
pub const STATUS_CONNECTED: &str = "connected";

/// Status message acknowledging a close sentinel before the socket drops.
pub const STATUS_CLOSING: &str = "closing";

/// A status event sent to the client at a defined pipeline checkpoint.
///
/// Serde's externally-tagged representation gives each variant the required
/// one-key JSON shape, e.g. `{"transcript":"hello"}` or `{"audio_done":true}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection lifecycle marker ("connected" or "closing").
    Status(String),

    /// Operator-ish chatter that is still visible to the client.
    Debug(String),

    /// Terse, generic failure classification. Never raw diagnostics.
    Error(String),

    /// Pipeline progress marker ("starting transcription", "starting LLM",
    /// "starting TTS").
    Progress(String),

    /// The transcript of the utterance, sent as soon as STT succeeds.
    Transcript(String),

    /// Marks the end of the audio stream for one turn. Always `true`.
    AudioDone(bool),
}

impl ServerEvent {
    pub fn status(value: &str) -> Self {
        ServerEvent::Status(value.to_string())
    }

    pub fn error(message: &str) -> Self {
        ServerEvent::Error(message.to_string())
    }

    pub fn progress(stage: &str) -> Self {
        ServerEvent::Progress(stage.to_string())
    }
}

/// Returns true if the frame is the end-of-utterance sentinel.
pub fn is_end_marker(frame: &[u8]) -> bool {
    frame == END_OF_UTTERANCE
}

/// Returns true if the frame is the close-session sentinel.
pub fn is_close_marker(frame: &[u8]) -> bool {
    frame == CLOSE_SESSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_one_top_level_key() {
        let cases = vec![
            (ServerEvent::status(STATUS_CONNECTED), r#"{"status":"connected"}"#),
            (ServerEvent::Debug("hello from backend".to_string()), r#"{"debug":"hello from backend"}"#),
            (ServerEvent::error("Transcription failed"), r#"{"error":"Transcription failed"}"#),
            (ServerEvent::progress("starting LLM"), r#"{"progress":"starting LLM"}"#),
            (ServerEvent::Transcript("hi there".to_string()), r#"{"transcript":"hi there"}"#),
            (ServerEvent::AudioDone(true), r#"{"audio_done":true}"#),
        ];

        for (event, expected) in cases {
            assert_eq!(serde_json::to_string(&event).unwrap(), expected);
        }
    }

    #[test]
    fn test_sentinel_detection_is_exact() {
        assert!(is_end_marker(b"__END__"));
        assert!(is_close_marker(b"__CLOSE__"));

        // Near misses are audio data, not control frames
        assert!(!is_end_marker(b"__END___"));
        assert!(!is_end_marker(b"_END_"));
        assert!(!is_close_marker(b"__CLOSE__ "));
        assert!(!is_close_marker(b""));
    }
}
