//! # Transcoder Adapter
//!
//! Converts between compressed audio containers and fixed-format decoded
//! waveforms by delegating to an external ffmpeg process over pipes: write
//! the whole input to stdin, read the whole output from stdout, then inspect
//! the exit status. There is no partial or streaming decode: the downstream
//! transcription call is non-streaming, so the whole buffer is transformed
//! at once.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Boundary between the pipeline and the external codec service.
///
/// Both operations are pure transformations: same bytes in, same bytes out,
/// no state retained between calls.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Decode an arbitrary compressed audio blob into a mono WAV waveform at
    /// the given sample rate.
    async fn decode(&self, container: &[u8], sample_rate: u32) -> VoiceResult<Vec<u8>>;

    /// Encode raw synthesized audio into a mono playback container at the
    /// given sample rate.
    async fn encode(&self, audio: &[u8], format: &str, sample_rate: u32) -> VoiceResult<Vec<u8>>;
}

/// ffmpeg-backed transcoder.
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one `pipe:0 -> pipe:1` conversion through ffmpeg.
    async fn convert(&self, input: &[u8], format: &str, sample_rate: u32) -> VoiceResult<Vec<u8>> {
        let mut child = Command::new(&self.binary)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-f",
                format,
                "-ac",
                "1",
                "-ar",
                &sample_rate.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                VoiceError::Transcode(format!("failed to start {}: {}", self.binary, err))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Transcode("ffmpeg stdin unavailable".to_string()))?;

        // Feed stdin from its own task while draining stdout, otherwise a
        // large conversion fills one pipe and deadlocks the other.
        let payload = input.to_vec();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
            let _ = stdin.shutdown().await;
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| VoiceError::Transcode(format!("ffmpeg did not run: {}", err)))?;
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VoiceError::Transcode(stderr));
        }

        debug!(
            input_bytes = input.len(),
            output_bytes = output.stdout.len(),
            format,
            sample_rate,
            "ffmpeg conversion complete"
        );

        Ok(output.stdout)
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn decode(&self, container: &[u8], sample_rate: u32) -> VoiceResult<Vec<u8>> {
        self.convert(container, "wav", sample_rate).await
    }

    async fn encode(&self, audio: &[u8], format: &str, sample_rate: u32) -> VoiceResult<Vec<u8>> {
        self.convert(audio, format, sample_rate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_a_transcode_error() {
        let transcoder = FfmpegTranscoder::new("definitely-not-ffmpeg-9000");
        let err = transcoder.decode(b"whatever", 16000).await.unwrap_err();
        match err {
            VoiceError::Transcode(msg) => assert!(msg.contains("failed to start")),
            other => panic!("expected transcode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_diagnostics() {
        // `false` exits 1 without reading its pipes, which is exactly the
        // failure shape of a codec rejecting its input.
        let transcoder = FfmpegTranscoder::new("false");
        let err = transcoder.encode(b"", "wav", 24000).await.unwrap_err();
        assert!(matches!(err, VoiceError::Transcode(_)));
        assert_eq!(err.client_message(), "FFmpeg conversion failed");
    }
}
