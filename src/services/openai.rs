//! # OpenAI Client
//!
//! One reqwest-backed client implementing all three service traits against
//! an OpenAI-compatible API:
//!
//! - `POST /audio/transcriptions`: multipart upload of the in-memory WAV
//! - `POST /chat/completions`: server-sent-event stream, deltas concatenated
//! - `POST /audio/speech`: streamed audio body, fragments concatenated
//!
//! The API key and model names come from [`OpenAiConfig`]; nothing here is
//! read from ambient globals.

use crate::config::OpenAiConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::services::{ReplyGenerator, SpeechSynthesizer, SpeechToText};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Extract the text delta from one SSE `data:` line of a streamed chat
/// completion. Returns `None` for keep-alives, `[DONE]`, malformed JSON, and
/// chunks without a content delta, all of which are silently skipped.
fn delta_from_sse_line(line: &str) -> Option<String> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

fn is_done_line(line: &str) -> bool {
    line.trim()
        .strip_prefix("data:")
        .map(|data| data.trim() == "[DONE]")
        .unwrap_or(false)
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, wav: &[u8]) -> VoiceResult<String> {
        let part = multipart::Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|err| VoiceError::Transcription(err.to_string()))?;

        let form = multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", part);

        let response = self
            .http
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| VoiceError::Transcription(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Transcription(format!("{}: {}", status, body)));
        }

        let payload: TranscriptionResponse = response
            .json()
            .await
            .map_err(|err| VoiceError::Transcription(err.to_string()))?;

        Ok(payload.text)
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiClient {
    async fn generate(&self, user_text: &str) -> String {
        let body = json!({
            "model": self.config.chat_model,
            "messages": [
                {"role": "system", "content": self.config.system_prompt},
                {"role": "user", "content": user_text}
            ],
            "stream": true
        });

        let response = match self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "completion request failed, using empty reply");
                return String::new();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "completion request rejected, using empty reply");
            return String::new();
        }

        // Concatenate every content delta into one complete reply. Stream
        // errors and malformed chunks are skipped, not raised: a fully failed
        // stream becomes an empty reply by design.
        let mut reply = String::new();
        let mut pending = Vec::new();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(error = %err, "completion stream interrupted");
                    break;
                }
            };

            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);

                if is_done_line(&line) {
                    break 'outer;
                }
                if let Some(delta) = delta_from_sse_line(&line) {
                    reply.push_str(&delta);
                }
            }
        }

        debug!(chars = reply.len(), "completion stream concatenated");
        reply
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> VoiceResult<Vec<u8>> {
        let body = json!({
            "model": self.config.tts_model,
            "voice": voice,
            "input": text,
            "instructions": self.config.tts_instructions,
        });

        let response = self
            .http
            .post(self.endpoint("audio/speech"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| VoiceError::Synthesis(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!("{}: {}", status, body)));
        }

        let mut audio = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| VoiceError::Synthesis(err.to_string()))?;
            audio.extend_from_slice(&chunk);
        }

        Ok(audio)
    }
}
