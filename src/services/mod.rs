//! # External Services
//!
//! Trait seams for the three sequential external calls a conversation turn
//! makes: speech-to-text, reply generation, and speech synthesis. The turn
//! pipeline only depends on these traits, which keeps the providers
//! swappable and lets tests inject failures at any single stage.

pub mod openai;

use crate::error::VoiceResult;
use async_trait::async_trait;

pub use openai::OpenAiClient;

/// Speech-to-text, addressed as one blocking request per utterance.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a complete mono WAV waveform into text.
    async fn transcribe(&self, wav: &[u8]) -> VoiceResult<String>;
}

/// Language-model reply generation.
///
/// The response is streamed from the provider and concatenated into one
/// complete string before anything downstream sees it; the client is never
/// shown incremental tokens. A failed or malformed stream degrades to an
/// empty reply rather than failing the turn; the error taxonomy has no
/// generation variant on purpose.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, user_text: &str) -> String;
}

/// Speech synthesis with a provider voice identifier.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize the reply text, concatenating the provider's streamed
    /// fragments into one raw audio buffer.
    async fn synthesize(&self, text: &str, voice: &str) -> VoiceResult<Vec<u8>>;
}
