//! # Configuration Management
//!
//! Loads and validates gateway configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! Everything the session pipeline needs (provider credentials, the voice
//! map, timeouts, the artifact retention window) lives in one explicit
//! [`AppConfig`] constructed once at startup and passed by reference into the
//! session controller. There are no ambient globals.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_*, plus HOST / PORT / OPENAI_API_KEY)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub housekeeping: HousekeepingConfig,
    pub voices: VoiceConfig,
}

/// HTTP server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings for the OpenAI-compatible speech and language services.
///
/// ## Fields:
/// - `api_key`: bearer token; normally injected via `OPENAI_API_KEY`
/// - `base_url`: API root, e.g. `https://api.openai.com/v1`
/// - `transcription_model` / `chat_model` / `tts_model`: provider model names
/// - `system_prompt`: fixed directive prepended to every completion request
/// - `tts_instructions`: fixed tone instruction for synthesis requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub tts_model: String,
    pub system_prompt: String,
    pub tts_instructions: String,
}

/// Audio transcoding parameters for the two pipeline boundaries.
///
/// Inbound audio is decoded to mono PCM at `input_sample_rate` before
/// transcription; synthesized audio is re-encoded to `output_format` at
/// `output_sample_rate` before being streamed back in `chunk_size` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub ffmpeg_path: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_format: String,
    pub chunk_size: usize,
}

/// Per-session timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds to wait for an inbound frame before emitting a timeout error.
    pub idle_timeout_secs: u64,

    /// Pause after the last audio chunk before `audio_done`, letting the
    /// client drain its receive buffer.
    pub drain_delay_ms: u64,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

/// Transient-artifact sweeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Directory holding transient audio artifacts.
    pub directory: String,

    /// File extension the sweeper is allowed to remove (without the dot).
    pub extension: String,

    /// Files older than this many minutes are eligible for removal.
    pub retention_minutes: u64,
}

impl HousekeepingConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes * 60)
    }
}

/// Mapping from client-facing voice labels to provider voice identifiers.
///
/// The label set is closed; anything the client sends outside of it falls
/// back to the default voice. The selection is bound once at connection time
/// and is immutable for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub default: String,
    pub female: String,
    pub male: String,
    pub robot: String,
}

impl VoiceConfig {
    /// Resolve a client-facing label to a provider voice identifier.
    pub fn resolve(&self, label: &str) -> &str {
        match label {
            "default" => &self.default,
            "female" => &self.female,
            "male" => &self.male,
            "robot" => &self.robot,
            _ => &self.default,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            openai: OpenAiConfig {
                api_key: String::new(), // must come from the environment
                base_url: "https://api.openai.com/v1".to_string(),
                transcription_model: "whisper-1".to_string(),
                chat_model: "gpt-4o".to_string(),
                tts_model: "gpt-4o-mini-tts".to_string(),
                system_prompt: "You are a helpful assistant.".to_string(),
                tts_instructions: "Speak in a cheerful and positive tone.".to_string(),
            },
            audio: AudioConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                input_sample_rate: 16000,  // what the transcription model expects
                output_sample_rate: 24000, // playback rate for synthesized audio
                output_format: "wav".to_string(),
                chunk_size: crate::protocol::AUDIO_CHUNK_SIZE,
            },
            session: SessionConfig {
                idle_timeout_secs: 30,
                drain_delay_ms: 200,
            },
            housekeeping: HousekeepingConfig {
                directory: "audio_logs".to_string(),
                extension: "wav".to_string(),
                retention_minutes: 10,
            },
            voices: VoiceConfig {
                default: "coral".to_string(),
                female: "nova".to_string(),
                male: "echo".to_string(),
                robot: "onyx".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// `HOST`, `PORT`, and `OPENAI_API_KEY` are honored without the `APP_`
    /// prefix because deployment platforms and the provider SDKs conventionally
    /// set them that way.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("openai.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration can actually run a session.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.openai.api_key.is_empty() {
            return Err(anyhow::anyhow!(
                "OPENAI_API_KEY environment variable is not set"
            ));
        }

        if self.audio.chunk_size == 0 {
            return Err(anyhow::anyhow!("Audio chunk size must be greater than 0"));
        }

        if self.session.idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Idle timeout must be greater than 0"));
        }

        Ok(())
    }
}
