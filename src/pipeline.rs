//! # Turn Pipeline
//!
//! Runs one full conversation turn: raw compressed utterance bytes in,
//! playback audio frames out, with status events at every checkpoint.
//!
//! ## Stage chain:
//! 1. transcode inbound (raw -> mono 16 kHz WAV)
//! 2. transcribe (WAV -> transcript, emitted to the client immediately)
//! 3. generate reply (streamed completion, concatenated; never fails)
//! 4. synthesize (streamed speech, concatenated)
//! 5. transcode outbound (-> mono 24 kHz playback container)
//! 6. stream out in fixed-size binary frames, then signal completion
//!
//! Each stage is gated on the previous one succeeding. Any stage failure
//! aborts the remaining stages and bubbles a [`VoiceError`] back to the
//! session controller, which turns it into a single `error` event; the
//! session itself survives and waits for the next utterance.
//!
//! Output audio is only sent once the full synthesized waveform is
//! available: chunked delivery, not incremental synthesis streaming. That is
//! a deliberate simplification of the client protocol.

use crate::audio::AudioTranscoder;
use crate::config::{AudioConfig, SessionConfig};
use crate::error::VoiceResult;
use crate::protocol::ServerEvent;
use crate::services::{ReplyGenerator, SpeechSynthesizer, SpeechToText};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One item of turn output, delivered to the session controller as it is
/// produced. Events become JSON text frames; audio becomes binary frames.
#[derive(Debug, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    Audio(Vec<u8>),
}

/// Everything a turn needs that outlives any single turn: the codec adapter,
/// the three external services, and the audio/timing parameters. Built once
/// at startup and shared across all sessions.
pub struct PipelineServices {
    pub transcoder: Arc<dyn AudioTranscoder>,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn ReplyGenerator>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

impl PipelineServices {
    fn drain_delay(&self) -> Duration {
        self.session.drain_delay()
    }
}

/// Execute one conversation turn.
///
/// Progress, transcript, audio frames, and the completion marker are pushed
/// through `out` as they happen; a send failure means the session is gone
/// and is deliberately ignored rather than raised as a secondary fault.
pub async fn run_turn(
    services: &PipelineServices,
    raw: Vec<u8>,
    voice: &str,
    out: &mpsc::UnboundedSender<Outbound>,
) -> VoiceResult<()> {
    let emit = |item: Outbound| {
        let _ = out.send(item);
    };

    info!(bytes = raw.len(), voice, "turn started");

    // 1. Decode whatever the recorder sent into the transcription format
    let wav = services
        .transcoder
        .decode(&raw, services.audio.input_sample_rate)
        .await?;
    debug!(wav_bytes = wav.len(), "inbound audio decoded");

    // 2. Transcribe, and show the user their own words right away
    emit(Outbound::Event(ServerEvent::progress("starting transcription")));
    let transcript = services.stt.transcribe(&wav).await?;
    info!(transcript = %transcript, "utterance transcribed");
    emit(Outbound::Event(ServerEvent::Transcript(transcript.clone())));

    // 3. Generate the reply. A dead or malformed completion stream comes
    // back as an empty string and the turn carries on.
    emit(Outbound::Event(ServerEvent::progress("starting LLM")));
    let reply = services.llm.generate(&transcript).await;
    info!(chars = reply.len(), "reply generated");

    // 4. Synthesize the reply with the session's voice
    emit(Outbound::Event(ServerEvent::progress("starting TTS")));
    let speech = services.tts.synthesize(&reply, voice).await?;
    debug!(speech_bytes = speech.len(), "reply synthesized");

    // 5. Re-encode for playback
    let playback = services
        .transcoder
        .encode(
            &speech,
            &services.audio.output_format,
            services.audio.output_sample_rate,
        )
        .await?;

    // 6. Stream out in bounded frames so the transport can apply
    // backpressure per frame instead of swallowing one giant blob
    let chunk_size = services.audio.chunk_size;
    for chunk in playback.chunks(chunk_size) {
        emit(Outbound::Audio(chunk.to_vec()));
    }
    debug!(
        total_bytes = playback.len(),
        frames = playback.len().div_ceil(chunk_size),
        "playback audio streamed"
    );

    // Let the client drain its receive buffer before the completion signal
    tokio::time::sleep(services.drain_delay()).await;
    emit(Outbound::Event(ServerEvent::AudioDone(true)));

    info!("turn complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::{VoiceError, VoiceResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubTranscoder {
        fail_decode: bool,
        fail_encode: bool,
    }

    #[async_trait]
    impl AudioTranscoder for StubTranscoder {
        async fn decode(&self, container: &[u8], _sample_rate: u32) -> VoiceResult<Vec<u8>> {
            if self.fail_decode {
                return Err(VoiceError::Transcode("bad container".to_string()));
            }
            let mut wav = b"WAV:".to_vec();
            wav.extend_from_slice(container);
            Ok(wav)
        }

        async fn encode(&self, audio: &[u8], _format: &str, _rate: u32) -> VoiceResult<Vec<u8>> {
            if self.fail_encode {
                return Err(VoiceError::Transcode("bad pcm".to_string()));
            }
            Ok(audio.to_vec())
        }
    }

    struct StubStt {
        fail: bool,
    }

    #[async_trait]
    impl SpeechToText for StubStt {
        async fn transcribe(&self, _wav: &[u8]) -> VoiceResult<String> {
            if self.fail {
                return Err(VoiceError::Transcription("401 unauthorized".to_string()));
            }
            Ok("hello gateway".to_string())
        }
    }

    struct StubLlm {
        reply: String,
    }

    #[async_trait]
    impl ReplyGenerator for StubLlm {
        async fn generate(&self, _user_text: &str) -> String {
            self.reply.clone()
        }
    }

    struct StubTts {
        fail: bool,
        audio_len: usize,
        inputs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for StubTts {
        async fn synthesize(&self, text: &str, _voice: &str) -> VoiceResult<Vec<u8>> {
            self.inputs.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(VoiceError::Synthesis("503".to_string()));
            }
            Ok(vec![0u8; self.audio_len])
        }
    }

    struct Setup {
        fail_decode: bool,
        fail_encode: bool,
        fail_stt: bool,
        fail_tts: bool,
        reply: String,
        audio_len: usize,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                fail_decode: false,
                fail_encode: false,
                fail_stt: false,
                fail_tts: false,
                reply: "hi there".to_string(),
                audio_len: 10_000,
            }
        }
    }

    fn services(setup: Setup) -> (PipelineServices, Arc<StubTts>) {
        let config = AppConfig::default();
        let tts = Arc::new(StubTts {
            fail: setup.fail_tts,
            audio_len: setup.audio_len,
            inputs: Mutex::new(Vec::new()),
        });
        let mut session = config.session.clone();
        session.drain_delay_ms = 0; // keep tests fast

        let services = PipelineServices {
            transcoder: Arc::new(StubTranscoder {
                fail_decode: setup.fail_decode,
                fail_encode: setup.fail_encode,
            }),
            stt: Arc::new(StubStt { fail: setup.fail_stt }),
            llm: Arc::new(StubLlm { reply: setup.reply }),
            tts: tts.clone(),
            audio: config.audio.clone(),
            session,
        };
        (services, tts)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    fn audio_bytes(items: &[Outbound]) -> usize {
        items
            .iter()
            .filter_map(|item| match item {
                Outbound::Audio(chunk) => Some(chunk.len()),
                _ => None,
            })
            .sum()
    }

    #[tokio::test]
    async fn test_happy_path_event_order_and_chunking() {
        let (services, _tts) = services(Setup::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_turn(&services, vec![1, 2, 3], "echo", &tx).await.unwrap();

        let items = drain(&mut rx);
        assert_eq!(
            items[0],
            Outbound::Event(ServerEvent::progress("starting transcription"))
        );
        assert_eq!(
            items[1],
            Outbound::Event(ServerEvent::Transcript("hello gateway".to_string()))
        );
        assert_eq!(items[2], Outbound::Event(ServerEvent::progress("starting LLM")));
        assert_eq!(items[3], Outbound::Event(ServerEvent::progress("starting TTS")));

        // 10_000 bytes of playback audio -> 4096 + 4096 + 1808
        let frames: Vec<_> = items
            .iter()
            .filter_map(|item| match item {
                Outbound::Audio(chunk) => Some(chunk.len()),
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![4096, 4096, 1808]);

        assert_eq!(
            items.last().unwrap(),
            &Outbound::Event(ServerEvent::AudioDone(true))
        );
    }

    #[tokio::test]
    async fn test_decode_failure_short_circuits() {
        let (services, _tts) = services(Setup {
            fail_decode: true,
            ..Setup::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = run_turn(&services, vec![0], "coral", &tx).await.unwrap_err();
        assert!(matches!(err, VoiceError::Transcode(_)));

        let items = drain(&mut rx);
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_transcription_failure_sends_no_audio() {
        let (services, tts) = services(Setup {
            fail_stt: true,
            ..Setup::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = run_turn(&services, vec![0], "coral", &tx).await.unwrap_err();
        assert!(matches!(err, VoiceError::Transcription(_)));

        let items = drain(&mut rx);
        assert_eq!(audio_bytes(&items), 0);
        // Synthesis never ran
        assert!(tts.inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_sends_no_audio() {
        let (services, _tts) = services(Setup {
            fail_tts: true,
            ..Setup::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = run_turn(&services, vec![0], "onyx", &tx).await.unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));

        let items = drain(&mut rx);
        assert_eq!(audio_bytes(&items), 0);
        // The transcript still went out before the failing stage
        assert!(items.iter().any(|item| matches!(
            item,
            Outbound::Event(ServerEvent::Transcript(_))
        )));
    }

    #[tokio::test]
    async fn test_outbound_encode_failure_short_circuits() {
        let (services, _tts) = services(Setup {
            fail_encode: true,
            ..Setup::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = run_turn(&services, vec![0], "coral", &tx).await.unwrap_err();
        assert!(matches!(err, VoiceError::Transcode(_)));
        assert_eq!(audio_bytes(&drain(&mut rx)), 0);
    }

    #[tokio::test]
    async fn test_empty_reply_still_completes_the_turn() {
        // The generation stage can degrade to an empty string; synthesis
        // then runs on it and the turn finishes normally.
        let (services, tts) = services(Setup {
            reply: String::new(),
            audio_len: 100,
            ..Setup::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_turn(&services, vec![0], "nova", &tx).await.unwrap();

        assert_eq!(tts.inputs.lock().unwrap().as_slice(), &[String::new()]);
        let items = drain(&mut rx);
        assert_eq!(audio_bytes(&items), 100);
        assert_eq!(
            items.last().unwrap(),
            &Outbound::Event(ServerEvent::AudioDone(true))
        );
    }

    #[tokio::test]
    async fn test_exact_chunk_multiple_has_no_empty_frame() {
        let (services, _tts) = services(Setup {
            audio_len: 8192,
            ..Setup::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_turn(&services, vec![0], "coral", &tx).await.unwrap();

        let frames: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Audio(chunk) => Some(chunk.len()),
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![4096, 4096]);
    }
}
