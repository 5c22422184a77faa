//! # WebSocket Session Controller
//!
//! Owns one voice conversation per connection at `/ws/voice`: accept, greet,
//! loop over {assemble an utterance, run a turn}, tear down.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: client connects with an optional `voice` query
//!    parameter, bound once for the session's lifetime
//! 2. **Recording**: client streams binary audio frames, then the `__END__`
//!    sentinel
//! 3. **Turn**: server emits progress events, the transcript, then the
//!    synthesized reply as 4096-byte binary frames and `{"audio_done":true}`
//! 4. **Repeat** until the client disconnects or sends `__CLOSE__`
//!
//! ## Actor Model:
//! Each connection is an independent actix actor. The turn pipeline runs in
//! a spawned task and reports back through the actor's mailbox, which keeps
//! turns strictly sequential per session: a new turn only starts once the
//! previous `TurnFinished` message has been handled, and utterances that
//! complete in the meantime wait in a queue. Messages addressed to a stopped
//! actor are dropped by the mailbox, so a severed connection is never
//! written to.

use crate::assembler::{FrameOutcome, UtteranceAssembler};
use crate::error::VoiceError;
use crate::housekeeping::sweep_stale_artifacts;
use crate::pipeline::{run_turn, Outbound, PipelineServices};
use crate::protocol::{ServerEvent, STATUS_CLOSING, STATUS_CONNECTED};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How often the idle watchdog wakes up to check the last-frame clock.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks the silence window between inbound frames.
///
/// Kept separate from the actor so the deadline arithmetic can be tested
/// with explicit clock values. Firing restarts the window, so a silent
/// client gets exactly one timeout error per window, not one per tick.
#[derive(Debug)]
struct IdleWatchdog {
    last_activity: Instant,
}

impl IdleWatchdog {
    fn new(now: Instant) -> Self {
        Self { last_activity: now }
    }

    /// Record inbound activity (or a finished turn) at `now`.
    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Whether the idle window has elapsed at `now`. While `suspended`
    /// (a turn is running, the client is listening) the clock never fires.
    fn expired(&mut self, now: Instant, timeout: Duration, suspended: bool) -> bool {
        if suspended {
            return false;
        }
        if now.duration_since(self.last_activity) >= timeout {
            self.last_activity = now;
            return true;
        }
        false
    }
}

/// WebSocket actor for one voice session.
pub struct VoiceSocket {
    /// Identifier for log correlation only; never sent to the client.
    session_id: String,

    /// Provider voice identifier, resolved from the `voice` query parameter
    /// at connect time and immutable afterwards.
    voice: String,

    /// Collects binary frames into the utterance in progress.
    assembler: UtteranceAssembler,

    /// Utterances completed while a turn was still running. Turns are
    /// strictly sequential, so these wait their turn, oldest first.
    queued: VecDeque<Vec<u8>>,

    /// Whether a turn pipeline task is currently running for this session.
    turn_in_flight: bool,

    /// Silence window for the timeout error.
    watchdog: IdleWatchdog,

    services: Arc<PipelineServices>,
    state: AppState,
}

impl VoiceSocket {
    pub fn new(state: AppState, services: Arc<PipelineServices>, voice_label: &str) -> Self {
        let voice = state.config.voices.resolve(voice_label).to_string();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            voice,
            assembler: UtteranceAssembler::new(),
            queued: VecDeque::new(),
            turn_in_flight: false,
            watchdog: IdleWatchdog::new(Instant::now()),
            services,
            state,
        }
    }

    fn send_event(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            ctx.text(json);
        }
    }

    /// Spawn the turn pipeline for one completed utterance. Output flows
    /// back through the mailbox as [`Deliver`] messages; the final
    /// [`TurnFinished`] unblocks the next queued utterance.
    fn start_turn(&mut self, raw: Vec<u8>, ctx: &mut ws::WebsocketContext<Self>) {
        self.turn_in_flight = true;

        let services = self.services.clone();
        let state = self.state.clone();
        let voice = self.voice.clone();
        let session_id = self.session_id.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();

            let forward_addr = addr.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(item) = rx.recv().await {
                    forward_addr.do_send(Deliver(item));
                }
            });

            // Run the turn in its own task so a panic degrades to a generic
            // server error instead of silently wedging the session.
            let turn = {
                let services = services.clone();
                let voice = voice.clone();
                let tx = tx.clone();
                tokio::spawn(async move { run_turn(&services, raw, &voice, &tx).await })
            };
            let result = match turn.await {
                Ok(result) => result,
                Err(join_err) => Err(VoiceError::Unexpected(join_err.to_string())),
            };

            drop(tx);
            let _ = forwarder.await;

            match result {
                Ok(()) => {
                    state.turn_completed();
                }
                Err(err) => {
                    error!(session = %session_id, error = %err, "turn failed");
                    state.turn_failed();
                    addr.do_send(Deliver(Outbound::Event(ServerEvent::error(
                        err.client_message(),
                    ))));
                }
            }

            addr.do_send(TurnFinished);
        });
    }

    fn idle_timeout(&self) -> Duration {
        self.state.config.session.idle_timeout()
    }
}

/// One item of turn output to forward onto the socket.
#[derive(Message)]
#[rtype(result = "()")]
struct Deliver(Outbound);

/// The in-flight turn finished (successfully or not).
#[derive(Message)]
#[rtype(result = "()")]
struct TurnFinished;

impl Actor for VoiceSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session = %self.session_id, voice = %self.voice, "voice session started");
        self.state.session_started();

        self.send_event(ctx, &ServerEvent::status(STATUS_CONNECTED));
        self.send_event(ctx, &ServerEvent::Debug("hello from backend".to_string()));

        // Sweep stale artifacts once per new session, off the actor thread
        let housekeeping = self.state.config.housekeeping.clone();
        tokio::task::spawn_blocking(move || {
            match sweep_stale_artifacts(
                Path::new(&housekeeping.directory),
                &housekeeping.extension,
                housekeeping.retention(),
            ) {
                Ok(removed) if removed > 0 => {
                    info!(removed, "housekeeping removed stale artifacts")
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "housekeeping sweep failed"),
            }
        });

        // Idle watchdog: exactly one timeout error per silent window, then a
        // fresh utterance.
        ctx.run_interval(IDLE_CHECK_INTERVAL, |act, ctx| {
            let timeout = act.idle_timeout();
            if act.watchdog.expired(Instant::now(), timeout, act.turn_in_flight) {
                warn!(session = %act.session_id, "no audio received within idle window");
                act.send_event(ctx, &ServerEvent::error(VoiceError::Timeout.client_message()));
                act.assembler.discard();
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            session = %self.session_id,
            turns = self.assembler.turn_seq(),
            "voice session ended"
        );
        self.state.session_ended();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.watchdog.touch(Instant::now());

                match self.assembler.accept_frame(&data) {
                    FrameOutcome::Collecting => {
                        debug!(
                            session = %self.session_id,
                            bytes = data.len(),
                            buffered = self.assembler.buffered_len(),
                            "audio chunk received"
                        );
                    }
                    FrameOutcome::Utterance(raw) => {
                        info!(
                            session = %self.session_id,
                            turn = self.assembler.turn_seq(),
                            bytes = raw.len(),
                            "utterance complete"
                        );
                        if self.turn_in_flight {
                            self.queued.push_back(raw);
                        } else {
                            self.start_turn(raw, ctx);
                        }
                    }
                    FrameOutcome::Empty => {
                        warn!(session = %self.session_id, "end marker with no audio");
                        self.send_event(
                            ctx,
                            &ServerEvent::error(VoiceError::EmptyInput.client_message()),
                        );
                    }
                    FrameOutcome::CloseRequested => {
                        info!(session = %self.session_id, "close signal received");
                        self.send_event(ctx, &ServerEvent::status(STATUS_CLOSING));
                        ctx.close(Some(ws::CloseReason {
                            code: ws::CloseCode::Normal,
                            description: None,
                        }));
                        ctx.stop();
                    }
                }
            }
            Ok(ws::Message::Text(text)) => {
                // Inbound traffic is binary-only; client content stays out
                // of the logs
                warn!(session = %self.session_id, bytes = text.len(), "unexpected text frame");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(session = %self.session_id, ?reason, "client disconnected");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session = %self.session_id, "unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session = %self.session_id, error = %err, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for VoiceSocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        match msg.0 {
            Outbound::Event(event) => self.send_event(ctx, &event),
            Outbound::Audio(chunk) => ctx.binary(chunk),
        }
    }
}

impl Handler<TurnFinished> for VoiceSocket {
    type Result = ();

    fn handle(&mut self, _msg: TurnFinished, ctx: &mut Self::Context) {
        self.turn_in_flight = false;
        // Restart the idle window now that the client can speak again
        self.watchdog.touch(Instant::now());

        if let Some(next) = self.queued.pop_front() {
            self.start_turn(next, ctx);
        }
    }
}

/// Pull the voice label out of the connection's query string; absent or
/// unparsable parameters mean the default voice.
fn voice_label_from_query(query_string: &str) -> String {
    web::Query::<HashMap<String, String>>::from_query(query_string)
        .ok()
        .and_then(|query| query.get("voice").cloned())
        .unwrap_or_else(|| "default".to_string())
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh [`VoiceSocket`] actor.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    services: web::Data<PipelineServices>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().peer_addr(),
        "new voice connection request"
    );

    let voice_label = voice_label_from_query(req.query_string());
    let socket = VoiceSocket::new(
        state.get_ref().clone(),
        services.into_inner(),
        &voice_label,
    );

    ws::start(socket, &req, stream)
}
