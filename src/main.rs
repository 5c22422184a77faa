//! # Voice Gateway Backend
//!
//! Actix-web server exposing a WebSocket voice-conversation endpoint. Each
//! connection runs a session loop: collect an utterance from binary audio
//! frames, transcribe it, generate a reply, synthesize speech, and stream
//! the audio back in fixed-size frames.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **state**: shared configuration handle and gateway counters
//! - **protocol**: wire-level sentinels and the server event vocabulary
//! - **assembler**: binary frame reassembly into complete utterances
//! - **pipeline**: the transcribe/generate/synthesize turn chain
//! - **websocket**: the per-connection session controller actor
//! - **services**: speech and language provider clients
//! - **audio**: ffmpeg-backed transcoding
//! - **housekeeping**: stale artifact sweeping
//! - **health**: liveness endpoint

mod assembler;
mod audio;
mod config;
mod error;
mod health;
mod housekeeping;
mod pipeline;
mod protocol;
mod services;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use audio::FfmpegTranscoder;
use config::AppConfig;
use pipeline::PipelineServices;
use services::OpenAiClient;
use state::AppState;
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-gateway-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // The artifact directory must exist before the first sweep runs
    std::fs::create_dir_all(&config.housekeeping.directory).with_context(|| {
        format!(
            "failed to create artifact directory {}",
            config.housekeeping.directory
        )
    })?;

    let client = Arc::new(OpenAiClient::new(config.openai.clone()));
    let services = Arc::new(PipelineServices {
        transcoder: Arc::new(FfmpegTranscoder::new(config.audio.ffmpeg_path.clone())),
        stt: client.clone(),
        llm: client.clone(),
        tts: client,
        audio: config.audio.clone(),
        session: config.session.clone(),
    });

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::from(services.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(Logger::default())
            .route("/ws/voice", web::get().to(websocket::voice_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging via tracing. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_gateway_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolve when SIGTERM or SIGINT arrives.
async fn wait_for_shutdown() {
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let sigint = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => {}
        _ = sigint => {}
    }
}
