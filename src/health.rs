//! Health endpoint: liveness plus a small snapshot of gateway activity.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": metrics.active_sessions,
            "turns_completed": metrics.turns_completed,
            "turn_failures": metrics.turn_failures
        },
        "models": {
            "transcription": config.openai.transcription_model,
            "chat": config.openai.chat_model,
            "tts": config.openai.tts_model
        }
    }))
}
