use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "window_size": config.audio.window_size,
                "fallback_chunk_size": config.audio.fallback_chunk_size,
                "spectrum_bands": config.audio.spectrum_bands,
                "silence_rms_threshold": config.audio.silence_rms_threshold,
                "pitch": {
                    "min_frequency": config.audio.pitch.min_frequency,
                    "max_frequency": config.audio.pitch.max_frequency,
                    "smoothing_factor": config.audio.pitch.smoothing_factor,
                    "correlation_floor": config.audio.pitch.correlation_floor
                }
            },
            "session": {
                "max_participants": config.session.max_participants,
                "progress_poll_interval_ms": config.session.progress_poll_interval_ms,
                "mic_time_refresh_ms": config.session.mic_time_refresh_ms,
                "echo_suppression_ms": config.session.echo_suppression_ms
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::Validation)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "audio": {
                "sample_rate": current_config.audio.sample_rate,
                "window_size": current_config.audio.window_size,
                "fallback_chunk_size": current_config.audio.fallback_chunk_size,
                "spectrum_bands": current_config.audio.spectrum_bands,
                "silence_rms_threshold": current_config.audio.silence_rms_threshold,
                "pitch": {
                    "min_frequency": current_config.audio.pitch.min_frequency,
                    "max_frequency": current_config.audio.pitch.max_frequency,
                    "smoothing_factor": current_config.audio.pitch.smoothing_factor,
                    "correlation_floor": current_config.audio.pitch.correlation_floor
                }
            },
            "session": {
                "max_participants": current_config.session.max_participants,
                "progress_poll_interval_ms": current_config.session.progress_poll_interval_ms,
                "mic_time_refresh_ms": current_config.session.mic_time_refresh_ms,
                "echo_suppression_ms": current_config.session.echo_suppression_ms
            }
        }
    })))
}
