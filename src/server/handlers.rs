//! Handlers for the two proxy endpoints

use super::error::ApiError;
use super::AppState;
use crate::messages::{AudioClip, ContextMessage};
use crate::proxy::{ChatResponse, TranscribeResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// `POST /api/chat`
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let invalid = || ApiError::Validation("Invalid message provided".to_string());

    let Json(body) = payload.map_err(|e| {
        debug!("Rejected chat body: {}", e);
        invalid()
    })?;

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(invalid)?;

    let context: Vec<ContextMessage> = match body.get("context") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|_| ApiError::Validation("Invalid context provided".to_string()))?,
    };

    info!("Chat request with {} context messages", context.len());

    let response = state
        .provider
        .chat(&state.chat_prompt, &context, message)
        .await
        .map_err(|e| {
            error!("Error processing chat: {}", e);
            ApiError::from(e)
        })?;

    Ok(Json(ChatResponse { response }))
}

/// `POST /api/transcribe`
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let mut audio: Option<AudioClip> = None;
    let mut context: Vec<ContextMessage> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid form data: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                let file_name = field.file_name().unwrap_or("recording.webm").to_string();
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_from_file_name(&file_name).to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Invalid audio upload: {}", e)))?;
                audio = Some(
                    AudioClip::new(data.to_vec())
                        .with_file_name(file_name)
                        .with_mime_type(mime_type),
                );
            }
            Some("context") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Invalid context field: {}", e)))?;
                context = parse_context(&raw);
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let audio = audio
        .filter(|clip| !clip.is_empty())
        .ok_or_else(|| ApiError::Validation("No audio file provided".to_string()))?;

    info!(
        "Transcription request: {} bytes, {} context messages",
        audio.len(),
        context.len()
    );

    let transcription = state.provider.transcribe(audio).await.map_err(|e| {
        error!("Error processing audio: {}", e);
        ApiError::from(e)
    })?;

    let response = state
        .provider
        .chat(&state.voice_prompt, &context, &transcription)
        .await
        .map_err(|e| {
            error!("Error processing audio: {}", e);
            ApiError::from(e)
        })?;

    Ok(Json(TranscribeResponse {
        transcription,
        response: Some(response),
    }))
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Context arrives as a JSON string; a bad value only costs the context
fn parse_context(raw: &str) -> Vec<ContextMessage> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(raw) {
        Ok(context) => context,
        Err(e) => {
            warn!("Failed to parse context: {}", e);
            Vec::new()
        }
    }
}

fn mime_from_file_name(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map_or("", |(_, ext)| ext);
    AudioClip::mime_for_extension(ext)
}
