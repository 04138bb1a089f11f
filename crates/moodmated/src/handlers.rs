//! HTTP request handlers.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use moodmate_core::{Emotion, Song};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::server::AppContext;

/// Liveness text served on `GET /`.
pub const LIVENESS_MESSAGE: &str = "MoodMate Brain is Active!";

/// Successful `/predict_emotion` body.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub emotion: Emotion,
    /// Percentage with two decimals, e.g. `"87.34%"`.
    pub confidence: String,
    pub songs: Vec<Song>,
}

/// GET /
pub async fn home() -> &'static str {
    LIVENESS_MESSAGE
}

/// GET /status
///
/// Reports which degraded modes (simulated classifier, empty or
/// uncategorized library) the daemon is running in.
pub async fn status(State(ctx): State<AppContext>) -> Json<Value> {
    let backend = ctx.engine.backend();
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "model_backend": backend.as_str(),
        "simulated": backend == moodmate_core::Backend::Simulated,
        "songs": ctx.library.len(),
        "category_column": ctx.library.has_category_column(),
    }))
}

/// POST /predict_emotion
///
/// Body: `{"image": "<base64 or data URL>"}`.
pub async fn predict_emotion(
    State(ctx): State<AppContext>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = match body {
        Ok(body) => predict(&ctx, &body).await,
        Err(rejection) => Err(ApiError::from(rejection)),
    };

    match result {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            if err.status().is_server_error() {
                tracing::warn!(error = %err, "predict_emotion failed");
            }
            if ctx.expose_errors {
                err.into_response()
            } else {
                err.redacted().into_response()
            }
        }
    }
}

async fn predict(ctx: &AppContext, body: &[u8]) -> ApiResult<PredictResponse> {
    let image = extract_image(body)?;

    let prediction = ctx.engine.analyze(image).await?;
    let recommendation = ctx.library.recommend(prediction.emotion);

    tracing::info!(
        emotion = %prediction.emotion,
        confidence = prediction.confidence,
        simulated = prediction.is_simulated(),
        songs = recommendation.songs.len(),
        selection = ?recommendation.selection,
        "emotion predicted"
    );

    Ok(PredictResponse {
        emotion: prediction.emotion,
        confidence: prediction.confidence_percent(),
        songs: recommendation.songs,
    })
}

/// Pull the `image` string out of the JSON request body.
///
/// A missing or falsy `image` (null, `""`, `0`, `false`, `[]`, `{}`) is a
/// client error; anything else that is not a string is a server error.
fn extract_image(body: &[u8]) -> ApiResult<String> {
    let mut request: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid JSON body: {e}")))?;

    let Some(fields) = request.as_object_mut() else {
        return Err(ApiError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        ));
    };

    match fields.remove("image") {
        None => Err(ApiError::MissingImage),
        Some(value) if is_falsy(&value) => Err(ApiError::MissingImage),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ApiError::InvalidRequest(
            "image must be a base64 string".to_string(),
        )),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
