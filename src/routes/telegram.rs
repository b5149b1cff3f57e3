use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use subtle::ConstantTimeEq;

use crate::config::get_config;
use crate::dto::telegram_dto::Update;
use crate::error::{Error, Result};
use crate::AppState;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram retries non-2xx deliveries, so handler failures are logged and acknowledged.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<impl IntoResponse> {
    verify_secret(&headers)?;

    let update_id = update.update_id;
    if let Err(e) = state.bot_service.handle_update(update).await {
        tracing::error!(update_id, error = ?e, "failed to handle telegram update");
    }
    Ok((StatusCode::OK, Json(serde_json::json!({ "ok": true }))))
}

fn verify_secret(headers: &HeaderMap) -> Result<()> {
    let Some(expected) = get_config().telegram_webhook_secret.as_deref() else {
        return Err(Error::Unauthorized("webhook_disabled".into()));
    };
    let Some(secret_hdr) = headers.get(SECRET_HEADER) else {
        return Err(Error::Unauthorized("missing_webhook_secret".into()));
    };
    let provided = secret_hdr
        .to_str()
        .map_err(|_| Error::Unauthorized("invalid_secret_header".into()))?;
    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(Error::Unauthorized("invalid_webhook_secret".into()))
    }
}
