use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::utils::time::today_utc;
use crate::AppState;

pub async fn get_student_debt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    if let Some(curator_id) = claims.curator_scope()? {
        state.debt_service.ensure_curates(student_id, curator_id).await?;
    }
    let summary = state.debt_service.student_debt(student_id, today_utc()).await?;
    Ok(Json(summary))
}
