use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::access_window_dto::{AccessWindowResponse, CreateAccessWindowPayload, ListWindowsQuery};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::utils::time::now;
use crate::AppState;

pub async fn create_window(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAccessWindowPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let curator_id = claims.user_id()?;
    let at = now();

    let window = state
        .window_service
        .schedule(
            curator_id,
            payload.student_id,
            payload.test_id,
            payload.open_from,
            payload.open_to,
            at,
        )
        .await?;

    tracing::info!(
        window_id = %window.id,
        student_id = %window.student_id,
        curator_id = %curator_id,
        "access window scheduled"
    );
    Ok((StatusCode::CREATED, Json(AccessWindowResponse::at(window, at))))
}

pub async fn list_windows(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListWindowsQuery>,
) -> Result<impl IntoResponse> {
    let curator_id = claims.user_id()?;
    let at = now();
    let windows = state
        .window_service
        .list_for_student(query.student_id, curator_id)
        .await?
        .into_iter()
        .map(|window| AccessWindowResponse::at(window, at))
        .collect::<Vec<_>>();
    Ok(Json(windows))
}

pub async fn delete_window(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let curator_id = claims.user_id()?;
    let window = state.window_service.deactivate(id, curator_id).await?;
    tracing::info!(window_id = %id, curator_id = %curator_id, "access window deactivated");
    Ok(Json(AccessWindowResponse::at(window, now())))
}
