use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use common::garde::validate_struct;
use std::sync::Arc;

use super::AppState;
use crate::http::{ApiError, RouteInfoPushRequest, RouteInfoQuery, RouteInfoSummaryResponse};

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// POST /api/v1/realtime/route-info
///
/// Responds with the values as submitted, not the merged snapshot.
pub async fn push_route_info(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RouteInfoPushRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RouteInfoPushRequest>), ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    validate_struct(&request)?;

    state
        .service
        .push(&request.device_id, &request.snapshot())
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/realtime/route-info?intersectionCode=...
pub async fn get_route_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RouteInfoQuery>,
) -> Result<Json<RouteInfoSummaryResponse>, ApiError> {
    let intersection_code = query
        .intersection_code
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| ApiError::missing_parameter("intersectionCode"))?;

    let summary = state.service.summarize(&intersection_code).await?;
    Ok(Json(summary.into()))
}
