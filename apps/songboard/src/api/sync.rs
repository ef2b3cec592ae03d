//! Sync endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::services::{SyncAllReport, SyncApplyReport, SyncPreview};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    /// Restrict the preview to these local artist ids.
    pub artist_ids: Option<Vec<i64>>,
}

/// Catalog ids picked from a preview.
#[derive(Debug, Default, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub albums: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/preview", post(preview))
        .route("/sync/apply", post(apply))
        .route("/sync-all", post(sync_all))
}

/// POST /api/sync/preview
///
/// An empty body previews every sync-enabled artist. A body that is not a
/// valid request is rejected.
pub async fn preview(
    State(state): State<AppState>,
    body: std::result::Result<Json<PreviewRequest>, JsonRejection>,
) -> Result<Json<SyncPreview>> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => PreviewRequest::default(),
        Err(e) => return Err(AppError::BadRequest(e.body_text())),
    };
    let preview = state.sync_service().preview(request.artist_ids).await?;
    Ok(Json(preview))
}

/// POST /api/sync/apply
pub async fn apply(
    State(state): State<AppState>,
    Json(body): Json<ApplyRequest>,
) -> Result<Json<SyncApplyReport>> {
    let report = state.sync_service().apply(body.albums, body.tracks).await;
    Ok(Json(report))
}

/// POST /api/sync-all
pub async fn sync_all(State(state): State<AppState>) -> Result<Json<SyncAllReport>> {
    let report = state.sync_service().sync_all().await?;
    Ok(Json(report))
}
