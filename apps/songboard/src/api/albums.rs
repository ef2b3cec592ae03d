//! Album endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{PaginatedResponse, Pagination, SuccessResponse};
use crate::db::models::{Album, Track};
use crate::db::queries::{self, map_album_row, ALBUM_COLUMNS};
use crate::error::{AppError, Result};
use crate::AppState;

/// Query parameters for listing albums.
#[derive(Debug, Deserialize)]
pub struct ListAlbumsQuery {
    pub artist_id: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub artist_id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub release_date: Option<String>,
    /// Catalog id; an album already imported under it is returned instead.
    pub itunes_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAlbumRequest {
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub release_date: Option<String>,
}

/// Album with its tracks in track order.
#[derive(Debug, Serialize)]
pub struct AlbumWithTracks {
    #[serde(flatten)]
    pub album: Album,
    pub tracks: Vec<Track>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/albums", get(list_albums).post(create_album))
        .route(
            "/albums/:id",
            get(get_album).patch(update_album).delete(delete_album),
        )
}

/// GET /api/albums
pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<ListAlbumsQuery>,
) -> Result<Json<PaginatedResponse<Album>>> {
    let (page, limit, offset) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve();

    let db = state.db.lock().await;

    let total: u64 = db.query_row(
        "SELECT COUNT(*) FROM albums al WHERE (?1 IS NULL OR al.artist_id = ?1)",
        [query.artist_id],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(&format!(
        r#"
        SELECT {} FROM albums al
        WHERE (?1 IS NULL OR al.artist_id = ?1)
        ORDER BY al.release_date DESC, al.id DESC
        LIMIT ?2 OFFSET ?3
        "#,
        ALBUM_COLUMNS
    ))?;

    let items = stmt
        .query_map(
            rusqlite::params![query.artist_id, limit, offset],
            map_album_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, page, limit)))
}

/// POST /api/albums
pub async fn create_album(
    State(state): State<AppState>,
    Json(body): Json<CreateAlbumRequest>,
) -> Result<Json<Album>> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Album name is required".to_string()));
    }

    let artist = {
        let db = state.db.lock().await;
        queries::get_artist(&db, body.artist_id)?
    };

    if let Some(itunes_id) = body.itunes_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let (album, _) = state
            .importer()
            .ensure_album(
                &artist,
                itunes_id,
                name,
                body.image_url.as_deref(),
                body.release_date.as_deref(),
            )
            .await?;
        return Ok(Json(album));
    }

    let db = state.db.lock().await;
    db.execute(
        "INSERT INTO albums (artist_id, name, image_url, release_date) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![artist.id, name, body.image_url, body.release_date],
    )?;
    let album = queries::get_album(&db, db.last_insert_rowid())?;

    tracing::info!(album_id = album.id, artist_id = artist.id, "Album created");

    Ok(Json(album))
}

/// GET /api/albums/:id
pub async fn get_album(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
) -> Result<Json<AlbumWithTracks>> {
    let db = state.db.lock().await;

    let album = queries::get_album(&db, album_id)?;
    let tracks = queries::list_tracks_for_album(&db, album_id)?;

    Ok(Json(AlbumWithTracks { album, tracks }))
}

/// PATCH /api/albums/:id
pub async fn update_album(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
    Json(body): Json<UpdateAlbumRequest>,
) -> Result<Json<Album>> {
    let db = state.db.lock().await;

    queries::get_album(&db, album_id)?;

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Album name cannot be empty".to_string()));
        }
        updates.push("name = ?");
        params.push(Box::new(name.to_string()));
    }

    if let Some(ref image_url) = body.image_url {
        updates.push("image_url = ?");
        params.push(Box::new(image_url.clone()));
    }

    if let Some(ref release_date) = body.release_date {
        updates.push("release_date = ?");
        params.push(Box::new(release_date.clone()));
    }

    if updates.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    updates.push("updated_at = datetime('now')");
    let query = format!("UPDATE albums SET {} WHERE id = ?", updates.join(", "));
    params.push(Box::new(album_id));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    db.execute(&query, param_refs.as_slice())?;

    let album = queries::get_album(&db, album_id)?;

    tracing::info!(album_id = album.id, "Album updated");

    Ok(Json(album))
}

/// DELETE /api/albums/:id
pub async fn delete_album(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    queries::get_album(&db, album_id)?;

    // CASCADE removes tracks, their statuses, post logs and sources
    db.execute("DELETE FROM albums WHERE id = ?1", [album_id])?;

    tracing::info!(album_id = album_id, "Album deleted");

    Ok(Json(SuccessResponse::with_message("Album deleted successfully")))
}
