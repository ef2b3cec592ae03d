//! Artist endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{PaginatedResponse, Pagination, SuccessResponse};
use crate::db::models::{Album, Artist};
use crate::db::queries::{self, map_artist_row, ARTIST_COLUMNS};
use crate::error::{AppError, Result};
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for listing artists.
#[derive(Debug, Deserialize)]
pub struct ListArtistsQuery {
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
    /// Filter by sync flag.
    pub sync_enabled: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Request body for creating an artist by hand.
#[derive(Debug, Deserialize)]
pub struct CreateArtistRequest {
    pub name: String,
    pub image_url: Option<String>,
    /// Catalog id; an artist already imported under it is returned instead.
    pub itunes_id: Option<String>,
    pub sync_enabled: Option<bool>,
}

/// Request body for updating an artist.
#[derive(Debug, Deserialize)]
pub struct UpdateArtistRequest {
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub sync_enabled: Option<bool>,
}

/// Artist with its albums.
#[derive(Debug, Serialize)]
pub struct ArtistWithAlbums {
    #[serde(flatten)]
    pub artist: Artist,
    pub albums: Vec<Album>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/artists", get(list_artists).post(create_artist))
        .route(
            "/artists/:id",
            get(get_artist).patch(update_artist).delete(delete_artist),
        )
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/artists
pub async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<ListArtistsQuery>,
) -> Result<Json<PaginatedResponse<Artist>>> {
    let (page, limit, offset) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve();
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let db = state.db.lock().await;

    let total: u64 = db.query_row(
        r#"
        SELECT COUNT(*) FROM artists a
        WHERE (?1 IS NULL OR a.name LIKE '%' || ?1 || '%')
          AND (?2 IS NULL OR a.sync_enabled = ?2)
        "#,
        rusqlite::params![search, query.sync_enabled],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(&format!(
        r#"
        SELECT {} FROM artists a
        WHERE (?1 IS NULL OR a.name LIKE '%' || ?1 || '%')
          AND (?2 IS NULL OR a.sync_enabled = ?2)
        ORDER BY a.name COLLATE NOCASE, a.id
        LIMIT ?3 OFFSET ?4
        "#,
        ARTIST_COLUMNS
    ))?;

    let items = stmt
        .query_map(
            rusqlite::params![search, query.sync_enabled, limit, offset],
            map_artist_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, page, limit)))
}

/// POST /api/artists
///
/// Creates an artist. With an `itunes_id` this goes through the importer so
/// the catalog id stays unique.
pub async fn create_artist(
    State(state): State<AppState>,
    Json(body): Json<CreateArtistRequest>,
) -> Result<Json<Artist>> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Artist name is required".to_string()));
    }
    let sync_enabled = body.sync_enabled.unwrap_or(true);

    if let Some(itunes_id) = body.itunes_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let artist = state
            .importer()
            .ensure_artist(itunes_id, name, body.image_url.as_deref(), sync_enabled)
            .await?;
        return Ok(Json(artist));
    }

    let db = state.db.lock().await;
    db.execute(
        "INSERT INTO artists (name, image_url, sync_enabled) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, body.image_url, sync_enabled],
    )?;
    let artist = queries::get_artist(&db, db.last_insert_rowid())?;

    tracing::info!(artist_id = artist.id, name = %artist.name, "Artist created");

    Ok(Json(artist))
}

/// GET /api/artists/:id
pub async fn get_artist(
    State(state): State<AppState>,
    Path(artist_id): Path<i64>,
) -> Result<Json<ArtistWithAlbums>> {
    let db = state.db.lock().await;

    let artist = queries::get_artist(&db, artist_id)?;
    let albums = queries::list_albums_for_artist(&db, artist_id)?;

    Ok(Json(ArtistWithAlbums { artist, albums }))
}

/// PATCH /api/artists/:id
pub async fn update_artist(
    State(state): State<AppState>,
    Path(artist_id): Path<i64>,
    Json(body): Json<UpdateArtistRequest>,
) -> Result<Json<Artist>> {
    let db = state.db.lock().await;

    queries::get_artist(&db, artist_id)?;

    // Build dynamic UPDATE query
    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Artist name cannot be empty".to_string()));
        }
        updates.push("name = ?");
        params.push(Box::new(name.to_string()));
    }

    if let Some(ref image_url) = body.image_url {
        updates.push("image_url = ?");
        params.push(Box::new(image_url.clone()));
    }

    if let Some(sync_enabled) = body.sync_enabled {
        updates.push("sync_enabled = ?");
        params.push(Box::new(sync_enabled));
    }

    if updates.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    updates.push("updated_at = datetime('now')");
    let query = format!("UPDATE artists SET {} WHERE id = ?", updates.join(", "));
    params.push(Box::new(artist_id));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    db.execute(&query, param_refs.as_slice())?;

    let artist = queries::get_artist(&db, artist_id)?;

    tracing::info!(artist_id = artist.id, "Artist updated");

    Ok(Json(artist))
}

/// DELETE /api/artists/:id
///
/// Removes the artist with its albums, tracks, statuses, post logs and sources.
pub async fn delete_artist(
    State(state): State<AppState>,
    Path(artist_id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    queries::get_artist(&db, artist_id)?;

    // CASCADE handles albums, tracks and everything hanging off them
    db.execute("DELETE FROM artists WHERE id = ?1", [artist_id])?;

    tracing::info!(artist_id = artist_id, "Artist deleted");

    Ok(Json(SuccessResponse::with_message("Artist deleted successfully")))
}
