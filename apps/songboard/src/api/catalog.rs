//! Catalog search and import endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::SourceKind;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::services::catalog::{CatalogAlbum, CatalogArtist, CatalogTrack, EntityKind};
use crate::services::{AlbumImport, TrackImport};
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: u32 = 25;
const MAX_SEARCH_LIMIT: u32 = 200;

/// Query parameters for catalog search.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub term: Option<String>,
    /// `artist`, `album` or `track` (default).
    pub entity: Option<EntityKind>,
    pub limit: Option<u32>,
}

/// A search hit with whether it is already in the library.
#[derive(Debug, Serialize)]
pub struct Hit<T> {
    #[serde(flatten)]
    pub item: T,
    pub imported: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub artists: Vec<Hit<CatalogArtist>>,
    pub albums: Vec<Hit<CatalogAlbum>>,
    pub tracks: Vec<Hit<CatalogTrack>>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/catalog/search", get(search))
        .route("/catalog/albums/:itunes_id/import", post(import_album))
        .route("/catalog/tracks/:itunes_id/import", post(import_track))
}

/// GET /api/catalog/search
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let term = params.term.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Err(AppError::BadRequest("Search term is required".to_string()));
    }
    let entity = params.entity.unwrap_or(EntityKind::Track);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let results = state.catalog.search(term, entity, limit).await?;

    tracing::debug!(
        term = %term,
        artists = results.artists.len(),
        albums = results.albums.len(),
        tracks = results.tracks.len(),
        "Catalog search"
    );

    let db = state.db.lock().await;
    let imported = |kind: SourceKind, ids: Vec<String>| queries::existing_source_ids(&db, kind, &ids);

    let artist_ids = imported(
        SourceKind::Artist,
        results.artists.iter().map(|a| a.id.clone()).collect(),
    )?;
    let album_ids = imported(
        SourceKind::Album,
        results.albums.iter().map(|a| a.id.clone()).collect(),
    )?;
    let track_ids = imported(
        SourceKind::Track,
        results.tracks.iter().map(|t| t.id.clone()).collect(),
    )?;

    Ok(Json(SearchResponse {
        artists: results
            .artists
            .into_iter()
            .map(|item| Hit {
                imported: artist_ids.contains(&item.id),
                item,
            })
            .collect(),
        albums: results
            .albums
            .into_iter()
            .map(|item| Hit {
                imported: album_ids.contains(&item.id),
                item,
            })
            .collect(),
        tracks: results
            .tracks
            .into_iter()
            .map(|item| Hit {
                imported: track_ids.contains(&item.id),
                item,
            })
            .collect(),
    }))
}

/// POST /api/catalog/albums/:itunes_id/import
///
/// Imports an album with every track. Safe to repeat.
pub async fn import_album(
    State(state): State<AppState>,
    Path(itunes_id): Path<String>,
) -> Result<Json<AlbumImport>> {
    let import = state.importer().import_album(itunes_id.trim()).await?;
    Ok(Json(import))
}

/// POST /api/catalog/tracks/:itunes_id/import
///
/// Imports a single track with its artist and album.
pub async fn import_track(
    State(state): State<AppState>,
    Path(itunes_id): Path<String>,
) -> Result<Json<TrackImport>> {
    let import = state.importer().import_track(itunes_id.trim()).await?;
    Ok(Json(import))
}
