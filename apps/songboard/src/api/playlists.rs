//! Playlist endpoints.
//!
//! Entries keep an explicit `order`; appends take the current maximum plus one
//! and removals leave gaps.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::SuccessResponse;
use crate::db::models::{Playlist, PlaylistTrack, Track};
use crate::db::is_unique_violation;
use crate::db::queries::{
    self, map_playlist_row, map_playlist_track_row, map_track_row, TRACK_COLUMNS,
};
use crate::error::{AppError, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddTrackRequest {
    pub track_id: i64,
}

/// The complete new order of a playlist.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub track_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistSummary {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub track_count: i64,
}

#[derive(Debug, Serialize)]
pub struct PlaylistEntry {
    pub order: i64,
    pub track: Track,
}

#[derive(Debug, Serialize)]
pub struct PlaylistDetail {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub tracks: Vec<PlaylistEntry>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/playlists", get(list_playlists).post(create_playlist))
        .route(
            "/playlists/:id",
            get(get_playlist).patch(update_playlist).delete(delete_playlist),
        )
        .route(
            "/playlists/:id/tracks",
            axum::routing::post(add_track).put(reorder_tracks),
        )
        .route("/playlists/:id/tracks/:track_id", delete(remove_track))
}

/// GET /api/playlists
pub async fn list_playlists(State(state): State<AppState>) -> Result<Json<Vec<PlaylistSummary>>> {
    let db = state.db.lock().await;

    let mut stmt = db.prepare(
        r#"
        SELECT p.id, p.name, p.description, p.created_at, p.updated_at,
               (SELECT COUNT(*) FROM playlist_tracks pt WHERE pt.playlist_id = p.id)
        FROM playlists p
        ORDER BY p.name COLLATE NOCASE, p.id
        "#,
    )?;

    let playlists = stmt
        .query_map([], |row| {
            Ok(PlaylistSummary {
                playlist: map_playlist_row(row)?,
                track_count: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(playlists))
}

/// POST /api/playlists
pub async fn create_playlist(
    State(state): State<AppState>,
    Json(body): Json<CreatePlaylistRequest>,
) -> Result<Json<Playlist>> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Playlist name is required".to_string()));
    }

    let db = state.db.lock().await;
    db.execute(
        "INSERT INTO playlists (name, description) VALUES (?1, ?2)",
        rusqlite::params![name, body.description],
    )?;
    let playlist = queries::get_playlist(&db, db.last_insert_rowid())?;

    tracing::info!(playlist_id = playlist.id, name = %playlist.name, "Playlist created");

    Ok(Json(playlist))
}

/// GET /api/playlists/:id
pub async fn get_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
) -> Result<Json<PlaylistDetail>> {
    let db = state.db.lock().await;
    Ok(Json(load_detail(&db, playlist_id)?))
}

/// PATCH /api/playlists/:id
pub async fn update_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
    Json(body): Json<UpdatePlaylistRequest>,
) -> Result<Json<Playlist>> {
    let db = state.db.lock().await;

    queries::get_playlist(&db, playlist_id)?;

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Playlist name cannot be empty".to_string()));
        }
        updates.push("name = ?");
        params.push(Box::new(name.to_string()));
    }

    if let Some(ref description) = body.description {
        updates.push("description = ?");
        params.push(Box::new(description.clone()));
    }

    if updates.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    updates.push("updated_at = datetime('now')");
    let query = format!("UPDATE playlists SET {} WHERE id = ?", updates.join(", "));
    params.push(Box::new(playlist_id));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    db.execute(&query, param_refs.as_slice())?;

    let playlist = queries::get_playlist(&db, playlist_id)?;

    tracing::info!(playlist_id = playlist.id, "Playlist updated");

    Ok(Json(playlist))
}

/// DELETE /api/playlists/:id
///
/// Tracks stay in the library; only the entries go.
pub async fn delete_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    queries::get_playlist(&db, playlist_id)?;
    db.execute("DELETE FROM playlists WHERE id = ?1", [playlist_id])?;

    tracing::info!(playlist_id = playlist_id, "Playlist deleted");

    Ok(Json(SuccessResponse::with_message("Playlist deleted successfully")))
}

/// POST /api/playlists/:id/tracks
///
/// Appends a track after the current last entry.
pub async fn add_track(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
    Json(body): Json<AddTrackRequest>,
) -> Result<Json<PlaylistTrack>> {
    let db = state.db.lock().await;

    queries::get_playlist(&db, playlist_id)?;
    queries::get_track(&db, body.track_id)?;

    let inserted = db.execute(
        r#"
        INSERT INTO playlist_tracks (playlist_id, track_id, position)
        SELECT ?1, ?2, COALESCE(MAX(position), -1) + 1
        FROM playlist_tracks WHERE playlist_id = ?1
        "#,
        rusqlite::params![playlist_id, body.track_id],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::BadRequest(
                "Track is already in the playlist".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    let entry = db.query_row(
        "SELECT id, playlist_id, track_id, position FROM playlist_tracks WHERE id = ?1",
        [db.last_insert_rowid()],
        map_playlist_track_row,
    )?;

    tracing::info!(
        playlist_id = playlist_id,
        track_id = body.track_id,
        order = entry.position,
        "Track added to playlist"
    );

    Ok(Json(entry))
}

/// PUT /api/playlists/:id/tracks
///
/// Rewrites the order. The body must list every track of the playlist exactly once.
pub async fn reorder_tracks(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<PlaylistDetail>> {
    let mut db = state.db.lock().await;

    queries::get_playlist(&db, playlist_id)?;

    let current: HashSet<i64> = {
        let mut stmt = db.prepare("SELECT track_id FROM playlist_tracks WHERE playlist_id = ?1")?;
        let ids = stmt
            .query_map([playlist_id], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<i64>, _>>()?;
        ids
    };
    validate_reorder(&current, &body.track_ids)?;

    let tx = db.transaction()?;
    for (position, track_id) in body.track_ids.iter().enumerate() {
        tx.execute(
            "UPDATE playlist_tracks SET position = ?1 WHERE playlist_id = ?2 AND track_id = ?3",
            rusqlite::params![position as i64, playlist_id, track_id],
        )?;
    }
    tx.execute(
        "UPDATE playlists SET updated_at = datetime('now') WHERE id = ?1",
        [playlist_id],
    )?;
    tx.commit()?;

    tracing::info!(playlist_id = playlist_id, tracks = body.track_ids.len(), "Playlist reordered");

    Ok(Json(load_detail(&db, playlist_id)?))
}

/// DELETE /api/playlists/:id/tracks/:track_id
pub async fn remove_track(
    State(state): State<AppState>,
    Path((playlist_id, track_id)): Path<(i64, i64)>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    queries::get_playlist(&db, playlist_id)?;

    let removed = db.execute(
        "DELETE FROM playlist_tracks WHERE playlist_id = ?1 AND track_id = ?2",
        [playlist_id, track_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound("Track is not in the playlist".to_string()));
    }

    tracing::info!(playlist_id = playlist_id, track_id = track_id, "Track removed from playlist");

    Ok(Json(SuccessResponse::with_message("Track removed from playlist")))
}

fn load_detail(conn: &rusqlite::Connection, playlist_id: i64) -> Result<PlaylistDetail> {
    let playlist = queries::get_playlist(conn, playlist_id)?;

    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {}, pt.position
        FROM playlist_tracks pt
        JOIN tracks t ON t.id = pt.track_id
        WHERE pt.playlist_id = ?1
        ORDER BY pt.position, pt.id
        "#,
        TRACK_COLUMNS
    ))?;

    let tracks = stmt
        .query_map([playlist_id], |row| {
            Ok(PlaylistEntry {
                track: map_track_row(row)?,
                order: row.get(10)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(PlaylistDetail { playlist, tracks })
}

/// A reorder must be a permutation of the current entries.
fn validate_reorder(current: &HashSet<i64>, requested: &[i64]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in requested {
        if !seen.insert(*id) {
            return Err(AppError::BadRequest(format!("Track {} listed twice", id)));
        }
        if !current.contains(id) {
            return Err(AppError::BadRequest(format!("Track {} is not in the playlist", id)));
        }
    }
    if seen.len() != current.len() {
        return Err(AppError::BadRequest(
            "Reorder must list every track of the playlist".to_string(),
        ));
    }
    Ok(())
}
