//! Track endpoints, including workflow status and post logs.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PaginatedResponse, Pagination, SuccessResponse};
use crate::db::models::{PostLog, Track, TrackStatus, TrackStatusKind};
use crate::db::queries::{self, map_post_log_row, map_track_row, TRACK_COLUMNS};
use crate::error::{AppError, Result};
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for listing tracks.
#[derive(Debug, Deserialize)]
pub struct ListTracksQuery {
    pub album_id: Option<i64>,
    /// Matches tracks of the artist directly or through their album.
    pub artist_id: Option<i64>,
    pub status: Option<TrackStatusKind>,
    pub starred: Option<bool>,
    pub ignored: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTrackRequest {
    pub name: String,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub duration_ms: Option<i64>,
    pub track_number: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrackRequest {
    pub name: Option<String>,
    /// An empty string clears the note.
    pub note: Option<String>,
    pub album_id: Option<i64>,
    pub duration_ms: Option<i64>,
    pub track_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<TrackStatusKind>,
    pub starred: Option<bool>,
    pub ignored: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub platform: String,
    pub url: Option<String>,
    /// Defaults to now.
    pub posted_at: Option<String>,
}

/// Status of a track as seen by clients; tracks without a status row read as idea.
#[derive(Debug, Serialize)]
pub struct StatusView {
    pub track_id: i64,
    pub status: TrackStatusKind,
    pub starred: bool,
    pub ignored: bool,
}

impl StatusView {
    fn of(track_id: i64, status: Option<TrackStatus>) -> Self {
        match status {
            Some(s) => Self {
                track_id,
                status: s.status,
                starred: s.starred,
                ignored: s.ignored,
            },
            None => Self {
                track_id,
                status: TrackStatusKind::default(),
                starred: false,
                ignored: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrackListItem {
    #[serde(flatten)]
    pub track: Track,
    pub status: TrackStatusKind,
    pub starred: bool,
    pub ignored: bool,
}

#[derive(Debug, Serialize)]
pub struct TrackDetail {
    #[serde(flatten)]
    pub track: Track,
    pub status: StatusView,
    pub posts: Vec<PostLog>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tracks", get(list_tracks).post(create_track))
        .route(
            "/tracks/:id",
            get(get_track).patch(update_track).delete(delete_track),
        )
        .route("/tracks/:id/status", get(get_status).patch(update_status))
        .route("/tracks/:id/posts", get(list_posts).post(create_post))
        .route("/posts/:id", delete(delete_post))
}

// =============================================================================
// Track Handlers
// =============================================================================

/// GET /api/tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<ListTracksQuery>,
) -> Result<Json<PaginatedResponse<TrackListItem>>> {
    let (page, limit, offset) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve();
    let status = query.status.map(|s| s.as_str());

    let filter = r#"
        FROM tracks t
        LEFT JOIN track_statuses ts ON ts.track_id = t.id
        WHERE (?1 IS NULL OR t.album_id = ?1)
          AND (?2 IS NULL OR t.artist_id = ?2
               OR t.album_id IN (SELECT id FROM albums WHERE artist_id = ?2))
          AND (?3 IS NULL OR COALESCE(ts.status, 'idea') = ?3)
          AND (?4 IS NULL OR COALESCE(ts.starred, 0) = ?4)
          AND (?5 IS NULL OR COALESCE(ts.ignored, 0) = ?5)
    "#;

    let db = state.db.lock().await;

    let total: u64 = db.query_row(
        &format!("SELECT COUNT(*) {}", filter),
        rusqlite::params![
            query.album_id,
            query.artist_id,
            status,
            query.starred,
            query.ignored
        ],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(&format!(
        "SELECT {}, COALESCE(ts.status, 'idea'), COALESCE(ts.starred, 0), COALESCE(ts.ignored, 0)
         {}
         ORDER BY t.album_id, t.track_number, t.id
         LIMIT ?6 OFFSET ?7",
        TRACK_COLUMNS, filter
    ))?;

    let items = stmt
        .query_map(
            rusqlite::params![
                query.album_id,
                query.artist_id,
                status,
                query.starred,
                query.ignored,
                limit,
                offset,
            ],
            |row| {
                let status: String = row.get(10)?;
                Ok(TrackListItem {
                    track: map_track_row(row)?,
                    status: status.parse().unwrap_or_default(),
                    starred: row.get(11)?,
                    ignored: row.get(12)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, page, limit)))
}

/// POST /api/tracks
///
/// Creates a track by hand together with its initial idea status.
pub async fn create_track(
    State(state): State<AppState>,
    Json(body): Json<CreateTrackRequest>,
) -> Result<Json<Track>> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Track name is required".to_string()));
    }

    let mut db = state.db.lock().await;

    let artist_id = match body.album_id {
        Some(album_id) => {
            let album = queries::get_album(&db, album_id)?;
            if body.artist_id.is_some_and(|id| id != album.artist_id) {
                return Err(AppError::BadRequest(
                    "artist_id does not match the album's artist".to_string(),
                ));
            }
            Some(album.artist_id)
        }
        None => match body.artist_id {
            Some(artist_id) => Some(queries::get_artist(&db, artist_id)?.id),
            None => None,
        },
    };

    let tx = db.transaction()?;
    tx.execute(
        "INSERT INTO tracks (album_id, artist_id, name, duration_ms, track_number, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            body.album_id,
            artist_id,
            name,
            body.duration_ms,
            body.track_number,
            body.note
        ],
    )?;
    let track_id = tx.last_insert_rowid();
    tx.execute("INSERT INTO track_statuses (track_id) VALUES (?1)", [track_id])?;
    tx.commit()?;

    let track = queries::get_track(&db, track_id)?;

    tracing::info!(track_id = track.id, album_id = ?track.album_id, "Track created");

    Ok(Json(track))
}

/// GET /api/tracks/:id
pub async fn get_track(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<Json<TrackDetail>> {
    let db = state.db.lock().await;

    let track = queries::get_track(&db, track_id)?;
    let status = queries::find_track_status(&db, track_id)?;
    let posts = match &status {
        Some(s) => queries::list_post_logs(&db, s.id)?,
        None => Vec::new(),
    };

    Ok(Json(TrackDetail {
        track,
        status: StatusView::of(track_id, status),
        posts,
    }))
}

/// PATCH /api/tracks/:id
pub async fn update_track(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(body): Json<UpdateTrackRequest>,
) -> Result<Json<Track>> {
    let db = state.db.lock().await;

    queries::get_track(&db, track_id)?;

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Track name cannot be empty".to_string()));
        }
        updates.push("name = ?");
        params.push(Box::new(name.to_string()));
    }

    if let Some(ref note) = body.note {
        updates.push("note = ?");
        params.push(Box::new(if note.is_empty() { None } else { Some(note.clone()) }));
    }

    if let Some(album_id) = body.album_id {
        // Moving a track also moves its denormalized artist
        let album = queries::get_album(&db, album_id)?;
        updates.push("album_id = ?");
        params.push(Box::new(album.id));
        updates.push("artist_id = ?");
        params.push(Box::new(album.artist_id));
    }

    if let Some(duration_ms) = body.duration_ms {
        updates.push("duration_ms = ?");
        params.push(Box::new(duration_ms));
    }

    if let Some(track_number) = body.track_number {
        updates.push("track_number = ?");
        params.push(Box::new(track_number));
    }

    if updates.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    updates.push("updated_at = datetime('now')");
    let query = format!("UPDATE tracks SET {} WHERE id = ?", updates.join(", "));
    params.push(Box::new(track_id));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    db.execute(&query, param_refs.as_slice())?;

    let track = queries::get_track(&db, track_id)?;

    tracing::info!(track_id = track.id, "Track updated");

    Ok(Json(track))
}

/// DELETE /api/tracks/:id
pub async fn delete_track(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    queries::get_track(&db, track_id)?;

    // CASCADE removes status, post logs, playlist entries and source
    db.execute("DELETE FROM tracks WHERE id = ?1", [track_id])?;

    tracing::info!(track_id = track_id, "Track deleted");

    Ok(Json(SuccessResponse::with_message("Track deleted successfully")))
}

// =============================================================================
// Status Handlers
// =============================================================================

/// GET /api/tracks/:id/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<Json<StatusView>> {
    let db = state.db.lock().await;

    queries::get_track(&db, track_id)?;
    let status = queries::find_track_status(&db, track_id)?;

    Ok(Json(StatusView::of(track_id, status)))
}

/// PATCH /api/tracks/:id/status
///
/// Upserts the status row. Starring clears ignored and ignoring clears starred.
pub async fn update_status(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<TrackStatus>> {
    if body.status.is_none() && body.starred.is_none() && body.ignored.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    if body.starred == Some(true) && body.ignored == Some(true) {
        return Err(AppError::BadRequest(
            "A track cannot be starred and ignored at the same time".to_string(),
        ));
    }

    let mut db = state.db.lock().await;

    queries::get_track(&db, track_id)?;

    let tx = db.transaction()?;
    let current = queries::ensure_track_status(&tx, track_id)?;
    let (status, starred, ignored) = resolve_status(&current, &body);
    tx.execute(
        "UPDATE track_statuses
         SET status = ?1, starred = ?2, ignored = ?3, updated_at = datetime('now')
         WHERE id = ?4",
        rusqlite::params![status.as_str(), starred, ignored, current.id],
    )?;
    tx.commit()?;

    let updated = queries::ensure_track_status(&db, track_id)?;

    tracing::info!(
        track_id = track_id,
        status = %updated.status,
        starred = updated.starred,
        ignored = updated.ignored,
        "Track status updated"
    );

    Ok(Json(updated))
}

/// New `(status, starred, ignored)` after applying `request` to `current`.
fn resolve_status(
    current: &TrackStatus,
    request: &UpdateStatusRequest,
) -> (TrackStatusKind, bool, bool) {
    let status = request.status.unwrap_or(current.status);
    let mut starred = request.starred.unwrap_or(current.starred);
    let mut ignored = request.ignored.unwrap_or(current.ignored);

    if request.starred == Some(true) {
        ignored = false;
    }
    if request.ignored == Some(true) {
        starred = false;
    }

    (status, starred, ignored)
}

// =============================================================================
// Post Log Handlers
// =============================================================================

/// GET /api/tracks/:id/posts
pub async fn list_posts(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<Json<Vec<PostLog>>> {
    let db = state.db.lock().await;

    queries::get_track(&db, track_id)?;
    let posts = match queries::find_track_status(&db, track_id)? {
        Some(status) => queries::list_post_logs(&db, status.id)?,
        None => Vec::new(),
    };

    Ok(Json(posts))
}

/// POST /api/tracks/:id/posts
///
/// Records a post and moves the track to `posted`.
pub async fn create_post(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(body): Json<CreatePostRequest>,
) -> Result<Json<PostLog>> {
    let platform = body.platform.trim();
    if platform.is_empty() {
        return Err(AppError::BadRequest("Platform is required".to_string()));
    }

    let posted_at = body.posted_at.as_deref().map(parse_posted_at).transpose()?;

    let mut db = state.db.lock().await;

    queries::get_track(&db, track_id)?;

    let tx = db.transaction()?;
    let status = queries::ensure_track_status(&tx, track_id)?;
    tx.execute(
        "UPDATE track_statuses SET status = 'posted', updated_at = datetime('now') WHERE id = ?1",
        [status.id],
    )?;
    tx.execute(
        "INSERT INTO post_logs (track_status_id, platform, url, posted_at)
         VALUES (?1, ?2, ?3, COALESCE(?4, datetime('now')))",
        rusqlite::params![status.id, platform, body.url, posted_at],
    )?;
    let post = tx.query_row(
        "SELECT id, track_status_id, platform, url, posted_at, created_at
         FROM post_logs WHERE id = ?1",
        [tx.last_insert_rowid()],
        map_post_log_row,
    )?;
    tx.commit()?;

    tracing::info!(
        track_id = track_id,
        post_id = post.id,
        platform = %post.platform,
        "Post recorded"
    );

    Ok(Json(post))
}

/// Normalizes an RFC 3339 or `YYYY-MM-DD HH:MM:SS` timestamp to SQLite's UTC format.
fn parse_posted_at(raw: &str) -> Result<String> {
    const SQLITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).format(SQLITE_FORMAT).to_string())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, SQLITE_FORMAT)
                .map(|dt| dt.format(SQLITE_FORMAT).to_string())
        })
        .map_err(|_| AppError::BadRequest(format!("Invalid posted_at timestamp: {}", raw)))
}

/// DELETE /api/posts/:id
///
/// The track keeps its status.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    let deleted = db.execute("DELETE FROM post_logs WHERE id = ?1", [post_id])?;
    if deleted == 0 {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    tracing::info!(post_id = post_id, "Post deleted");

    Ok(Json(SuccessResponse::with_message("Post deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(starred: bool, ignored: bool) -> TrackStatus {
        TrackStatus {
            id: 1,
            track_id: 1,
            status: TrackStatusKind::Ready,
            starred,
            ignored,
            updated_at: String::new(),
        }
    }

    fn request(starred: Option<bool>, ignored: Option<bool>) -> UpdateStatusRequest {
        UpdateStatusRequest {
            status: None,
            starred,
            ignored,
        }
    }

    #[test]
    fn test_starring_clears_ignored() {
        let (_, starred, ignored) = resolve_status(&status(false, true), &request(Some(true), None));
        assert!(starred);
        assert!(!ignored);
    }

    #[test]
    fn test_ignoring_clears_starred() {
        let (_, starred, ignored) = resolve_status(&status(true, false), &request(None, Some(true)));
        assert!(!starred);
        assert!(ignored);
    }

    #[test]
    fn test_unstarring_leaves_ignored_alone() {
        let (kind, starred, ignored) =
            resolve_status(&status(true, false), &request(Some(false), None));
        assert_eq!(kind, TrackStatusKind::Ready);
        assert!(!starred);
        assert!(!ignored);
    }

    #[test]
    fn test_parse_posted_at() {
        assert_eq!(
            parse_posted_at("2024-05-01T10:30:00+02:00").unwrap(),
            "2024-05-01 08:30:00"
        );
        assert_eq!(
            parse_posted_at("2024-05-01 10:30:00").unwrap(),
            "2024-05-01 10:30:00"
        );
        assert!(parse_posted_at("yesterday").is_err());
    }

    #[test]
    fn test_status_view_defaults_to_idea() {
        let view = StatusView::of(7, None);
        assert_eq!(view.status, TrackStatusKind::Idea);
        assert!(!view.starred && !view.ignored);
    }
}
