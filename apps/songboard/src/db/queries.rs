//! Row mappers and lookups shared by the API handlers and the import services.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};

use super::models::{
    Album, Artist, Playlist, PlaylistTrack, PostLog, SourceKind, Track, TrackStatus,
    TrackStatusKind,
};
use crate::error::{AppError, Result};

pub const ARTIST_COLUMNS: &str =
    "a.id, a.name, a.image_url, a.itunes_id, a.sync_enabled, a.created_at, a.updated_at";

pub const ALBUM_COLUMNS: &str = "al.id, al.artist_id, al.name, al.image_url, al.itunes_id, \
     al.release_date, al.created_at, al.updated_at";

pub const TRACK_COLUMNS: &str = "t.id, t.album_id, t.artist_id, t.name, t.duration_ms, \
     t.track_number, t.note, t.itunes_id, t.created_at, t.updated_at";

const STATUS_COLUMNS: &str = "id, track_id, status, starred, ignored, updated_at";

/// SQLite's default limit on bound parameters is 999.
const MAX_IN_PARAMS: usize = 500;

// =============================================================================
// Row mappers
// =============================================================================

pub fn map_artist_row(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        image_url: row.get(2)?,
        itunes_id: row.get(3)?,
        sync_enabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn map_album_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        artist_id: row.get(1)?,
        name: row.get(2)?,
        image_url: row.get(3)?,
        itunes_id: row.get(4)?,
        release_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn map_track_row(row: &rusqlite::Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        album_id: row.get(1)?,
        artist_id: row.get(2)?,
        name: row.get(3)?,
        duration_ms: row.get(4)?,
        track_number: row.get(5)?,
        note: row.get(6)?,
        itunes_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn map_status_row(row: &rusqlite::Row) -> rusqlite::Result<TrackStatus> {
    let status_str: String = row.get(2)?;
    // The CHECK constraint keeps unknown values out; fall back to idea regardless.
    let status = status_str.parse().unwrap_or(TrackStatusKind::Idea);

    Ok(TrackStatus {
        id: row.get(0)?,
        track_id: row.get(1)?,
        status,
        starred: row.get(3)?,
        ignored: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn map_post_log_row(row: &rusqlite::Row) -> rusqlite::Result<PostLog> {
    Ok(PostLog {
        id: row.get(0)?,
        track_status_id: row.get(1)?,
        platform: row.get(2)?,
        url: row.get(3)?,
        posted_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn map_playlist_row(row: &rusqlite::Row) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn map_playlist_track_row(row: &rusqlite::Row) -> rusqlite::Result<PlaylistTrack> {
    Ok(PlaylistTrack {
        id: row.get(0)?,
        playlist_id: row.get(1)?,
        track_id: row.get(2)?,
        position: row.get(3)?,
    })
}

/// Maps `QueryReturnedNoRows` to a 404 for the named entity.
pub fn not_found(entity: &'static str) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("{} not found", entity)),
        _ => AppError::Sqlite(e),
    }
}

// =============================================================================
// Entity lookups
// =============================================================================

pub fn get_artist(conn: &Connection, artist_id: i64) -> Result<Artist> {
    conn.query_row(
        &format!("SELECT {} FROM artists a WHERE a.id = ?1", ARTIST_COLUMNS),
        [artist_id],
        map_artist_row,
    )
    .map_err(not_found("Artist"))
}

pub fn get_album(conn: &Connection, album_id: i64) -> Result<Album> {
    conn.query_row(
        &format!("SELECT {} FROM albums al WHERE al.id = ?1", ALBUM_COLUMNS),
        [album_id],
        map_album_row,
    )
    .map_err(not_found("Album"))
}

pub fn get_track(conn: &Connection, track_id: i64) -> Result<Track> {
    conn.query_row(
        &format!("SELECT {} FROM tracks t WHERE t.id = ?1", TRACK_COLUMNS),
        [track_id],
        map_track_row,
    )
    .map_err(not_found("Track"))
}

pub fn get_playlist(conn: &Connection, playlist_id: i64) -> Result<Playlist> {
    conn.query_row(
        "SELECT id, name, description, created_at, updated_at FROM playlists WHERE id = ?1",
        [playlist_id],
        map_playlist_row,
    )
    .map_err(not_found("Playlist"))
}

pub fn list_albums_for_artist(conn: &Connection, artist_id: i64) -> Result<Vec<Album>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM albums al WHERE al.artist_id = ?1 ORDER BY al.release_date DESC, al.id",
        ALBUM_COLUMNS
    ))?;
    let albums = stmt
        .query_map([artist_id], map_album_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(albums)
}

pub fn list_tracks_for_album(conn: &Connection, album_id: i64) -> Result<Vec<Track>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tracks t WHERE t.album_id = ?1 ORDER BY t.track_number, t.id",
        TRACK_COLUMNS
    ))?;
    let tracks = stmt
        .query_map([album_id], map_track_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tracks)
}

// =============================================================================
// Sources
// =============================================================================

pub fn find_artist_by_source(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Artist>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM sources s JOIN artists a ON a.id = s.artist_id \
             WHERE s.source_type = 'artist' AND s.external_id = ?1",
            ARTIST_COLUMNS
        ),
        [external_id],
        map_artist_row,
    )
    .optional()
}

pub fn find_album_by_source(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Album>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM sources s JOIN albums al ON al.id = s.album_id \
             WHERE s.source_type = 'album' AND s.external_id = ?1",
            ALBUM_COLUMNS
        ),
        [external_id],
        map_album_row,
    )
    .optional()
}

pub fn find_track_by_source(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Track>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM sources s JOIN tracks t ON t.id = s.track_id \
             WHERE s.source_type = 'track' AND s.external_id = ?1",
            TRACK_COLUMNS
        ),
        [external_id],
        map_track_row,
    )
    .optional()
}

/// Returns the subset of `external_ids` that already have a source row of `kind`.
pub fn existing_source_ids(
    conn: &Connection,
    kind: SourceKind,
    external_ids: &[String],
) -> rusqlite::Result<HashSet<String>> {
    let mut found = HashSet::new();

    for chunk in external_ids.chunks(MAX_IN_PARAMS) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT external_id FROM sources WHERE source_type = ? AND external_id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let params = std::iter::once(kind.as_str()).chain(chunk.iter().map(String::as_str));
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            row.get::<_, String>(0)
        })?;
        for row in rows {
            found.insert(row?);
        }
    }

    Ok(found)
}

pub fn insert_source(
    conn: &Connection,
    kind: SourceKind,
    external_id: &str,
    entity_id: i64,
) -> rusqlite::Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO sources (source_type, external_id, {}) VALUES (?1, ?2, ?3)",
            kind.column()
        ),
        params![kind.as_str(), external_id, entity_id],
    )?;
    Ok(conn.last_insert_rowid())
}

// =============================================================================
// Track status
// =============================================================================

pub fn find_track_status(conn: &Connection, track_id: i64) -> rusqlite::Result<Option<TrackStatus>> {
    conn.query_row(
        &format!("SELECT {} FROM track_statuses WHERE track_id = ?1", STATUS_COLUMNS),
        [track_id],
        map_status_row,
    )
    .optional()
}

/// Returns the status row for a track, creating a default one when absent.
pub fn ensure_track_status(conn: &Connection, track_id: i64) -> rusqlite::Result<TrackStatus> {
    conn.execute(
        "INSERT INTO track_statuses (track_id) VALUES (?1) ON CONFLICT(track_id) DO NOTHING",
        [track_id],
    )?;
    conn.query_row(
        &format!("SELECT {} FROM track_statuses WHERE track_id = ?1", STATUS_COLUMNS),
        [track_id],
        map_status_row,
    )
}

pub fn list_post_logs(conn: &Connection, track_status_id: i64) -> rusqlite::Result<Vec<PostLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, track_status_id, platform, url, posted_at, created_at
         FROM post_logs WHERE track_status_id = ?1
         ORDER BY posted_at DESC, id DESC",
    )?;
    let logs = stmt
        .query_map([track_status_id], map_post_log_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}
