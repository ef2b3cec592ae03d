//! Catalog import and reconciliation.
//!
//! Guarantees at most one local artist, album and track per catalog id. The
//! `sources` table is the identity map; checks before inserts are an
//! optimization and the UNIQUE constraint on `(source_type, external_id)` is
//! what keeps concurrent imports from duplicating rows.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::models::{Album, Artist, SourceKind, Track};
use crate::db::{self, queries};
use crate::error::{AppError, Result};
use crate::services::batch::try_run_batched;
use crate::services::catalog::{CatalogClient, CatalogTrack};

const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Outcome of importing one catalog album.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumImport {
    pub artist: Artist,
    pub album: Album,
    pub created_album: bool,
    pub created_tracks: Vec<Track>,
}

impl AlbumImport {
    pub fn created_track_count(&self) -> usize {
        self.created_tracks.len()
    }
}

/// Outcome of importing one catalog track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackImport {
    pub artist: Artist,
    pub album: Album,
    pub track: Track,
    pub created: bool,
}

/// Creates local rows for catalog entities, never more than once per catalog id.
#[derive(Clone)]
pub struct Importer {
    db: Arc<Mutex<Connection>>,
    catalog: Arc<CatalogClient>,
    track_batch_size: usize,
}

impl Importer {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        catalog: Arc<CatalogClient>,
        track_batch_size: usize,
    ) -> Self {
        Self {
            db,
            catalog,
            track_batch_size: track_batch_size.max(1),
        }
    }

    /// Returns the artist imported for `external_id`, creating it when missing.
    ///
    /// An existing artist without an image gets `fallback_image`; an existing
    /// image is never replaced.
    pub async fn ensure_artist(
        &self,
        external_id: &str,
        fallback_name: &str,
        fallback_image: Option<&str>,
        sync_enabled: bool,
    ) -> Result<Artist> {
        let mut db = self.db.lock().await;

        if let Some(artist) = queries::find_artist_by_source(&db, external_id)? {
            return backfill_artist_image(&db, artist, fallback_image);
        }

        match insert_artist(&mut db, external_id, fallback_name, fallback_image, sync_enabled) {
            Ok(artist) => {
                tracing::info!(
                    artist_id = artist.id,
                    itunes_id = %external_id,
                    name = %artist.name,
                    "Artist imported"
                );
                Ok(artist)
            }
            Err(e) if db::is_unique_violation(&e) => {
                tracing::debug!(itunes_id = %external_id, "Artist created concurrently, reusing it");
                queries::find_artist_by_source(&db, external_id)?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "artist {} conflicts with a row that has no source",
                        external_id
                    ))
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the album imported for `external_id` and whether it was created now.
    pub async fn ensure_album(
        &self,
        artist: &Artist,
        external_id: &str,
        name: &str,
        image: Option<&str>,
        release_date: Option<&str>,
    ) -> Result<(Album, bool)> {
        let mut db = self.db.lock().await;

        if let Some(album) = queries::find_album_by_source(&db, external_id)? {
            return Ok((backfill_album_image(&db, album, image)?, false));
        }

        match insert_album(&mut db, artist.id, external_id, name, image, release_date) {
            Ok(album) => {
                tracing::info!(
                    album_id = album.id,
                    artist_id = artist.id,
                    itunes_id = %external_id,
                    name = %album.name,
                    "Album imported"
                );
                Ok((album, true))
            }
            Err(e) if db::is_unique_violation(&e) => {
                tracing::debug!(itunes_id = %external_id, "Album created concurrently, reusing it");
                let album = queries::find_album_by_source(&db, external_id)?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "album {} conflicts with a row that has no source",
                        external_id
                    ))
                })?;
                Ok((album, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Imports a catalog album with all of its tracks.
    pub async fn import_album(&self, external_album_id: &str) -> Result<AlbumImport> {
        self.import_album_for(external_album_id, None).await
    }

    /// Imports a catalog album, reusing `known_artist` instead of resolving
    /// the artist from the payload when the caller already has it.
    pub async fn import_album_for(
        &self,
        external_album_id: &str,
        known_artist: Option<&Artist>,
    ) -> Result<AlbumImport> {
        let payload = self
            .catalog
            .lookup_album_with_tracks(external_album_id)
            .await?
            .ok_or_else(|| {
                AppError::CatalogNotFound(format!("album {} not found", external_album_id))
            })?;
        let header = payload.album;

        let artist = match known_artist {
            Some(artist) => artist.clone(),
            None => {
                let artist_id = header.artist_id.as_deref().ok_or_else(|| {
                    AppError::CatalogNotFound(format!(
                        "album {} has no artist",
                        external_album_id
                    ))
                })?;
                self.ensure_artist(
                    artist_id,
                    header.artist_name.as_deref().unwrap_or(UNKNOWN_ARTIST),
                    header.image_url.as_deref(),
                    true,
                )
                .await?
            }
        };

        let (album, created_album) = self
            .ensure_album(
                &artist,
                &header.id,
                &header.name,
                header.image_url.as_deref(),
                header.release_date.as_deref(),
            )
            .await?;

        let created_tracks = self.create_missing_tracks(&album, payload.tracks).await?;

        tracing::info!(
            album_id = album.id,
            itunes_id = %header.id,
            created_album,
            created_tracks = created_tracks.len(),
            "Album import finished"
        );

        Ok(AlbumImport {
            artist,
            album,
            created_album,
            created_tracks,
        })
    }

    /// Imports a single catalog track together with its artist and album.
    pub async fn import_track(&self, external_track_id: &str) -> Result<TrackImport> {
        let info = self
            .catalog
            .lookup_track(external_track_id)
            .await?
            .ok_or_else(|| {
                AppError::CatalogNotFound(format!("track {} not found", external_track_id))
            })?;

        let (Some(artist_id), Some(album_id)) = (info.artist_id.as_deref(), info.album_id.as_deref())
        else {
            return Err(AppError::CatalogNotFound(format!(
                "track {} has no artist or album",
                external_track_id
            )));
        };

        let artist = self
            .ensure_artist(
                artist_id,
                info.artist_name.as_deref().unwrap_or(UNKNOWN_ARTIST),
                info.image_url.as_deref(),
                true,
            )
            .await?;

        let album_name = info.album_name.as_deref().unwrap_or(&info.name);
        let (album, _) = self
            .ensure_album(
                &artist,
                album_id,
                album_name,
                info.image_url.as_deref(),
                info.release_date.as_deref(),
            )
            .await?;

        let existing = {
            let db = self.db.lock().await;
            queries::find_track_by_source(&db, &info.id)?
        };
        if let Some(track) = existing {
            return Ok(TrackImport {
                artist,
                album,
                track,
                created: false,
            });
        }

        let (track, created) = match self.create_catalog_track(&album, &info).await? {
            Some(track) => (track, true),
            None => {
                let db = self.db.lock().await;
                let track = queries::find_track_by_source(&db, &info.id)?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "track {} conflicts with a row that has no source",
                        info.id
                    ))
                })?;
                (track, false)
            }
        };

        tracing::info!(
            track_id = track.id,
            itunes_id = %info.id,
            created,
            "Track import finished"
        );

        Ok(TrackImport {
            artist,
            album,
            track,
            created,
        })
    }

    /// Creates the tracks of `candidates` that have no source row yet.
    async fn create_missing_tracks(
        &self,
        album: &Album,
        candidates: Vec<CatalogTrack>,
    ) -> Result<Vec<Track>> {
        let ids: Vec<String> = candidates.iter().map(|t| t.id.clone()).collect();
        let existing = {
            let db = self.db.lock().await;
            queries::existing_source_ids(&db, SourceKind::Track, &ids)?
        };

        let mut seen = HashSet::new();
        let missing: Vec<CatalogTrack> = candidates
            .into_iter()
            .filter(|t| !existing.contains(&t.id) && seen.insert(t.id.clone()))
            .collect();

        if missing.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            album_id = album.id,
            missing = missing.len(),
            batch_size = self.track_batch_size,
            "Creating missing tracks"
        );

        let created = try_run_batched(missing, self.track_batch_size, |track| async move {
            self.create_catalog_track(album, &track).await
        })
        .await?;

        Ok(created.into_iter().flatten().collect())
    }

    /// Creates one catalog track with its source and initial status.
    ///
    /// Returns `None` when another import created the same track first.
    async fn create_catalog_track(
        &self,
        album: &Album,
        track: &CatalogTrack,
    ) -> Result<Option<Track>> {
        let mut db = self.db.lock().await;

        match insert_track(&mut db, album, track) {
            Ok(created) => Ok(Some(created)),
            Err(e) if db::is_unique_violation(&e) => {
                tracing::debug!(itunes_id = %track.id, "Track created concurrently, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn backfill_artist_image(conn: &Connection, mut artist: Artist, image: Option<&str>) -> Result<Artist> {
    if let (None, Some(image)) = (&artist.image_url, image) {
        conn.execute(
            "UPDATE artists SET image_url = ?1, updated_at = datetime('now')
             WHERE id = ?2 AND image_url IS NULL",
            params![image, artist.id],
        )?;
        tracing::debug!(artist_id = artist.id, "Artist image backfilled");
        artist.image_url = Some(image.to_string());
    }
    Ok(artist)
}

fn backfill_album_image(conn: &Connection, mut album: Album, image: Option<&str>) -> Result<Album> {
    if let (None, Some(image)) = (&album.image_url, image) {
        conn.execute(
            "UPDATE albums SET image_url = ?1, updated_at = datetime('now')
             WHERE id = ?2 AND image_url IS NULL",
            params![image, album.id],
        )?;
        tracing::debug!(album_id = album.id, "Album image backfilled");
        album.image_url = Some(image.to_string());
    }
    Ok(album)
}

fn insert_artist(
    conn: &mut Connection,
    external_id: &str,
    name: &str,
    image: Option<&str>,
    sync_enabled: bool,
) -> rusqlite::Result<Artist> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO artists (name, image_url, itunes_id, sync_enabled) VALUES (?1, ?2, ?3, ?4)",
        params![name, image, external_id, sync_enabled],
    )?;
    let artist_id = tx.last_insert_rowid();
    queries::insert_source(&tx, SourceKind::Artist, external_id, artist_id)?;
    let artist = tx.query_row(
        &format!("SELECT {} FROM artists a WHERE a.id = ?1", queries::ARTIST_COLUMNS),
        [artist_id],
        queries::map_artist_row,
    )?;
    tx.commit()?;
    Ok(artist)
}

fn insert_album(
    conn: &mut Connection,
    artist_id: i64,
    external_id: &str,
    name: &str,
    image: Option<&str>,
    release_date: Option<&str>,
) -> rusqlite::Result<Album> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO albums (artist_id, name, image_url, itunes_id, release_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![artist_id, name, image, external_id, release_date],
    )?;
    let album_id = tx.last_insert_rowid();
    queries::insert_source(&tx, SourceKind::Album, external_id, album_id)?;
    let album = tx.query_row(
        &format!("SELECT {} FROM albums al WHERE al.id = ?1", queries::ALBUM_COLUMNS),
        [album_id],
        queries::map_album_row,
    )?;
    tx.commit()?;
    Ok(album)
}

fn insert_track(conn: &mut Connection, album: &Album, track: &CatalogTrack) -> rusqlite::Result<Track> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO tracks (album_id, artist_id, name, duration_ms, track_number, itunes_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            album.id,
            album.artist_id,
            track.name,
            track.duration_ms,
            track.track_number,
            track.id,
        ],
    )?;
    let track_id = tx.last_insert_rowid();
    queries::insert_source(&tx, SourceKind::Track, &track.id, track_id)?;
    tx.execute("INSERT INTO track_statuses (track_id) VALUES (?1)", [track_id])?;
    let created = tx.query_row(
        &format!("SELECT {} FROM tracks t WHERE t.id = ?1", queries::TRACK_COLUMNS),
        [track_id],
        queries::map_track_row,
    )?;
    tx.commit()?;
    Ok(created)
}
