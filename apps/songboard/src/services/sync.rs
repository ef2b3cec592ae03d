//! Sync of tracked artists against the catalog.
//!
//! `preview` is a read-only diff of catalog content that is not imported yet,
//! `apply` imports a reviewed selection of it, and `sync_all` imports the most
//! recent albums of every tracked artist without a review step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::db::models::Artist;
use crate::db::queries;
use crate::error::Result;
use crate::services::batch::{run_batched, try_run_batched};
use crate::services::catalog::{CatalogAlbum, CatalogClient, CatalogTrack};
use crate::services::import::Importer;

// =============================================================================
// Preview shapes
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPreview {
    pub artists: Vec<ArtistPreview>,
}

impl SyncPreview {
    pub fn album_count(&self) -> usize {
        self.artists.iter().map(|a| a.albums.len()).sum()
    }

    pub fn track_count(&self) -> usize {
        self.artists
            .iter()
            .flat_map(|a| &a.albums)
            .map(|al| al.tracks.len())
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistPreview {
    pub artist_id: i64,
    pub name: String,
    pub itunes_id: String,
    pub albums: Vec<AlbumPreview>,
}

/// A catalog album with at least one track that is not imported yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumPreview {
    pub itunes_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub release_date: Option<String>,
    pub is_new_album: bool,
    /// Local id when the album itself is already imported.
    pub album_id: Option<i64>,
    pub tracks: Vec<TrackPreview>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPreview {
    pub itunes_id: String,
    pub name: String,
    pub track_number: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl From<&CatalogTrack> for TrackPreview {
    fn from(track: &CatalogTrack) -> Self {
        Self {
            itunes_id: track.id.clone(),
            name: track.name.clone(),
            track_number: track.track_number,
            duration_ms: track.duration_ms,
        }
    }
}

// =============================================================================
// Apply / sync-all reports
// =============================================================================

/// Result of importing one selected album or track.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub itunes_id: String,
    pub success: bool,
    pub created_album: bool,
    pub created_tracks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApplyOutcome {
    fn failed(itunes_id: String, error: String) -> Self {
        Self {
            itunes_id,
            success: false,
            created_album: false,
            created_tracks: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncApplyReport {
    pub albums: Vec<ApplyOutcome>,
    pub tracks: Vec<ApplyOutcome>,
    pub created_albums: usize,
    pub created_tracks: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistSyncSummary {
    pub artist_id: i64,
    pub name: String,
    pub new_albums: usize,
    pub new_tracks: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllReport {
    pub artists: Vec<ArtistSyncSummary>,
    pub new_albums: usize,
    pub new_tracks: usize,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct SyncService {
    db: Arc<Mutex<Connection>>,
    catalog: Arc<CatalogClient>,
    importer: Importer,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(db: Arc<Mutex<Connection>>, catalog: Arc<CatalogClient>, config: SyncConfig) -> Self {
        let importer = Importer::new(Arc::clone(&db), Arc::clone(&catalog), config.track_batch_size);
        Self {
            db,
            catalog,
            importer,
            config,
        }
    }

    /// Builds the diff of importable catalog content for tracked artists.
    ///
    /// `artist_ids` restricts the scan to those artists; missing or empty
    /// means every sync-enabled artist. Never writes to the store.
    pub async fn preview(&self, artist_ids: Option<Vec<i64>>) -> Result<SyncPreview> {
        let artists = {
            let db = self.db.lock().await;
            list_tracked_artists(&db, artist_ids.as_deref())?
        };

        tracing::info!(artists = artists.len(), "Building sync preview");

        let outcomes = run_batched(artists, self.config.fetch_batch_size, |artist| async move {
            let outcome = self.preview_artist(&artist).await;
            (artist, outcome)
        })
        .await;

        let mut preview = SyncPreview::default();
        for (artist, outcome) in outcomes {
            match outcome {
                Ok(Some(entry)) => preview.artists.push(entry),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        artist_id = artist.id,
                        name = %artist.name,
                        error = %e,
                        "Skipping artist in sync preview"
                    );
                }
            }
        }

        tracing::info!(
            artists = preview.artists.len(),
            albums = preview.album_count(),
            tracks = preview.track_count(),
            "Sync preview built"
        );

        Ok(preview)
    }

    /// Preview entry for one artist, `None` when nothing is importable.
    async fn preview_artist(&self, artist: &Artist) -> Result<Option<ArtistPreview>> {
        let Some(itunes_id) = artist.itunes_id.clone() else {
            return Ok(None);
        };

        let (known_albums, known_tracks) = {
            let db = self.db.lock().await;
            (
                imported_album_ids(&db, artist.id)?,
                imported_track_ids(&db, artist.id)?,
            )
        };

        let remote_albums = self
            .catalog
            .lookup_artist_albums(&itunes_id, self.config.album_limit, false)
            .await?;

        let known_albums = &known_albums;
        let known_tracks = &known_tracks;
        let albums = try_run_batched(remote_albums, self.config.fetch_batch_size, |album| async move {
            self.preview_album(album, known_albums, known_tracks).await
        })
        .await?;

        let albums: Vec<AlbumPreview> = albums.into_iter().flatten().collect();
        if albums.is_empty() {
            return Ok(None);
        }

        Ok(Some(ArtistPreview {
            artist_id: artist.id,
            name: artist.name.clone(),
            itunes_id,
            albums,
        }))
    }

    async fn preview_album(
        &self,
        album: CatalogAlbum,
        known_albums: &HashMap<String, i64>,
        known_tracks: &HashSet<String>,
    ) -> Result<Option<AlbumPreview>> {
        let Some(payload) = self.catalog.lookup_album_with_tracks(&album.id).await? else {
            return Ok(None);
        };

        let album_id = known_albums.get(&album.id).copied();
        let is_new_album = album_id.is_none();
        let tracks = candidate_tracks(&payload.tracks, is_new_album, known_tracks);

        if tracks.is_empty() {
            return Ok(None);
        }

        Ok(Some(AlbumPreview {
            itunes_id: album.id,
            name: album.name,
            image_url: album.image_url,
            release_date: album.release_date,
            is_new_album,
            album_id,
            tracks,
        }))
    }

    /// Imports the selected albums, then the selected tracks.
    ///
    /// Each id is attempted once and reports its own outcome.
    pub async fn apply(&self, albums: Vec<String>, tracks: Vec<String>) -> SyncApplyReport {
        let albums = dedupe(albums);
        let tracks = dedupe(tracks);

        tracing::info!(albums = albums.len(), tracks = tracks.len(), "Applying sync selection");

        let mut report = SyncApplyReport::default();

        report.albums = run_batched(albums, self.config.fetch_batch_size, |id| async move {
            match self.importer.import_album(&id).await {
                Ok(import) => ApplyOutcome {
                    created_tracks: import.created_track_count(),
                    created_album: import.created_album,
                    itunes_id: id,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(itunes_id = %id, error = %e, "Album import failed during sync apply");
                    ApplyOutcome::failed(id, e.to_string())
                }
            }
        })
        .await;

        report.tracks = run_batched(tracks, self.config.fetch_batch_size, |id| async move {
            match self.importer.import_track(&id).await {
                Ok(import) => ApplyOutcome {
                    created_tracks: usize::from(import.created),
                    created_album: false,
                    itunes_id: id,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(itunes_id = %id, error = %e, "Track import failed during sync apply");
                    ApplyOutcome::failed(id, e.to_string())
                }
            }
        })
        .await;

        for outcome in report.albums.iter().chain(report.tracks.iter()) {
            if !outcome.success {
                report.failed += 1;
            }
            report.created_albums += usize::from(outcome.created_album);
            report.created_tracks += outcome.created_tracks;
        }

        tracing::info!(
            created_albums = report.created_albums,
            created_tracks = report.created_tracks,
            failed = report.failed,
            "Sync selection applied"
        );

        report
    }

    /// Imports the most recent catalog albums of every sync-enabled artist.
    pub async fn sync_all(&self) -> Result<SyncAllReport> {
        let artists = {
            let db = self.db.lock().await;
            list_tracked_artists(&db, None)?
        };

        tracing::info!(artists = artists.len(), "Running sync-all");

        let summaries = run_batched(artists, self.config.fetch_batch_size, |artist| async move {
            self.sync_artist(artist).await
        })
        .await;

        let report = SyncAllReport {
            new_albums: summaries.iter().map(|s| s.new_albums).sum(),
            new_tracks: summaries.iter().map(|s| s.new_tracks).sum(),
            artists: summaries,
        };

        tracing::info!(
            new_albums = report.new_albums,
            new_tracks = report.new_tracks,
            "Sync-all finished"
        );

        Ok(report)
    }

    async fn sync_artist(&self, artist: Artist) -> ArtistSyncSummary {
        let mut summary = ArtistSyncSummary {
            artist_id: artist.id,
            name: artist.name.clone(),
            new_albums: 0,
            new_tracks: 0,
            errors: Vec::new(),
        };

        let Some(itunes_id) = artist.itunes_id.as_deref() else {
            return summary;
        };

        let albums = match self
            .catalog
            .lookup_artist_albums(itunes_id, self.config.recent_album_limit, true)
            .await
        {
            Ok(albums) => albums,
            Err(e) => {
                tracing::warn!(artist_id = artist.id, error = %e, "Catalog lookup failed during sync-all");
                summary.errors.push(e.to_string());
                return summary;
            }
        };

        for album in albums {
            match self.importer.import_album_for(&album.id, Some(&artist)).await {
                Ok(import) => {
                    summary.new_albums += usize::from(import.created_album);
                    summary.new_tracks += import.created_track_count();
                }
                Err(e) => {
                    tracing::warn!(
                        artist_id = artist.id,
                        itunes_id = %album.id,
                        error = %e,
                        "Album import failed during sync-all"
                    );
                    summary.errors.push(format!("album {}: {}", album.id, e));
                }
            }
        }

        summary
    }
}

/// Tracks of an album payload that a preview should offer.
///
/// Every track of a new album is a candidate; for an imported album only the
/// tracks without a source row are.
fn candidate_tracks(
    tracks: &[CatalogTrack],
    is_new_album: bool,
    known_tracks: &HashSet<String>,
) -> Vec<TrackPreview> {
    let mut seen = HashSet::new();
    tracks
        .iter()
        .filter(|t| is_new_album || !known_tracks.contains(&t.id))
        .filter(|t| seen.insert(t.id.clone()))
        .map(TrackPreview::from)
        .collect()
}

/// Drops repeated ids, keeping the first occurrence.
fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn list_tracked_artists(conn: &Connection, artist_ids: Option<&[i64]>) -> Result<Vec<Artist>> {
    let artists = match artist_ids {
        Some(ids) if !ids.is_empty() => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM artists a
                 WHERE a.itunes_id IS NOT NULL AND a.id IN ({})
                 ORDER BY a.name",
                queries::ARTIST_COLUMNS,
                placeholders
            ))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), queries::map_artist_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        _ => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM artists a
                 WHERE a.sync_enabled = 1 AND a.itunes_id IS NOT NULL
                 ORDER BY a.name",
                queries::ARTIST_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], queries::map_artist_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(artists)
}

/// Catalog album id → local album id for albums imported under `artist_id`.
fn imported_album_ids(conn: &Connection, artist_id: i64) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare(
        "SELECT s.external_id, al.id
         FROM sources s JOIN albums al ON al.id = s.album_id
         WHERE s.source_type = 'album' AND al.artist_id = ?1",
    )?;
    let ids = stmt
        .query_map([artist_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(ids)
}

/// Catalog ids of every track imported for `artist_id`, directly or via its albums.
fn imported_track_ids(conn: &Connection, artist_id: i64) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT s.external_id
         FROM sources s
         JOIN tracks t ON t.id = s.track_id
         LEFT JOIN albums al ON al.id = t.album_id
         WHERE s.source_type = 'track' AND (t.artist_id = ?1 OR al.artist_id = ?1)",
    )?;
    let ids = stmt
        .query_map([artist_id], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> CatalogTrack {
        CatalogTrack {
            id: id.to_string(),
            name: format!("Track {}", id),
            album_id: Some("100".to_string()),
            album_name: None,
            artist_id: None,
            artist_name: None,
            image_url: None,
            duration_ms: None,
            track_number: None,
            release_date: None,
        }
    }

    #[test]
    fn test_candidate_tracks_for_new_album_include_everything() {
        let known: HashSet<String> = ["1".to_string()].into_iter().collect();
        let tracks = vec![track("1"), track("2")];

        let candidates = candidate_tracks(&tracks, true, &known);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_candidate_tracks_for_imported_album_skip_known() {
        let known: HashSet<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        let tracks = vec![track("1"), track("2"), track("3"), track("4")];

        let candidates = candidate_tracks(&tracks, false, &known);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].itunes_id, "4");
    }

    #[test]
    fn test_candidate_tracks_drop_repeated_ids() {
        let tracks = vec![track("5"), track("5")];
        assert_eq!(candidate_tracks(&tracks, true, &HashSet::new()).len(), 1);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let ids = vec!["3", "1", "3", " ", "2", "1"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedupe(ids), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_preview_serializes_camel_case() {
        let preview = AlbumPreview {
            itunes_id: "1".to_string(),
            name: "A".to_string(),
            image_url: None,
            release_date: None,
            is_new_album: true,
            album_id: None,
            tracks: vec![],
        };
        let value = serde_json::to_value(&preview).unwrap();
        assert_eq!(value["isNewAlbum"], true);
        assert_eq!(value["itunesId"], "1");
    }
}
