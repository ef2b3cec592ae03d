//! Test infrastructure for songboard integration tests.
//!
//! Provides a `TestApp` wrapper around `axum_test::TestServer` backed by an
//! in-memory database and a `FakeCatalog` standing in for the iTunes API.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use axum_test::TestServer;
use rusqlite::Connection;
use tokio::sync::Mutex;

use songboard::config::Config;
use songboard::error::{AppError, Result};
use songboard::services::catalog::{
    CatalogClient, CatalogEntry, CatalogProvider, LookupQuery, SearchQuery,
};
use songboard::{build_router, db, AppState};

// =============================================================================
// Fake catalog
// =============================================================================

/// In-memory catalog keyed by `(id, entity)` lookups.
#[derive(Default)]
pub struct FakeCatalog {
    lookups: StdMutex<HashMap<(String, Option<String>), Vec<CatalogEntry>>>,
    search_results: StdMutex<Vec<CatalogEntry>>,
    failing: StdMutex<HashSet<String>>,
    lookup_count: AtomicUsize,
}

impl FakeCatalog {
    /// Registers an album with its tracks for album, track and artist lookups.
    pub fn add_album(
        &self,
        album_id: i64,
        artist_id: i64,
        artist_name: &str,
        name: &str,
        track_ids: &[i64],
    ) {
        let header = album_entry(album_id, artist_id, artist_name, name);
        let tracks: Vec<CatalogEntry> = track_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                track_entry(*id, album_id, artist_id, artist_name, name, i as i64 + 1)
            })
            .collect();

        let mut lookups = self.lookups.lock().unwrap();

        let mut payload = vec![header.clone()];
        payload.extend(tracks.iter().cloned());
        lookups.insert((album_id.to_string(), Some("song".to_string())), payload);

        for track in &tracks {
            let id = track.track_id.unwrap().to_string();
            lookups.insert((id, None), vec![track.clone()]);
        }

        let albums = lookups
            .entry((artist_id.to_string(), Some("album".to_string())))
            .or_insert_with(|| vec![artist_entry(artist_id, artist_name)]);
        albums.retain(|e| e.collection_id != Some(album_id));
        albums.push(header);
    }

    pub fn set_search_results(&self, entries: Vec<CatalogEntry>) {
        *self.search_results.lock().unwrap() = entries;
    }

    /// Makes every lookup for `id` fail as if the catalog were down.
    pub fn fail_id(&self, id: impl ToString) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogProvider for FakeCatalog {
    fn name(&self) -> &str {
        "fake"
    }

    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CatalogEntry>> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        // Let concurrent imports interleave
        tokio::task::yield_now().await;

        if self.failing.lock().unwrap().contains(&query.id) {
            return Err(AppError::CatalogUnavailable(format!(
                "lookup {} failed",
                query.id
            )));
        }

        let lookups = self.lookups.lock().unwrap();
        let entries = lookups
            .get(&(query.id.clone(), query.entity.clone()))
            .cloned()
            .unwrap_or_default();

        // Artist lookups: the artist wrapper first, then at most `limit` albums
        let artist_lookup = query.entity.as_deref() == Some("album");
        let (mut albums, mut others): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| artist_lookup && e.wrapper_type == "collection");
        if query.sort.as_deref() == Some("recent") {
            albums.sort_by(|a, b| b.release_date.cmp(&a.release_date));
        }
        if let Some(limit) = query.limit {
            albums.truncate(limit as usize);
        }
        others.extend(albums);
        Ok(others)
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<CatalogEntry>> {
        Ok(self.search_results.lock().unwrap().clone())
    }
}

pub fn artist_entry(artist_id: i64, name: &str) -> CatalogEntry {
    CatalogEntry {
        wrapper_type: "artist".to_string(),
        artist_id: Some(artist_id),
        artist_name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn album_entry(album_id: i64, artist_id: i64, artist_name: &str, name: &str) -> CatalogEntry {
    CatalogEntry {
        wrapper_type: "collection".to_string(),
        collection_type: Some("Album".to_string()),
        artist_id: Some(artist_id),
        artist_name: Some(artist_name.to_string()),
        collection_id: Some(album_id),
        collection_name: Some(name.to_string()),
        artwork_url_100: Some(format!("https://img.example.com/{}/100x100bb.jpg", album_id)),
        release_date: Some(format!("2020-01-{:02}T07:00:00Z", (album_id % 28) + 1)),
        ..Default::default()
    }
}

pub fn track_entry(
    track_id: i64,
    album_id: i64,
    artist_id: i64,
    artist_name: &str,
    album_name: &str,
    track_number: i64,
) -> CatalogEntry {
    CatalogEntry {
        wrapper_type: "track".to_string(),
        kind: Some("song".to_string()),
        artist_id: Some(artist_id),
        artist_name: Some(artist_name.to_string()),
        collection_id: Some(album_id),
        collection_name: Some(album_name.to_string()),
        track_id: Some(track_id),
        track_name: Some(format!("Track {}", track_id)),
        track_number: Some(track_number),
        track_time_millis: Some(180_000),
        artwork_url_100: Some(format!("https://img.example.com/{}/100x100bb.jpg", album_id)),
        ..Default::default()
    }
}

// =============================================================================
// Test application
// =============================================================================

/// Test application wrapper around axum_test::TestServer.
pub struct TestApp {
    server: TestServer,
    state: AppState,
    catalog: Arc<FakeCatalog>,
}

impl TestApp {
    /// Create a new test application with in-memory database and fake catalog.
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let conn = db::init_db_memory().expect("Failed to initialize test database");

        let catalog = Arc::new(FakeCatalog::default());
        let client = Arc::new(CatalogClient::new(
            Arc::clone(&catalog) as Arc<dyn CatalogProvider>,
            config.catalog.artwork_size,
        ));

        let state = AppState::new(config, conn, client);
        let server =
            TestServer::new(build_router(state.clone())).expect("Failed to create test server");

        Self {
            server,
            state,
            catalog,
        }
    }

    pub fn server(&self) -> &TestServer {
        &self.server
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.state.db
    }

    pub fn catalog(&self) -> &FakeCatalog {
        &self.catalog
    }

    /// Number of rows in `table`.
    pub async fn count(&self, table: &str) -> i64 {
        let db = self.db().lock().await;
        db.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .expect("Failed to count rows")
    }

    #[allow(dead_code)]
    pub async fn seed_artist(&self, name: &str) -> i64 {
        let db = self.db().lock().await;
        db.execute("INSERT INTO artists (name) VALUES (?1)", [name])
            .expect("Failed to seed artist");
        db.last_insert_rowid()
    }

    #[allow(dead_code)]
    pub async fn seed_album(&self, artist_id: i64, name: &str) -> i64 {
        let db = self.db().lock().await;
        db.execute(
            "INSERT INTO albums (artist_id, name) VALUES (?1, ?2)",
            rusqlite::params![artist_id, name],
        )
        .expect("Failed to seed album");
        db.last_insert_rowid()
    }

    /// Seeds a track under `album_id` with an idea status.
    #[allow(dead_code)]
    pub async fn seed_track(&self, album_id: i64, name: &str) -> i64 {
        let db = self.db().lock().await;
        db.execute(
            "INSERT INTO tracks (album_id, artist_id, name)
             SELECT id, artist_id, ?2 FROM albums WHERE id = ?1",
            rusqlite::params![album_id, name],
        )
        .expect("Failed to seed track");
        let track_id = db.last_insert_rowid();
        db.execute("INSERT INTO track_statuses (track_id) VALUES (?1)", [track_id])
            .expect("Failed to seed track status");
        track_id
    }
}
