//! Music catalog client (iTunes Search/Lookup API).
//!
//! `CatalogProvider` is the raw transport returning `results[]` entries,
//! `CatalogClient` classifies and normalizes them into albums, tracks and
//! artists the importer can work with.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::CatalogConfig;
use crate::error::{AppError, Result};

/// Upper bound the lookup endpoint accepts for `limit`.
pub const MAX_LOOKUP_LIMIT: u32 = 200;

lazy_static! {
    static ref ARTWORK_SIZE: Regex = Regex::new(r"/(\d+)x(\d+)([a-z]*)(\.[A-Za-z0-9]+)$").unwrap();
}

// =============================================================================
// Raw payload
// =============================================================================

/// Top-level response body of both `/lookup` and `/search`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    #[serde(default)]
    pub result_count: u32,
    #[serde(default)]
    pub results: Vec<CatalogEntry>,
}

/// One element of `results[]`. Which fields are present depends on `wrapper_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(default)]
    pub wrapper_type: String,
    pub collection_type: Option<String>,
    pub artist_id: Option<i64>,
    pub artist_name: Option<String>,
    pub collection_id: Option<i64>,
    pub collection_name: Option<String>,
    pub track_id: Option<i64>,
    pub track_name: Option<String>,
    pub track_number: Option<i64>,
    pub track_time_millis: Option<i64>,
    pub track_count: Option<i64>,
    #[serde(rename = "artworkUrl100")]
    pub artwork_url_100: Option<String>,
    pub release_date: Option<String>,
    /// `song`, `music-video`, ... for track entries.
    pub kind: Option<String>,
}

/// Classification of a catalog entry by its `wrapperType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Artist,
    Collection,
    Track,
    Other,
}

impl CatalogEntry {
    pub fn entry_kind(&self) -> EntryKind {
        match self.wrapper_type.as_str() {
            "artist" => EntryKind::Artist,
            "collection" => EntryKind::Collection,
            "track" => EntryKind::Track,
            _ => EntryKind::Other,
        }
    }

    /// Track entries that are songs; music videos and other media are skipped.
    fn is_song(&self) -> bool {
        self.entry_kind() == EntryKind::Track
            && self.kind.as_deref().map_or(true, |k| k == "song")
    }
}

// =============================================================================
// Normalized shapes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogAlbum {
    pub id: String,
    pub name: String,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub image_url: Option<String>,
    pub release_date: Option<String>,
    pub track_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    pub album_id: Option<String>,
    pub album_name: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub image_url: Option<String>,
    pub duration_ms: Option<i64>,
    pub track_number: Option<i64>,
    pub release_date: Option<String>,
}

/// An album header together with every track entry of the same payload.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogAlbumWithTracks {
    pub album: CatalogAlbum,
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSearchResults {
    pub artists: Vec<CatalogArtist>,
    pub albums: Vec<CatalogAlbum>,
    pub tracks: Vec<CatalogTrack>,
}

/// What a free-text search should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    /// Value of the `entity` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            EntityKind::Artist => "musicArtist",
            EntityKind::Album => "album",
            EntityKind::Track => "song",
        }
    }
}

/// Replaces the `NxN` size token in an artwork URL with `size`x`size`.
///
/// URLs without a size token in their final path segment are returned unchanged.
pub fn upgrade_artwork(url: &str, size: u32) -> String {
    ARTWORK_SIZE
        .replace(url, |caps: &regex::Captures| {
            format!("/{}x{}{}{}", size, size, &caps[3], &caps[4])
        })
        .into_owned()
}

// =============================================================================
// Provider
// =============================================================================

/// Query for the `/lookup` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupQuery {
    pub id: String,
    pub entity: Option<String>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

impl LookupQuery {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity: None,
            limit: None,
            sort: None,
        }
    }

    pub fn entity(mut self, entity: &str) -> Self {
        self.entity = Some(entity.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: &str) -> Self {
        self.sort = Some(sort.to_string());
        self
    }
}

/// Query for the `/search` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub entity: EntityKind,
    pub limit: u32,
}

/// Raw access to a music catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CatalogEntry>>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogEntry>>;
}

/// Spaces requests by a minimum interval.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP provider for the public iTunes Search API.
pub struct ItunesProvider {
    client: Client,
    base_url: String,
    country: String,
    rate_limiter: RateLimiter,
}

impl ItunesProvider {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
            rate_limiter: RateLimiter::new(Duration::from_millis(config.rate_limit_ms)),
        })
    }

    async fn get_entries(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<CatalogEntry>> {
        self.rate_limiter.wait().await;

        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("country", self.country.as_str())])
            .send()
            .await
            .map_err(|e| {
                AppError::CatalogUnavailable(format!("request to {} failed: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::CatalogUnavailable(format!(
                "{} returned status {}",
                path, status
            )));
        }

        let body = response.json::<CatalogResponse>().await.map_err(|e| {
            AppError::CatalogUnavailable(format!("malformed response from {}: {}", path, e))
        })?;

        tracing::debug!(path = %path, results = body.result_count, "Catalog response");

        Ok(body.results)
    }
}

#[async_trait]
impl CatalogProvider for ItunesProvider {
    fn name(&self) -> &str {
        "itunes"
    }

    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CatalogEntry>> {
        let mut params = vec![("id", query.id.clone())];
        if let Some(entity) = &query.entity {
            params.push(("entity", entity.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(sort) = &query.sort {
            params.push(("sort", sort.clone()));
        }

        self.get_entries("/lookup", &params).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogEntry>> {
        let params = [
            ("term", query.term.clone()),
            ("media", "music".to_string()),
            ("entity", query.entity.as_param().to_string()),
            ("limit", query.limit.to_string()),
        ];

        self.get_entries("/search", &params).await
    }
}

// =============================================================================
// Client
// =============================================================================

/// Normalizing front of a `CatalogProvider`.
#[derive(Clone)]
pub struct CatalogClient {
    provider: Arc<dyn CatalogProvider>,
    artwork_size: u32,
}

impl CatalogClient {
    pub fn new(provider: Arc<dyn CatalogProvider>, artwork_size: u32) -> Self {
        Self {
            provider,
            artwork_size,
        }
    }

    /// Client backed by the iTunes HTTP provider, wrapped in Arc for shared access.
    pub fn itunes_shared(config: &CatalogConfig) -> Result<Arc<Self>> {
        let provider = ItunesProvider::new(config)?;
        Ok(Arc::new(Self::new(Arc::new(provider), config.artwork_size)))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Fetches an album header and all of its tracks in one request.
    ///
    /// `Ok(None)` means the catalog answered but knows no such album.
    pub async fn lookup_album_with_tracks(
        &self,
        album_id: &str,
    ) -> Result<Option<CatalogAlbumWithTracks>> {
        tracing::debug!(album_id = %album_id, provider = self.provider.name(), "Catalog album lookup");

        let query = LookupQuery::new(album_id)
            .entity("song")
            .limit(MAX_LOOKUP_LIMIT);
        let entries = self.provider.lookup(&query).await?;

        let Some(header) = pick_album_header(&entries, album_id) else {
            return Ok(None);
        };
        let Some(album) = self.album_from_entry(header) else {
            return Ok(None);
        };

        let tracks = entries
            .iter()
            .filter(|e| e.is_song())
            .filter_map(|e| self.track_from_entry(e))
            .collect();

        Ok(Some(CatalogAlbumWithTracks { album, tracks }))
    }

    /// Fetches a single track.
    pub async fn lookup_track(&self, track_id: &str) -> Result<Option<CatalogTrack>> {
        tracing::debug!(track_id = %track_id, provider = self.provider.name(), "Catalog track lookup");

        let entries = self.provider.lookup(&LookupQuery::new(track_id)).await?;

        Ok(entries
            .iter()
            .filter(|e| e.entry_kind() == EntryKind::Track)
            .find(|e| e.track_id.map(|id| id.to_string()).as_deref() == Some(track_id))
            .and_then(|e| self.track_from_entry(e)))
    }

    /// Lists the albums of an artist, newest first when `recent_first` is set.
    pub async fn lookup_artist_albums(
        &self,
        artist_id: &str,
        limit: u32,
        recent_first: bool,
    ) -> Result<Vec<CatalogAlbum>> {
        tracing::debug!(artist_id = %artist_id, limit, recent_first, "Catalog artist albums lookup");

        let mut query = LookupQuery::new(artist_id)
            .entity("album")
            .limit(limit.min(MAX_LOOKUP_LIMIT));
        if recent_first {
            query = query.sort("recent");
        }

        let entries = self.provider.lookup(&query).await?;

        Ok(entries
            .iter()
            .filter(|e| e.entry_kind() == EntryKind::Collection)
            .filter_map(|e| self.album_from_entry(e))
            .collect())
    }

    /// Free-text search. No dedup, no caching.
    pub async fn search(
        &self,
        term: &str,
        entity: EntityKind,
        limit: u32,
    ) -> Result<CatalogSearchResults> {
        let query = SearchQuery {
            term: term.to_string(),
            entity,
            limit,
        };
        let entries = self.provider.search(&query).await?;

        let mut results = CatalogSearchResults::default();
        for entry in &entries {
            match entry.entry_kind() {
                EntryKind::Artist => {
                    if let (Some(id), Some(name)) = (entry.artist_id, &entry.artist_name) {
                        results.artists.push(CatalogArtist {
                            id: id.to_string(),
                            name: name.clone(),
                        });
                    }
                }
                EntryKind::Collection => results.albums.extend(self.album_from_entry(entry)),
                EntryKind::Track if entry.is_song() => {
                    results.tracks.extend(self.track_from_entry(entry))
                }
                _ => {}
            }
        }

        Ok(results)
    }

    fn artwork(&self, url: &Option<String>) -> Option<String> {
        url.as_deref().map(|u| upgrade_artwork(u, self.artwork_size))
    }

    /// Album fields of a collection entry, or of the collection a track belongs to.
    fn album_from_entry(&self, entry: &CatalogEntry) -> Option<CatalogAlbum> {
        let id = entry.collection_id?;
        Some(CatalogAlbum {
            id: id.to_string(),
            name: entry.collection_name.clone().unwrap_or_default(),
            artist_id: entry.artist_id.map(|id| id.to_string()),
            artist_name: entry.artist_name.clone(),
            image_url: self.artwork(&entry.artwork_url_100),
            release_date: entry.release_date.clone(),
            track_count: entry.track_count,
        })
    }

    fn track_from_entry(&self, entry: &CatalogEntry) -> Option<CatalogTrack> {
        let id = entry.track_id?;
        Some(CatalogTrack {
            id: id.to_string(),
            name: entry.track_name.clone().unwrap_or_default(),
            album_id: entry.collection_id.map(|id| id.to_string()),
            album_name: entry.collection_name.clone(),
            artist_id: entry.artist_id.map(|id| id.to_string()),
            artist_name: entry.artist_name.clone(),
            image_url: self.artwork(&entry.artwork_url_100),
            duration_ms: entry.track_time_millis,
            track_number: entry.track_number,
            release_date: entry.release_date.clone(),
        })
    }
}

/// Picks the album header of a lookup payload.
///
/// Prefers the collection entry whose id matches `album_id`; otherwise falls
/// back to the first entry, which may pick the wrong album on unexpected data.
pub fn pick_album_header<'a>(entries: &'a [CatalogEntry], album_id: &str) -> Option<&'a CatalogEntry> {
    entries
        .iter()
        .find(|e| {
            e.entry_kind() == EntryKind::Collection
                && e.collection_id.map(|id| id.to_string()).as_deref() == Some(album_id)
        })
        .or_else(|| entries.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALBUM_PAYLOAD: &str = r#"{
        "resultCount": 3,
        "results": [
            {
                "wrapperType": "collection",
                "collectionType": "Album",
                "artistId": 777,
                "collectionId": 12345,
                "artistName": "X",
                "collectionName": "First Light",
                "artworkUrl100": "https://is1-ssl.mzstatic.com/image/thumb/Music/v4/aa/source/100x100bb.jpg",
                "trackCount": 2,
                "releaseDate": "2021-04-02T07:00:00Z"
            },
            {
                "wrapperType": "track",
                "kind": "song",
                "artistId": 777,
                "collectionId": 12345,
                "trackId": 1,
                "artistName": "X",
                "collectionName": "First Light",
                "trackName": "Dawn",
                "trackNumber": 1,
                "trackTimeMillis": 201000
            },
            {
                "wrapperType": "track",
                "kind": "music-video",
                "artistId": 777,
                "collectionId": 12345,
                "trackId": 9,
                "trackName": "Dawn (Video)"
            }
        ]
    }"#;

    struct StaticProvider(Vec<CatalogEntry>);

    #[async_trait]
    impl CatalogProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn lookup(&self, _query: &LookupQuery) -> Result<Vec<CatalogEntry>> {
            Ok(self.0.clone())
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<CatalogEntry>> {
            Ok(self.0.clone())
        }
    }

    fn client_for(payload: &str) -> CatalogClient {
        let response: CatalogResponse = serde_json::from_str(payload).unwrap();
        CatalogClient::new(Arc::new(StaticProvider(response.results)), 600)
    }

    #[test]
    fn test_deserialize_lookup_payload() {
        let response: CatalogResponse = serde_json::from_str(ALBUM_PAYLOAD).unwrap();
        assert_eq!(response.result_count, 3);
        assert_eq!(response.results[0].entry_kind(), EntryKind::Collection);
        assert_eq!(response.results[1].entry_kind(), EntryKind::Track);
        assert_eq!(response.results[1].track_time_millis, Some(201000));
        assert!(response.results[0].artwork_url_100.is_some());
    }

    #[test]
    fn test_upgrade_artwork() {
        assert_eq!(
            upgrade_artwork("https://example.com/a/source/100x100bb.jpg", 600),
            "https://example.com/a/source/600x600bb.jpg"
        );
        assert_eq!(
            upgrade_artwork("https://example.com/a/60x60.png", 600),
            "https://example.com/a/600x600.png"
        );
    }

    #[test]
    fn test_upgrade_artwork_passthrough() {
        let url = "https://example.com/cover.jpg";
        assert_eq!(upgrade_artwork(url, 600), url);
        // Only the final path segment carries the size token.
        let url = "https://example.com/100x100/cover.jpg";
        assert_eq!(upgrade_artwork(url, 600), url);
    }

    #[test]
    fn test_pick_album_header_prefers_matching_collection() {
        let entries = vec![
            CatalogEntry {
                wrapper_type: "track".to_string(),
                collection_id: Some(1),
                track_id: Some(10),
                ..Default::default()
            },
            CatalogEntry {
                wrapper_type: "collection".to_string(),
                collection_id: Some(2),
                ..Default::default()
            },
            CatalogEntry {
                wrapper_type: "collection".to_string(),
                collection_id: Some(1),
                ..Default::default()
            },
        ];

        let header = pick_album_header(&entries, "1").unwrap();
        assert_eq!(header.entry_kind(), EntryKind::Collection);
        assert_eq!(header.collection_id, Some(1));

        // No match at all: first entry wins.
        let header = pick_album_header(&entries, "3").unwrap();
        assert_eq!(header.track_id, Some(10));

        assert!(pick_album_header(&[], "1").is_none());
    }

    #[tokio::test]
    async fn test_lookup_album_with_tracks_skips_videos() {
        let client = client_for(ALBUM_PAYLOAD);
        let result = client.lookup_album_with_tracks("12345").await.unwrap().unwrap();

        assert_eq!(result.album.id, "12345");
        assert_eq!(result.album.artist_id.as_deref(), Some("777"));
        assert_eq!(
            result.album.image_url.as_deref(),
            Some("https://is1-ssl.mzstatic.com/image/thumb/Music/v4/aa/source/600x600bb.jpg")
        );
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.tracks[0].id, "1");
        assert_eq!(result.tracks[0].duration_ms, Some(201000));
    }

    #[tokio::test]
    async fn test_lookup_album_empty_payload_is_none() {
        let client = client_for(r#"{"resultCount": 0, "results": []}"#);
        assert!(client.lookup_album_with_tracks("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_track_matches_requested_id() {
        let client = client_for(ALBUM_PAYLOAD);
        let track = client.lookup_track("1").await.unwrap().unwrap();
        assert_eq!(track.name, "Dawn");
        assert_eq!(track.album_id.as_deref(), Some("12345"));

        assert!(client.lookup_track("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_classifies_entries() {
        let client = client_for(ALBUM_PAYLOAD);
        let results = client.search("x", EntityKind::Album, 10).await.unwrap();
        assert_eq!(results.albums.len(), 1);
        assert_eq!(results.tracks.len(), 1);
        assert!(results.artists.is_empty());
    }

    #[test]
    fn test_entity_kind_params() {
        assert_eq!(EntityKind::Artist.as_param(), "musicArtist");
        assert_eq!(EntityKind::Album.as_param(), "album");
        assert_eq!(EntityKind::Track.as_param(), "song");
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
