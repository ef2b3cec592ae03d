use serde::{Deserialize, Serialize};

/// Workflow stage of a track. Any stage can be set from any other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatusKind {
    #[default]
    Idea,
    Ready,
    Recorded,
    Posted,
}

impl TrackStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatusKind::Idea => "idea",
            TrackStatusKind::Ready => "ready",
            TrackStatusKind::Recorded => "recorded",
            TrackStatusKind::Posted => "posted",
        }
    }
}

impl std::fmt::Display for TrackStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackStatusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idea" => Ok(TrackStatusKind::Idea),
            "ready" => Ok(TrackStatusKind::Ready),
            "recorded" => Ok(TrackStatusKind::Recorded),
            "posted" => Ok(TrackStatusKind::Posted),
            other => Err(format!("unknown track status: {}", other)),
        }
    }
}

/// Kind of local entity a `Source` row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Artist,
    Album,
    Track,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Artist => "artist",
            SourceKind::Album => "album",
            SourceKind::Track => "track",
        }
    }

    /// Foreign key column holding the local entity id.
    pub fn column(&self) -> &'static str {
        match self {
            SourceKind::Artist => "artist_id",
            SourceKind::Album => "album_id",
            SourceKind::Track => "track_id",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub itunes_id: Option<String>,
    pub sync_enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub artist_id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub itunes_id: Option<String>,
    pub release_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub name: String,
    pub duration_ms: Option<i64>,
    pub track_number: Option<i64>,
    pub note: Option<String>,
    pub itunes_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackStatus {
    pub id: i64,
    pub track_id: i64,
    pub status: TrackStatusKind,
    pub starred: bool,
    pub ignored: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostLog {
    pub id: i64,
    pub track_status_id: i64,
    pub platform: String,
    pub url: Option<String>,
    pub posted_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTrack {
    pub id: i64,
    pub playlist_id: i64,
    pub track_id: i64,
    #[serde(rename = "order")]
    pub position: i64,
}
