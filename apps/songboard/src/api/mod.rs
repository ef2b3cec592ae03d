//! API endpoint handlers for songboard.

use axum::Router;
use serde::{Deserialize, Serialize};

use crate::AppState;

pub mod albums;
pub mod artists;
pub mod catalog;
pub mod playlists;
pub mod sync;
pub mod tracks;

/// All `/api` routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(artists::router())
        .merge(albums::router())
        .merge(tracks::router())
        .merge(playlists::router())
        .merge(catalog::router())
        .merge(sync::router())
}

/// Paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items in the current page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// Current page number (1-indexed).
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

/// `page` / `limit` query parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    /// Page number (1-indexed, default: 1).
    pub page: Option<u32>,
    /// Items per page (default: 50, max: 200).
    pub limit: Option<u32>,
}

impl Pagination {
    /// Resolved `(page, limit, offset)`.
    pub fn resolve(&self) -> (u32, u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(50).clamp(1, 200);
        let offset = (page - 1).saturating_mul(limit);
        (page, limit, offset)
    }
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let pages = ((total as f64) / (limit as f64)).ceil() as u32;
        Self {
            items,
            total,
            page,
            pages,
        }
    }
}
