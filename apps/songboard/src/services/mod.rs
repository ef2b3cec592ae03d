//! Application services for songboard.

pub mod batch;
pub mod catalog;
pub mod import;
pub mod scheduler;
pub mod sync;

pub use catalog::{CatalogClient, CatalogProvider, ItunesProvider};
pub use import::{AlbumImport, Importer, TrackImport};
pub use scheduler::{JobContext, Scheduler};
pub use sync::{SyncAllReport, SyncApplyReport, SyncPreview, SyncService};
