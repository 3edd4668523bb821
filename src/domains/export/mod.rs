pub mod aggregator;
pub mod archive_builder;
pub mod asset_fetcher;
pub mod naming;
pub mod packaging;
pub mod repository;
pub mod service;
pub mod types;

pub use aggregator::{AggregatedFamilyContent, ContentAggregator, MemberName};
pub use archive_builder::ArchiveBuilder;
pub use asset_fetcher::{AssetFetcher, HttpAssetFetcher};
pub use repository::{ExportJobRepository, SqliteExportJobRepository};
pub use service::{ExportService, ExportServiceImpl};
pub use types::{ArchiveEntry, ExportJob, ExportStatus, ExportSummary, RetrievalFailure};
