use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domains::family::ContentKind;

/// Export job statuses.
///
/// `Pending` and `Processing` are both "in flight"; `Completed` and `Failed`
/// are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExportStatus::Pending),
            "processing" => Some(ExportStatus::Processing),
            "completed" => Some(ExportStatus::Completed),
            "failed" => Some(ExportStatus::Failed),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, ExportStatus::Pending | ExportStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }
}

/// Row mapped to the `export_jobs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: Uuid,
    pub family_id: Uuid,
    pub requested_by: Uuid,
    pub status: ExportStatus,
    pub file_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExportJob {
    /// A fresh in-flight job as created by the job manager
    pub fn new_processing(family_id: Uuid, requested_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            family_id,
            requested_by,
            status: ExportStatus::Processing,
            file_path: None,
            file_size_bytes: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            expires_at: None,
        }
    }

    /// Completed, has a stored archive and has not yet expired at `now`.
    pub fn is_downloadable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ExportStatus::Completed
            && self.file_path.is_some()
            && self.expires_at.map(|exp| exp > now).unwrap_or(false)
    }
}

/// Summary returned to the caller of the status and trigger entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub export: Option<ExportJob>,
    pub download_url: Option<String>,
}

/// Body of one file inside the archive
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveContent {
    Text(String),
    Binary(Vec<u8>),
}

impl ArchiveContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ArchiveContent::Text(text) => text.as_bytes(),
            ArchiveContent::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ArchiveContent::Binary(_))
    }
}

/// A virtual file inside the package: folder-relative path plus content.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: ArchiveContent,
}

impl ArchiveEntry {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: ArchiveContent::Text(content.into()),
        }
    }

    pub fn binary(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content: ArchiveContent::Binary(bytes),
        }
    }
}

/// Why a single asset could not be downloaded. Never fatal to the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalFailure {
    #[error("request timed out")]
    Timeout,
    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid asset URL: {0}")]
    InvalidUrl(String),
}

/// A content-kind query that failed during aggregation; that kind renders empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationFailure {
    pub kind: ContentKind,
    pub message: String,
}

/// Rows of one content kind left out because their id or timestamp was unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRows {
    pub kind: ContentKind,
    pub count: usize,
}

/// Result of packaging + publishing one archive
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArchive {
    pub key: String,
    pub size_bytes: i64,
    pub entry_count: usize,
}
