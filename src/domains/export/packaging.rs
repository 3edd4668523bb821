use chrono::{DateTime, Utc};
use log::{debug, info};
use std::io::{Cursor, Write};
use tokio::task;
use uuid::Uuid;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::domains::core::object_store::ObjectStore;
use crate::errors::{ServiceError, ServiceResult};

use super::naming::file_title;
use super::types::ArchiveEntry;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Serialize every entry into one deflate-compressed zip held in memory.
/// Returns the bytes and their length.
pub fn package(entries: &[ArchiveEntry], compression_level: i32) -> ServiceResult<(Vec<u8>, u64)> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(compression_level));

    for entry in entries {
        zip.start_file(entry.path.as_str(), options)
            .map_err(|e| ServiceError::PackagingFailed(format!("Failed to add {} to archive: {}", entry.path, e)))?;
        zip.write_all(entry.content.as_bytes())
            .map_err(|e| ServiceError::PackagingFailed(format!("Failed to write {} to archive: {}", entry.path, e)))?;
    }

    let bytes = zip
        .finish()
        .map_err(|e| ServiceError::PackagingFailed(format!("Failed to finalize archive: {}", e)))?
        .into_inner();
    let size = bytes.len() as u64;

    debug!("Packaged {} entries into {} bytes", entries.len(), size);
    Ok((bytes, size))
}

/// Runs [`package`] on the blocking pool; compression is CPU bound.
pub async fn package_in_background(entries: Vec<ArchiveEntry>, compression_level: i32) -> ServiceResult<(Vec<u8>, u64)> {
    task::spawn_blocking(move || package(&entries, compression_level))
        .await
        .map_err(|e| ServiceError::PackagingFailed(format!("Packaging task failed: {}", e)))?
}

/// `<familyId>/<timestamp without colons>_<family name>.zip`
pub fn object_key(family_id: Uuid, family_name: &str, now: DateTime<Utc>, max_title_len: usize) -> String {
    format!(
        "{}/{}_{}.zip",
        family_id,
        now.format("%Y-%m-%dT%H%M%S%.3fZ"),
        file_title(Some(family_name), max_title_len)
    )
}

/// Upload the packaged archive under `key`; returns the stored size.
pub async fn publish(store: &dyn ObjectStore, key: &str, bytes: Vec<u8>) -> ServiceResult<u64> {
    let size = store
        .upload(key, bytes, ARCHIVE_CONTENT_TYPE)
        .await
        .map_err(|e| ServiceError::PublishFailed(format!("Upload of {} failed: {}", key, e)))?;

    info!("Published archive {} ({} bytes)", key, size);
    Ok(size)
}
