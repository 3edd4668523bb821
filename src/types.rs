use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subscription tier of a family. Only some tiers may request an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Premium,
    Legacy,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
            PlanTier::Legacy => "legacy",
        }
    }

    /// Unknown tiers are treated as `Free`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "premium" => PlanTier::Premium,
            "legacy" => PlanTier::Legacy,
            _ => PlanTier::Free,
        }
    }

    pub fn allows_export(&self) -> bool {
        matches!(self, PlanTier::Premium | PlanTier::Legacy)
    }
}

/// Longest retention accepted from the environment (ten years)
pub const MAX_RETENTION_DAYS: u64 = 3650;

/// Tunables for the archival export pipeline
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Per-asset network timeout
    pub asset_fetch_timeout: Duration,
    /// Lifetime of a generated download link
    pub signed_url_ttl: Duration,
    /// How long a completed archive stays downloadable
    pub archive_retention: chrono::Duration,
    /// Deflate level used when packaging (1-9)
    pub compression_level: i32,
    /// Titles are cut to this many characters before sanitizing
    pub max_title_len: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            asset_fetch_timeout: Duration::from_secs(15),
            signed_url_ttl: Duration::from_secs(3600),
            archive_retention: chrono::Duration::days(7),
            compression_level: 6,
            max_title_len: 50,
        }
    }
}

impl ExportConfig {
    /// Build a config from `FAMILY_ARCHIVE_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let asset_fetch_timeout = env_u64("FAMILY_ARCHIVE_ASSET_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.asset_fetch_timeout);
        let signed_url_ttl = env_u64("FAMILY_ARCHIVE_SIGNED_URL_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.signed_url_ttl);
        let archive_retention = env_u64("FAMILY_ARCHIVE_RETENTION_DAYS")
            .map(retention_from_days)
            .unwrap_or(defaults.archive_retention);
        let compression_level = env_u64("FAMILY_ARCHIVE_COMPRESSION_LEVEL")
            .map(|level| level.clamp(1, 9) as i32)
            .unwrap_or(defaults.compression_level);
        let max_title_len = env_u64("FAMILY_ARCHIVE_MAX_TITLE_LEN")
            .map(|len| len.max(1) as usize)
            .unwrap_or(defaults.max_title_len);

        Self {
            asset_fetch_timeout,
            signed_url_ttl,
            archive_retention,
            compression_level,
            max_title_len,
        }
    }
}

fn retention_from_days(days: u64) -> chrono::Duration {
    if days > MAX_RETENTION_DAYS {
        log::warn!("Retention of {} days capped at {}", days, MAX_RETENTION_DAYS);
    }
    chrono::Duration::days(days.min(MAX_RETENTION_DAYS) as i64)
}

fn env_u64(key: &str) -> Option<u64> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring unparsable {}={}", key, raw);
                None
            }
        },
        Err(_) => None,
    }
}
