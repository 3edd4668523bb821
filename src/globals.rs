use crate::domains::core::object_store::{ApiObjectStore, LocalObjectStore, ObjectStore};
use crate::domains::export::asset_fetcher::HttpAssetFetcher;
use crate::domains::export::repository::SqliteExportJobRepository;
use crate::domains::export::service::{ExportService, ExportServiceImpl};
use crate::domains::family::{PlanTierEntitlement, SqliteFamilyRepository};
use crate::ffi::error::{FFIError, FFIResult};
use crate::types::ExportConfig;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// Global state definitions
lazy_static! {
    static ref INIT_MUTEX: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
    static ref INITIALIZED: AtomicBool = AtomicBool::new(false);

    static ref DB_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);
    static ref OBJECT_STORE: Mutex<Option<Arc<dyn ObjectStore>>> = Mutex::new(None);
    static ref EXPORT_SERVICE: Mutex<Option<Arc<dyn ExportService>>> = Mutex::new(None);
}

/// Where published archives go, decided from `FAMILY_ARCHIVE_*` variables.
#[derive(Debug, Clone, PartialEq)]
enum StoreSettings {
    Api {
        base_url: String,
        api_key: String,
        bucket: String,
    },
    Local {
        public_base_url: String,
        signing_secret: Option<String>,
    },
}

const DEFAULT_BUCKET: &str = "family-archives";

fn store_settings<F>(var: F, storage_path: &str) -> StoreSettings
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

    if let Some(base_url) = non_empty("FAMILY_ARCHIVE_STORAGE_URL") {
        return StoreSettings::Api {
            base_url,
            api_key: non_empty("FAMILY_ARCHIVE_STORAGE_KEY").unwrap_or_default(),
            bucket: non_empty("FAMILY_ARCHIVE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
        };
    }

    StoreSettings::Local {
        public_base_url: non_empty("FAMILY_ARCHIVE_PUBLIC_URL")
            .unwrap_or_else(|| format!("file://{}", storage_path.trim_end_matches('/'))),
        signing_secret: non_empty("FAMILY_ARCHIVE_SIGNING_SECRET"),
    }
}

fn build_object_store(settings: StoreSettings, storage_path: &str) -> FFIResult<Arc<dyn ObjectStore>> {
    match settings {
        StoreSettings::Api { base_url, api_key, bucket } => {
            if api_key.is_empty() {
                warn!("FAMILY_ARCHIVE_STORAGE_KEY is not set; storage API calls will be unauthenticated");
            }
            info!("Publishing archives to storage API {} (bucket {})", base_url, bucket);
            let store = ApiObjectStore::new(&base_url, &bucket, &api_key)
                .map_err(|e| FFIError::internal(format!("Object store configuration failed: {}", e)))?;
            Ok(Arc::new(store))
        }
        StoreSettings::Local { public_base_url, signing_secret } => {
            let secret = signing_secret.unwrap_or_else(|| {
                warn!("FAMILY_ARCHIVE_SIGNING_SECRET is not set; signed links will not survive a restart");
                Uuid::new_v4().to_string()
            });
            info!("Publishing archives to local directory {}", storage_path);
            let store = LocalObjectStore::new(storage_path, &public_base_url, &secret)
                .map_err(|e| FFIError::internal(format!("Failed to create archive directory: {}", e)))?;
            Ok(Arc::new(store))
        }
    }
}

/// Initialize logging, the database pool and the export service. Later calls are no-ops.
pub async fn initialize(db_url: &str, storage_path: &str) -> FFIResult<()> {
    // Acquire the async mutex to ensure single initialization
    let _guard = INIT_MUTEX.lock().await;

    if INITIALIZED.load(Ordering::Acquire) {
        return Ok(());
    }

    let result = initialize_internal(db_url, storage_path).await;

    // Mark as initialized only if successful
    if result.is_ok() {
        INITIALIZED.store(true, Ordering::Release);
    }

    result
}

async fn initialize_internal(db_url: &str, storage_path: &str) -> FFIResult<()> {
    dotenv::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        #[cfg(debug_assertions)]
        std::env::set_var("RUST_LOG", "debug");
        #[cfg(not(debug_assertions))]
        std::env::set_var("RUST_LOG", "info");
    }

    // Initialize env_logger if not already initialized
    let _ = env_logger::try_init();

    info!("Starting internal initialization");
    debug!("Database URL: {}", db_url);
    debug!("Archive storage path: {}", storage_path);

    let config = ExportConfig::from_env();
    debug!("Export config: {:?}", config);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .map_err(|e| FFIError::internal(format!("Database connection failed: {}", e)))?;

    *DB_POOL
        .lock()
        .map_err(|_| FFIError::internal("DB_POOL lock poisoned".to_string()))? = Some(pool.clone());

    // Schema must exist before any service touches the pool
    crate::db_migration::initialize_database().await?;

    let settings = store_settings(|name| std::env::var(name).ok(), storage_path);
    let store = build_object_store(settings, storage_path)?;

    let family_repo = Arc::new(SqliteFamilyRepository::new(pool.clone()));
    let job_repo = Arc::new(SqliteExportJobRepository::new(pool.clone()));
    let fetcher = HttpAssetFetcher::new(config.asset_fetch_timeout)
        .map_err(|e| FFIError::internal(format!("Failed to build asset HTTP client: {}", e)))?;
    let fetcher = Arc::new(fetcher);

    let export_service: Arc<dyn ExportService> = Arc::new(ExportServiceImpl::new(
        family_repo.clone(),
        family_repo,
        job_repo,
        Arc::new(PlanTierEntitlement),
        fetcher,
        store.clone(),
        config,
    ));

    *OBJECT_STORE
        .lock()
        .map_err(|_| FFIError::internal("OBJECT_STORE lock poisoned".to_string()))? = Some(store);
    *EXPORT_SERVICE
        .lock()
        .map_err(|_| FFIError::internal("EXPORT_SERVICE lock poisoned".to_string()))? = Some(export_service);

    info!("Initialization complete");
    Ok(())
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Get the database pool
pub fn get_db_pool() -> FFIResult<SqlitePool> {
    DB_POOL
        .lock()
        .map_err(|_| FFIError::internal("DB_POOL lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| FFIError::internal("Database not initialized".to_string()))
}

/// Get the object store archives are published to
pub fn get_object_store() -> FFIResult<Arc<dyn ObjectStore>> {
    OBJECT_STORE
        .lock()
        .map_err(|_| FFIError::internal("OBJECT_STORE lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| FFIError::internal("Object store not initialized".to_string()))
}

/// Get the export service
pub fn get_export_service() -> FFIResult<Arc<dyn ExportService>> {
    EXPORT_SERVICE
        .lock()
        .map_err(|_| FFIError::internal("EXPORT_SERVICE lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| FFIError::internal("Export service not initialized".to_string()))
}

/// Initialize globals once for the whole test binary, against a scratch
/// database and archive directory.
#[cfg(test)]
pub fn initialize_for_tests() -> std::path::PathBuf {
    let root = std::env::temp_dir().join(format!("family-archive-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&root).unwrap();
    let db_url = format!("sqlite://{}?mode=rwc", root.join("archive.db").display());
    let storage = root.join("archives");

    crate::ffi::block_on_async(initialize(&db_url, &storage.to_string_lossy())).unwrap();
    root
}
