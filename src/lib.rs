// Public modules
pub mod auth;
pub mod domains;
pub mod errors;
pub mod ffi;
pub mod globals;
pub mod types;

// Private modules
mod db_migration;

/// Initialize the library with the given SQLite URL and archive storage directory.
/// This function must be called before any other function in the library.
pub async fn initialize(db_url: &str, storage_path: &str) -> ffi::FFIResult<()> {
    globals::initialize(db_url, storage_path).await
}

/// Get a reference to the SQLite connection pool
/// This is primarily for internal use
pub fn get_db_pool() -> ffi::FFIResult<sqlx::SqlitePool> {
    globals::get_db_pool()
}
