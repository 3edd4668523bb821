use std::ffi::{c_char, CStr, CString};
use std::os::raw::c_int;

use lazy_static::lazy_static;
use serde::Deserialize;
use tokio::runtime::Runtime;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::ffi::error::{ErrorCode, FFIError};

pub mod error;
pub mod export;

pub use error::FFIResult;

lazy_static! {
    // Shared by every entry point so pools and clients outlive a single call
    static ref RUNTIME: Runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("family-archive-ffi")
        .build()
        .expect("Failed to create Tokio runtime");
}

/// Run async code to completion from a synchronous FFI entry point
pub fn block_on_async<F, T, E>(future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    RUNTIME.block_on(future)
}

/// Error handling helper for FFI boundaries (returns error code)
pub fn handle_status_result<F>(func: F) -> c_int
where
    F: FnOnce() -> FFIResult<()>,
{
    match func() {
        Ok(_) => ErrorCode::Success as c_int,
        Err(e) => {
            log::warn!(
                "FFI call failed: code={:?} status={} message={}",
                e.code,
                e.http_status,
                e.message
            );
            e.code as c_int
        }
    }
}

/// Serialize `value` into a caller-owned C string.
pub fn to_c_json<T: serde::Serialize>(value: &T) -> FFIResult<*mut c_char> {
    let json = serde_json::to_string(value)
        .map_err(|e| FFIError::internal(format!("JSON serialization failed: {}", e)))?;
    Ok(CString::new(json)?.into_raw())
}

/// Write the JSON form of `result` to `*out` and return its status code.
/// Errors are written too, so the caller can always parse `*out`.
///
/// # Safety
/// `out` must be null or valid for writes.
pub unsafe fn write_json_result<T: serde::Serialize>(out: *mut *mut c_char, result: FFIResult<T>) -> c_int {
    let (payload, outcome) = match result {
        Ok(value) => (to_c_json(&value), Ok(())),
        Err(err) => (to_c_json(&err), Err(err)),
    };

    if !out.is_null() {
        match payload {
            Ok(ptr) => *out = ptr,
            Err(e) => {
                log::error!("Failed to encode FFI response: {}", e);
                *out = std::ptr::null_mut();
            }
        }
    }

    handle_status_result(|| outcome)
}

/// Borrow a required C string argument as UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives the call.
pub unsafe fn required_str<'a>(ptr: *const c_char, name: &str) -> FFIResult<&'a str> {
    if ptr.is_null() {
        return Err(FFIError::null_pointer(&format!("{} is null", name)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| FFIError::new(ErrorCode::InvalidUtf8, &format!("{} is not valid UTF-8", name)))
}

/// Caller identity as sent by the host, `{ "user_id": "<uuid>" | null }`.
#[derive(Debug, Deserialize)]
pub struct CallerPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl CallerPayload {
    /// A missing or null `user_id` yields an anonymous context.
    pub fn into_auth(self) -> FFIResult<AuthContext> {
        let device_id = self.device_id.unwrap_or_else(|| "ffi".to_string());
        match self.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(AuthContext::anonymous(device_id)),
            Some(raw) => {
                let user_id = Uuid::parse_str(raw)
                    .map_err(|_| FFIError::new(ErrorCode::InvalidUuid, &format!("Invalid user_id: {}", raw)))?;
                Ok(AuthContext::new(user_id, device_id))
            }
        }
    }
}

/// Parse the caller JSON into an `AuthContext`.
pub fn parse_caller(json: &str) -> FFIResult<AuthContext> {
    let payload: CallerPayload = serde_json::from_str(json)
        .map_err(|e| FFIError::invalid_argument(&format!("Invalid caller JSON: {}", e)))?;
    payload.into_auth()
}
