// FFI bindings for the `ExportService`.
//
// Every entry point takes the caller as JSON (`{ "user_id": "<uuid>" | null }`),
// writes a JSON document to `*result` and returns the `ErrorCode` as an int.
// On failure `*result` holds the serialized `FFIError`, including `httpStatus`.
// Strings handed out here must be released with `family_export_free`.

use std::ffi::{c_char, CString};
use std::os::raw::c_int;

use uuid::Uuid;

use crate::domains::export::service::ExportService;
use crate::domains::export::types::{ExportJob, ExportSummary};
use crate::ffi::error::{FFIError, FFIResult};
use crate::ffi::{block_on_async, handle_status_result, parse_caller, required_str, write_json_result};

async fn export_status(service: &dyn ExportService, caller_json: &str) -> FFIResult<ExportSummary> {
    let auth = parse_caller(caller_json)?;
    Ok(service.get_export_status(&auth).await?)
}

async fn export_start(service: &dyn ExportService, caller_json: &str) -> FFIResult<ExportSummary> {
    let auth = parse_caller(caller_json)?;
    Ok(service.start_export(&auth).await?)
}

async fn export_list_archives(service: &dyn ExportService, caller_json: &str) -> FFIResult<Vec<String>> {
    let auth = parse_caller(caller_json)?;
    Ok(service.list_archives(&auth).await?)
}

async fn export_get_job(service: &dyn ExportService, caller_json: &str, job_id: &str) -> FFIResult<ExportJob> {
    let auth = parse_caller(caller_json)?;
    let job_id = Uuid::parse_str(job_id.trim())
        .map_err(|_| FFIError::invalid_argument(&format!("Invalid job id: {}", job_id)))?;
    Ok(service.get_job(job_id, &auth).await?)
}

/// Latest export of the caller's family plus a fresh download link when it is ready.
///
/// # Safety
/// `caller_json` must be a NUL-terminated string; `result` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn family_export_get_status(caller_json: *const c_char, result: *mut *mut c_char) -> c_int {
    if result.is_null() {
        return handle_status_result(|| Err(FFIError::null_pointer("result is null")));
    }
    let outcome = required_str(caller_json, "caller_json").and_then(|caller| {
        let service = crate::globals::get_export_service()?;
        block_on_async(export_status(service.as_ref(), caller))
    });
    write_json_result(result, outcome)
}

/// Run a full export for the caller's family. Blocks until the archive is
/// published or the job has failed.
///
/// # Safety
/// `caller_json` must be a NUL-terminated string; `result` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn family_export_start(caller_json: *const c_char, result: *mut *mut c_char) -> c_int {
    if result.is_null() {
        return handle_status_result(|| Err(FFIError::null_pointer("result is null")));
    }
    let outcome = required_str(caller_json, "caller_json").and_then(|caller| {
        let service = crate::globals::get_export_service()?;
        block_on_async(export_start(service.as_ref(), caller))
    });
    write_json_result(result, outcome)
}

/// Keys of every archive published for the caller's family, as a JSON array.
///
/// # Safety
/// `caller_json` must be a NUL-terminated string; `result` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn family_export_list_archives(caller_json: *const c_char, result: *mut *mut c_char) -> c_int {
    if result.is_null() {
        return handle_status_result(|| Err(FFIError::null_pointer("result is null")));
    }
    let outcome = required_str(caller_json, "caller_json").and_then(|caller| {
        let service = crate::globals::get_export_service()?;
        block_on_async(export_list_archives(service.as_ref(), caller))
    });
    write_json_result(result, outcome)
}

/// A single export job of the caller's family.
///
/// # Safety
/// `caller_json` and `job_id` must be NUL-terminated strings; `result` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn family_export_get_job(
    caller_json: *const c_char,
    job_id: *const c_char,
    result: *mut *mut c_char,
) -> c_int {
    if result.is_null() {
        return handle_status_result(|| Err(FFIError::null_pointer("result is null")));
    }
    let outcome = required_str(caller_json, "caller_json").and_then(|caller| {
        let job_id = required_str(job_id, "job_id")?;
        let service = crate::globals::get_export_service()?;
        block_on_async(export_get_job(service.as_ref(), caller, job_id))
    });
    write_json_result(result, outcome)
}

/// Free a string returned by any `family_export_*` function.
///
/// # Safety
/// `ptr` must come from this library and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn family_export_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
