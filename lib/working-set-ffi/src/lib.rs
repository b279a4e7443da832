//! C ABI for querying the working-set size of a process.
//!
//! This crate builds a dynamic library (`memory_usage.dll`, `libmemory_usage.so`, `libmemory_usage.dylib`) meant to be
//! loaded by a host application and called through its foreign-function interface.
//!
//! ## Exported functions
//!
//! - `get_memory_usage(pid) -> int64_t`: the working-set size of the process in bytes, or `-1` if the process could
//!   not be queried for any reason.
//! - `get_memory_usage_detailed(pid, out_bytes) -> int32_t`: the same query, but returning a status code that tells
//!   the failure causes apart, with the size written through `out_bytes` on success.
//! - `memory_usage_abi_version() -> uint32_t`: a stable ABI contract version (not the crate version).
//! - `memory_usage_init_logging() -> int32_t`: opt-in diagnostics to standard error, configured through the
//!   `MEMORY_USAGE_LOG_LEVEL` and `MEMORY_USAGE_LOG_FORMAT_JSON` environment variables.
//!
//! No call ever unwinds across the boundary: panics are caught and reported as failures.
//!
//! ### Minimal C usage
//! ```c
//! #include <stdint.h>
//! #include <stdio.h>
//!
//! int64_t get_memory_usage(uint32_t pid);
//!
//! int main(void) {
//!   int64_t bytes = get_memory_usage(1234);
//!   if (bytes < 0) {
//!     puts("no measurement available");
//!   } else {
//!     printf("working set: %lld bytes\n", (long long)bytes);
//!   }
//!   return 0;
//! }
//! ```
//!
//! ### Compatibility with 32-bit `int` callers
//!
//! `get_memory_usage` returns a 64-bit integer so that working sets of 2GiB and more are not truncated. Callers that
//! declare the return type as a 32-bit `int` (the default for Python's `ctypes`) still observe `-1` on failure, and
//! the low 32 bits of the size on success.

use std::panic::{catch_unwind, UnwindSafe};

use tracing::{error, warn};
use working_set::{query_working_set_size, ProcessId, QueryError};

pub mod config;
pub mod logging;

use self::config::LoggingConfiguration;

/// Stable ABI contract version (bump on breaking C ABI changes).
pub const MEMORY_USAGE_ABI_VERSION: u32 = 1;

/// Value returned by `get_memory_usage` when no measurement is available.
pub const MEMORY_USAGE_FAILED: i64 = -1;

/// Status of a detailed working-set query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum QueryStatus {
    /// The query succeeded, and the working-set size was written to the output pointer.
    Ok = 0,

    /// A handle to the process could not be acquired: it does not exist, or the caller lacks permission.
    ProcessNotAccessible = 1,

    /// A handle to the process was acquired, but its memory counters could not be read.
    QueryFailed = 2,

    /// An argument was invalid, such as a null output pointer.
    InvalidArgument = 3,

    /// An internal error occurred.
    InternalError = 4,
}

impl From<&QueryError> for QueryStatus {
    fn from(error: &QueryError) -> Self {
        match error {
            QueryError::ProcessNotAccessible { .. } => Self::ProcessNotAccessible,
            QueryError::QueryFailed { .. } => Self::QueryFailed,
        }
    }
}

fn catch_panic<F, T>(f: F) -> Option<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(value) => Some(value),
        Err(_) => {
            error!("Caught panic while querying process memory.");
            None
        }
    }
}

/// Returns the working-set size of the given process, in bytes.
///
/// Returns `-1` if the process does not exist, cannot be accessed, or its memory counters could not be read. Sizes
/// larger than `INT64_MAX` are saturated.
#[no_mangle]
pub extern "C" fn get_memory_usage(pid: u32) -> i64 {
    match catch_panic(|| query_working_set_size(ProcessId::new(pid))) {
        Some(Ok(size)) => i64::try_from(size).unwrap_or(i64::MAX),
        Some(Err(_)) | None => MEMORY_USAGE_FAILED,
    }
}

/// Queries the working-set size of the given process, in bytes, distinguishing between failure causes.
///
/// On success, the size is written to `out_bytes` and `0` is returned. Otherwise, `out_bytes` is left untouched and a
/// non-zero [`QueryStatus`] is returned.
///
/// # Safety
///
/// `out_bytes` must either be null, in which case `InvalidArgument` is returned, or be valid for a write of a single,
/// properly-aligned `uint64_t`.
#[no_mangle]
pub unsafe extern "C" fn get_memory_usage_detailed(pid: u32, out_bytes: *mut u64) -> i32 {
    if out_bytes.is_null() {
        return QueryStatus::InvalidArgument as i32;
    }

    let status = match catch_panic(|| query_working_set_size(ProcessId::new(pid))) {
        Some(Ok(size)) => {
            // SAFETY: The caller guarantees `out_bytes` is valid for writes, and we've checked that it's not null.
            unsafe { out_bytes.write(size) };
            QueryStatus::Ok
        }
        Some(Err(e)) => QueryStatus::from(&e),
        None => QueryStatus::InternalError,
    };

    status as i32
}

/// Returns the ABI contract version.
///
/// This is **not** the crate version; it only changes when the C ABI changes in a backward-incompatible way.
#[no_mangle]
pub extern "C" fn memory_usage_abi_version() -> u32 {
    MEMORY_USAGE_ABI_VERSION
}

/// Initializes logging to standard error.
///
/// Configuration is read from the `MEMORY_USAGE_LOG_LEVEL` and `MEMORY_USAGE_LOG_FORMAT_JSON` environment variables.
/// Returns `0` on success, or `-1` if logging could not be initialized, such as when the host process already
/// installed a global `tracing` subscriber.
#[no_mangle]
pub extern "C" fn memory_usage_init_logging() -> i32 {
    let config = LoggingConfiguration::from_env();
    match catch_panic(|| logging::initialize_logging(&config)) {
        Some(Ok(())) => 0,
        Some(Err(e)) => {
            // Only reaches a subscriber someone else already installed.
            warn!(error = %e, "Failed to initialize logging.");
            -1
        }
        None => -1,
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    #[test]
    fn own_process() {
        let bytes = get_memory_usage(std::process::id());
        assert!(bytes > 0);
    }

    #[test]
    fn missing_process() {
        assert_eq!(get_memory_usage(u32::MAX), MEMORY_USAGE_FAILED);
    }

    #[cfg(any(target_os = "linux", target_os = "windows"))]
    #[test]
    fn reserved_process() {
        assert_eq!(get_memory_usage(0), MEMORY_USAGE_FAILED);
    }

    #[test]
    fn detailed_own_process() {
        let mut bytes = 0u64;
        let status = unsafe { get_memory_usage_detailed(std::process::id(), &mut bytes) };
        assert_eq!(status, QueryStatus::Ok as i32);
        assert!(bytes > 0);
    }

    #[test]
    fn detailed_missing_process() {
        let mut bytes = 42u64;
        let status = unsafe { get_memory_usage_detailed(u32::MAX, &mut bytes) };
        assert_eq!(status, QueryStatus::ProcessNotAccessible as i32);
        assert_eq!(bytes, 42);
    }

    #[test]
    fn detailed_null_output() {
        let status = unsafe { get_memory_usage_detailed(std::process::id(), ptr::null_mut()) };
        assert_eq!(status, QueryStatus::InvalidArgument as i32);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn detailed_inaccessible_process() {
        // Init's memory maps are off limits unless we're privileged enough to trace it.
        match std::fs::File::open("/proc/1/smaps_rollup") {
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {}
            _ => return,
        }

        let mut bytes = 42u64;
        let status = unsafe { get_memory_usage_detailed(1, &mut bytes) };
        assert_eq!(status, QueryStatus::ProcessNotAccessible as i32);
        assert_eq!(status, 1);
        assert_eq!(bytes, 42);
        assert_eq!(get_memory_usage(1), MEMORY_USAGE_FAILED);
    }

    #[test]
    fn status_codes() {
        let pid = ProcessId::new(7);
        let not_accessible = QueryError::ProcessNotAccessible {
            pid,
            source: std::io::ErrorKind::PermissionDenied.into(),
        };
        let query_failed = QueryError::QueryFailed {
            pid,
            source: std::io::ErrorKind::InvalidData.into(),
        };

        assert_eq!(QueryStatus::from(&not_accessible) as i32, 1);
        assert_eq!(QueryStatus::from(&query_failed) as i32, 2);
        assert_eq!(QueryStatus::Ok as i32, 0);
        assert_eq!(QueryStatus::InvalidArgument as i32, 3);
        assert_eq!(QueryStatus::InternalError as i32, 4);
    }

    #[test]
    fn abi_version() {
        assert_eq!(memory_usage_abi_version(), MEMORY_USAGE_ABI_VERSION);
    }

    #[test]
    fn logging_initializes_once() {
        assert_eq!(memory_usage_init_logging(), 0);
        assert_eq!(memory_usage_init_logging(), -1);

        // Queries keep working, and keep collapsing failures, with a subscriber installed.
        assert!(get_memory_usage(std::process::id()) > 0);
        assert_eq!(get_memory_usage(u32::MAX), MEMORY_USAGE_FAILED);
    }
}
