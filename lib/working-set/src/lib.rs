//! Process working-set querying.
//!
//! This crate provides a way to query the working-set size of an arbitrary process, by process identifier: the
//! number of bytes of physical memory currently resident for that process.
//!
//! Every query follows the same shape: acquire a read-only handle to the process, ask the operating system for its
//! memory counters, and release the handle. The handle is released on every exit path, including failures. Failures
//! are reported as a [`QueryError`], which distinguishes between not being able to acquire a handle at all
//! ([`QueryError::ProcessNotAccessible`]) and acquiring one but failing to read the counters
//! ([`QueryError::QueryFailed`]).
//!
//! ## Windows
//!
//! On Windows, `OpenProcess` is used to acquire a handle with `PROCESS_QUERY_INFORMATION | PROCESS_VM_READ` access,
//! and `GetProcessMemoryInfo` is used to read `PROCESS_MEMORY_COUNTERS`. The `WorkingSetSize` counter is returned.
//!
//! ## Linux
//!
//! On Linux, [procfs](https://docs.kernel.org/filesystems/proc.html) is used, and the resident set size is read from
//! one of three files, depending on their availability:
//!
//! - `/proc/<pid>/smaps_rollup`: This file is a pre-aggregated version of `/proc/<pid>/smaps`, and is the most
//!   efficient way to query RSS. (Available in Linux 4.14+)
//! - `/proc/<pid>/smaps`: This file contains detailed information about the memory mappings of the process, and can
//!   be aggregated to determine the resident set size. (Available in Linux 2.6.14+)
//! - `/proc/<pid>/statm`: This file contains lazily-updated memory statistics about the process, and is the least
//!   accurate, but is generally good enough for most use-cases. (Available in Linux 2.6+)
//!
//! The open file descriptor serves as the process handle.
//!
//! ## macOS
//!
//! On macOS, we query the kernel with `proc_pidinfo` for the task information of the process, and return its resident
//! size.
//!
//! ## Other platforms
//!
//! No support. All queries fail with [`QueryError::ProcessNotAccessible`].

use std::fmt;

use tracing::{debug, trace};

mod error;
pub use self::error::QueryError;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use self::linux as sys;

#[cfg(target_os = "macos")]
mod darwin;
#[cfg(target_os = "macos")]
use self::darwin as sys;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
use self::windows as sys;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod unsupported;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
use self::unsupported as sys;

/// A process identifier.
///
/// This is an opaque reference to a process, assigned by the operating system. It is not validated in any way when
/// constructed: it may refer to a process which no longer exists, or one which the caller is not permitted to query.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Creates a new `ProcessId` from the given raw identifier.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the identifier of the calling process.
    pub fn current() -> Self {
        Self(std::process::id())
    }

    /// Returns the raw identifier.
    pub const fn as_raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ProcessId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A working-set querier.
///
/// Any scratch state needed to perform a query is allocated when the querier is created, so that querying does not
/// allocate. A querier holds no process handles between queries.
#[derive(Default)]
pub struct Querier {
    inner: sys::Querier,
}

impl Querier {
    /// Gets the working-set size of the given process, in bytes.
    ///
    /// The value is a point-in-time snapshot. Nothing is retried: a failed attempt is returned as-is.
    ///
    /// # Errors
    ///
    /// If a handle to the process cannot be acquired, because the process does not exist or the caller lacks
    /// permission to query it, [`QueryError::ProcessNotAccessible`] is returned. If the handle was acquired but the
    /// memory counters could not be read, [`QueryError::QueryFailed`] is returned.
    pub fn working_set_size(&mut self, pid: ProcessId) -> Result<u64, QueryError> {
        match self.inner.working_set_size(pid) {
            Ok(size) => {
                trace!(%pid, working_set_bytes = size, "Queried process working set.");
                Ok(size)
            }
            Err(e) => {
                match &e {
                    QueryError::ProcessNotAccessible { source, .. } => {
                        trace!(%pid, error = %source, "Process not accessible for working set query.")
                    }
                    QueryError::QueryFailed { source, .. } => {
                        debug!(%pid, error = %source, "Failed to query process memory counters.")
                    }
                }
                Err(e)
            }
        }
    }
}

/// Queries the working-set size of the given process, in bytes.
///
/// This constructs a fresh [`Querier`] for the single query. Callers that query repeatedly should hold on to a
/// `Querier` instead, which avoids re-allocating its scratch state on every call.
///
/// # Errors
///
/// See [`Querier::working_set_size`].
pub fn query_working_set_size(pid: ProcessId) -> Result<u64, QueryError> {
    Querier::default().working_set_size(pid)
}
