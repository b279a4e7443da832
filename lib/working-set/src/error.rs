use std::io;

use snafu::Snafu;

use crate::ProcessId;

/// A working-set query error.
///
/// The underlying source is always an OS error code or a bare [`io::ErrorKind`], so constructing one of these never
/// allocates.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum QueryError {
    /// A handle to the process could not be acquired.
    ///
    /// The process may not exist, the caller may lack the permission to query it, or the identifier may be reserved
    /// or out of range for the platform.
    #[snafu(display("Process {} is not accessible: {}", pid, source))]
    ProcessNotAccessible {
        /// Process that was queried.
        pid: ProcessId,

        /// Error source.
        source: io::Error,
    },

    /// A handle to the process was acquired, but its memory counters could not be read.
    #[snafu(display("Failed to query memory counters for process {}: {}", pid, source))]
    QueryFailed {
        /// Process that was queried.
        pid: ProcessId,

        /// Error source.
        source: io::Error,
    },
}

impl QueryError {
    /// Returns the process identifier this error concerns.
    pub fn pid(&self) -> ProcessId {
        match self {
            Self::ProcessNotAccessible { pid, .. } | Self::QueryFailed { pid, .. } => *pid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_pid() {
        let error = QueryError::ProcessNotAccessible {
            pid: ProcessId::new(17),
            source: io::ErrorKind::NotFound.into(),
        };
        assert_eq!(error.pid(), ProcessId::new(17));
        assert!(error.to_string().starts_with("Process 17 is not accessible"));

        let error = QueryError::QueryFailed {
            pid: ProcessId::new(23),
            source: io::ErrorKind::InvalidData.into(),
        };
        assert_eq!(error.pid(), ProcessId::new(23));
        assert!(error.to_string().contains("process 23"));
    }
}
