use std::{ffi::c_int, io, mem::MaybeUninit};

use libc::{proc_pidinfo, proc_taskinfo, PROC_PIDTASKINFO};
use snafu::IntoError as _;

use crate::{
    error::{ProcessNotAccessible, QueryFailed},
    ProcessId, QueryError,
};

/// A working-set querier.
#[derive(Default)]
pub(crate) struct Querier;

impl Querier {
    pub(crate) fn working_set_size(&mut self, pid: ProcessId) -> Result<u64, QueryError> {
        // Process identifiers are signed on macOS, so anything that doesn't fit can't name a process.
        let raw_pid = c_int::try_from(pid.as_raw())
            .map_err(|_| ProcessNotAccessible { pid }.into_error(io::ErrorKind::InvalidInput.into()))?;

        // Prepare a holding struct for the task info.
        let mut task_info = MaybeUninit::<proc_taskinfo>::uninit();
        let task_info_len = std::mem::size_of::<proc_taskinfo>() as c_int;

        // SAFETY: We're passing a valid pointer, and struct length, for the task info output.
        let written = unsafe {
            proc_pidinfo(
                raw_pid,
                PROC_PIDTASKINFO,
                0,
                task_info.as_mut_ptr().cast(),
                task_info_len,
            )
        };

        // There's no separate handle to acquire on macOS, so a missing process or a permission failure from the query
        // itself is treated as the process not being accessible.
        if written <= 0 {
            let error = io::Error::last_os_error();
            return match error.raw_os_error() {
                Some(libc::ESRCH) | Some(libc::EPERM) => Err(ProcessNotAccessible { pid }.into_error(error)),
                _ => Err(QueryFailed { pid }.into_error(error)),
            };
        }

        if written < task_info_len {
            return Err(QueryFailed { pid }.into_error(io::ErrorKind::UnexpectedEof.into()));
        }

        // SAFETY: We know the structure has been fully populated by `proc_pidinfo` at this point.
        let task_info = unsafe { task_info.assume_init() };
        Ok(task_info.pti_resident_size)
    }
}
