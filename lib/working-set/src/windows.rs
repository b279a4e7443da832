use std::{io, mem::MaybeUninit};

use snafu::IntoError as _;
use windows_sys::Win32::{
    Foundation::{CloseHandle, HANDLE},
    System::{
        ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS},
        Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ},
    },
};

use crate::{
    error::{ProcessNotAccessible, QueryFailed},
    ProcessId, QueryError,
};

/// An owned process handle, closed on drop.
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    /// Opens a handle to the given process with enough access to read its memory counters.
    fn open(pid: ProcessId) -> io::Result<Self> {
        // SAFETY: `OpenProcess` has no pointer arguments, and a null return value is handled below.
        let handle = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, 0, pid.as_raw()) };
        if handle.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(Self(handle))
        }
    }

    fn memory_counters(&self) -> io::Result<PROCESS_MEMORY_COUNTERS> {
        // Prepare a holding struct for the process memory counters.
        let mut pmc = MaybeUninit::<PROCESS_MEMORY_COUNTERS>::uninit();
        let pmc_len = std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;

        // SAFETY: The handle is open for the lifetime of `self`, and we're passing a valid pointer, and struct length,
        // for the counters output.
        let result = unsafe { GetProcessMemoryInfo(self.0, pmc.as_mut_ptr(), pmc_len) };
        match result {
            0 => Err(io::Error::last_os_error()),

            // SAFETY: We know the structure has been populated by `GetProcessMemoryInfo` at this point.
            _ => Ok(unsafe { pmc.assume_init() }),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: We own the handle, and it's only ever closed here.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// A working-set querier.
#[derive(Default)]
pub(crate) struct Querier;

impl Querier {
    pub(crate) fn working_set_size(&mut self, pid: ProcessId) -> Result<u64, QueryError> {
        let handle = ProcessHandle::open(pid).map_err(|e| ProcessNotAccessible { pid }.into_error(e))?;

        // Failing to read the counters here generally means the process exited after we got the handle.
        let pmc = handle
            .memory_counters()
            .map_err(|e| QueryFailed { pid }.into_error(e))?;
        Ok(pmc.WorkingSetSize as u64)
    }
}
