//! Handle leak test for `Querier`.
//!
//! Note: this is an integration test so that no other tests are opening or closing handles concurrently while we're
//! counting them.

use working_set::{query_working_set_size, ProcessId, Querier};

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn open_handle_count() -> usize {
    #[cfg(target_os = "linux")]
    const FD_DIR: &str = "/proc/self/fd";
    #[cfg(target_os = "macos")]
    const FD_DIR: &str = "/dev/fd";

    // The directory listing itself holds a descriptor open, but it does so on every call, so counts stay comparable.
    std::fs::read_dir(FD_DIR).unwrap().count()
}

#[cfg(target_os = "windows")]
fn open_handle_count() -> usize {
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, GetProcessHandleCount};

    let mut count = 0;
    // SAFETY: The pseudo-handle for the current process is always valid, and we pass a valid output pointer.
    let result = unsafe { GetProcessHandleCount(GetCurrentProcess(), &mut count) };
    assert_ne!(result, 0);
    count as usize
}

#[test]
fn no_handle_leaks() {
    const ITERATIONS: usize = 1000;

    let mut querier = Querier::default();
    let own_pid = ProcessId::current();

    // Warm up once so that anything lazily initialized by the platform is already in place.
    querier.working_set_size(own_pid).unwrap();
    let _ = querier.working_set_size(ProcessId::new(u32::MAX));

    let before = open_handle_count();
    for i in 0..ITERATIONS {
        assert!(querier.working_set_size(ProcessId::new(u32::MAX - i as u32)).is_err());
        #[cfg(any(target_os = "linux", target_os = "windows"))]
        assert!(query_working_set_size(ProcessId::new(0)).is_err());
        assert!(query_working_set_size(ProcessId::new(u32::MAX)).is_err());
        assert!(querier.working_set_size(own_pid).is_ok());
    }
    let after = open_handle_count();

    assert_eq!(before, after);
}
