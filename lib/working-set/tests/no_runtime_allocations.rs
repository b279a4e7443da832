//! Allocation test for `Querier`.
//!
//! Note: this is an integration test as the global allocator must be overridden to track all allocations made, and
//! doing so in normal unit tests could interfere with other tests.

use dhat::{HeapStats, Profiler};
use working_set::{ProcessId, Querier};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
fn no_runtime_allocations() {
    // After initially creating `Querier`, there should be _no_ runtime allocations made when calling
    // `working_set_size`, whether the query succeeds or fails.
    let mut querier = Querier::default();
    let own_pid = ProcessId::current();
    let missing_pid = ProcessId::new(u32::MAX);
    let _size = querier.working_set_size(own_pid).unwrap();

    let _profiler = Profiler::builder().testing().build();
    let _size = querier.working_set_size(own_pid).unwrap();
    let _size = querier.working_set_size(own_pid).unwrap();
    let _size = querier.working_set_size(own_pid).unwrap();
    let _error = querier.working_set_size(missing_pid).unwrap_err();
    let stats = HeapStats::get();

    dhat::assert_eq!(stats.total_blocks, 0);
    dhat::assert_eq!(stats.total_bytes, 0);
    dhat::assert_eq!(stats.max_blocks, 0);
    dhat::assert_eq!(stats.max_bytes, 0);
    dhat::assert_eq!(stats.curr_blocks, 0);
    dhat::assert_eq!(stats.curr_bytes, 0);
}
