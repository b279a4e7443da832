use std::io;

use snafu::IntoError as _;

use crate::{error::ProcessNotAccessible, ProcessId, QueryError};

/// A working-set querier.
#[derive(Default)]
pub(crate) struct Querier;

impl Querier {
    pub(crate) fn working_set_size(&mut self, pid: ProcessId) -> Result<u64, QueryError> {
        Err(ProcessNotAccessible { pid }.into_error(io::ErrorKind::Unsupported.into()))
    }
}
