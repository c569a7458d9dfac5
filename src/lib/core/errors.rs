use anyhow::Error;
use std::io;

/// Returns `true` if the error chain bottoms out in a broken pipe, as when
/// stdout feeds a pager that exits early.
#[inline]
pub fn is_broken_pipe(err: &Error) -> bool {
    matches!(
        err.root_cause().downcast_ref::<io::Error>(),
        Some(io_err) if io_err.kind() == io::ErrorKind::BrokenPipe
    )
}
