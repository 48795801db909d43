use allocator_api2::alloc::AllocError;
use thiserror::Error;

/// Failure of a combined allocation: either the control block couldn't be allocated, or the
/// payload's constructor gave up. In both cases the block memory has already been released.
#[derive(Error, Debug)]
pub enum MakeSharedError<E> {
    #[error("failed to allocate control block")]
    Alloc(#[from] AllocError),
    #[error("failed to construct shared object: {0}")]
    Construct(#[source] E)
}
