//! Single-threaded `std::shared_ptr` / `std::weak_ptr` with separately allocated control blocks,
//! aliasing handles and combined allocation through `make_shared`.

pub(crate) mod control_block {
    pub mod base;
    pub mod obj;
    pub mod ptr;
}
pub mod error;
pub mod shared_ptr;
pub mod weak_ptr;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::MakeSharedError;
pub use shared_ptr::{ make_shared, make_shared_with, NullPtr, SharedPtr };
pub use weak_ptr::WeakPtr;
