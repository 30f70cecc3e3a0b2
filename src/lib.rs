//! A small tensor library in Rust
//!
//! This library provides an immutable dense tensor of 32-bit floats backed
//! by `ndarray`, with elementwise arithmetic, matrix multiplication,
//! structural operations, reductions, and slicing.

pub mod error;
pub mod tensor;

// Re-export commonly used types for convenience
pub use error::{Result, TensorError};
pub use tensor::{DType, Index, Tensor};

/// Re-export of the array backend for raw-buffer interop.
pub use ndarray;
