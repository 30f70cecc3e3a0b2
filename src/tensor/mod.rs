//! Tensor module containing the tensor value object and its operations
//!
//! This module provides the core `Tensor` type and all operations on
//! tensors: construction, inspection, structural operations, elementwise
//! arithmetic, matrix multiplication, and reductions.

mod core;
pub mod ops;

// Re-export the main types for convenience
pub use core::{DType, Index, Tensor};
