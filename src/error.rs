//! Error types for tensor operations

use thiserror::Error;

/// Result type alias using [`TensorError`]
pub type Result<T> = std::result::Result<T, TensorError>;

/// Errors that can occur when constructing or operating on tensors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    /// Construction input that cannot form a dense tensor (ragged rows,
    /// flat data whose length disagrees with the requested shape)
    #[error("invalid tensor data: {reason}")]
    InvalidData {
        /// What was wrong with the input
        reason: String,
    },

    /// Operand shapes that are incompatible for an operation
    #[error("{op}: operand shapes {lhs:?} and {rhs:?} are incompatible")]
    ShapeMismatch {
        /// The operation that was attempted
        op: &'static str,
        /// Left-hand side shape
        lhs: Vec<usize>,
        /// Right-hand side shape
        rhs: Vec<usize>,
    },

    /// An argument that is missing, out of range, or otherwise unusable
    #[error("invalid argument `{arg}`: {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A mean/max style reduction over zero elements, which has no
    /// defined value
    #[error("{op}: cannot reduce over zero elements (axis {axis:?})")]
    EmptyReduction {
        /// The reduction that was attempted
        op: &'static str,
        /// The reduced axis, or `None` when reducing all elements
        axis: Option<usize>,
    },

    /// An integer index outside the valid range of an axis
    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds {
        /// The offending index as given by the caller
        index: isize,
        /// The axis that was indexed
        axis: usize,
        /// Extent of that axis
        size: usize,
    },
}
