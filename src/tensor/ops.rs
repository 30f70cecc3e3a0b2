//! Numeric tensor operations
//!
//! This module contains elementwise arithmetic with broadcasting, matrix
//! multiplication, reductions, and softmax. The array kernels are ndarray's;
//! this module contributes shape checking and error reporting.

use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2, IxDyn, Zip};
use tracing::instrument;

use super::core::resolve_dim;
use super::Tensor;
use crate::error::{Result, TensorError};

impl Tensor {
    // ------------------------------------------------------------------
    // Elementwise arithmetic
    // ------------------------------------------------------------------

    /// Elementwise addition with broadcasting.
    #[instrument(skip(self, other), fields(lhs = ?self.shape(), rhs = ?other.shape()))]
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_op(other, "add", |a, b| a + b)
    }

    /// Elementwise subtraction with broadcasting.
    #[instrument(skip(self, other), fields(lhs = ?self.shape(), rhs = ?other.shape()))]
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_op(other, "sub", |a, b| a - b)
    }

    /// Elementwise (Hadamard) multiplication with broadcasting.
    #[instrument(skip(self, other), fields(lhs = ?self.shape(), rhs = ?other.shape()))]
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_op(other, "mul", |a, b| a * b)
    }

    /// Elementwise division with broadcasting.
    ///
    /// Division by zero follows IEEE-754 `f32` semantics and produces
    /// infinities or NaN rather than an error.
    #[instrument(skip(self, other), fields(lhs = ?self.shape(), rhs = ?other.shape()))]
    pub fn div(&self, other: &Tensor) -> Result<Tensor> {
        self.binary_op(other, "div", |a, b| a / b)
    }

    /// Add a scalar to every element.
    pub fn add_scalar(&self, scalar: f32) -> Tensor {
        Tensor::from_ndarray(self.as_ndarray().mapv(|v| v + scalar))
    }

    /// Subtract a scalar from every element.
    pub fn sub_scalar(&self, scalar: f32) -> Tensor {
        Tensor::from_ndarray(self.as_ndarray().mapv(|v| v - scalar))
    }

    /// Multiply every element by a scalar.
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        Tensor::from_ndarray(self.as_ndarray().mapv(|v| v * scalar))
    }

    /// Divide every element by a scalar.
    pub fn div_scalar(&self, scalar: f32) -> Tensor {
        Tensor::from_ndarray(self.as_ndarray().mapv(|v| v / scalar))
    }

    // Broadcast both operands to their common shape, then combine them
    // element by element.
    fn binary_op<F>(&self, other: &Tensor, op: &'static str, apply: F) -> Result<Tensor>
    where
        F: Fn(f32, f32) -> f32,
    {
        let shape = broadcast_shape(op, self.shape(), other.shape())?;
        let mismatch = || TensorError::ShapeMismatch {
            op,
            lhs: self.shape().to_vec(),
            rhs: other.shape().to_vec(),
        };
        let lhs = self
            .as_ndarray()
            .broadcast(IxDyn(&shape))
            .ok_or_else(mismatch)?;
        let rhs = other
            .as_ndarray()
            .broadcast(IxDyn(&shape))
            .ok_or_else(mismatch)?;
        let data = Zip::from(&lhs).and(&rhs).map_collect(|&a, &b| apply(a, b));
        Ok(Tensor::from_ndarray(data))
    }

    // ------------------------------------------------------------------
    // Matrix multiplication
    // ------------------------------------------------------------------

    /// Matrix multiplication over the trailing two dimensions.
    ///
    /// Both operands must have at least two dimensions and agreeing inner
    /// dimensions. Leading dimensions broadcast, so stacks of matrices
    /// multiply batch by batch.
    #[instrument(skip(self, other), fields(lhs = ?self.shape(), rhs = ?other.shape()))]
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        let mismatch = || TensorError::ShapeMismatch {
            op: "matmul",
            lhs: self.shape().to_vec(),
            rhs: other.shape().to_vec(),
        };
        let (ls, rs) = (self.shape(), other.shape());
        if ls.len() < 2 || rs.len() < 2 {
            return Err(mismatch());
        }
        let (m, k) = (ls[ls.len() - 2], ls[ls.len() - 1]);
        let (k2, n) = (rs[rs.len() - 2], rs[rs.len() - 1]);
        if k != k2 {
            return Err(mismatch());
        }

        if ls.len() == 2 && rs.len() == 2 {
            let lhs = as_matrix(self.as_ndarray().view());
            let rhs = as_matrix(other.as_ndarray().view());
            return Ok(Tensor::from_ndarray(lhs.dot(&rhs)));
        }

        let batch = broadcast_shape("matmul", &ls[..ls.len() - 2], &rs[..rs.len() - 2])
            .map_err(|_| mismatch())?;
        let mut lhs_shape = batch.clone();
        lhs_shape.extend([m, k]);
        let mut rhs_shape = batch.clone();
        rhs_shape.extend([k, n]);
        let lhs = self
            .as_ndarray()
            .broadcast(IxDyn(&lhs_shape))
            .ok_or_else(mismatch)?;
        let rhs = other
            .as_ndarray()
            .broadcast(IxDyn(&rhs_shape))
            .ok_or_else(mismatch)?;

        let batch_len: usize = batch.iter().product();
        let mut data = Vec::with_capacity(batch_len * m * n);
        for flat in 0..batch_len {
            let index = unravel(flat, &batch);
            let product = matrix_at(&lhs, &index).dot(&matrix_at(&rhs, &index));
            data.extend(product.iter().copied());
        }
        let mut out_shape = batch;
        out_shape.extend([m, n]);
        Tensor::from_vec(data, &out_shape)
    }

    // ------------------------------------------------------------------
    // Reductions
    // ------------------------------------------------------------------

    /// Sum of all elements. An empty tensor sums to `0`.
    #[instrument(skip(self), fields(shape = ?self.shape()))]
    pub fn sum(&self) -> Tensor {
        Tensor::scalar(self.as_ndarray().sum())
    }

    /// Sum along an axis.
    ///
    /// # Arguments
    /// * `axis` - The axis to sum along (`None` means sum all elements)
    /// * `keepdims` - If true, keep the reduced axis as size 1
    #[instrument(skip(self), fields(shape = ?self.shape(), axis = ?axis, keepdims = keepdims))]
    pub fn sum_axis(&self, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        match axis {
            None => Ok(keep_all_dims(self.sum(), self.ndim(), keepdims)),
            Some(ax) => {
                self.check_axis(ax)?;
                let mut out = self.as_ndarray().sum_axis(Axis(ax));
                if keepdims {
                    out = out.insert_axis(Axis(ax));
                }
                Ok(Tensor::from_ndarray(out))
            }
        }
    }

    /// Arithmetic mean of all elements.
    ///
    /// Fails with an empty-reduction error when the tensor has no elements.
    #[instrument(skip(self), fields(shape = ?self.shape()))]
    pub fn mean(&self) -> Result<Tensor> {
        let mean = self
            .as_ndarray()
            .mean()
            .ok_or(TensorError::EmptyReduction {
                op: "mean",
                axis: None,
            })?;
        Ok(Tensor::scalar(mean))
    }

    /// Arithmetic mean along an axis.
    ///
    /// # Arguments
    /// * `axis` - The axis to average along (`None` means all elements)
    /// * `keepdims` - If true, keep the reduced axis as size 1
    #[instrument(skip(self), fields(shape = ?self.shape(), axis = ?axis, keepdims = keepdims))]
    pub fn mean_axis(&self, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        match axis {
            None => Ok(keep_all_dims(self.mean()?, self.ndim(), keepdims)),
            Some(ax) => {
                self.check_axis(ax)?;
                let mut out =
                    self.as_ndarray()
                        .mean_axis(Axis(ax))
                        .ok_or(TensorError::EmptyReduction {
                            op: "mean",
                            axis: Some(ax),
                        })?;
                if keepdims {
                    out = out.insert_axis(Axis(ax));
                }
                Ok(Tensor::from_ndarray(out))
            }
        }
    }

    /// Maximum of all elements.
    ///
    /// Fails with an empty-reduction error when the tensor has no elements.
    #[instrument(skip(self), fields(shape = ?self.shape()))]
    pub fn max(&self) -> Result<Tensor> {
        if self.numel() == 0 {
            return Err(TensorError::EmptyReduction {
                op: "max",
                axis: None,
            });
        }
        let max = self
            .as_ndarray()
            .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        Ok(Tensor::scalar(max))
    }

    /// Maximum along an axis.
    ///
    /// # Arguments
    /// * `axis` - The axis to reduce (`None` means all elements)
    /// * `keepdims` - If true, keep the reduced axis as size 1
    #[instrument(skip(self), fields(shape = ?self.shape(), axis = ?axis, keepdims = keepdims))]
    pub fn max_axis(&self, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        match axis {
            None => Ok(keep_all_dims(self.max()?, self.ndim(), keepdims)),
            Some(ax) => {
                self.check_axis(ax)?;
                if self.shape()[ax] == 0 {
                    return Err(TensorError::EmptyReduction {
                        op: "max",
                        axis: Some(ax),
                    });
                }
                let mut out =
                    self.as_ndarray()
                        .fold_axis(Axis(ax), f32::NEG_INFINITY, |acc, &v| acc.max(v));
                if keepdims {
                    out = out.insert_axis(Axis(ax));
                }
                Ok(Tensor::from_ndarray(out))
            }
        }
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.ndim() {
            return Err(TensorError::InvalidArgument {
                arg: "axis",
                reason: format!(
                    "axis {axis} is out of range for a {}-dimensional tensor",
                    self.ndim()
                ),
            });
        }
        Ok(())
    }
}

/// Softmax along a dimension, in a numerically stable form.
///
/// The maximum along `dim` is subtracted before exponentiating, so large
/// inputs do not overflow. Negative `dim` counts from the end.
#[instrument(skip(input), fields(shape = ?input.shape(), dim = dim))]
pub fn softmax(input: &Tensor, dim: isize) -> Result<Tensor> {
    let ax = Axis(resolve_dim(dim, input.ndim(), "dim")?);
    if input.shape()[ax.0] == 0 {
        return Err(TensorError::EmptyReduction {
            op: "softmax",
            axis: Some(ax.0),
        });
    }
    let array = input.as_ndarray();
    let max = array
        .fold_axis(ax, f32::NEG_INFINITY, |acc, &v| acc.max(v))
        .insert_axis(ax);
    let mut out = array.to_owned();
    out.zip_mut_with(&max, |v, &m| *v = (*v - m).exp());
    let sum = out.sum_axis(ax).insert_axis(ax);
    out.zip_mut_with(&sum, |v, &s| *v /= s);
    Ok(Tensor::from_ndarray(out))
}

// Compute the broadcast shape of two operands, aligning from the trailing
// side and stretching size-1 dimensions.
fn broadcast_shape(op: &'static str, lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let ndim = lhs.len().max(rhs.len());
    let mut shape = vec![0; ndim];
    for i in 0..ndim {
        let l = if i >= ndim - lhs.len() {
            lhs[i - (ndim - lhs.len())]
        } else {
            1
        };
        let r = if i >= ndim - rhs.len() {
            rhs[i - (ndim - rhs.len())]
        } else {
            1
        };
        shape[i] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(TensorError::ShapeMismatch {
                    op,
                    lhs: lhs.to_vec(),
                    rhs: rhs.to_vec(),
                })
            }
        };
    }
    Ok(shape)
}

// Convert a flat batch number into a multi-index over `shape`.
fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (i, &dim) in shape.iter().enumerate().rev() {
        index[i] = flat % dim;
        flat /= dim;
    }
    index
}

// Select the 2-D matrix at a batch index of a broadcast stack.
fn matrix_at<'a>(view: &ArrayViewD<'a, f32>, index: &[usize]) -> ArrayView2<'a, f32> {
    let mut matrix = view.clone();
    for &i in index {
        matrix = matrix.index_axis_move(Axis(0), i);
    }
    as_matrix(matrix)
}

fn as_matrix(view: ArrayViewD<'_, f32>) -> ArrayView2<'_, f32> {
    view.into_dimensionality::<Ix2>()
        .expect("exactly two dimensions remain")
}

// Reduce-all output shape: scalar, or all-ones when keepdims is requested.
fn keep_all_dims(scalar: Tensor, ndim: usize, keepdims: bool) -> Tensor {
    if keepdims {
        scalar
            .reshape(&vec![1; ndim])
            .expect("a single element fills an all-ones shape")
    } else {
        scalar
    }
}

// Operator sugar over the named methods. The tensor-tensor forms panic on
// incompatible shapes, mirroring ndarray's own operators; the named methods
// are the fallible contract.

impl std::ops::Add<&Tensor> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Tensor {
        Tensor::add(self, rhs).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl std::ops::Sub<&Tensor> for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Tensor {
        Tensor::sub(self, rhs).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl std::ops::Mul<&Tensor> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Tensor {
        Tensor::mul(self, rhs).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl std::ops::Div<&Tensor> for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: &Tensor) -> Tensor {
        Tensor::div(self, rhs).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl std::ops::Add<f32> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: f32) -> Tensor {
        self.add_scalar(rhs)
    }
}

impl std::ops::Sub<f32> for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: f32) -> Tensor {
        self.sub_scalar(rhs)
    }
}

impl std::ops::Mul<f32> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: f32) -> Tensor {
        self.mul_scalar(rhs)
    }
}

impl std::ops::Div<f32> for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: f32) -> Tensor {
        self.div_scalar(rhs)
    }
}
