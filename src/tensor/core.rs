use std::fmt;

use ndarray::{Array, Array2, ArrayD, Axis, Dimension, IxDyn, Slice};
use num_traits::AsPrimitive;
use rand::distributions::Uniform;
use rand::prelude::Distribution;
use tracing::instrument;

use crate::error::{Result, TensorError};

/// Element type of a tensor. Only 32-bit floats are supported; every
/// constructor coerces its input to this precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
}

impl DType {
    /// Size of one element in bytes.
    pub const fn size_of(self) -> usize {
        match self {
            DType::F32 => 4,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "float32"),
        }
    }
}

/// A single-axis selector for [`Tensor::slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// Pick one position along the axis and drop the axis from the result.
    /// Negative positions count from the end.
    Item(isize),
    /// Select a start/stop/step range with Python slice semantics: bounds
    /// are optional, negative bounds count from the end, out-of-range
    /// bounds clamp, and a negative step walks the axis backward.
    Range {
        start: Option<isize>,
        end: Option<isize>,
        step: isize,
    },
    /// Keep the whole axis.
    Full,
}

impl Index {
    /// Unit-step range `[start, end)`.
    pub fn range(start: isize, end: isize) -> Self {
        Index::Range {
            start: Some(start),
            end: Some(end),
            step: 1,
        }
    }
}

impl From<isize> for Index {
    fn from(index: isize) -> Self {
        Index::Item(index)
    }
}

impl From<std::ops::Range<isize>> for Index {
    fn from(range: std::ops::Range<isize>) -> Self {
        Index::range(range.start, range.end)
    }
}

impl From<std::ops::RangeFull> for Index {
    fn from(_: std::ops::RangeFull) -> Self {
        Index::Full
    }
}

/// Immutable dense n-dimensional array of 32-bit floats.
///
/// A `Tensor` owns its buffer (an `ndarray::ArrayD<f32>`) and never mutates
/// it: every operation returns a freshly allocated tensor, so values can be
/// shared across threads by read-only reference.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// Create a tensor from flat data in row-major order and a shape.
    ///
    /// Elements of any primitive numeric type are coerced to `f32`.
    #[instrument(skip(data), fields(len = data.len(), shape = ?shape))]
    pub fn from_vec<T: AsPrimitive<f32>>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let len = data.len();
        let data: Vec<f32> = data.into_iter().map(|v| v.as_()).collect();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            TensorError::InvalidData {
                reason: format!("data of length {len} cannot fill shape {shape:?}"),
            }
        })?;
        Ok(Tensor { data: array })
    }

    /// Create a 2-D tensor from nested rows.
    ///
    /// Fails when the rows have inconsistent lengths.
    #[instrument(skip(rows), fields(count = rows.len()))]
    pub fn from_vec2d<T: AsPrimitive<f32>>(rows: &[Vec<T>]) -> Result<Self> {
        if rows.is_empty() {
            return Ok(Tensor::zeros(&[0, 0]));
        }
        let cols = rows[0].len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(TensorError::InvalidData {
                    reason: format!(
                        "ragged rows: row {i} has length {}, expected {cols}",
                        row.len()
                    ),
                });
            }
        }
        let data: Vec<f32> = rows.iter().flatten().map(|v| v.as_()).collect();
        Tensor::from_vec(data, &[rows.len(), cols])
    }

    /// Create a 1-D tensor from a slice.
    pub fn from_slice<T: AsPrimitive<f32>>(data: &[T]) -> Self {
        let data: Vec<f32> = data.iter().map(|v| v.as_()).collect();
        Tensor {
            data: from_parts(&[data.len()], data),
        }
    }

    /// Create a 0-D tensor holding a single value.
    pub fn scalar(value: f32) -> Self {
        Tensor {
            data: ArrayD::from_elem(IxDyn(&[]), value),
        }
    }

    /// Wrap an `ndarray` array of any dimensionality.
    ///
    /// The buffer is taken over as-is when it is already in standard
    /// (row-major) layout, and copied into standard layout otherwise.
    pub fn from_ndarray<D: Dimension>(array: Array<f32, D>) -> Self {
        let array = array.into_dyn();
        let data = if array.is_standard_layout() {
            array
        } else {
            array.as_standard_layout().into_owned()
        };
        Tensor { data }
    }

    /// Create a tensor filled with zeros.
    #[instrument(fields(shape = ?shape))]
    pub fn zeros(shape: &[usize]) -> Self {
        Tensor {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Create a tensor filled with ones.
    #[instrument(fields(shape = ?shape))]
    pub fn ones(shape: &[usize]) -> Self {
        Tensor::full(shape, 1.0)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: &[usize], value: f32) -> Self {
        Tensor {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Identity matrix of size n x n.
    pub fn eye(n: usize) -> Self {
        Tensor::from_ndarray(Array2::<f32>::eye(n))
    }

    /// Create a tensor with uniform random values in [-1, 1).
    #[instrument(fields(shape = ?shape))]
    pub fn random(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        let mut rng = rand::thread_rng();
        let uniform = Uniform::new(-1.0f32, 1.0);
        let data: Vec<f32> = (0..numel).map(|_| uniform.sample(&mut rng)).collect();
        Tensor {
            data: from_parts(shape, data),
        }
    }

    /// Extents of each dimension.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Element type of the buffer.
    pub fn dtype(&self) -> DType {
        DType::F32
    }

    /// Exact byte size of the underlying buffer.
    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype().size_of()
    }

    /// Borrow the underlying `ndarray` buffer without copying.
    pub fn as_ndarray(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Consume the tensor and return the underlying `ndarray` buffer.
    pub fn into_ndarray(self) -> ArrayD<f32> {
        self.data
    }

    /// Flat row-major view of the buffer.
    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("tensor buffers are stored in standard layout")
    }

    /// Extract the value of a single-element tensor.
    pub fn item(&self) -> Result<f32> {
        match self.data.first() {
            Some(&value) if self.numel() == 1 => Ok(value),
            _ => Err(TensorError::InvalidArgument {
                arg: "self",
                reason: format!(
                    "item() requires a tensor with exactly one element, got {}",
                    self.numel()
                ),
            }),
        }
    }

    /// Reinterpret the elements, in row-major order, under a new shape.
    ///
    /// Fails when the element count of `new_shape` differs from `numel()`.
    #[instrument(skip(self), fields(old = ?self.shape(), new = ?new_shape))]
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Tensor> {
        let data: Vec<f32> = self.data.iter().copied().collect();
        let array = ArrayD::from_shape_vec(IxDyn(new_shape), data).map_err(|_| {
            TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape().to_vec(),
                rhs: new_shape.to_vec(),
            }
        })?;
        Ok(Tensor { data: array })
    }

    /// Swap the last two dimensions.
    ///
    /// Tensors with fewer than two dimensions are returned as an unchanged
    /// copy.
    #[instrument(skip(self), fields(shape = ?self.shape()))]
    pub fn transpose(&self) -> Tensor {
        let n = self.ndim();
        if n < 2 {
            return self.clone();
        }
        let mut view = self.data.view();
        view.swap_axes(n - 2, n - 1);
        Tensor {
            data: view.as_standard_layout().into_owned(),
        }
    }

    /// Swap two named dimensions.
    ///
    /// # Arguments
    /// * `dim0`, `dim1` - The dimensions to swap, 0-indexed; negative values
    ///   count from the end. Give both to swap a specific pair, or neither
    ///   to swap the last two. Giving exactly one is an error.
    #[instrument(skip(self), fields(shape = ?self.shape(), dim0 = ?dim0, dim1 = ?dim1))]
    pub fn transpose_dims(&self, dim0: Option<isize>, dim1: Option<isize>) -> Result<Tensor> {
        match (dim0, dim1) {
            (None, None) => Ok(self.transpose()),
            (Some(d0), Some(d1)) => {
                let d0 = resolve_dim(d0, self.ndim(), "dim0")?;
                let d1 = resolve_dim(d1, self.ndim(), "dim1")?;
                let mut view = self.data.view();
                view.swap_axes(d0, d1);
                Ok(Tensor {
                    data: view.as_standard_layout().into_owned(),
                })
            }
            (Some(_), None) => Err(TensorError::InvalidArgument {
                arg: "dim1",
                reason: "dim0 was given without dim1; pass both dimensions to swap a \
                         specific pair, or neither to swap the last two"
                    .to_string(),
            }),
            (None, Some(_)) => Err(TensorError::InvalidArgument {
                arg: "dim0",
                reason: "dim1 was given without dim0; pass both dimensions to swap a \
                         specific pair, or neither to swap the last two"
                    .to_string(),
            }),
        }
    }

    /// Select a sub-region with one [`Index`] per leading axis.
    ///
    /// Axes without a selector are kept in full. `Item` selectors drop
    /// their axis from the result, range selectors keep it.
    #[instrument(skip(self), fields(shape = ?self.shape(), index = ?index))]
    pub fn slice(&self, index: &[Index]) -> Result<Tensor> {
        if index.len() > self.ndim() {
            return Err(TensorError::InvalidArgument {
                arg: "index",
                reason: format!(
                    "{} selectors given for a {}-dimensional tensor",
                    index.len(),
                    self.ndim()
                ),
            });
        }
        let mut view = self.data.view();
        let mut picked = Vec::new();
        for (axis, sel) in index.iter().enumerate() {
            let size = self.shape()[axis];
            match *sel {
                Index::Full => {}
                Index::Item(i) => {
                    let pos = wrap_index(i, size).ok_or(TensorError::IndexOutOfBounds {
                        index: i,
                        axis,
                        size,
                    })?;
                    picked.push((axis, pos));
                }
                Index::Range { start, end, step } => {
                    view.slice_axis_inplace(Axis(axis), resolve_range(axis, size, start, end, step)?);
                }
            }
        }
        // Drop picked axes last, in reverse so earlier axis numbers stay valid
        for &(axis, pos) in picked.iter().rev() {
            view = view.index_axis_move(Axis(axis), pos);
        }
        Ok(Tensor {
            data: view.as_standard_layout().into_owned(),
        })
    }

    /// Read one element, with one index per dimension.
    ///
    /// Negative indices count from the end of their axis.
    pub fn at(&self, index: &[isize]) -> Result<f32> {
        if index.len() != self.ndim() {
            return Err(TensorError::InvalidArgument {
                arg: "index",
                reason: format!(
                    "{} indices given for a {}-dimensional tensor",
                    index.len(),
                    self.ndim()
                ),
            });
        }
        let mut pos = Vec::with_capacity(index.len());
        for (axis, &i) in index.iter().enumerate() {
            let size = self.shape()[axis];
            pos.push(wrap_index(i, size).ok_or(TensorError::IndexOutOfBounds {
                index: i,
                axis,
                size,
            })?);
        }
        Ok(self.data[IxDyn(&pos)])
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(array: ArrayD<f32>) -> Self {
        Tensor::from_ndarray(array)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(data={}, shape={:?})", self.data, self.shape())
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(data={})", self.data)
    }
}

/// Resolve a possibly-negative dimension index against `ndim`.
pub(crate) fn resolve_dim(dim: isize, ndim: usize, arg: &'static str) -> Result<usize> {
    let n = ndim as isize;
    let resolved = if dim < 0 { dim + n } else { dim };
    if !(0..n).contains(&resolved) {
        return Err(TensorError::InvalidArgument {
            arg,
            reason: format!("dimension {dim} is out of range for a {ndim}-dimensional tensor"),
        });
    }
    Ok(resolved as usize)
}

// Wrap a possibly-negative index and check that it falls inside the axis.
fn wrap_index(index: isize, size: usize) -> Option<usize> {
    let n = size as isize;
    let wrapped = if index < 0 { index + n } else { index };
    (0..n).contains(&wrapped).then_some(wrapped as usize)
}

// Translate one Python-style start/stop/step triple into an ndarray `Slice`
// over an axis of extent `size`.
fn resolve_range(
    axis: usize,
    size: usize,
    start: Option<isize>,
    end: Option<isize>,
    step: isize,
) -> Result<Slice> {
    if step == 0 {
        return Err(TensorError::InvalidArgument {
            arg: "step",
            reason: format!("step must be non-zero (axis {axis})"),
        });
    }
    let n = size as isize;
    let wrap = |i: isize| if i < 0 { i + n } else { i };
    if step > 0 {
        let lo = wrap(start.unwrap_or(0)).clamp(0, n);
        let hi = wrap(end.unwrap_or(n)).clamp(0, n).max(lo);
        Ok(Slice::new(lo, Some(hi), step))
    } else {
        // A backward range selects first, first+step, .. down to just above
        // stop; ndarray expresses that as the equivalent forward range
        // traversed with a negative step.
        let first = wrap(start.unwrap_or(n - 1)).clamp(-1, n - 1);
        let stop = end.map(wrap).map(|e| e.clamp(-1, n - 1)).unwrap_or(-1);
        if first <= stop {
            return Ok(Slice::new(0, Some(0), 1));
        }
        Ok(Slice::new(stop + 1, Some(first + 1), step))
    }
}

// Assemble an array from a shape and matching flat data.
fn from_parts(shape: &[usize], data: Vec<f32>) -> ArrayD<f32> {
    ArrayD::from_shape_vec(IxDyn(shape), data).expect("data length matches the shape product")
}
