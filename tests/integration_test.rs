//! Integration tests to ensure all tensor modules work together

use rust_tensor::ndarray::{ArrayD, IxDyn};
use rust_tensor::tensor::ops::softmax;
use rust_tensor::{Index, Result, Tensor, TensorError};

#[test]
fn test_tensor_operations_integration() {
    // Build two matrices and chain arithmetic with matmul
    let x = Tensor::from_vec2d(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let y = Tensor::from_vec2d(&[vec![2.0, 3.0], vec![4.0, 5.0]]).unwrap();

    let z = x.add(&y).unwrap();
    assert_eq!(z.as_slice(), &[3.0, 5.0, 7.0, 9.0]);

    let w = x.mul(&y).unwrap();
    assert_eq!(w.as_slice(), &[2.0, 6.0, 12.0, 20.0]);

    let c = x.matmul(&Tensor::eye(2)).unwrap();
    assert_eq!(c, x);

    // Structural ops compose with arithmetic results
    let t = z.transpose();
    assert_eq!(t.as_slice(), &[3.0, 7.0, 5.0, 9.0]);
    assert_eq!(t.reshape(&[4]).unwrap().reshape(&[2, 2]).unwrap(), t);
}

#[test]
fn test_error_propagation_integration() {
    fn pipeline(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let summed = a.add(b)?;
        let product = summed.matmul(b)?;
        product.sum_axis(Some(0), true)
    }

    let a = Tensor::from_vec2d(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let b = Tensor::from_vec2d(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let out = pipeline(&a, &b).unwrap();
    assert_eq!(out.shape(), &[1, 2]);
    assert_eq!(out.as_slice(), &[5.0, 7.0]);

    let ragged = Tensor::from_slice(&[1.0, 2.0, 3.0]);
    let err = pipeline(&a, &ragged).unwrap_err();
    assert!(matches!(err, TensorError::ShapeMismatch { .. }));
}

#[test]
fn test_reduction_integration() {
    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();

    let summed = x.sum_axis(Some(0), false).unwrap();
    assert_eq!(summed.shape(), &[3]);
    assert_eq!(summed.as_slice(), &[5.0, 7.0, 9.0]);

    let mean = x.mean_axis(Some(1), true).unwrap();
    assert_eq!(mean.shape(), &[2, 1]);
    assert_eq!(mean.as_slice(), &[2.0, 5.0]);

    let max = x.max_axis(None, false).unwrap();
    assert_eq!(max.item().unwrap(), 6.0);
}

#[test]
fn test_softmax_integration() {
    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    let y = softmax(&x, -1).unwrap();
    assert_eq!(y.shape(), &[2, 3]);

    // Each row sums to one, and rows are shift-invariant
    let rows = y.sum_axis(Some(1), false).unwrap();
    for &row in rows.as_slice() {
        assert!((row - 1.0).abs() < 1e-6);
    }
    let shifted = softmax(&x.add_scalar(100.0), -1).unwrap();
    for (a, b) in y.as_slice().iter().zip(shifted.as_slice()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_slicing_integration() {
    let x = Tensor::from_vec(
        (0..24).map(|v| v as f32).collect(),
        &[2, 3, 4],
    )
    .unwrap();

    let picked = x
        .slice(&[Index::Item(1), Index::range(0, 2), Index::Full])
        .unwrap();
    assert_eq!(picked.shape(), &[2, 4]);
    assert_eq!(
        picked.as_slice(),
        &[12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0]
    );

    // A sliced tensor participates in arithmetic like any other
    let doubled = picked.mul_scalar(2.0);
    assert_eq!(doubled.at(&[0, 0]).unwrap(), 24.0);
}

#[test]
fn test_ndarray_interop_integration() {
    // Construct from the backend representation and read it back without
    // a copy
    let array =
        ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let t = Tensor::from_ndarray(array.clone());
    assert_eq!(t.as_ndarray(), &array);
    assert_eq!(t.nbytes(), 16);

    let back = t.into_ndarray();
    assert_eq!(back, array);
}

#[test]
fn test_tensor_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Tensor>();
}
