//! Shape/stride descriptors, borrowed tensor views and owning tensors.
//!
//! `TensorView` is a non-owning, dtype-tagged window over a byte
//! buffer (a safetensors mapping or an owned `Tensor`). The borrow
//! checker bounds every view by its backing storage, so a view can
//! never outlive the mapping or tensor it was derived from.

use crate::dtype::{read_f32, DType};
use crate::{Error, Result};

/// Canonical row-major strides for `shape`, in elements.
#[must_use]
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// A non-owning view: byte slice + dtype + shape + strides.
#[derive(Clone, Debug)]
pub struct TensorView<'a> {
    data: &'a [u8],
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> TensorView<'a> {
    /// Create a contiguous row-major view over `data`.
    ///
    /// # Errors
    /// Returns `InvalidShape` if the byte length does not equal
    /// `numel * size_in_bytes(dtype)`.
    pub fn new(data: &'a [u8], dtype: DType, shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        let expected = numel * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(Error::InvalidShape(format!(
                "{} bytes cannot back a {dtype} view of shape {shape:?} ({expected} bytes)",
                data.len()
            )));
        }
        Ok(Self {
            data,
            dtype,
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
        })
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Strides in elements, one per dimension.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Raw little-endian bytes backing the view.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.strides == row_major_strides(&self.shape)
    }

    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }

    /// Read element `index` (flat, row-major) as f32.
    #[inline]
    #[must_use]
    pub fn read_f32(&self, index: usize) -> f32 {
        read_f32(self.data, self.dtype, index)
    }

    /// Bytes of row `i` along the leading dimension.
    ///
    /// # Panics
    /// Panics if the view is 0-dimensional or `i` is out of bounds.
    #[must_use]
    pub fn row(&self, i: usize) -> &'a [u8] {
        let row_elems: usize = self.shape[1..].iter().product();
        let row_bytes = row_elems * self.dtype.size_in_bytes();
        &self.data[i * row_bytes..(i + 1) * row_bytes]
    }

    /// Borrow the data as `&[f32]` when the view is F32 and the
    /// backing bytes are 4-byte aligned. Used as a fast path by the
    /// kernels; `None` falls back to scalar reads.
    #[must_use]
    pub fn as_f32(&self) -> Option<&'a [f32]> {
        if self.dtype != DType::F32 {
            return None;
        }
        bytemuck::try_cast_slice(self.data).ok()
    }

    /// Decode the whole view into an f32 vector.
    #[must_use]
    pub fn to_f32_vec(&self) -> Vec<f32> {
        if let Some(s) = self.as_f32() {
            return s.to_vec();
        }
        (0..self.numel()).map(|i| self.read_f32(i)).collect()
    }
}

/// An owning tensor: byte buffer + dtype + shape.
///
/// Dropping a `Tensor` invalidates every view into it; the borrow
/// checker enforces this at compile time.
#[derive(Clone)]
pub struct Tensor {
    data: Vec<u8>,
    dtype: DType,
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a zero-initialised tensor.
    #[must_use]
    pub fn empty(shape: &[usize], dtype: DType) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            data: vec![0u8; numel * dtype.size_in_bytes()],
            dtype,
            shape: shape.to_vec(),
        }
    }

    /// Create an F32 tensor from a slice.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape.
    #[must_use]
    pub fn from_f32(shape: &[usize], data: &[f32]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "data len {} != shape product {numel}",
            data.len()
        );
        Self {
            data: bytemuck::cast_slice(data).to_vec(),
            dtype: DType::F32,
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor from raw little-endian bytes.
    ///
    /// # Panics
    /// Panics if the byte length does not match the shape and dtype.
    #[must_use]
    pub fn from_raw(shape: &[usize], dtype: DType, data: Vec<u8>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(data.len(), numel * dtype.size_in_bytes());
        Self {
            data,
            dtype,
            shape: shape.to_vec(),
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Borrow the tensor as a view.
    #[must_use]
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            data: &self.data,
            dtype: self.dtype,
            shape: self.shape.clone(),
            strides: row_major_strides(&self.shape),
        }
    }

    /// Reinterpret with a new shape of equal element count.
    ///
    /// # Panics
    /// Panics if the element counts differ.
    #[must_use]
    pub fn reshape(mut self, shape: &[usize]) -> Self {
        let new_numel: usize = shape.iter().product();
        assert_eq!(
            self.numel(),
            new_numel,
            "reshape: {} elements != {new_numel} elements",
            self.numel()
        );
        self.shape = shape.to_vec();
        self
    }

    /// Get the data as an f32 slice.
    ///
    /// # Panics
    /// Panics if dtype is not F32.
    #[must_use]
    pub fn as_f32_slice(&self) -> &[f32] {
        assert_eq!(self.dtype, DType::F32, "expected F32 tensor");
        bytemuck::cast_slice(&self.data)
    }

    /// Get the data as a mutable f32 slice.
    ///
    /// # Panics
    /// Panics if dtype is not F32.
    pub fn as_f32_slice_mut(&mut self) -> &mut [f32] {
        assert_eq!(self.dtype, DType::F32, "expected F32 tensor");
        bytemuck::cast_slice_mut(&mut self.data)
    }

    /// Consume the tensor into an f32 vector.
    ///
    /// # Panics
    /// Panics if dtype is not F32.
    #[must_use]
    pub fn into_f32_vec(self) -> Vec<f32> {
        assert_eq!(self.dtype, DType::F32, "expected F32 tensor");
        bytemuck::cast_slice(&self.data).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(row_major_strides(&[5]), vec![1]);
        assert_eq!(row_major_strides(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_empty_is_contiguous() {
        for (shape, dtype) in [
            (vec![2, 3], DType::F32),
            (vec![4], DType::F16),
            (vec![2, 2, 2], DType::BF16),
            (vec![7], DType::I8),
        ] {
            let t = Tensor::empty(&shape, dtype);
            let v = t.view();
            assert!(v.is_contiguous());
            assert_eq!(v.strides(), row_major_strides(&shape));
            assert_eq!(v.size_in_bytes(), v.numel() * dtype.size_in_bytes());
        }
    }

    #[test]
    fn test_view_rejects_bad_length() {
        let bytes = [0u8; 10];
        assert!(TensorView::new(&bytes, DType::F32, &[2, 3]).is_err());
    }

    #[test]
    fn test_from_f32_roundtrip() {
        let t = Tensor::from_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.view().read_f32(4), 5.0);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::from_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let r = t.reshape(&[3, 2]);
        assert_eq!(r.shape(), &[3, 2]);
        assert_eq!(r.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "reshape")]
    fn test_reshape_numel_mismatch() {
        let t = Tensor::from_f32(&[2, 3], &[0.0; 6]);
        let _ = t.reshape(&[4, 2]);
    }

    #[test]
    fn test_row() {
        let t = Tensor::from_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let v = t.view();
        let row1: &[f32] = bytemuck::cast_slice(v.row(1));
        assert_eq!(row1, &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_to_f32_vec_from_f16() {
        let bits: Vec<u8> = [1.0f32, -2.0, 0.5]
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_bits().to_le_bytes())
            .collect();
        let t = Tensor::from_raw(&[3], DType::F16, bits);
        assert_eq!(t.view().to_f32_vec(), vec![1.0, -2.0, 0.5]);
    }

    #[test]
    fn test_as_f32_fast_path() {
        let t = Tensor::from_f32(&[4], &[1.0, 2.0, 3.0, 4.0]);
        let v = t.view();
        assert_eq!(v.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

        let h = Tensor::empty(&[4], DType::F16);
        assert!(h.view().as_f32().is_none());
    }

    #[test]
    fn test_mutate_through_slice() {
        let mut t = Tensor::empty(&[2, 2], DType::F32);
        t.as_f32_slice_mut()[3] = 9.0;
        assert_eq!(t.view().read_f32(3), 9.0);
    }
}
