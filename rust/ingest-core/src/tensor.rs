// rust/ingest-core/src/tensor.rs

//! Dense sample buffers.
//!
//! A `Tensor` is the addressable numeric buffer the decoder writes into. It
//! stores every element as `f64` but coerces each stored value to the
//! declared element type, so a `u8` buffer never holds 300.0 and an `f32`
//! buffer never holds more precision than an `f32` can represent.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Element type of a sample buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F16,
    #[default]
    F32,
    F64,
}

impl DType {
    /// Converts `value` to the nearest value representable by this type.
    ///
    /// Integer types truncate toward zero and saturate at their bounds.
    pub fn coerce(self, value: f64) -> f64 {
        match self {
            DType::U8 => value as u8 as f64,
            DType::I8 => value as i8 as f64,
            DType::U16 => value as u16 as f64,
            DType::I16 => value as i16 as f64,
            DType::U32 => value as u32 as f64,
            DType::I32 => value as i32 as f64,
            DType::F16 => half::f16::from_f64(value).to_f64(),
            DType::F32 => value as f32 as f64,
            DType::F64 => value,
        }
    }

    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

/// Number of elements addressed by `shape`.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// A zero-initialised, row-major numeric buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    dtype: DType,
    data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        Self {
            shape: shape.to_vec(),
            dtype,
            data: vec![0.0; element_count(shape)],
        }
    }

    /// Builds a tensor from existing values, coercing each to `dtype`.
    pub fn from_values(shape: &[usize], dtype: DType, values: &[f64]) -> Result<Self> {
        let expected = element_count(shape);
        if values.len() != expected {
            return Err(IngestError::shape_mismatch(format!(
                "{} values supplied for shape {:?} ({} elements)",
                values.len(),
                shape,
                expected
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            dtype,
            data: values.iter().map(|&v| dtype.coerce(v)).collect(),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.data.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        let len = self.data.len();
        let slot = self
            .data
            .get_mut(index)
            .ok_or(IngestError::IndexOutOfBounds { index, len })?;
        *slot = self.dtype.coerce(value);
        Ok(())
    }

    pub fn get_at(&self, location: &[usize]) -> Option<f64> {
        self.linear_index(location).and_then(|i| self.get(i))
    }

    pub fn set_at(&mut self, location: &[usize], value: f64) -> Result<()> {
        let index = self.linear_index(location).ok_or_else(|| {
            IngestError::shape_mismatch(format!(
                "location {:?} does not address shape {:?}",
                location, self.shape
            ))
        })?;
        self.set(index, value)
    }

    /// Writes `values` contiguously starting at linear index `start`.
    pub fn set_range(&mut self, start: usize, values: &[f64]) -> Result<()> {
        let end = start + values.len();
        if end > self.data.len() {
            return Err(IngestError::IndexOutOfBounds {
                index: end.saturating_sub(1),
                len: self.data.len(),
            });
        }
        let dtype = self.dtype;
        for (slot, &v) in self.data[start..end].iter_mut().zip(values) {
            *slot = dtype.coerce(v);
        }
        Ok(())
    }

    /// Zeroes the buffer and sets a single 1 at `index`.
    pub fn set_one_hot(&mut self, index: usize) -> Result<()> {
        if index >= self.data.len() {
            return Err(IngestError::IndexOutOfBounds {
                index,
                len: self.data.len(),
            });
        }
        self.data.iter_mut().for_each(|v| *v = 0.0);
        self.data[index] = 1.0;
        Ok(())
    }

    /// Index of the largest element, used to read a one-hot buffer back.
    pub fn argmax(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    fn linear_index(&self, location: &[usize]) -> Option<usize> {
        if location.len() != self.shape.len() {
            return None;
        }
        let mut index = 0;
        for (&pos, &dim) in location.iter().zip(&self.shape) {
            if pos >= dim {
                return None;
            }
            index = index * dim + pos;
        }
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_saturates_integers() {
        assert_eq!(DType::U8.coerce(300.0), 255.0);
        assert_eq!(DType::U8.coerce(-4.0), 0.0);
        assert_eq!(DType::I8.coerce(-200.0), -128.0);
        assert_eq!(DType::I32.coerce(2.9), 2.0);
        assert_eq!(DType::F64.coerce(0.1), 0.1);
        assert_eq!(DType::F32.coerce(0.1), 0.1f32 as f64);
    }

    #[test]
    fn test_location_addressing_is_row_major() {
        let mut t = Tensor::zeros(&[2, 3], DType::F32);
        t.set_at(&[1, 2], 7.0).unwrap();
        assert_eq!(t.get(5), Some(7.0));
        assert_eq!(t.get_at(&[1, 2]), Some(7.0));
        assert!(t.get_at(&[2, 0]).is_none());
        assert!(t.set_at(&[0, 3], 1.0).is_err());
    }

    #[test]
    fn test_set_range_bounds() {
        let mut t = Tensor::zeros(&[4], DType::F64);
        t.set_range(1, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.as_slice(), &[0.0, 1.0, 2.0, 3.0]);
        assert!(t.set_range(2, &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_one_hot_clears_previous_values() {
        let mut t = Tensor::zeros(&[3], DType::F32);
        t.set(0, 0.5).unwrap();
        t.set_one_hot(2).unwrap();
        assert_eq!(t.as_slice(), &[0.0, 0.0, 1.0]);
        assert_eq!(t.argmax(), Some(2));
        assert!(t.set_one_hot(3).is_err());
    }

    #[test]
    fn test_from_values_checks_length() {
        assert!(Tensor::from_values(&[2, 2], DType::U8, &[1.0, 2.0]).is_err());
        let t = Tensor::from_values(&[2], DType::U8, &[1.7, 256.0]).unwrap();
        assert_eq!(t.as_slice(), &[1.0, 255.0]);
    }
}
