// rust/ingest-core/src/dataset/sample.rs

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result, TensorRole};
use crate::tensor::{element_count, DType, Tensor};

/// Declared shape and element type of every sample in a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleLayout {
    pub input_shape: Vec<usize>,
    #[serde(default)]
    pub input_dtype: DType,
    pub output_shape: Vec<usize>,
    #[serde(default)]
    pub output_dtype: DType,
}

impl SampleLayout {
    pub fn new(input_shape: &[usize], output_shape: &[usize]) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
            input_dtype: DType::default(),
            output_shape: output_shape.to_vec(),
            output_dtype: DType::default(),
        }
    }

    #[must_use]
    pub fn with_dtypes(mut self, input: DType, output: DType) -> Self {
        self.input_dtype = input;
        self.output_dtype = output;
        self
    }

    pub fn input_len(&self) -> usize {
        element_count(&self.input_shape)
    }

    pub fn output_len(&self) -> usize {
        element_count(&self.output_shape)
    }

    /// A zero-filled sample shaped per this layout.
    pub fn empty_sample(&self) -> Sample {
        Sample {
            input: Tensor::zeros(&self.input_shape, self.input_dtype),
            output: Tensor::zeros(&self.output_shape, self.output_dtype),
            class_index: None,
        }
    }

    /// Rejects samples whose buffers differ in shape or element type.
    pub fn check(&self, sample: &Sample) -> Result<()> {
        let pairs = [
            (TensorRole::Input, &sample.input, &self.input_shape, self.input_dtype),
            (TensorRole::Output, &sample.output, &self.output_shape, self.output_dtype),
        ];
        for (role, tensor, shape, dtype) in pairs {
            if tensor.shape() != shape.as_slice() || tensor.dtype() != dtype {
                return Err(IngestError::shape_mismatch(format!(
                    "{role} buffer is {:?}/{:?}, dataset expects {:?}/{:?}",
                    tensor.shape(),
                    tensor.dtype(),
                    shape,
                    dtype
                )));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, shape) in [("input", &self.input_shape), ("output", &self.output_shape)] {
            if shape.is_empty() || shape.contains(&0) {
                return Err(IngestError::config(format!(
                    "dataset.{name}_shape must be non-empty with positive dimensions, got {shape:?}"
                )));
            }
        }
        Ok(())
    }
}

/// One decoded record: input buffer, output buffer and class.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Tensor,
    pub output: Tensor,
    pub class_index: Option<usize>,
}

impl Sample {
    pub fn tensor(&self, role: TensorRole) -> &Tensor {
        match role {
            TensorRole::Input => &self.input,
            TensorRole::Output => &self.output,
        }
    }

    pub fn tensor_mut(&mut self, role: TensorRole) -> &mut Tensor {
        match role {
            TensorRole::Input => &mut self.input,
            TensorRole::Output => &mut self.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample_matches_layout() {
        let layout = SampleLayout::new(&[2, 3], &[4]).with_dtypes(DType::U8, DType::F32);
        let sample = layout.empty_sample();
        assert_eq!(sample.input.len(), 6);
        assert_eq!(sample.output.len(), 4);
        assert_eq!(sample.class_index, None);
        assert!(layout.check(&sample).is_ok());
    }

    #[test]
    fn test_check_detects_mismatch() {
        let layout = SampleLayout::new(&[2], &[1]);
        let mut sample = layout.empty_sample();
        sample.output = Tensor::zeros(&[2], DType::F32);
        assert!(matches!(
            layout.check(&sample),
            Err(IngestError::ShapeMismatch { .. })
        ));

        let mut sample = layout.empty_sample();
        sample.input = Tensor::zeros(&[2], DType::F64);
        assert!(layout.check(&sample).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dims() {
        assert!(SampleLayout::new(&[2, 0], &[1]).validate().is_err());
        assert!(SampleLayout::new(&[], &[1]).validate().is_err());
        assert!(SampleLayout::new(&[28, 28], &[10]).validate().is_ok());
    }
}
