// rust/ingest-core/src/cursor.rs

//! Multi-dimensional write cursors.
//!
//! A `Cursor` tracks where the next value lands in the input and output
//! buffers of the sample currently being decoded. Every store goes through
//! [`TensorCursor::checked_index`], which rejects positions outside the
//! declared shape instead of wrapping into a neighbouring row.

use crate::chunk::ScalingMode;
use crate::error::{IngestError, Result, TensorRole};

/// Position, shape and row-major strides for one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorCursor {
    position: Vec<usize>,
    shape: Vec<usize>,
    stride: Vec<usize>,
}

impl TensorCursor {
    pub fn new(shape: &[usize]) -> Self {
        let mut stride = vec![1; shape.len()];
        for d in (0..shape.len().saturating_sub(1)).rev() {
            stride[d] = stride[d + 1] * shape[d + 1];
        }
        Self {
            position: vec![0; shape.len()],
            shape: shape.to_vec(),
            stride,
        }
    }

    pub fn position(&self) -> &[usize] {
        &self.position
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Sum over dimensions of `position[d] * stride[d]`.
    pub fn storage_index(&self) -> usize {
        self.position
            .iter()
            .zip(&self.stride)
            .map(|(p, s)| p * s)
            .sum()
    }

    /// Whether every coordinate lies in `[0, shape[d])`.
    pub fn in_range(&self) -> bool {
        self.position.iter().zip(&self.shape).all(|(p, s)| p < s)
    }

    /// Range check followed by the linear index, in that order.
    pub fn checked_index(&self, role: TensorRole) -> Result<usize> {
        if !self.in_range() {
            return Err(IngestError::out_of_range(role, &self.position, &self.shape));
        }
        Ok(self.storage_index())
    }

    pub fn set(&mut self, dim: usize, value: usize) -> Result<()> {
        *self.axis_mut(dim)? = value;
        Ok(())
    }

    pub fn increment(&mut self, dim: usize, by: usize) -> Result<()> {
        let axis = self.axis_mut(dim)?;
        *axis = axis.saturating_add(by);
        Ok(())
    }

    /// Moves along the last dimension; rank-0 buffers have nowhere to go.
    pub fn advance_last(&mut self, by: usize) -> Result<()> {
        match self.rank() {
            0 => Err(IngestError::invalid_chunk("cannot advance a rank-0 tensor")),
            rank => self.increment(rank - 1, by),
        }
    }

    pub fn reset(&mut self) {
        self.position.iter_mut().for_each(|p| *p = 0);
    }

    pub fn position_sum(&self) -> usize {
        self.position.iter().sum()
    }

    fn axis_mut(&mut self, dim: usize) -> Result<&mut usize> {
        let rank = self.position.len();
        self.position.get_mut(dim).ok_or_else(|| {
            IngestError::invalid_chunk(format!(
                "dimension {dim} does not exist on a rank-{rank} tensor"
            ))
        })
    }
}

/// Per-linear-index tags consumed by the post-load normalization pass.
pub type NormalizationMap = Vec<Option<ScalingMode>>;

/// Write state for the record currently being decoded.
///
/// Concurrent decoders give every task its own clone so cursor updates
/// never race.
#[derive(Debug, Clone)]
pub struct Cursor {
    input: TensorCursor,
    output: TensorCursor,
    input_normalization: NormalizationMap,
    output_normalization: NormalizationMap,
    recording: bool,
}

impl Cursor {
    /// Creates a cursor that records normalization tags for its first sample.
    pub fn new(input_shape: &[usize], output_shape: &[usize]) -> Self {
        let input = TensorCursor::new(input_shape);
        let output = TensorCursor::new(output_shape);
        Self {
            input_normalization: vec![None; input_shape.iter().product()],
            output_normalization: vec![None; output_shape.iter().product()],
            input,
            output,
            recording: true,
        }
    }

    pub fn input(&self) -> &TensorCursor {
        &self.input
    }

    pub fn output(&self) -> &TensorCursor {
        &self.output
    }

    pub fn tensor(&self, role: TensorRole) -> &TensorCursor {
        match role {
            TensorRole::Input => &self.input,
            TensorRole::Output => &self.output,
        }
    }

    pub fn tensor_mut(&mut self, role: TensorRole) -> &mut TensorCursor {
        match role {
            TensorRole::Input => &mut self.input,
            TensorRole::Output => &mut self.output,
        }
    }

    /// Zeroes both positions; called whenever a record starts.
    pub fn reset(&mut self) {
        self.input.reset();
        self.output.reset();
    }

    /// Sum of every position entry on both cursors. Zero means nothing has
    /// been written since the last reset.
    pub fn position_sum(&self) -> usize {
        self.input.position_sum() + self.output.position_sum()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Tags `index` with `mode` while the first sample is being decoded.
    pub fn tag(&mut self, role: TensorRole, index: usize, mode: ScalingMode) {
        if !self.recording {
            return;
        }
        let map = match role {
            TensorRole::Input => &mut self.input_normalization,
            TensorRole::Output => &mut self.output_normalization,
        };
        if let Some(slot) = map.get_mut(index) {
            *slot = mode.is_post_hoc().then_some(mode);
        }
    }

    /// Stops recording and hands back the input and output tag maps.
    pub fn take_normalization(&mut self) -> (NormalizationMap, NormalizationMap) {
        self.recording = false;
        (
            std::mem::take(&mut self.input_normalization),
            std::mem::take(&mut self.output_normalization),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_are_row_major() {
        let c = TensorCursor::new(&[4, 3, 2]);
        assert_eq!(c.stride(), &[6, 2, 1]);

        let c = TensorCursor::new(&[5]);
        assert_eq!(c.stride(), &[1]);
    }

    #[test]
    fn test_storage_index() {
        let mut c = TensorCursor::new(&[4, 3, 2]);
        c.set(0, 2).unwrap();
        c.set(1, 1).unwrap();
        c.set(2, 1).unwrap();
        assert_eq!(c.storage_index(), 2 * 6 + 2 + 1);
        assert!(c.in_range());
    }

    #[test]
    fn test_checked_index_rejects_overrun() {
        let mut c = TensorCursor::new(&[2, 3]);
        c.set(1, 3).unwrap();
        // Would silently alias [1, 0] if the range check were skipped.
        assert_eq!(c.storage_index(), 3);
        match c.checked_index(TensorRole::Output) {
            Err(IngestError::LocationOutOfRange {
                role,
                location,
                shape,
            }) => {
                assert_eq!(role, TensorRole::Output);
                assert_eq!(location, vec![0, 3]);
                assert_eq!(shape, vec![2, 3]);
            }
            other => panic!("expected LocationOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_dimension_is_invalid_chunk() {
        let mut c = TensorCursor::new(&[2]);
        assert!(matches!(c.set(1, 0), Err(IngestError::InvalidChunk { .. })));
        assert!(matches!(c.increment(3, 1), Err(IngestError::InvalidChunk { .. })));
    }

    #[test]
    fn test_reset_and_position_sum() {
        let mut cursor = Cursor::new(&[2, 2], &[3]);
        cursor.tensor_mut(TensorRole::Input).advance_last(1).unwrap();
        cursor.tensor_mut(TensorRole::Output).advance_last(2).unwrap();
        assert_eq!(cursor.position_sum(), 3);
        cursor.reset();
        assert_eq!(cursor.position_sum(), 0);
    }

    #[test]
    fn test_tags_only_while_recording() {
        let mut cursor = Cursor::new(&[3], &[1]);
        cursor.tag(TensorRole::Input, 0, ScalingMode::MinMax);
        cursor.tag(TensorRole::Input, 1, ScalingMode::UnitInterval);
        let (input, output) = cursor.take_normalization();
        assert_eq!(input, vec![Some(ScalingMode::MinMax), None, None]);
        assert_eq!(output, vec![None]);
        assert!(!cursor.is_recording());

        cursor.tag(TensorRole::Input, 2, ScalingMode::Standardize);
        let (input, _) = cursor.take_normalization();
        assert!(input.is_empty());
    }
}
