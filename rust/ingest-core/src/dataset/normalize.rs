// rust/ingest-core/src/dataset/normalize.rs

//! Post-load feature normalization.
//!
//! Feature chunks scaled with `min-max` or `standardize` store raw values
//! while decoding. The decoder tags the linear indices they wrote in the
//! first sample, and [`Dataset::normalize`] rescales those indices across
//! every sample once loading is done.

use tracing::debug;

use super::store::Dataset;
use crate::chunk::ScalingMode;
use crate::cursor::NormalizationMap;
use crate::error::{IngestError, Result, TensorRole};

#[derive(Debug, Clone, Copy)]
struct Stats {
    min: f64,
    max: f64,
    mean: f64,
    std_dev: f64,
}

impl Stats {
    fn collect(values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        }
    }

    fn apply(&self, mode: ScalingMode, value: f64) -> f64 {
        match mode {
            ScalingMode::MinMax => {
                let range = self.max - self.min;
                if range > 0.0 {
                    (value - self.min) / range
                } else {
                    0.0
                }
            }
            ScalingMode::Standardize => {
                if self.std_dev > 0.0 {
                    (value - self.mean) / self.std_dev
                } else {
                    0.0
                }
            }
            ScalingMode::None | ScalingMode::UnitInterval => value,
        }
    }
}

impl Dataset {
    /// Rescales every tagged feature across all samples.
    ///
    /// Returns the number of features that were rescaled. Constant features
    /// map to 0. Integer buffers coerce the rescaled values back to their
    /// element type.
    pub fn normalize(&mut self) -> Result<usize> {
        if self.is_locked() {
            return Err(IngestError::DatasetLocked);
        }
        let input = std::mem::take(&mut self.input_normalization);
        let output = std::mem::take(&mut self.output_normalization);

        let result = self
            .normalize_role(TensorRole::Input, &input)
            .and_then(|n| Ok(n + self.normalize_role(TensorRole::Output, &output)?));

        self.input_normalization = input;
        self.output_normalization = output;

        let rescaled = result?;
        debug!(features = rescaled, samples = self.num_samples(), "Normalized dataset");
        Ok(rescaled)
    }

    fn normalize_role(&mut self, role: TensorRole, tags: &NormalizationMap) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let mut rescaled = 0;
        let mut column = Vec::with_capacity(self.num_samples());
        for (index, mode) in tags.iter().enumerate() {
            let Some(mode) = *mode else { continue };

            column.clear();
            column.extend(
                self.samples()
                    .iter()
                    .filter_map(|s| s.tensor(role).get(index)),
            );
            let stats = Stats::collect(&column);

            for sample in self.samples_mut() {
                let tensor = sample.tensor_mut(role);
                if let Some(value) = tensor.get(index) {
                    tensor.set(index, stats.apply(mode, value))?;
                }
            }
            rescaled += 1;
        }
        Ok(rescaled)
    }
}
