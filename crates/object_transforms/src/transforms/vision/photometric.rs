use crate::sample::Sample;
use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};

const NORM_EPS: f32 = 1e-10;

// ============================================================================
// ToImage
// ============================================================================

/// Rescales each listed element into `[0, custom_max]` with its own min and
/// max.
///
/// # Mathematical Operation:
/// ```text
/// output = custom_max * (input - min) / (max - min + 1e-10)
/// ```
///
/// A constant array becomes all zeros.
#[derive(Debug, Clone)]
pub struct ToImage {
    norm_elems: Vec<String>,
    custom_max: f32,
}

impl ToImage {
    pub fn new(norm_elems: &[&str], custom_max: f32) -> Result<Self> {
        ensure!(!norm_elems.is_empty(), "ToImage needs at least one element to rescale");
        ensure!(
            custom_max > 0.0,
            "Rescale maximum must be positive (got {})",
            custom_max
        );
        Ok(Self {
            norm_elems: norm_elems.iter().map(|e| e.to_string()).collect(),
            custom_max,
        })
    }
}

impl Default for ToImage {
    fn default() -> Self {
        Self {
            norm_elems: vec!["image".to_string()],
            custom_max: 255.0,
        }
    }
}

impl Transform<Sample, Sample> for ToImage {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        for elem in &self.norm_elems {
            sample
                .get_mut(elem)?
                .map_arrays(|_, data| {
                    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
                    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    Ok(data.mapv(|v| self.custom_max * (v - min) / (max - min + NORM_EPS)))
                })
                .with_context(|| format!("Failed to rescale '{}'", elem))?;
        }
        Ok(sample)
    }
}
