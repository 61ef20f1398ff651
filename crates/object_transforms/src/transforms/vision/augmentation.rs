use crate::sample::{ArrayKind, Entry, Sample};
use crate::transforms::vision::raster::{
    flip_horizontal, is_binary_like, rotation_matrix, warp_affine, Interpolation,
};
use crate::transforms::Transform;
use crate::worker_rng::{worker_choose_index, worker_gen_bool, worker_gen_range};
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// RandomHorizontalFlip
// ============================================================================

/// Randomly mirrors every spatial entry of a sample left to right.
/// Returns an error if probability `p` is outside [0.0, 1.0] range.
///
/// # Example
/// ```ignore
/// let flip = RandomHorizontalFlip::new(0.5)?; // 50% flip chance
/// let augmented = flip.apply(sample)?;
/// ```
#[derive(Debug, Clone)]
pub struct RandomHorizontalFlip {
    p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&p),
            "Probability must be in [0.0, 1.0] range (got {})",
            p
        );
        Ok(Self { p })
    }

    fn flip_all(mut sample: Sample) -> Result<Sample> {
        for entry in sample.features.values_mut() {
            entry.map_arrays(|_, data| Ok(flip_horizontal(data)))?;
        }
        Ok(sample)
    }
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self { p: 0.5 }
    }
}

impl Transform<Sample, Sample> for RandomHorizontalFlip {
    fn apply(&self, sample: Sample) -> Result<Sample> {
        let flip = match self.p {
            // Fast paths: no draw from the worker RNG
            0.0 => false,
            1.0 => true,
            _ => worker_gen_bool(self.p),
        };
        if flip {
            Self::flip_all(sample)
        } else {
            Ok(sample)
        }
    }
}

// ============================================================================
// ScaleNRotate
// ============================================================================

/// Where [`ScaleNRotate`] draws its angle or scale from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeSpec {
    /// Uniform in `[min, max]`.
    Continuous { min: f64, max: f64 },
    /// One of the listed values, uniformly.
    Discrete(Vec<f64>),
}

impl RangeSpec {
    fn validate(&self, what: &str) -> Result<()> {
        match self {
            RangeSpec::Continuous { min, max } => ensure!(
                min.is_finite() && max.is_finite() && min <= max,
                "{} range must satisfy min <= max (got [{}, {}])",
                what,
                min,
                max
            ),
            RangeSpec::Discrete(values) => {
                ensure!(!values.is_empty(), "{} choices cannot be empty", what);
                ensure!(
                    values.iter().all(|v| v.is_finite()),
                    "{} choices must be finite",
                    what
                );
            }
        }
        Ok(())
    }

    fn values(&self) -> Vec<f64> {
        match self {
            RangeSpec::Continuous { min, max } => vec![*min, *max],
            RangeSpec::Discrete(values) => values.clone(),
        }
    }

    fn sample(&self) -> f64 {
        match self {
            RangeSpec::Continuous { min, max } if min == max => *min,
            RangeSpec::Continuous { min, max } => worker_gen_range(*min..=*max),
            RangeSpec::Discrete(values) => values[worker_choose_index(values.len())],
        }
    }
}

/// Rotates and scales every spatial entry of a sample by one random angle
/// (degrees) and scale, about each array's centre.
///
/// Label-like arrays (all values in {0, 1, 255}) and, with `semseg`, every
/// mask are warped with nearest-neighbour interpolation; everything else is
/// bicubic. Inverse masks are padded with 255, the rest with 0. Points and
/// boxes are not transformed.
///
/// # Example
/// ```ignore
/// let aug = ScaleNRotate::new(
///     RangeSpec::Continuous { min: -20.0, max: 20.0 },
///     RangeSpec::Continuous { min: 0.75, max: 1.25 },
///     false,
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct ScaleNRotate {
    rots: RangeSpec,
    scales: RangeSpec,
    semseg: bool,
}

impl ScaleNRotate {
    pub fn new(rots: RangeSpec, scales: RangeSpec, semseg: bool) -> Result<Self> {
        rots.validate("Rotation")?;
        scales.validate("Scale")?;
        ensure!(
            scales.values().iter().all(|&s| s > 0.0),
            "Scales must be positive (got {:?})",
            scales
        );
        Ok(Self {
            rots,
            scales,
            semseg,
        })
    }

    fn interpolation(&self, kind: ArrayKind, data: &ndarray::Array3<f32>) -> Interpolation {
        if (self.semseg && kind == ArrayKind::Mask) || is_binary_like(data) {
            Interpolation::Nearest
        } else {
            Interpolation::Cubic
        }
    }
}

impl Default for ScaleNRotate {
    fn default() -> Self {
        Self {
            rots: RangeSpec::Continuous {
                min: -30.0,
                max: 30.0,
            },
            scales: RangeSpec::Continuous {
                min: 0.75,
                max: 1.25,
            },
            semseg: false,
        }
    }
}

impl Transform<Sample, Sample> for ScaleNRotate {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let angle = self.rots.sample();
        let scale = self.scales.sample();

        for key in sample.spatial_keys() {
            let entry: &mut Entry = sample.get_mut(&key)?;
            entry
                .map_arrays(|kind, data| {
                    let (h, w, _) = data.dim();
                    let center = (w as f64 / 2.0, h as f64 / 2.0);
                    let matrix = rotation_matrix(center, angle, scale);
                    let interpolation = self.interpolation(kind, data);
                    warp_affine(data, &matrix, (h, w), interpolation, kind.fill_value())
                })
                .with_context(|| {
                    format!(
                        "Failed to rotate '{}' by {:.2} degrees at scale {:.3}",
                        key, angle, scale
                    )
                })?;
        }
        Ok(sample)
    }
}
