use crate::error::TransformError;
use crate::sample::{Entry, Sample};
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use ndarray::{concatenate, ArrayView3, Axis};

// ============================================================================
// ConcatInputs
// ============================================================================

/// Stacks the channels of `elems` (in order) into a single image under
/// `concat`, e.g. the crop plus its confidence map as network input.
///
/// | Input                                   | `concat`       |
/// |-----------------------------------------|----------------|
/// | `crop_image (h, w, 3)`, `nellipse (h, w, 1)` | `(h, w, 4)` |
///
/// # Example
/// ```ignore
/// let concat = ConcatInputs::new(&["crop_image", "nellipse"])?;
/// let sample = concat.apply(sample)?;
/// ```
#[derive(Debug, Clone)]
pub struct ConcatInputs {
    elems: Vec<String>,
}

impl ConcatInputs {
    pub fn new(elems: &[&str]) -> Result<Self> {
        ensure!(!elems.is_empty(), "ConcatInputs needs at least one element");
        Ok(Self {
            elems: elems.iter().map(|e| e.to_string()).collect(),
        })
    }
}

impl Transform<Sample, Sample> for ConcatInputs {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let mut views: Vec<ArrayView3<f32>> = Vec::with_capacity(self.elems.len());
        let mut expected = None;
        for elem in &self.elems {
            let (_, data) = sample.array(elem)?;
            let (h, w, _) = data.dim();
            match expected {
                None => expected = Some((h, w)),
                Some(shape) if shape != (h, w) => {
                    return Err(TransformError::ShapeMismatch {
                        key: elem.clone(),
                        expected: shape,
                        found: (h, w),
                    }
                    .into())
                }
                Some(_) => {}
            }
            views.push(data.view());
        }

        let concat = concatenate(Axis(2), &views)?;
        sample.insert("concat", Entry::image(concat));
        Ok(sample)
    }
}
