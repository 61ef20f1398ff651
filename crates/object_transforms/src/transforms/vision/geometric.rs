use crate::config::Mode;
use crate::geometry::{crop_instances, BoundingBox, DynamicRelax, Point};
use crate::sample::{ArrayKind, Entry, Sample};
use crate::transforms::vision::raster::{resize, Interpolation};
use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};
use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

// ============================================================================
// CropFromMask
// ============================================================================

/// How the crop margin around each object is chosen.
#[derive(Debug, Clone)]
pub enum RelaxPolicy {
    /// Same number of pixels for every object.
    Fixed(i64),
    /// Margin scaled with the object size, see [`DynamicRelax`].
    Dynamic(DynamicRelax),
}

/// Crops `crop_elems` around every object instance of `mask_elem`.
///
/// For each element `e` the crops are written to `crop_<e>`: a plain array for
/// single-instance masks and a [`Entry::Stack`] with one crop per instance
/// otherwise. When `e` is the mask itself, instance `k` only keeps channel `k`.
/// The margins used go to `crop_relax` and the union box of all instances to
/// `bbox`.
///
/// # Example
/// ```ignore
/// let crop = CropFromMask::dynamic(&["image", "gt"], "gt", 512, Mode::Train, true)?;
/// let sample = crop.apply(sample)?;
/// ```
#[derive(Debug, Clone)]
pub struct CropFromMask {
    crop_elems: Vec<String>,
    mask_elem: String,
    relax: RelaxPolicy,
    zero_pad: bool,
}

impl CropFromMask {
    pub fn fixed(crop_elems: &[&str], mask_elem: &str, relax: i64, zero_pad: bool) -> Result<Self> {
        ensure!(relax >= 0, "Crop relax must be non-negative (got {})", relax);
        Self::with_policy(crop_elems, mask_elem, RelaxPolicy::Fixed(relax), zero_pad)
    }

    /// Dynamic margin for crops that will be resized to `d × d`.
    pub fn dynamic(
        crop_elems: &[&str],
        mask_elem: &str,
        d: usize,
        mode: Mode,
        zero_pad: bool,
    ) -> Result<Self> {
        let policy = DynamicRelax::new(d, mode)?;
        Self::with_policy(crop_elems, mask_elem, RelaxPolicy::Dynamic(policy), zero_pad)
    }

    fn with_policy(
        crop_elems: &[&str],
        mask_elem: &str,
        relax: RelaxPolicy,
        zero_pad: bool,
    ) -> Result<Self> {
        ensure!(!crop_elems.is_empty(), "CropFromMask needs at least one element to crop");
        Ok(Self {
            crop_elems: crop_elems.iter().map(|e| e.to_string()).collect(),
            mask_elem: mask_elem.to_string(),
            relax,
            zero_pad,
        })
    }

    fn relax_per_instance(&self, masks: &Array3<f32>, sample: &Sample) -> Vec<i64> {
        let instances = masks.dim().2;
        match &self.relax {
            RelaxPolicy::Fixed(r) => vec![*r; instances],
            RelaxPolicy::Dynamic(policy) => {
                let dz = policy.inner_size();
                masks
                    .axis_iter(Axis(2))
                    .enumerate()
                    .map(|(k, mask)| {
                        let extent = BoundingBox::from_mask(mask).map_or(0, |b| b.extent());
                        if extent < 1 {
                            warn!(
                                sample = sample.id().unwrap_or("<no id>"),
                                instance = k,
                                "object too small for dynamic relax, using threshold margin"
                            );
                        }
                        policy.relax_for(extent as f64, dz)
                    })
                    .collect()
            }
        }
    }
}

impl Transform<Sample, Sample> for CropFromMask {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let masks = sample.array(&self.mask_elem)?.1.clone();
        let relax = self.relax_per_instance(&masks, &sample);

        for elem in &self.crop_elems {
            let (kind, source) = sample.array(elem)?;
            let mut crops = crop_instances(
                source.view(),
                masks.view(),
                &relax,
                self.zero_pad,
                kind.fill_value(),
            )
            .with_context(|| format!("Failed to crop '{}' around '{}'", elem, self.mask_elem))?;

            if *elem == self.mask_elem {
                for (k, crop) in crops.iter_mut().enumerate() {
                    *crop = crop.slice(s![.., .., k..k + 1]).to_owned();
                }
            }

            let entry = match crops.len() {
                1 => Entry::Array {
                    kind,
                    data: crops.remove(0),
                },
                _ => Entry::Stack { kind, items: crops },
            };
            sample.insert(format!("crop_{}", elem), entry);
        }

        let relax_entry = match relax.as_slice() {
            [single] => Entry::Scalar(*single as f64),
            many => Entry::Scalars(many.iter().map(|&r| r as f64).collect()),
        };
        sample.insert("crop_relax", relax_entry);
        let bbox = BoundingBox::from_instances(masks.view()).unwrap_or_default();
        sample.insert("bbox", Entry::BBox(bbox));
        Ok(sample)
    }
}

// ============================================================================
// FixedResize
// ============================================================================

/// Target size of one element in [`FixedResize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resolution {
    /// Exact `(height, width)`.
    Size(usize, usize),
    /// Short side becomes this length, aspect ratio kept.
    ShortSide(usize),
}

impl Resolution {
    fn target(self, (height, width): (usize, usize)) -> (usize, usize) {
        match self {
            Resolution::Size(h, w) => (h, w),
            Resolution::ShortSide(side) => {
                let short = height.min(width).max(1) as f64;
                let scale = side as f64 / short;
                (
                    ((height as f64 * scale).round() as usize).max(1),
                    ((width as f64 * scale).round() as usize).max(1),
                )
            }
        }
    }
}

/// Resizes the listed elements to fixed resolutions and drops the rest.
///
/// Metadata, bounding boxes and crop margins are always kept; so is
/// `extreme_points_coord` unless it is listed, in which case its points are
/// rescaled from the `bbox` crop to the listed size. Arrays use cubic
/// interpolation (nearest for masks) unless an interpolation map is given,
/// which must name exactly the same elements.
#[derive(Debug, Clone)]
pub struct FixedResize {
    resolutions: HashMap<String, Resolution>,
    interpolations: Option<HashMap<String, Interpolation>>,
}

impl FixedResize {
    pub fn new(resolutions: HashMap<String, Resolution>) -> Result<Self> {
        for (elem, res) in &resolutions {
            let ok = match res {
                Resolution::Size(h, w) => *h > 0 && *w > 0,
                Resolution::ShortSide(s) => *s > 0,
            };
            ensure!(ok, "Resolution for '{}' must be positive (got {:?})", elem, res);
        }
        Ok(Self {
            resolutions,
            interpolations: None,
        })
    }

    pub fn with_interpolations(
        mut self,
        interpolations: HashMap<String, Interpolation>,
    ) -> Result<Self> {
        ensure!(
            interpolations.len() == self.resolutions.len()
                && interpolations.keys().all(|k| self.resolutions.contains_key(k)),
            "Interpolation map must list the same elements as the resolution map ({} vs {})",
            interpolations.len(),
            self.resolutions.len()
        );
        self.interpolations = Some(interpolations);
        Ok(self)
    }

    fn interpolation(&self, elem: &str, kind: ArrayKind) -> Interpolation {
        if let Some(map) = &self.interpolations {
            if let Some(interp) = map.get(elem) {
                return *interp;
            }
        }
        match kind {
            ArrayKind::Mask | ArrayKind::InverseMask => Interpolation::Nearest,
            ArrayKind::Image | ArrayKind::Heatmap => Interpolation::Cubic,
        }
    }

    fn rescale_points(points: &[Point], bbox: &BoundingBox, res: Resolution) -> Result<Vec<Point>> {
        let Resolution::Size(h, w) = res else {
            anyhow::bail!("Point coordinates need an exact (height, width) resolution");
        };
        let (rows, cols) = (bbox.rows().max(1) as f64, bbox.cols().max(1) as f64);
        Ok(points
            .iter()
            .map(|p| {
                Point::new(
                    (p.x as f64 * w as f64 / cols).round() as usize,
                    (p.y as f64 * h as f64 / rows).round() as usize,
                )
            })
            .collect())
    }
}

impl Transform<Sample, Sample> for FixedResize {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let bbox = match sample.features.get("bbox") {
            Some(Entry::BBox(b)) => Some(*b),
            _ => None,
        };
        let keys: Vec<String> = sample.features().map(str::to_string).collect();

        for key in keys {
            let Some(&res) = self.resolutions.get(&key) else {
                let keep = key == "extreme_points_coord"
                    || matches!(
                        sample.features.get(&key),
                        Some(
                            Entry::Metadata(_)
                                | Entry::BBox(_)
                                | Entry::Scalar(_)
                                | Entry::Scalars(_)
                        )
                    );
                if !keep {
                    sample.remove(&key);
                }
                continue;
            };

            let entry = sample.get_mut(&key)?;
            match entry {
                Entry::Points(points) => {
                    let bbox = bbox
                        .context("Rescaling extreme point coordinates needs a 'bbox' entry")?;
                    *points = Self::rescale_points(points, &bbox, res)?;
                }
                Entry::Array { .. } | Entry::Stack { .. } => {
                    entry
                        .map_arrays(|kind, data| {
                            let (h, w, _) = data.dim();
                            resize(data, res.target((h, w)), self.interpolation(&key, kind))
                        })
                        .with_context(|| format!("Failed to resize '{}'", key))?;
                }
                _ => {}
            }
        }
        Ok(sample)
    }
}

// ============================================================================
// CreateBBMask
// ============================================================================

/// Writes `bb_mask`: 0 inside the bounding box of `gt`, 255 outside.
#[derive(Debug, Clone)]
pub struct CreateBBMask {
    elem: String,
}

impl CreateBBMask {
    pub fn new(elem: &str) -> Self {
        Self {
            elem: elem.to_string(),
        }
    }
}

impl Default for CreateBBMask {
    fn default() -> Self {
        Self::new("gt")
    }
}

impl Transform<Sample, Sample> for CreateBBMask {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let (_, masks) = sample.array(&self.elem)?;
        let (height, width, _) = masks.dim();
        let mut out = Array3::from_elem((height, width, 1), 255.0);
        if let Some(b) = BoundingBox::from_instances(masks.view()) {
            out.slice_mut(s![
                b.y_min as usize..=b.y_max as usize,
                b.x_min as usize..=b.x_max as usize,
                ..
            ])
            .fill(0.0);
        }
        sample.insert(
            "bb_mask",
            Entry::Array {
                kind: ArrayKind::InverseMask,
                data: out,
            },
        );
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker_rng::init_worker_rng;

    fn square_sample() -> Sample {
        let mut gt = Array3::zeros((20, 20, 1));
        gt.slice_mut(s![5..15, 5..15, ..]).fill(1.0);
        let image = Array3::from_shape_fn((20, 20, 3), |(y, x, c)| (y * 20 + x + c) as f32);
        Sample::from_single("image", Entry::image(image))
            .with_feature("gt", Entry::mask(gt))
            .with_feature("id", Entry::Metadata("square".into()))
    }

    #[test]
    fn test_fixed_crop() -> Result<()> {
        let crop = CropFromMask::fixed(&["image", "gt"], "gt", 2, false)?;
        let sample = crop.apply(square_sample())?;

        let (kind, img) = sample.array("crop_image")?;
        assert_eq!(kind, ArrayKind::Image);
        assert_eq!(img.dim(), (14, 14, 3));
        assert_eq!(img[[0, 0, 0]], (3 * 20 + 3) as f32);

        let (_, gt) = sample.array("crop_gt")?;
        assert_eq!(gt.dim(), (14, 14, 1));
        assert_eq!(gt[[2, 2, 0]], 1.0);
        assert_eq!(gt[[1, 1, 0]], 0.0);

        assert_eq!(sample.get("crop_relax")?, &Entry::Scalar(2.0));
        assert_eq!(sample.get("bbox")?, &Entry::BBox(BoundingBox::new(5, 5, 14, 14)));
        Ok(())
    }

    #[test]
    fn test_zero_pad_fill_follows_kind() -> Result<()> {
        let sample = square_sample().with_feature(
            "void",
            Entry::Array {
                kind: ArrayKind::InverseMask,
                data: Array3::zeros((20, 20, 1)),
            },
        );
        let crop = CropFromMask::fixed(&["image", "void"], "gt", 8, true)?;
        let sample = crop.apply(sample)?;
        let (_, void) = sample.array("crop_void")?;
        assert_eq!(void.dim(), (26, 26, 1));
        assert_eq!(void[[0, 0, 0]], 255.0);
        assert_eq!(void[[13, 13, 0]], 0.0);
        let (_, img) = sample.array("crop_image")?;
        assert_eq!(img[[0, 0, 0]], 0.0);
        Ok(())
    }

    #[test]
    fn test_multi_instance_crop_stack() -> Result<()> {
        let mut gt = Array3::zeros((20, 20, 2));
        gt.slice_mut(s![1..4, 1..4, 0]).fill(1.0);
        gt.slice_mut(s![10..18, 12..16, 1]).fill(1.0);
        let sample = Sample::from_single("image", Entry::image(Array3::ones((20, 20, 3))))
            .with_feature("gt", Entry::mask(gt));

        let crop = CropFromMask::fixed(&["image", "gt"], "gt", 0, false)?;
        let sample = crop.apply(sample)?;

        match sample.get("crop_gt")? {
            Entry::Stack { kind, items } => {
                assert_eq!(*kind, ArrayKind::Mask);
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].dim(), (3, 3, 1));
                assert_eq!(items[1].dim(), (8, 4, 1));
                assert!(items[1].iter().all(|&v| v == 1.0));
            }
            other => panic!("expected a stack, got {:?}", other.kind()),
        }
        assert_eq!(sample.get("crop_relax")?, &Entry::Scalars(vec![0.0, 0.0]));
        assert_eq!(sample.get("bbox")?, &Entry::BBox(BoundingBox::new(1, 1, 15, 17)));
        Ok(())
    }

    #[test]
    fn test_empty_mask_gives_zero_crops() -> Result<()> {
        let sample = Sample::from_single("image", Entry::image(Array3::ones((6, 8, 3))))
            .with_feature("gt", Entry::mask(Array3::zeros((6, 8, 1))));
        let crop = CropFromMask::dynamic(&["image", "gt"], "gt", 64, Mode::Val, true)?;
        let sample = crop.apply(sample)?;
        let (_, img) = sample.array("crop_image")?;
        assert_eq!(img.dim(), (6, 8, 3));
        assert!(img.iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn test_dynamic_relax_validation() -> Result<()> {
        let mut gt = Array3::zeros((600, 600, 1));
        gt.slice_mut(s![100..301, 100..301, ..]).fill(1.0);
        let sample = Sample::from_single("gt", Entry::mask(gt));
        let crop = CropFromMask::dynamic(&["gt"], "gt", 512, Mode::Val, true)?;
        let sample = crop.apply(sample)?;
        assert_eq!(sample.get("crop_relax")?, &Entry::Scalar(42.0));
        let (_, gt) = sample.array("crop_gt")?;
        assert_eq!(gt.dim(), (201 + 84, 201 + 84, 1));
        Ok(())
    }

    #[test]
    fn test_dynamic_relax_train_is_seeded() -> Result<()> {
        let crop = CropFromMask::dynamic(&["image"], "gt", 64, Mode::Train, true)?;
        init_worker_rng(0, 0, 7);
        let first = crop.apply(square_sample())?;
        init_worker_rng(0, 0, 7);
        let second = crop.apply(square_sample())?;
        assert_eq!(first.get("crop_relax")?, second.get("crop_relax")?);
        Ok(())
    }

    #[test]
    fn test_dynamic_relax_small_train_output_rejected() -> Result<()> {
        assert!(CropFromMask::dynamic(&["gt"], "gt", 5, Mode::Train, false).is_err());
        let crop = CropFromMask::dynamic(&["gt"], "gt", 5, Mode::Val, false)?;
        assert!(crop.apply(square_sample())?.contains("crop_gt"));
        Ok(())
    }

    #[test]
    fn test_negative_relax_rejected() {
        assert!(CropFromMask::fixed(&["image"], "gt", -1, false).is_err());
        assert!(CropFromMask::fixed(&[], "gt", 1, false).is_err());
    }

    #[test]
    fn test_fixed_resize_drops_unlisted() -> Result<()> {
        let sample = square_sample()
            .with_feature("bbox", Entry::BBox(BoundingBox::new(0, 0, 19, 19)))
            .with_feature("extra", Entry::heatmap(Array3::zeros((20, 20, 1))));
        let resize = FixedResize::new(HashMap::from([
            ("image".to_string(), Resolution::Size(10, 12)),
            ("gt".to_string(), Resolution::ShortSide(40)),
        ]))?;
        let sample = resize.apply(sample)?;

        assert_eq!(sample.array("image")?.1.dim(), (10, 12, 3));
        let (_, gt) = sample.array("gt")?;
        assert_eq!(gt.dim(), (40, 40, 1));
        assert!(gt.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(!sample.contains("extra"));
        assert!(sample.contains("id"));
        assert!(sample.contains("bbox"));
        Ok(())
    }

    #[test]
    fn test_fixed_resize_rescales_points() -> Result<()> {
        let sample = Sample::from_single("bbox", Entry::BBox(BoundingBox::new(10, 10, 29, 19)))
            .with_feature("extreme_points_coord", Entry::Points(vec![Point::new(19, 5)]));
        let resize = FixedResize::new(HashMap::from([(
            "extreme_points_coord".to_string(),
            Resolution::Size(20, 40),
        )]))?;
        let sample = resize.apply(sample)?;
        assert_eq!(
            sample.get("extreme_points_coord")?,
            &Entry::Points(vec![Point::new(38, 10)])
        );
        Ok(())
    }

    #[test]
    fn test_fixed_resize_interpolation_map_must_match() -> Result<()> {
        let resolutions = HashMap::from([("image".to_string(), Resolution::Size(4, 4))]);
        let resize = FixedResize::new(resolutions)?;
        let mismatched = HashMap::from([("gt".to_string(), Interpolation::Nearest)]);
        assert!(resize.clone().with_interpolations(mismatched).is_err());
        let matching = HashMap::from([("image".to_string(), Interpolation::Linear)]);
        assert!(resize.with_interpolations(matching).is_ok());
        Ok(())
    }

    #[test]
    fn test_bb_mask() -> Result<()> {
        let sample = CreateBBMask::default().apply(square_sample())?;
        assert_eq!(sample.get("bb_mask")?.kind(), crate::sample::EntryKind::InverseMask);
        let (_, out) = sample.array("bb_mask")?;
        assert_eq!(out[[5, 5, 0]], 0.0);
        assert_eq!(out[[14, 14, 0]], 0.0);
        assert_eq!(out[[4, 10, 0]], 255.0);
        assert_eq!(out[[15, 15, 0]], 255.0);
        Ok(())
    }
}
