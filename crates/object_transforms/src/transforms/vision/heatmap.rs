//! Confidence maps derived from an object mask.
//!
//! All transforms here read a single-instance mask, find its extreme points
//! and render a single-channel map of the same spatial size. A mask without
//! foreground short-circuits to an all-zero map.

use crate::config::Mode;
use crate::error::TransformError;
use crate::geometry::{
    is_uniform, locate, mv_gaussian_map, n_ellipse, n_ellipse_with_gaussians, normalize_weight_map,
    point_gaussians, skewed_axes_map,
};
use crate::sample::{Entry, Sample};
use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};
use ndarray::{concatenate, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Reads `key` as a single-instance mask and binarises it.
fn single_mask(sample: &Sample, key: &str) -> Result<Array2<f32>> {
    let (_, data) = sample.array(key)?;
    if data.dim().2 != 1 {
        return Err(TransformError::UnexpectedKind {
            key: key.to_string(),
            expected: "Mask",
            found: "MultiInstanceMask",
        }
        .into());
    }
    Ok(data
        .index_axis(Axis(2), 0)
        .mapv(|v| if v != 0.0 { 1.0 } else { 0.0 }))
}

fn is_background(mask: ArrayView2<f32>) -> bool {
    mask.iter().all(|&v| v == 0.0)
}

fn to_heatmap(map: Array2<f32>) -> Entry {
    Entry::heatmap(map.insert_axis(Axis(2)))
}

// ============================================================================
// ExtremePointsHeatmap
// ============================================================================

/// Renders a Gaussian at each extreme point of `elem`.
///
/// Writes `extreme_points` (pixelwise max of the Gaussians, in `[0, 1]`) and
/// `extreme_points_coord` (`[left, right, top, bottom]`). In training mode the
/// points are perturbed by up to `pert` pixels.
#[derive(Debug, Clone)]
pub struct ExtremePointsHeatmap {
    elem: String,
    sigma: f64,
    pert: usize,
    mode: Mode,
}

impl ExtremePointsHeatmap {
    pub fn new(elem: &str, sigma: f64, pert: usize, mode: Mode) -> Result<Self> {
        ensure!(sigma > 0.0, "Gaussian sigma must be positive (got {})", sigma);
        Ok(Self {
            elem: elem.to_string(),
            sigma,
            pert,
            mode,
        })
    }
}

impl Default for ExtremePointsHeatmap {
    fn default() -> Self {
        Self {
            elem: "gt".to_string(),
            sigma: 10.0,
            pert: 0,
            mode: Mode::Val,
        }
    }
}

impl Transform<Sample, Sample> for ExtremePointsHeatmap {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let mask = single_mask(&sample, &self.elem)
            .context("Extreme points are only defined for one object per mask")?;
        let heatmap = if is_background(mask.view()) {
            Array2::zeros(mask.raw_dim())
        } else {
            let points = locate(mask.view(), self.pert, self.mode)?;
            sample.insert("extreme_points_coord", Entry::Points(points.to_vec()));
            point_gaussians(mask.dim(), &points, self.sigma)
        };
        sample.insert("extreme_points", to_heatmap(heatmap));
        Ok(sample)
    }
}

// ============================================================================
// NEllipse / NEllipseWithGaussians
// ============================================================================

/// N-ellipse through the extreme points of `crop_gt`, scaled to `[0, 255]`.
/// Writes `nellipse`.
#[derive(Debug, Clone)]
pub struct NEllipse {
    elem: String,
}

impl NEllipse {
    pub fn new(elem: &str) -> Self {
        Self {
            elem: elem.to_string(),
        }
    }
}

impl Default for NEllipse {
    fn default() -> Self {
        Self::new("crop_gt")
    }
}

impl Transform<Sample, Sample> for NEllipse {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let mask = single_mask(&sample, &self.elem)?;
        let map = if is_background(mask.view()) {
            Array2::zeros(mask.raw_dim())
        } else {
            let points = locate(mask.view(), 0, Mode::Val)?;
            n_ellipse(mask.dim(), &points) * 255.0
        };
        sample.insert("nellipse", to_heatmap(map));
        Ok(sample)
    }
}

/// N-ellipse blended with extreme-point Gaussians (weight `alpha`),
/// rescaled so the maximum is 255. Writes `nellipse_with_gaussians`.
#[derive(Debug, Clone)]
pub struct NEllipseWithGaussians {
    elem: String,
    alpha: f32,
    sigma: f64,
}

impl NEllipseWithGaussians {
    pub fn new(elem: &str, alpha: f32) -> Result<Self> {
        ensure!(alpha >= 0.0, "Gaussian blend weight must be non-negative (got {})", alpha);
        Ok(Self {
            elem: elem.to_string(),
            alpha,
            sigma: 10.0,
        })
    }
}

impl Default for NEllipseWithGaussians {
    fn default() -> Self {
        Self {
            elem: "crop_gt".to_string(),
            alpha: 0.6,
            sigma: 10.0,
        }
    }
}

impl Transform<Sample, Sample> for NEllipseWithGaussians {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let mask = single_mask(&sample, &self.elem)?;
        let map = if is_background(mask.view()) {
            Array2::zeros(mask.raw_dim())
        } else {
            let points = locate(mask.view(), 0, Mode::Val)?;
            n_ellipse_with_gaussians(mask.dim(), &points, self.alpha, self.sigma)
        };
        sample.insert("nellipse_with_gaussians", to_heatmap(map));
        Ok(sample)
    }
}

// ============================================================================
// AddConfidenceMap
// ============================================================================

/// Which weight map [`AddConfidenceMap`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapType {
    /// Skewed-axis L1 + L2 distance map around the extreme points.
    #[default]
    L1L2,
    /// Multivariate Gaussian fitted to the foreground.
    Gaussian,
}

impl HeatmapType {
    /// Temperature used when none is configured.
    pub fn default_tau(self) -> f64 {
        match self {
            HeatmapType::L1L2 => 1.0,
            HeatmapType::Gaussian => 0.5,
        }
    }
}

/// Appends a confidence map computed from `crop_gt` as an extra channel of
/// `elem`, writing the result to `with_hm`.
///
/// The map is min-max normalised and scaled to `[0, 255]`. `elem` and the mask
/// must have the same spatial size.
#[derive(Debug, Clone)]
pub struct AddConfidenceMap {
    elem: String,
    mask_elem: String,
    hm_type: HeatmapType,
    tau: f64,
    pert: usize,
    mode: Mode,
}

impl AddConfidenceMap {
    pub fn new(
        elem: &str,
        hm_type: HeatmapType,
        tau: f64,
        pert: usize,
        mode: Mode,
    ) -> Result<Self> {
        ensure!(tau > 0.0, "Confidence map temperature must be positive (got {})", tau);
        Ok(Self {
            elem: elem.to_string(),
            mask_elem: "crop_gt".to_string(),
            hm_type,
            tau,
            pert,
            mode,
        })
    }

    pub fn mask_elem(mut self, mask_elem: &str) -> Self {
        self.mask_elem = mask_elem.to_string();
        self
    }

    fn confidence(&self, mask: ArrayView2<f32>) -> Result<Array2<f32>> {
        if is_uniform(mask) {
            return Ok(Array2::zeros(mask.raw_dim()));
        }
        let weights = match self.hm_type {
            HeatmapType::L1L2 => {
                let points = locate(mask, self.pert, self.mode)?;
                skewed_axes_map(mask, &points, self.tau, true, None).weights
            }
            HeatmapType::Gaussian => mv_gaussian_map(mask, self.tau, true),
        };
        Ok(normalize_weight_map(weights.view()) * 255.0)
    }
}

impl Default for AddConfidenceMap {
    fn default() -> Self {
        Self {
            elem: "crop_image".to_string(),
            mask_elem: "crop_gt".to_string(),
            hm_type: HeatmapType::L1L2,
            tau: HeatmapType::L1L2.default_tau(),
            pert: 0,
            mode: Mode::Val,
        }
    }
}

impl Transform<Sample, Sample> for AddConfidenceMap {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let mask = single_mask(&sample, &self.mask_elem)?;
        let (_, image) = sample.array(&self.elem)?;
        let (height, width, _) = image.dim();
        if mask.dim() != (height, width) {
            return Err(TransformError::ShapeMismatch {
                key: self.mask_elem.clone(),
                expected: (height, width),
                found: mask.dim(),
            }
            .into());
        }

        let hm = self.confidence(mask.view()).with_context(|| {
            format!("Failed to compute confidence map from '{}'", self.mask_elem)
        })?;
        let hm = hm.insert_axis(Axis(2));
        let stacked: Array3<f32> = concatenate(Axis(2), &[image.view(), hm.view()])?;
        sample.insert("with_hm", Entry::image(stacked));
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::worker_rng::init_worker_rng;
    use ndarray::s;

    fn crop_sample() -> Sample {
        let mut gt = Array3::zeros((20, 20, 1));
        gt.slice_mut(s![5..15, 5..15, ..]).fill(1.0);
        Sample::from_single("crop_gt", Entry::mask(gt.clone()))
            .with_feature("gt", Entry::mask(gt))
            .with_feature("crop_image", Entry::image(Array3::from_elem((20, 20, 3), 7.0)))
    }

    fn empty_sample() -> Sample {
        Sample::from_single("crop_gt", Entry::mask(Array3::zeros((8, 9, 1))))
            .with_feature("gt", Entry::mask(Array3::zeros((8, 9, 1))))
            .with_feature("crop_image", Entry::image(Array3::ones((8, 9, 3))))
    }

    #[test]
    fn test_extreme_points_heatmap() -> Result<()> {
        let sample = ExtremePointsHeatmap::default().apply(crop_sample())?;
        let (_, hm) = sample.array("extreme_points")?;
        assert_eq!(hm.dim(), (20, 20, 1));
        assert_eq!(hm[[10, 5, 0]], 1.0);
        assert_eq!(
            sample.get("extreme_points_coord")?,
            &Entry::Points(vec![
                Point::new(5, 10),
                Point::new(14, 10),
                Point::new(10, 5),
                Point::new(10, 14),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_extreme_points_rejects_multi_instance() {
        let sample = Sample::from_single("gt", Entry::mask(Array3::ones((4, 4, 2))));
        let err = ExtremePointsHeatmap::default().apply(sample).unwrap_err();
        assert!(format!("{:#}", err).contains("MultiInstanceMask"));
    }

    #[test]
    fn test_extreme_points_perturbation_is_seeded() -> Result<()> {
        let transform = ExtremePointsHeatmap::new("gt", 10.0, 3, Mode::Train)?;
        init_worker_rng(2, 1, 99);
        let first = transform.apply(crop_sample())?;
        init_worker_rng(2, 1, 99);
        let second = transform.apply(crop_sample())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_empty_masks_give_zero_maps() -> Result<()> {
        let sample = ExtremePointsHeatmap::default().apply(empty_sample())?;
        let sample = NEllipse::default().apply(sample)?;
        let sample = NEllipseWithGaussians::default().apply(sample)?;
        let sample = AddConfidenceMap::default().apply(sample)?;

        for key in ["extreme_points", "nellipse", "nellipse_with_gaussians"] {
            let (_, map) = sample.array(key)?;
            assert_eq!(map.dim(), (8, 9, 1));
            assert!(map.iter().all(|&v| v == 0.0), "{} is not zero", key);
        }
        assert!(!sample.contains("extreme_points_coord"));
        let (_, with_hm) = sample.array("with_hm")?;
        assert_eq!(with_hm.dim(), (8, 9, 4));
        assert!(with_hm.slice(s![.., .., 3]).iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn test_full_foreground_mask_has_points() -> Result<()> {
        let full = Array3::ones((10, 12, 1));
        let sample = Sample::from_single("crop_gt", Entry::mask(full.clone()))
            .with_feature("gt", Entry::mask(full));
        let sample = ExtremePointsHeatmap::default().apply(sample)?;
        let sample = NEllipse::default().apply(sample)?;
        let sample = NEllipseWithGaussians::default().apply(sample)?;

        assert_eq!(
            sample.get("extreme_points_coord")?,
            &Entry::Points(vec![
                Point::new(0, 5),
                Point::new(11, 5),
                Point::new(6, 0),
                Point::new(6, 9),
            ])
        );
        for key in ["extreme_points", "nellipse", "nellipse_with_gaussians"] {
            let (_, map) = sample.array(key)?;
            let max = map.iter().copied().fold(0.0f32, f32::max);
            assert!(max > 0.0, "{} is all zero", key);
        }
        Ok(())
    }

    #[test]
    fn test_nellipse_scaled_to_255() -> Result<()> {
        let sample = NEllipse::default().apply(crop_sample())?;
        let (_, map) = sample.array("nellipse")?;
        assert!((map[[10, 10, 0]] - 255.0).abs() < 1e-3);
        assert_eq!(map[[0, 0, 0]], 0.0);

        let sample = NEllipseWithGaussians::default().apply(crop_sample())?;
        let (_, map) = sample.array("nellipse_with_gaussians")?;
        let max = map.iter().copied().fold(0.0f32, f32::max);
        assert!((max - 255.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_confidence_map_channels() -> Result<()> {
        for hm_type in [HeatmapType::L1L2, HeatmapType::Gaussian] {
            let transform = AddConfidenceMap::new("crop_image", hm_type, 1.0, 0, Mode::Val)?;
            let sample = transform.apply(crop_sample())?;
            let (_, with_hm) = sample.array("with_hm")?;
            assert_eq!(with_hm.dim(), (20, 20, 4));
            assert_eq!(with_hm[[3, 3, 1]], 7.0);
            let hm: ArrayView2<f32> = with_hm.slice(s![.., .., 3]);
            let max = hm.iter().copied().fold(f32::MIN, f32::max);
            let min = hm.iter().copied().fold(f32::MAX, f32::min);
            assert!((max - 255.0).abs() < 1e-2);
            assert!(min.abs() < 1e-6);
            assert!((hm[[10, 10]] - 255.0).abs() < 1e-2);
        }
        Ok(())
    }

    #[test]
    fn test_confidence_map_shape_mismatch() {
        let sample =
            crop_sample().with_feature("crop_image", Entry::image(Array3::zeros((10, 20, 3))));
        let err = AddConfidenceMap::default().apply(sample).unwrap_err();
        assert!(err.to_string().contains("shape mismatch"));
    }
}
