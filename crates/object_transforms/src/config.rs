//! src/config.rs
//!
//! Configuration for transform pipelines.
//!
//! A `PipelineConfig` lists transforms in the order they run plus the
//! train/val mode shared by every stochastic step. It can be assembled in code
//! or read from JSON:
//!
//! ```ignore
//! let config = PipelineConfig::builder()
//!     .mode(Mode::Train)
//!     .transform(TransformConfig::RandomHorizontalFlip { p: 0.5 })
//!     .transform(TransformConfig::AddConfidenceMap { /* ... */ })
//!     .build();
//! let pipeline = config.pipeline()?;
//! ```
//!
//! ```json
//! {
//!   "mode": "val",
//!   "transforms": [
//!     {"type": "crop_from_mask", "dynamic_size": 512, "zero_pad": true},
//!     {"type": "fixed_resize", "resolutions": {"crop_image": [512, 512], "crop_gt": [512, 512]}},
//!     {"type": "add_confidence_map", "hm_type": "l1l2", "tau": 1.0}
//!   ]
//! }
//! ```

use crate::error::TransformError;
use crate::sample::Sample;
use crate::transforms::vision::{
    AddConfidenceMap, ConcatInputs, CreateBBMask, CropFromMask, ExtremePointsHeatmap, FixedResize,
    HeatmapType, Interpolation, NEllipse, NEllipseWithGaussians, RandomHorizontalFlip, RangeSpec,
    Resolution, ScaleNRotate, ToImage,
};
use crate::transforms::{Compose, Transform};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Training draws random perturbations and zooms; validation is
/// deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Val,
}

impl FromStr for Mode {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Mode::Train),
            "val" => Ok(Mode::Val),
            other => Err(TransformError::config(format!(
                "unknown mode '{other}', expected 'train' or 'val'"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Train => "train",
            Mode::Val => "val",
        })
    }
}

fn default_rots() -> RangeSpec {
    RangeSpec::Continuous {
        min: -30.0,
        max: 30.0,
    }
}

fn default_scales() -> RangeSpec {
    RangeSpec::Continuous {
        min: 0.75,
        max: 1.25,
    }
}

fn default_flip_p() -> f64 {
    0.5
}

fn default_crop_elems() -> Vec<String> {
    vec!["image".to_string(), "gt".to_string()]
}

fn default_gt() -> String {
    "gt".to_string()
}

fn default_crop_gt() -> String {
    "crop_gt".to_string()
}

fn default_crop_image() -> String {
    "crop_image".to_string()
}

fn default_image() -> Vec<String> {
    vec!["image".to_string()]
}

fn default_sigma() -> f64 {
    10.0
}

fn default_alpha() -> f32 {
    0.6
}

fn default_custom_max() -> f32 {
    255.0
}

/// One pipeline step, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    ScaleNRotate {
        #[serde(default = "default_rots")]
        rots: RangeSpec,
        #[serde(default = "default_scales")]
        scales: RangeSpec,
        #[serde(default)]
        semseg: bool,
    },
    RandomHorizontalFlip {
        #[serde(default = "default_flip_p")]
        p: f64,
    },
    /// Exactly one of `relax` (fixed margin) and `dynamic_size` (output side
    /// for the dynamic margin) must be set.
    CropFromMask {
        #[serde(default = "default_crop_elems")]
        crop_elems: Vec<String>,
        #[serde(default = "default_gt")]
        mask_elem: String,
        #[serde(default)]
        relax: Option<i64>,
        #[serde(default)]
        dynamic_size: Option<usize>,
        #[serde(default)]
        zero_pad: bool,
    },
    FixedResize {
        resolutions: HashMap<String, Resolution>,
        #[serde(default)]
        interpolations: Option<HashMap<String, Interpolation>>,
    },
    ExtremePoints {
        #[serde(default = "default_gt")]
        elem: String,
        #[serde(default = "default_sigma")]
        sigma: f64,
        #[serde(default)]
        pert: usize,
    },
    #[serde(rename = "nellipse")]
    NEllipse {
        #[serde(default = "default_crop_gt")]
        elem: String,
    },
    #[serde(rename = "nellipse_with_gaussians")]
    NEllipseWithGaussians {
        #[serde(default = "default_crop_gt")]
        elem: String,
        #[serde(default = "default_alpha")]
        alpha: f32,
    },
    AddConfidenceMap {
        #[serde(default = "default_crop_image")]
        elem: String,
        #[serde(default = "default_crop_gt")]
        mask_elem: String,
        #[serde(default)]
        hm_type: HeatmapType,
        /// Defaults to the map type's own temperature.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tau: Option<f64>,
        #[serde(default)]
        pert: usize,
    },
    #[serde(rename = "create_bb_mask")]
    CreateBBMask {
        #[serde(default = "default_gt")]
        elem: String,
    },
    ConcatInputs {
        elems: Vec<String>,
    },
    ToImage {
        #[serde(default = "default_image")]
        norm_elems: Vec<String>,
        #[serde(default = "default_custom_max")]
        custom_max: f32,
    },
}

pub type BoxedTransform = Box<dyn Transform<Sample, Sample>>;

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl TransformConfig {
    pub fn name(&self) -> &'static str {
        match self {
            TransformConfig::ScaleNRotate { .. } => "ScaleNRotate",
            TransformConfig::RandomHorizontalFlip { .. } => "RandomHorizontalFlip",
            TransformConfig::CropFromMask { .. } => "CropFromMask",
            TransformConfig::FixedResize { .. } => "FixedResize",
            TransformConfig::ExtremePoints { .. } => "ExtremePoints",
            TransformConfig::NEllipse { .. } => "NEllipse",
            TransformConfig::NEllipseWithGaussians { .. } => "NEllipseWithGaussians",
            TransformConfig::AddConfidenceMap { .. } => "AddConfidenceMap",
            TransformConfig::CreateBBMask { .. } => "CreateBBMask",
            TransformConfig::ConcatInputs { .. } => "ConcatInputs",
            TransformConfig::ToImage { .. } => "ToImage",
        }
    }

    /// Builds the transform this entry describes, validating its parameters.
    pub fn build(&self, mode: Mode) -> Result<BoxedTransform> {
        let transform: BoxedTransform = match self {
            TransformConfig::ScaleNRotate {
                rots,
                scales,
                semseg,
            } => Box::new(ScaleNRotate::new(rots.clone(), scales.clone(), *semseg)?),
            TransformConfig::RandomHorizontalFlip { p } => Box::new(RandomHorizontalFlip::new(*p)?),
            TransformConfig::CropFromMask {
                crop_elems,
                mask_elem,
                relax,
                dynamic_size,
                zero_pad,
            } => {
                let elems = as_strs(crop_elems);
                let crop = match (relax, dynamic_size) {
                    (Some(r), None) => CropFromMask::fixed(&elems, mask_elem, *r, *zero_pad)?,
                    (None, Some(d)) => {
                        CropFromMask::dynamic(&elems, mask_elem, *d, mode, *zero_pad)?
                    }
                    _ => {
                        return Err(TransformError::config(
                            "crop_from_mask needs exactly one of 'relax' and 'dynamic_size'",
                        )
                        .into())
                    }
                };
                Box::new(crop)
            }
            TransformConfig::FixedResize {
                resolutions,
                interpolations,
            } => {
                let resize = FixedResize::new(resolutions.clone())?;
                let resize = match interpolations {
                    Some(map) => resize.with_interpolations(map.clone())?,
                    None => resize,
                };
                Box::new(resize)
            }
            TransformConfig::ExtremePoints { elem, sigma, pert } => {
                Box::new(ExtremePointsHeatmap::new(elem, *sigma, *pert, mode)?)
            }
            TransformConfig::NEllipse { elem } => Box::new(NEllipse::new(elem)),
            TransformConfig::NEllipseWithGaussians { elem, alpha } => {
                Box::new(NEllipseWithGaussians::new(elem, *alpha)?)
            }
            TransformConfig::AddConfidenceMap {
                elem,
                mask_elem,
                hm_type,
                tau,
                pert,
            } => {
                let tau = tau.unwrap_or_else(|| hm_type.default_tau());
                let confidence = AddConfidenceMap::new(elem, *hm_type, tau, *pert, mode)?;
                Box::new(confidence.mask_elem(mask_elem))
            }
            TransformConfig::CreateBBMask { elem } => Box::new(CreateBBMask::new(elem)),
            TransformConfig::ConcatInputs { elems } => {
                Box::new(ConcatInputs::new(&as_strs(elems))?)
            }
            TransformConfig::ToImage {
                norm_elems,
                custom_max,
            } => Box::new(ToImage::new(&as_strs(norm_elems), *custom_max)?),
        };
        Ok(transform)
    }
}

/// Ordered list of transforms plus the mode they run in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Train or val; decides whether point location and dynamic relax draw
    /// random numbers. Defaults to train.
    #[serde(default)]
    pub mode: Mode,
    pub transforms: Vec<TransformConfig>,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse pipeline configuration")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize pipeline configuration")
    }

    /// Builds every configured transform into a runnable [`Compose`].
    pub fn pipeline(&self) -> Result<Compose> {
        let mut compose = Compose::new();
        for (index, step) in self.transforms.iter().enumerate() {
            let transform = step.build(self.mode).with_context(|| {
                format!("Invalid configuration for step {} ({})", index, step.name())
            })?;
            compose.push_boxed(step.name(), transform);
        }
        info!(mode = %self.mode, steps = compose.len(), "built transform pipeline");
        Ok(compose)
    }
}

/// Builder for PipelineConfig with method chaining
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the mode shared by all steps
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Append a step
    pub fn transform(mut self, step: TransformConfig) -> Self {
        self.config.transforms.push(step);
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() -> Result<()> {
        assert_eq!("train".parse::<Mode>()?, Mode::Train);
        assert_eq!("VAL".parse::<Mode>()?, Mode::Val);
        assert!("test".parse::<Mode>().is_err());
        assert_eq!(Mode::Val.to_string(), "val");
        Ok(())
    }

    #[test]
    fn test_pipeline_from_json() -> Result<()> {
        let json = r#"{
            "mode": "val",
            "transforms": [
                {"type": "random_horizontal_flip"},
                {"type": "scale_n_rotate", "rots": {"discrete": [-10, 0, 10]}},
                {"type": "crop_from_mask", "dynamic_size": 512, "zero_pad": true},
                {"type": "fixed_resize", "resolutions": {"crop_image": [512, 512], "crop_gt": 256}},
                {"type": "nellipse"},
                {"type": "add_confidence_map", "hm_type": "gaussian"},
                {"type": "concat_inputs", "elems": ["crop_image", "nellipse"]}
            ]
        }"#;
        let config = PipelineConfig::from_json(json)?;
        assert_eq!(config.mode, Mode::Val);
        assert_eq!(
            config.transforms[1],
            TransformConfig::ScaleNRotate {
                rots: RangeSpec::Discrete(vec![-10.0, 0.0, 10.0]),
                scales: default_scales(),
                semseg: false,
            }
        );
        match &config.transforms[3] {
            TransformConfig::FixedResize { resolutions, .. } => {
                assert_eq!(resolutions["crop_image"], Resolution::Size(512, 512));
                assert_eq!(resolutions["crop_gt"], Resolution::ShortSide(256));
            }
            other => panic!("unexpected step {}", other.name()),
        }

        let pipeline = config.pipeline()?;
        assert_eq!(
            pipeline.names().collect::<Vec<_>>(),
            vec![
                "RandomHorizontalFlip",
                "ScaleNRotate",
                "CropFromMask",
                "FixedResize",
                "NEllipse",
                "AddConfidenceMap",
                "ConcatInputs"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_invalid_step_reports_index() {
        let config = PipelineConfig::builder()
            .transform(TransformConfig::RandomHorizontalFlip { p: 0.5 })
            .transform(TransformConfig::RandomHorizontalFlip { p: 2.0 })
            .build();
        let err = config.pipeline().unwrap_err();
        assert!(err.to_string().contains("step 1"));
    }

    #[test]
    fn test_crop_needs_one_relax_policy() {
        let both = TransformConfig::CropFromMask {
            crop_elems: default_crop_elems(),
            mask_elem: default_gt(),
            relax: Some(10),
            dynamic_size: Some(512),
            zero_pad: false,
        };
        assert!(both.build(Mode::Val).is_err());
    }

    #[test]
    fn test_confidence_map_tau_follows_type() -> Result<()> {
        use crate::sample::Entry;
        use ndarray::{s, Array3};

        let mut gt = Array3::zeros((16, 16, 1));
        gt.slice_mut(s![3..12, 5..10, ..]).fill(1.0);
        let sample = Sample::from_single("crop_gt", Entry::mask(gt))
            .with_feature("crop_image", Entry::image(Array3::zeros((16, 16, 3))));

        let step: TransformConfig =
            serde_json::from_str(r#"{"type": "add_confidence_map", "hm_type": "gaussian"}"#)?;
        let configured = step.build(Mode::Val)?.apply(sample.clone())?;
        let explicit =
            AddConfidenceMap::new("crop_image", HeatmapType::Gaussian, 0.5, 0, Mode::Val)?;
        let explicit = explicit.apply(sample)?;
        assert_eq!(configured, explicit);
        assert_eq!(HeatmapType::L1L2.default_tau(), 1.0);
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let config = PipelineConfig::builder()
            .mode(Mode::Val)
            .transform(TransformConfig::NEllipseWithGaussians {
                elem: default_crop_gt(),
                alpha: 0.6,
            })
            .build();
        assert_eq!(PipelineConfig::from_json(&config.to_json()?)?, config);
        Ok(())
    }
}
