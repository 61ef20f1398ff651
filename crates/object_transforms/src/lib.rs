//! Object-centric sample transforms for interactive segmentation training.
//!
//! A [`Sample`] maps feature names to tagged entries (images, masks, heatmaps,
//! points, boxes). Transforms move a sample through cropping around objects,
//! extreme-point and confidence-map generation and affine augmentation.
//! The array algorithms live in [`geometry`]; [`transforms`] wraps them as
//! composable [`Transform`]s, and [`config`] builds pipelines from JSON.

pub mod config;
pub mod error;
pub mod geometry;
pub mod sample;
pub mod transforms;
pub mod worker_rng;

pub use config::{Mode, PipelineConfig, TransformConfig};
pub use error::TransformError;
pub use geometry::{BoundingBox, CropWindow, DynamicRelax, Point};
pub use sample::{ArrayKind, Entry, EntryKind, Sample};
pub use transforms::{Chain, Compose, Transform};
pub use worker_rng::{init_worker_rng, reset_worker_rng};
