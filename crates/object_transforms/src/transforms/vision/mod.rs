//! src/transforms/vision/mod.rs
//!
//! Sample transforms for object-centric segmentation training.
//!
//! # Module Organization
//!
//! ```text
//! transforms/vision/
//! ├── raster.rs        → Array-level warp, resize and flip
//! ├── geometric.rs     → Cropping around objects, fixed resizing, box masks
//! ├── heatmap.rs       → Extreme-point, n-ellipse and confidence maps
//! ├── augmentation.rs  → Random flip, scale and rotation
//! ├── photometric.rs   → Value rescaling
//! └── conversion.rs    → Channel concatenation
//! ```
//!
//! # Quick Start
//!
//! All transforms are re-exported at the module level for convenient access:
//!
//! ```ignore
//! use object_transforms::config::Mode;
//! use object_transforms::transforms::Transform;
//! use object_transforms::transforms::vision::{AddConfidenceMap, CropFromMask, ScaleNRotate};
//!
//! let pipeline = ScaleNRotate::default()
//!     .then(CropFromMask::dynamic(&["image", "gt"], "gt", 512, Mode::Train, true)?)
//!     .then(AddConfidenceMap::default());
//! ```

pub mod augmentation;
pub mod conversion;
pub mod geometric;
pub mod heatmap;
pub mod photometric;
pub mod raster;

pub use augmentation::{RandomHorizontalFlip, RangeSpec, ScaleNRotate};
pub use conversion::ConcatInputs;
pub use geometric::{CreateBBMask, CropFromMask, FixedResize, RelaxPolicy, Resolution};
pub use heatmap::{
    AddConfidenceMap, ExtremePointsHeatmap, HeatmapType, NEllipse, NEllipseWithGaussians,
};
pub use photometric::ToImage;
pub use raster::{AffineMatrix, Interpolation};
