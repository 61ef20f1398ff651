//! src/geometry/mod.rs
//!
//! Array-level algorithms behind the sample transforms. Everything here works
//! on `ndarray` views and knows nothing about `Sample` keys.
//!
//! ```text
//! geometry/
//! ├── extreme_points.rs → left/right/top/bottom foreground points
//! ├── bbox.rs           → tight boxes and relaxed crop windows
//! ├── crop.rs           → cropping (single and per-instance) and un-cropping
//! ├── relax.rs          → object-size adaptive crop margin
//! ├── nellipse.rs       → n-ellipse confidence and point Gaussians
//! └── weight_map.rs     → skewed-axis and multivariate Gaussian weight maps
//! ```

pub mod bbox;
pub mod crop;
pub mod extreme_points;
pub mod nellipse;
pub mod relax;
pub mod weight_map;

pub use bbox::{apply_relax, bbox, BoundingBox, CropWindow, Padding};
pub use crop::{crop_from_bbox, crop_from_mask, crop_instances, uncrop};
pub use extreme_points::{locate, Point};
pub use nellipse::{n_ellipse, n_ellipse_with_gaussians, point_gaussians};
pub use relax::DynamicRelax;
pub use weight_map::{mv_gaussian_map, normalize_weight_map, skewed_axes_map, SkewedAxesMap};

use ndarray::ArrayView2;

/// True if the array holds a single distinct value (no contrast at all).
pub fn is_uniform(mask: ArrayView2<f32>) -> bool {
    let mut values = mask.iter();
    match values.next() {
        Some(&first) => values.all(|&v| v == first),
        None => true,
    }
}
