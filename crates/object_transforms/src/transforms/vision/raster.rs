//! Raster operations on `(height, width, channels)` arrays: affine warp,
//! resize and horizontal flip.
//!
//! The warp follows OpenCV's `warpAffine` conventions (the matrix maps source
//! to destination, constant border) so augmented samples line up with masks
//! warped by other tools. Warping goes through `imageproc` and smooth resizing
//! through `image::imageops::resize`, one channel at a time.

use anyhow::{ensure, Context, Result};
use image::{imageops::FilterType, ImageBuffer, Luma};
use imageproc::geometric_transformations::{
    warp_into, Interpolation as WarpInterpolation, Projection,
};
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

/// Interpolation used when resampling an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Linear => FilterType::Triangle,
            Interpolation::Cubic => FilterType::CatmullRom,
        }
    }

    fn warp_mode(self) -> WarpInterpolation {
        match self {
            Interpolation::Nearest => WarpInterpolation::Nearest,
            Interpolation::Linear => WarpInterpolation::Bilinear,
            Interpolation::Cubic => WarpInterpolation::Bicubic,
        }
    }
}

/// A 2×3 affine matrix mapping source `(x, y)` to destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix(pub [[f64; 3]; 2]);

impl AffineMatrix {
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// Inverse mapping, `None` for a singular matrix.
    pub fn invert(&self) -> Option<Self> {
        let [[a, b, tx], [c, d, ty]] = self.0;
        let det = a * d - b * c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Self([
            [ia, ib, -(ia * tx + ib * ty)],
            [ic, id, -(ic * tx + id * ty)],
        ]))
    }
}

/// Rotation by `angle` degrees (counter-clockwise, image y axis pointing
/// down) combined with isotropic `scale`, about `center = (x, y)`.
pub fn rotation_matrix((cx, cy): (f64, f64), angle: f64, scale: f64) -> AffineMatrix {
    let theta = angle.to_radians();
    let alpha = scale * theta.cos();
    let beta = scale * theta.sin();
    AffineMatrix([
        [alpha, beta, (1.0 - alpha) * cx - beta * cy],
        [-beta, alpha, beta * cx + (1.0 - alpha) * cy],
    ])
}

/// Border pixels added around each channel before warping. `imageproc`
/// returns the default pixel whenever a kernel tap leaves the source, so the
/// source is framed with `border` to keep the taps inside.
const WARP_PAD: usize = 3;

/// Warps `src` with `matrix` into an array of `(height, width)`.
///
/// Each channel is warped by `imageproc`'s `warp_into`. Kernel taps that land
/// outside `src` read `border`, as with a constant border in OpenCV.
pub fn warp_affine(
    src: &Array3<f32>,
    matrix: &AffineMatrix,
    (height, width): (usize, usize),
    interpolation: Interpolation,
    border: f32,
) -> Result<Array3<f32>> {
    ensure!(
        matrix.invert().is_some(),
        "Affine matrix is singular and cannot be inverted"
    );
    let (sh, sw, channels) = src.dim();

    // Shift the padded frame back onto the source before applying `matrix`.
    let pad = WARP_PAD as f64;
    let [[a, b, tx], [c, d, ty]] = matrix.0;
    let projection = Projection::from_matrix([
        a as f32,
        b as f32,
        (tx - (a + b) * pad) as f32,
        c as f32,
        d as f32,
        (ty - (c + d) * pad) as f32,
        0.0,
        0.0,
        1.0,
    ])
    .context("Affine matrix is singular and cannot be inverted")?;

    let (ph, pw) = (sh + 2 * WARP_PAD, sw + 2 * WARP_PAD);
    let mut dst = Array3::zeros((height, width, channels));
    for (k, channel) in src.axis_iter(Axis(2)).enumerate() {
        let mut padded = Array2::from_elem((ph, pw), border);
        padded
            .slice_mut(s![WARP_PAD..WARP_PAD + sh, WARP_PAD..WARP_PAD + sw])
            .assign(&channel);
        let source: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(pw as u32, ph as u32, padded.iter().copied().collect())
                .context("Failed to wrap channel as an image buffer")?;

        let mut warped = ImageBuffer::from_pixel(width as u32, height as u32, Luma([border]));
        warp_into(
            &source,
            &projection,
            interpolation.warp_mode(),
            Luma([border]),
            &mut warped,
        );
        for (x, y, pixel) in warped.enumerate_pixels() {
            dst[[y as usize, x as usize, k]] = pixel.0[0];
        }
    }
    Ok(dst)
}

/// Resizes `src` to `(height, width)`.
///
/// `Nearest` maps destination pixel `i` to source pixel
/// `floor(i · src / dst)` so labels are copied, never blended. Smooth modes
/// resample each channel with the `image` crate.
pub fn resize(
    src: &Array3<f32>,
    (height, width): (usize, usize),
    interpolation: Interpolation,
) -> Result<Array3<f32>> {
    ensure!(
        height > 0 && width > 0,
        "Array dimensions must be positive after resizing (got {}x{})",
        height,
        width
    );
    let (sh, sw, channels) = src.dim();
    ensure!(sh > 0 && sw > 0, "Cannot resize an empty {}x{} array", sh, sw);
    if (sh, sw) == (height, width) {
        return Ok(src.clone());
    }

    if interpolation == Interpolation::Nearest {
        return Ok(Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
            let sy = (y * sh / height).min(sh - 1);
            let sx = (x * sw / width).min(sw - 1);
            src[[sy, sx, c]]
        }));
    }

    // `image` clamps float pixels to [0, 1], so each channel is rescaled into
    // that range and back.
    let mut dst = Array3::zeros((height, width, channels));
    for (c, channel) in src.axis_iter(Axis(2)).enumerate() {
        let lo = channel.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = channel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = hi - lo;
        if range == 0.0 {
            dst.index_axis_mut(Axis(2), c).fill(lo);
            continue;
        }
        let raw: Vec<f32> = channel.iter().map(|&v| (v - lo) / range).collect();
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(sw as u32, sh as u32, raw)
                .context("Failed to wrap channel as an image buffer")?;
        let resized =
            image::imageops::resize(&buffer, width as u32, height as u32, interpolation.filter());
        for (x, y, pixel) in resized.enumerate_pixels() {
            dst[[y as usize, x as usize, c]] = pixel.0[0] * range + lo;
        }
    }
    Ok(dst)
}

/// Mirrors `src` left to right.
pub fn flip_horizontal(src: &Array3<f32>) -> Array3<f32> {
    src.slice(s![.., ..;-1, ..]).to_owned()
}

/// True if every value is 0, 1 or 255, i.e. the array looks like a label map.
pub fn is_binary_like(src: &Array3<f32>) -> bool {
    src.iter().all(|&v| v == 0.0 || v == 1.0 || v == 255.0)
}
