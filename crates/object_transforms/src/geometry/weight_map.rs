use super::extreme_points::Point;
use ndarray::{Array2, ArrayView2};
use tracing::debug;

const NORM_EPS: f32 = 1e-10;

/// Variance of a uniform distribution over one pixel, added to the
/// covariance diagonal so single-row or single-column masks stay invertible.
const PIXEL_VARIANCE: f64 = 1.0 / 12.0;

/// Output of [`skewed_axes_map`]: the weights plus the per-pixel L1 and L2
/// distances they were computed from.
#[derive(Debug, Clone)]
pub struct SkewedAxesMap {
    pub weights: Array2<f32>,
    pub l1: Array2<f32>,
    pub l2: Array2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec2 {
    x: f64,
    y: f64,
}

impl Vec2 {
    fn from_point(p: Point) -> Self {
        Self {
            x: p.x as f64,
            y: p.y as f64,
        }
    }

    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    fn unit_or(self, fallback: Self) -> Self {
        let n = self.norm();
        if n < 1e-9 {
            fallback
        } else {
            Self {
                x: self.x / n,
                y: self.y / n,
            }
        }
    }
}

/// Intersection of the line through `a, b` with the line through `c, d`.
fn intersect(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> Option<Vec2> {
    let denom = (a.x - b.x) * (c.y - d.y) - (a.y - b.y) * (c.x - d.x);
    if denom.abs() < 1e-9 {
        return None;
    }
    let ab = a.x * b.y - a.y * b.x;
    let cd = c.x * d.y - c.y * d.x;
    Some(Vec2 {
        x: (ab * (c.x - d.x) - (a.x - b.x) * cd) / denom,
        y: (ab * (c.y - d.y) - (a.y - b.y) * cd) / denom,
    })
}

/// Skewed coordinate frame spanned by the left→right and top→bottom axes.
struct SkewedFrame {
    center: Vec2,
    u: Vec2,
    v: Vec2,
    det: f64,
}

impl SkewedFrame {
    fn new(points: &[Point; 4]) -> Self {
        let [l, r, t, b] = points.map(Vec2::from_point);
        let center = intersect(l, r, t, b).unwrap_or_else(|| {
            debug!("extreme-point axes are parallel, centring on the point mean");
            Vec2 {
                x: (l.x + r.x + t.x + b.x) / 4.0,
                y: (l.y + r.y + t.y + b.y) / 4.0,
            }
        });

        let u = r.sub(l).unit_or(Vec2 { x: 1.0, y: 0.0 });
        let mut v = b.sub(t).unit_or(Vec2 { x: 0.0, y: 1.0 });
        let mut det = u.x * v.y - u.y * v.x;
        if det.abs() < 1e-6 {
            v = Vec2 { x: -u.y, y: u.x };
            det = 1.0;
        }
        Self { center, u, v, det }
    }

    /// Coordinates `(a, b)` of `p` with `p - center = a·u + b·v`.
    fn coords(&self, p: Vec2) -> (f64, f64) {
        let d = p.sub(self.center);
        let a = (d.x * self.v.y - d.y * self.v.x) / self.det;
        let b = (self.u.x * d.y - self.u.y * d.x) / self.det;
        (a, b)
    }
}

/// Anisotropic distance map around the object's extreme points.
///
/// Every pixel is expressed in the frame of the two axes through the extreme
/// points (left→right, top→bottom), centred on their intersection. Each
/// coordinate is divided by the half-axis length on its side, so all four
/// extreme points sit at normalised distance 1. The weight is
/// `exp(-(l1 + l2) / (2·tau))`.
///
/// With `full_image == false` weights outside the mask foreground are 0;
/// `l2_threshold` zeroes pixels whose normalised L2 distance exceeds it.
pub fn skewed_axes_map(
    mask: ArrayView2<f32>,
    points: &[Point; 4],
    tau: f64,
    full_image: bool,
    l2_threshold: Option<f64>,
) -> SkewedAxesMap {
    let frame = SkewedFrame::new(points);
    let [l, r, t, b] = points.map(|p| frame.coords(Vec2::from_point(p)));
    let left = l.0.abs().max(1.0);
    let right = r.0.abs().max(1.0);
    let top = t.1.abs().max(1.0);
    let bottom = b.1.abs().max(1.0);

    let shape = mask.raw_dim();
    let mut weights = Array2::zeros(shape);
    let mut l1_map = Array2::zeros(shape);
    let mut l2_map = Array2::zeros(shape);

    for ((y, x), &m) in mask.indexed_iter() {
        let (a, b) = frame.coords(Vec2 {
            x: x as f64,
            y: y as f64,
        });
        let u = a / if a < 0.0 { left } else { right };
        let v = b / if b < 0.0 { top } else { bottom };
        let l1 = u.abs() + v.abs();
        let l2 = (u * u + v * v).sqrt();
        l1_map[[y, x]] = l1 as f32;
        l2_map[[y, x]] = l2 as f32;

        let outside_mask = !full_image && m == 0.0;
        let beyond = l2_threshold.is_some_and(|limit| l2 > limit);
        if !outside_mask && !beyond {
            weights[[y, x]] = (-(l1 + l2) / (2.0 * tau)).exp() as f32;
        }
    }

    SkewedAxesMap {
        weights,
        l1: l1_map,
        l2: l2_map,
    }
}

/// Density-shaped map of a 2D Gaussian fitted to the foreground coordinates,
/// `exp(-m² / (2·tau))` with `m` the Mahalanobis distance.
///
/// Returns zeros for a mask without foreground.
pub fn mv_gaussian_map(mask: ArrayView2<f32>, tau: f64, full_image: bool) -> Array2<f32> {
    let coords: Vec<(f64, f64)> = mask
        .indexed_iter()
        .filter(|&(_, &v)| v != 0.0)
        .map(|((y, x), _)| (x as f64, y as f64))
        .collect();
    if coords.is_empty() {
        return Array2::zeros(mask.raw_dim());
    }

    let n = coords.len() as f64;
    let mx = coords.iter().map(|c| c.0).sum::<f64>() / n;
    let my = coords.iter().map(|c| c.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in &coords {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }
    let (sxx, syy, sxy) = (sxx / n + PIXEL_VARIANCE, syy / n + PIXEL_VARIANCE, sxy / n);

    let det = sxx * syy - sxy * sxy;
    let (ixx, iyy, ixy) = (syy / det, sxx / det, -sxy / det);

    Array2::from_shape_fn(mask.raw_dim(), |(y, x)| {
        if !full_image && mask[[y, x]] == 0.0 {
            return 0.0;
        }
        let dx = x as f64 - mx;
        let dy = y as f64 - my;
        let m2 = dx * dx * ixx + 2.0 * dx * dy * ixy + dy * dy * iyy;
        (-m2 / (2.0 * tau)).exp() as f32
    })
}

/// Min-max normalisation to `[0, 1]`; the epsilon keeps flat maps finite.
pub fn normalize_weight_map(map: ArrayView2<f32>) -> Array2<f32> {
    let min = map.iter().copied().fold(f32::INFINITY, f32::min);
    let max = map.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    map.mapv(|v| (v - min) / (max - min + NORM_EPS))
}
