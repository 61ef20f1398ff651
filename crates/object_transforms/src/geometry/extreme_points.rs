use crate::config::Mode;
use crate::error::TransformError;
use crate::worker_rng::worker_gen_range;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// A pixel position, `x` along columns and `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Finds the four extreme points of the mask foreground in the order
/// `[left, right, top, bottom]`.
///
/// Among the pixels sharing an extreme coordinate the median one in
/// row-major scan order is picked (upper median for even counts), so the
/// result only depends on the mask. In [`Mode::Train`] every point is then
/// shifted by an independent integer offset in `[-perturbation, perturbation]`
/// along both axes and clipped to the array.
///
/// Fails with [`TransformError::EmptyMask`] when the mask has no nonzero pixel.
pub fn locate(
    mask: ArrayView2<f32>,
    perturbation: usize,
    mode: Mode,
) -> Result<[Point; 4], TransformError> {
    let (height, width) = mask.dim();

    let mut min_x = usize::MAX;
    let mut max_x = 0;
    let mut min_y = usize::MAX;
    let mut max_y = 0;
    for ((y, x), &v) in mask.indexed_iter() {
        if v != 0.0 {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_x == usize::MAX {
        return Err(TransformError::empty_mask("mask"));
    }

    // Candidates come out of the scan in row-major order.
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut top = Vec::new();
    let mut bottom = Vec::new();
    for ((y, x), &v) in mask.indexed_iter() {
        if v == 0.0 {
            continue;
        }
        let p = Point::new(x, y);
        if x == min_x {
            left.push(p);
        }
        if x == max_x {
            right.push(p);
        }
        if y == min_y {
            top.push(p);
        }
        if y == max_y {
            bottom.push(p);
        }
    }

    let mut points = [
        median(&left),
        median(&right),
        median(&top),
        median(&bottom),
    ];

    if mode == Mode::Train && perturbation > 0 {
        for p in points.iter_mut() {
            *p = perturb(*p, perturbation, width, height);
        }
    }
    Ok(points)
}

fn median(candidates: &[Point]) -> Point {
    candidates[candidates.len() / 2]
}

fn perturb(p: Point, perturbation: usize, width: usize, height: usize) -> Point {
    let pert = perturbation as i64;
    let dx: i64 = worker_gen_range(-pert..=pert);
    let dy: i64 = worker_gen_range(-pert..=pert);
    Point::new(
        (p.x as i64 + dx).clamp(0, width as i64 - 1) as usize,
        (p.y as i64 + dy).clamp(0, height as i64 - 1) as usize,
    )
}
