use super::extreme_points::Point;
use ndarray::Array2;

const EPS: f64 = 1e-10;

/// Sum of Euclidean distances from `(x, y)` to every focus.
fn focal_sum(x: f64, y: f64, foci: &[Point]) -> f64 {
    foci.iter()
        .map(|p| {
            let dx = x - p.x as f64;
            let dy = y - p.y as f64;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// N-ellipse confidence over a `(height, width)` grid with the extreme
/// points as foci.
///
/// The level curve goes through the extreme point with the largest focal sum,
/// so all four points lie on or inside it. Confidence is 1 where the focal sum
/// is smallest and falls linearly to 0 on the curve; everything outside is 0.
pub fn n_ellipse((height, width): (usize, usize), points: &[Point; 4]) -> Array2<f32> {
    let sums = Array2::from_shape_fn((height, width), |(y, x)| {
        focal_sum(x as f64, y as f64, points)
    });
    let level = points
        .iter()
        .map(|p| focal_sum(p.x as f64, p.y as f64, points))
        .fold(f64::MIN, f64::max);
    let min = sums.iter().copied().fold(f64::INFINITY, f64::min);

    let span = level - min;
    if span < EPS {
        // All foci coincide: only the focus itself is inside.
        return sums.mapv(|s| if s <= level + EPS { 1.0 } else { 0.0 });
    }
    sums.mapv(|s| ((level - s) / (span + EPS)).clamp(0.0, 1.0) as f32)
}

/// Pixelwise maximum of one Gaussian bump per point,
/// `exp(-4 ln2 · r² / σ²)` (σ is the full width at half maximum).
pub fn point_gaussians(
    (height, width): (usize, usize),
    points: &[Point],
    sigma: f64,
) -> Array2<f32> {
    let k = -4.0 * std::f64::consts::LN_2 / (sigma * sigma);
    Array2::from_shape_fn((height, width), |(y, x)| {
        points
            .iter()
            .map(|p| {
                let dx = x as f64 - p.x as f64;
                let dy = y as f64 - p.y as f64;
                (k * (dx * dx + dy * dy)).exp()
            })
            .fold(0.0, f64::max) as f32
    })
}

/// N-ellipse blended with the extreme-point Gaussians:
/// `255·ellipse + alpha·255·gaussians`, rescaled so the maximum is 255.
pub fn n_ellipse_with_gaussians(
    shape: (usize, usize),
    points: &[Point; 4],
    alpha: f32,
    sigma: f64,
) -> Array2<f32> {
    let ellipse = n_ellipse(shape, points);
    let gaussians = point_gaussians(shape, points, sigma);
    let mut z = ellipse * 255.0 + gaussians * (255.0 * alpha);
    let max = z.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        z.mapv_inplace(|v| v * 255.0 / max);
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::geometry::locate;
    use anyhow::Result;
    use ndarray::s;

    fn square_points() -> Result<[Point; 4]> {
        let mut mask = Array2::zeros((20, 20));
        mask.slice_mut(s![5..15, 5..15]).fill(1.0);
        Ok(locate(mask.view(), 0, Mode::Val)?)
    }

    fn argmax(map: &Array2<f32>) -> (usize, usize) {
        map.indexed_iter()
            .fold(((0, 0), f32::MIN), |best, (idx, &v)| if v > best.1 { (idx, v) } else { best })
            .0
    }

    #[test]
    fn test_ellipse_peaks_at_centre_and_vanishes_at_corners() -> Result<()> {
        let map = n_ellipse((20, 20), &square_points()?);
        assert_eq!(argmax(&map), (10, 10));
        assert!((map[[10, 10]] - 1.0).abs() < 1e-6);
        for corner in [[0, 0], [0, 19], [19, 0], [19, 19]] {
            assert_eq!(map[corner], 0.0);
        }
        assert!(map.iter().all(|&v| (0.0..=1.0).contains(&v)));
        Ok(())
    }

    #[test]
    fn test_ellipse_reaches_zero_at_outermost_focus() -> Result<()> {
        let points = square_points()?;
        let map = n_ellipse((20, 20), &points);
        // Left and top foci have the largest focal sum here.
        assert!(map[[10, 5]] < 1e-6);
        assert!(map[[5, 10]] < 1e-6);
        Ok(())
    }

    #[test]
    fn test_single_pixel_ellipse() {
        let p = Point::new(3, 2);
        let map = n_ellipse((5, 6), &[p, p, p, p]);
        assert_eq!(map[[2, 3]], 1.0);
        assert_eq!(map.sum(), 1.0);
    }

    #[test]
    fn test_gaussians_peak_at_points() {
        let points = [Point::new(1, 1), Point::new(8, 6)];
        let g = point_gaussians((10, 10), &points, 10.0);
        assert_eq!(g[[1, 1]], 1.0);
        assert_eq!(g[[6, 8]], 1.0);
        // half maximum at distance sigma / 2
        let half = point_gaussians((1, 11), &[Point::new(0, 0)], 10.0);
        assert!((half[[0, 5]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_blend_alpha_zero_is_scaled_ellipse() -> Result<()> {
        let points = square_points()?;
        let blended = n_ellipse_with_gaussians((20, 20), &points, 0.0, 10.0);
        let ellipse = n_ellipse((20, 20), &points);
        for (a, b) in blended.iter().zip(ellipse.iter()) {
            assert!((a - b * 255.0).abs() < 1e-3);
        }
        Ok(())
    }

    #[test]
    fn test_blend_max_is_255() -> Result<()> {
        let blended = n_ellipse_with_gaussians((20, 20), &square_points()?, 0.6, 10.0);
        let max = blended.iter().copied().fold(0.0f32, f32::max);
        assert!((max - 255.0).abs() < 1e-3);
        assert!(blended.iter().all(|&v| v >= 0.0));
        Ok(())
    }
}
