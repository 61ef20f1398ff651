#![allow(dead_code)]

use ndarray::{s, Array3};
use object_transforms::{Entry, Sample};

/// Builds a sample with an `image` ramp, a `gt` mask with one filled
/// rectangle per `(rows, cols)` entry, and an `id`.
pub fn object_sample(
    id: &str,
    (height, width): (usize, usize),
    objects: &[((usize, usize), (usize, usize))],
) -> Sample {
    let image = Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
        ((y * 7 + x * 3 + c * 11) % 256) as f32
    });
    let mut gt = Array3::zeros((height, width, objects.len().max(1)));
    for (k, &((y0, y1), (x0, x1))) in objects.iter().enumerate() {
        gt.slice_mut(s![y0..y1, x0..x1, k]).fill(1.0);
    }
    Sample::from_single("image", Entry::image(image))
        .with_feature("gt", Entry::mask(gt))
        .with_feature("id", Entry::Metadata(id.to_string()))
}

/// Single object centred in a 64×48 image.
pub fn single_object(id: &str) -> Sample {
    object_sample(id, (48, 64), &[((12, 36), (20, 44))])
}
