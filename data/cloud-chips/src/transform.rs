//! Augmentations applied to a chip and its mask together.
//!
//! Geometric transforms move image and mask pixels identically so the mask
//! stays aligned. Anything with the right `Fn` signature is a transform too.

use burn::tensor::{Data, Shape};
use rand::Rng;

use crate::{error::ChipError, types::Augmented};

pub trait ChipTransform: Send + Sync {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError>;
}

impl<F> ChipTransform for F
where
    F: Fn(Data<f32, 3>, Data<f32, 2>) -> Result<Augmented, ChipError> + Send + Sync,
{
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        self(image, mask)
    }
}

/// Runs its steps in order, stopping at the first failure.
#[derive(Default)]
pub struct Compose {
    steps: Vec<Box<dyn ChipTransform>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl ChipTransform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ChipTransform for Compose {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        self.steps
            .iter()
            .try_fold(Augmented::new(image, mask), |acc, step| {
                step.apply(acc.image, acc.mask)
            })
    }
}

/// Resamples to a fixed size: bilinear for the image, nearest for the mask.
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    pub height: usize,
    pub width: usize,
}

impl Resize {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
}

impl ChipTransform for Resize {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        let [in_h, in_w, channels] = check_aligned(&image, &mask)?;
        if [self.height, self.width, in_h, in_w].contains(&0) {
            return Err(ChipError::transform(format!(
                "can't resize {in_h}x{in_w} to {}x{}",
                self.height, self.width
            )));
        }
        let (out_h, out_w) = (self.height, self.width);
        let scale_y = in_h as f32 / out_h as f32;
        let scale_x = in_w as f32 / out_w as f32;

        let mut pixels = Vec::with_capacity(out_h * out_w * channels);
        for y in 0..out_h {
            let (y0, y1, wy) = linear_source(y, scale_y, in_h);
            for x in 0..out_w {
                let (x0, x1, wx) = linear_source(x, scale_x, in_w);
                for c in 0..channels {
                    let at = |yy: usize, xx: usize| image.value[(yy * in_w + xx) * channels + c];
                    let top = at(y0, x0) * (1.0 - wx) + at(y0, x1) * wx;
                    let bottom = at(y1, x0) * (1.0 - wx) + at(y1, x1) * wx;
                    pixels.push(top * (1.0 - wy) + bottom * wy);
                }
            }
        }

        let mut labels = Vec::with_capacity(out_h * out_w);
        for y in 0..out_h {
            let sy = nearest_source(y, scale_y, in_h);
            for x in 0..out_w {
                let sx = nearest_source(x, scale_x, in_w);
                labels.push(mask.value[sy * in_w + sx]);
            }
        }

        Ok(Augmented::new(
            Data::new(pixels, Shape::new([out_h, out_w, channels])),
            Data::new(labels, Shape::new([out_h, out_w])),
        ))
    }
}

/// Rotates about the centre by a random angle in
/// `[-limit_degrees, limit_degrees]`, with probability `p`. The image is
/// sampled bilinearly and the mask by nearest neighbour; source pixels that
/// fall outside the chip are mirrored back in.
#[derive(Debug, Clone, Copy)]
pub struct Rotate {
    pub limit_degrees: f64,
    pub p: f64,
}

impl Rotate {
    pub fn new(limit_degrees: f64, p: f64) -> Self {
        Self { limit_degrees, p }
    }
}

impl ChipTransform for Rotate {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        check_aligned(&image, &mask)?;
        if !roll(self.p)? {
            return Ok(Augmented::new(image, mask));
        }
        let limit = self.limit_degrees.abs();
        let degrees = if limit > 0.0 {
            rand::thread_rng().gen_range(-limit..=limit)
        } else {
            0.0
        };
        Ok(rotate(image, mask, degrees))
    }
}

/// Mirrors left to right with probability `p`.
#[derive(Debug, Clone, Copy)]
pub struct HorizontalFlip {
    pub p: f64,
}

impl HorizontalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl ChipTransform for HorizontalFlip {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        check_aligned(&image, &mask)?;
        if !roll(self.p)? {
            return Ok(Augmented::new(image, mask));
        }
        Ok(flip(image, mask, |y, x, _, w| (y, w - 1 - x)))
    }
}

/// Mirrors top to bottom with probability `p`.
#[derive(Debug, Clone, Copy)]
pub struct VerticalFlip {
    pub p: f64,
}

impl VerticalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl ChipTransform for VerticalFlip {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        check_aligned(&image, &mask)?;
        if !roll(self.p)? {
            return Ok(Augmented::new(image, mask));
        }
        Ok(flip(image, mask, |y, x, h, _| (h - 1 - y, x)))
    }
}

/// `(x - mean * max_pixel_value) / (std * max_pixel_value)` on the image,
/// per channel. A single mean or std value applies to every channel. The
/// mask is passed through.
#[derive(Debug, Clone)]
pub struct Normalize {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub max_pixel_value: f32,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>, max_pixel_value: f32) -> Self {
        Self {
            mean,
            std,
            max_pixel_value,
        }
    }
}

impl ChipTransform for Normalize {
    fn apply(&self, image: Data<f32, 3>, mask: Data<f32, 2>) -> Result<Augmented, ChipError> {
        let channels = image.shape.dims[2];
        let mean = per_channel(&self.mean, channels, "mean")?;
        let std = per_channel(&self.std, channels, "std")?;

        let offsets: Vec<f32> = mean.iter().map(|m| m * self.max_pixel_value).collect();
        let scales = std
            .iter()
            .map(|s| s * self.max_pixel_value)
            .map(|scale| {
                if scale == 0.0 {
                    Err(ChipError::transform("normalize divides by zero"))
                } else {
                    Ok(scale)
                }
            })
            .collect::<Result<Vec<f32>, _>>()?;

        let shape = image.shape;
        let value = image
            .value
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let c = i % channels;
                (v - offsets[c]) / scales[c]
            })
            .collect();

        Ok(Augmented::new(Data::new(value, shape), mask))
    }
}

fn check_aligned(image: &Data<f32, 3>, mask: &Data<f32, 2>) -> Result<[usize; 3], ChipError> {
    let [h, w, c] = image.shape.dims;
    if mask.shape.dims != [h, w] {
        return Err(ChipError::transform(format!(
            "mask {:?} does not match image {:?}",
            mask.shape.dims,
            [h, w]
        )));
    }
    Ok([h, w, c])
}

fn roll(p: f64) -> Result<bool, ChipError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(ChipError::transform(format!(
            "probability {p} is outside [0, 1]"
        )));
    }
    Ok(rand::thread_rng().gen_bool(p))
}

/// Rebuilds image and mask where output `(y, x)` reads `source(y, x, h, w)`.
fn flip(
    image: Data<f32, 3>,
    mask: Data<f32, 2>,
    source: impl Fn(usize, usize, usize, usize) -> (usize, usize),
) -> Augmented {
    let [h, w, channels] = image.shape.dims;
    let mut pixels = Vec::with_capacity(image.value.len());
    let mut labels = Vec::with_capacity(mask.value.len());
    for y in 0..h {
        for x in 0..w {
            let (sy, sx) = source(y, x, h, w);
            let start = (sy * w + sx) * channels;
            pixels.extend_from_slice(&image.value[start..start + channels]);
            labels.push(mask.value[sy * w + sx]);
        }
    }

    Augmented::new(
        Data::new(pixels, image.shape),
        Data::new(labels, mask.shape),
    )
}

/// Output `(y, x)` reads the source point obtained by turning `(y, x)`
/// back through `degrees` about the chip centre.
fn rotate(image: Data<f32, 3>, mask: Data<f32, 2>, degrees: f64) -> Augmented {
    let [h, w, channels] = image.shape.dims;
    if h == 0 || w == 0 {
        return Augmented::new(image, mask);
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cy, cx) = ((h - 1) as f64 / 2.0, (w - 1) as f64 / 2.0);

    let mut pixels = Vec::with_capacity(image.value.len());
    let mut labels = Vec::with_capacity(mask.value.len());
    for y in 0..h {
        for x in 0..w {
            let (dy, dx) = (y as f64 - cy, x as f64 - cx);
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;

            let (fx, fy) = (sx.floor(), sy.floor());
            let (wx, wy) = ((sx - fx) as f32, (sy - fy) as f32);
            let xs = [reflect(fx as i64, w), reflect(fx as i64 + 1, w)];
            let ys = [reflect(fy as i64, h), reflect(fy as i64 + 1, h)];
            for c in 0..channels {
                let at = |yy: usize, xx: usize| image.value[(yy * w + xx) * channels + c];
                let top = at(ys[0], xs[0]) * (1.0 - wx) + at(ys[0], xs[1]) * wx;
                let bottom = at(ys[1], xs[0]) * (1.0 - wx) + at(ys[1], xs[1]) * wx;
                pixels.push(top * (1.0 - wy) + bottom * wy);
            }

            let my = reflect(sy.round() as i64, h);
            let mx = reflect(sx.round() as i64, w);
            labels.push(mask.value[my * w + mx]);
        }
    }

    Augmented::new(
        Data::new(pixels, image.shape),
        Data::new(labels, mask.shape),
    )
}

/// Mirrors `index` into `0..len` without repeating the edge pixel.
fn reflect(index: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as i64 - 1);
    let folded = index.rem_euclid(period);
    if folded >= len as i64 {
        (period - folded) as usize
    } else {
        folded as usize
    }
}

/// Two neighbouring source indices and the weight of the second one,
/// sampling at pixel centres.
fn linear_source(dst: usize, scale: f32, len: usize) -> (usize, usize, f32) {
    let max = (len - 1) as f32;
    let src = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
    let lo = src.floor() as usize;
    let hi = (lo + 1).min(len - 1);
    (lo, hi, src - lo as f32)
}

fn nearest_source(dst: usize, scale: f32, len: usize) -> usize {
    ((dst as f32 * scale).floor() as usize).min(len - 1)
}

fn per_channel(values: &[f32], channels: usize, what: &str) -> Result<Vec<f32>, ChipError> {
    match values.len() {
        1 => Ok(vec![values[0]; channels]),
        n if n == channels => Ok(values.to_vec()),
        n => Err(ChipError::transform(format!(
            "{what} has {n} values for {channels} channels"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(h: usize, w: usize, c: usize) -> Data<f32, 3> {
        let value = (0..h * w * c).map(|v| v as f32).collect();
        Data::new(value, Shape::new([h, w, c]))
    }

    fn mask(h: usize, w: usize) -> Data<f32, 2> {
        let value = (0..h * w).map(|v| (v % 2) as f32).collect();
        Data::new(value, Shape::new([h, w]))
    }

    #[test]
    fn resize_downsamples_image_and_mask() {
        let out = Resize::new(2, 2).apply(image(4, 4, 2), mask(4, 4)).unwrap();

        assert_eq!(out.image.shape.dims, [2, 2, 2]);
        assert_eq!(out.mask.shape.dims, [2, 2]);
        // bilinear at (0.5, 0.5) of channel 0: mean of pixels 0, 1, 4, 5
        assert_eq!(out.image.value[0], (0.0 + 2.0 + 8.0 + 10.0) / 4.0);
        assert_eq!(out.mask.value, vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn resize_of_constant_image_stays_constant() {
        let flat = Data::new(vec![3.5; 5 * 3], Shape::new([5, 3, 1]));

        let out = Resize::new(7, 2).apply(flat, Data::new(vec![1.0; 15], Shape::new([5, 3])));
        let out = out.unwrap();

        assert_eq!(out.image.shape.dims, [7, 2, 1]);
        assert!(out.image.value.iter().all(|v| (v - 3.5).abs() < 1e-6));
        assert!(out.mask.value.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn resize_rejects_empty_target() {
        let result = Resize::new(0, 4).apply(image(4, 4, 1), mask(4, 4));

        assert!(matches!(result, Err(ChipError::Transform(_))));
    }

    #[test]
    fn quarter_turn_keeps_mask_on_its_pixels() {
        let mask = Data::new((0..16).map(|v| v as f32).collect(), Shape::new([4, 4]));
        let image = Data::new(
            mask.value.iter().flat_map(|v| [*v, *v * 2.0]).collect(),
            Shape::new([4, 4, 2]),
        );

        let out = rotate(image, mask, 90.0);

        // output (0, 0) reads source row 3, column 0
        assert_eq!(out.mask.value[0], 12.0);
        for (pixel, label) in out.image.value.chunks(2).zip(&out.mask.value) {
            assert!((pixel[0] - label).abs() < 1e-3);
            assert!((pixel[1] - 2.0 * label).abs() < 1e-3);
        }
    }

    #[test]
    fn zero_angle_rotation_is_identity() {
        let out = rotate(image(3, 5, 2), mask(3, 5), 0.0);

        assert_eq!(out.image.value, image(3, 5, 2).value);
        assert_eq!(out.mask.value, mask(3, 5).value);
    }

    #[test]
    fn random_rotation_keeps_shapes_and_mask_classes() {
        let rotate = Rotate::new(35.0, 1.0);

        for _ in 0..8 {
            let out = rotate.apply(image(6, 6, 3), mask(6, 6)).unwrap();

            assert_eq!(out.image.shape.dims, [6, 6, 3]);
            assert_eq!(out.mask.shape.dims, [6, 6]);
            assert!(out.mask.value.iter().all(|v| *v == 0.0 || *v == 1.0));
            let max = (6 * 6 * 3 - 1) as f32;
            assert!(out.image.value.iter().all(|v| (-1e-3..=max + 1e-3).contains(v)));
        }
    }

    #[test]
    fn reflect_mirrors_without_repeating_the_edge() {
        let folded: Vec<usize> = (-3..7).map(|i| reflect(i, 4)).collect();

        assert_eq!(folded, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        assert_eq!(reflect(-5, 1), 0);
    }

    #[test]
    fn certain_horizontal_flip_mirrors_columns() {
        let out = HorizontalFlip::new(1.0)
            .apply(image(1, 3, 1), Data::new(vec![1.0, 0.0, 0.0], Shape::new([1, 3])))
            .unwrap();

        assert_eq!(out.image.value, vec![2.0, 1.0, 0.0]);
        assert_eq!(out.mask.value, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn certain_vertical_flip_mirrors_rows_keeping_channels() {
        let out = VerticalFlip::new(1.0).apply(image(2, 1, 2), mask(2, 1)).unwrap();

        assert_eq!(out.image.value, vec![2.0, 3.0, 0.0, 1.0]);
        assert_eq!(out.mask.value, vec![1.0, 0.0]);
    }

    #[test]
    fn impossible_flip_is_identity() {
        let out = HorizontalFlip::new(0.0).apply(image(2, 2, 1), mask(2, 2)).unwrap();

        assert_eq!(out.image.value, image(2, 2, 1).value);
    }

    #[test]
    fn flip_rejects_bad_probability() {
        let result = VerticalFlip::new(1.5).apply(image(2, 2, 1), mask(2, 2));

        assert!(result.is_err());
    }

    #[test]
    fn flip_rejects_misaligned_mask() {
        let result = HorizontalFlip::new(1.0).apply(image(2, 2, 1), mask(3, 2));

        assert!(matches!(result, Err(ChipError::Transform(_))));
    }

    #[test]
    fn normalize_scales_each_channel() {
        let normalize = Normalize::new(vec![0.0, 1.0], vec![1.0, 2.0], 255.0);

        let out = normalize
            .apply(
                Data::new(vec![255.0, 765.0], Shape::new([1, 1, 2])),
                mask(1, 1),
            )
            .unwrap();

        assert_eq!(out.image.value, vec![1.0, 1.0]);
        assert_eq!(out.mask.value, vec![0.0]);
    }

    #[test]
    fn normalize_rejects_zero_std_and_wrong_arity() {
        let zero = Normalize::new(vec![0.0], vec![0.0], 255.0);
        assert!(zero.apply(image(1, 1, 3), mask(1, 1)).is_err());

        let arity = Normalize::new(vec![0.0, 0.0], vec![1.0], 1.0);
        assert!(arity.apply(image(1, 1, 3), mask(1, 1)).is_err());
    }

    #[test]
    fn compose_runs_steps_in_order() {
        let pipeline = Compose::new()
            .then(Resize::new(2, 2))
            .then(|image: Data<f32, 3>, mask: Data<f32, 2>| -> Result<Augmented, ChipError> {
                assert_eq!(image.shape.dims, [2, 2, 1]);
                Ok(Augmented::new(image, mask))
            })
            .then(Normalize::new(vec![0.0], vec![2.0], 1.0));

        let out = pipeline
            .apply(Data::new(vec![4.0; 16], Shape::new([4, 4, 1])), mask(4, 4))
            .unwrap();

        assert_eq!(pipeline.len(), 3);
        assert_eq!(out.image.value, vec![2.0; 4]);
    }
}
