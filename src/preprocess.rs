use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::tract_ndarray;

use crate::error::{Error, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Axis order of the model's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Layout {
    /// `[1, 3, H, W]`, as exported from PyTorch.
    #[default]
    Nchw,
    /// `[1, H, W, 3]`, as exported from TensorFlow/Keras.
    Nhwc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    /// Target length of the shorter image side before cropping.
    pub resize: u32,
    /// Side of the square center crop fed to the model.
    pub crop: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub layout: Layout,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            resize: 256,
            crop: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            layout: Layout::Nchw,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resize == 0 || self.crop == 0 {
            return Err(Error::invalid("resize and crop must be positive"));
        }
        if self.crop > self.resize {
            return Err(Error::invalid(format!(
                "crop {} is larger than resize {}",
                self.crop, self.resize
            )));
        }
        if self.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(Error::invalid(format!("bad std {:?}", self.std)));
        }
        Ok(())
    }

    /// Shape of the tensor produced by [`preprocess`].
    pub fn input_shape(&self) -> [usize; 4] {
        let side = self.crop as usize;
        match self.layout {
            Layout::Nchw => [1, 3, side, side],
            Layout::Nhwc => [1, side, side, 3],
        }
    }
}

pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Dimensions after scaling the shorter side to `target`.
fn resized_dims(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let h = (target as u64 * height as u64 / width as u64) as u32;
        (target, h)
    } else {
        let w = (target as u64 * width as u64 / height as u64) as u32;
        (w, target)
    }
}

/// Resize, center crop, scale to `[0, 1]` and normalize per channel.
pub fn preprocess(
    image: &RgbImage,
    config: &PreprocessConfig,
) -> Result<tract_ndarray::Array4<f32>> {
    config.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::invalid("image has no pixels"));
    }

    let (w, h) = resized_dims(width, height, config.resize);
    let resized = imageops::resize(image, w, h, FilterType::Triangle);

    let crop = config.crop;
    let left = ((w - crop) as f32 / 2.0).round() as u32;
    let top = ((h - crop) as f32 / 2.0).round() as u32;
    let cropped = imageops::crop_imm(&resized, left, top, crop, crop).to_image();

    let side = crop as usize;
    #[allow(clippy::cast_possible_truncation)]
    let value = |x: usize, y: usize, c: usize| {
        let v = f32::from(cropped[(x as _, y as _)][c]) / 255.0;
        (v - config.mean[c]) / config.std[c]
    };
    let tensor = match config.layout {
        Layout::Nchw => {
            tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| value(x, y, c))
        }
        Layout::Nhwc => {
            tract_ndarray::Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| value(x, y, c))
        }
    };
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(width: u32, height: u32, px: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(px))
    }

    #[test]
    fn shorter_side_is_scaled() {
        assert_eq!(resized_dims(640, 480, 256), (341, 256));
        assert_eq!(resized_dims(480, 640, 256), (256, 341));
        assert_eq!(resized_dims(300, 300, 256), (256, 256));
        assert_eq!(resized_dims(10, 20, 256), (256, 512));
    }

    #[test]
    fn shapes_follow_layout() {
        let img = uniform(64, 48, [10, 20, 30]);
        let mut config = PreprocessConfig {
            resize: 32,
            crop: 28,
            ..Default::default()
        };
        assert_eq!(preprocess(&img, &config).unwrap().shape(), &[1, 3, 28, 28]);
        assert_eq!(config.input_shape(), [1, 3, 28, 28]);

        config.layout = Layout::Nhwc;
        assert_eq!(preprocess(&img, &config).unwrap().shape(), &[1, 28, 28, 3]);
        assert_eq!(config.input_shape(), [1, 28, 28, 3]);
    }

    #[test]
    fn uniform_image_normalizes_per_channel() {
        let px = [255u8, 128, 0];
        let img = uniform(50, 70, px);
        let config = PreprocessConfig {
            resize: 20,
            crop: 16,
            ..Default::default()
        };
        let tensor = preprocess(&img, &config).unwrap();
        for c in 0..3 {
            let want = (px[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            // one u8 step is ~0.017 after normalization
            for v in tensor.index_axis(tract_ndarray::Axis(1), c).iter() {
                assert!((v - want).abs() < 0.02, "channel {c}: {v} != {want}");
            }
        }
    }

    #[test]
    fn crop_is_centered() {
        // left half black, right half white; a centered crop of an even
        // width sees both halves equally
        let img = RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let config = PreprocessConfig {
            resize: 20,
            crop: 20,
            mean: [0.0; 3],
            std: [1.0; 3],
            layout: Layout::Nchw,
        };
        let tensor = preprocess(&img, &config).unwrap();
        assert!(tensor[[0, 0, 10, 0]] < 0.1);
        assert!(tensor[[0, 0, 10, 19]] > 0.9);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let img = uniform(8, 8, [0, 0, 0]);
        for config in [
            PreprocessConfig { crop: 300, ..Default::default() },
            PreprocessConfig { resize: 0, ..Default::default() },
            PreprocessConfig { std: [0.2, 0.0, 0.2], ..Default::default() },
        ] {
            assert!(matches!(
                preprocess(&img, &config),
                Err(Error::InvalidArgument(_))
            ));
        }
    }
}
