//! 帧预处理: 翻转 + 对比度/亮度 (out = clamp(alpha·px + beta))

use anyhow::{ensure, Result};
use image::{imageops, RgbImage};

use crate::config::{Flip, PreprocessConfig};

pub trait FramePreprocessor: Send {
    fn process(&self, frame: RgbImage) -> Result<RgbImage>;
}

pub struct BasicPreprocessor {
    flip: Flip,
    alpha: f32,
    beta: f32,
}

impl BasicPreprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            flip: config.flip,
            alpha: config.alpha,
            beta: config.beta,
        }
    }

    fn is_identity(&self) -> bool {
        self.alpha == 1.0 && self.beta == 0.0
    }
}

impl FramePreprocessor for BasicPreprocessor {
    fn process(&self, mut frame: RgbImage) -> Result<RgbImage> {
        ensure!(
            self.alpha.is_finite() && self.beta.is_finite(),
            "invalid contrast/brightness ({}, {})",
            self.alpha,
            self.beta
        );

        match self.flip {
            Flip::None => {}
            Flip::Horizontal => imageops::flip_horizontal_in_place(&mut frame),
            Flip::Vertical => imageops::flip_vertical_in_place(&mut frame),
        }

        if !self.is_identity() {
            for px in frame.pixels_mut() {
                for c in px.0.iter_mut() {
                    *c = (self.alpha * *c as f32 + self.beta).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config(flip: Flip, alpha: f32, beta: f32) -> PreprocessConfig {
        PreprocessConfig { flip, alpha, beta }
    }

    #[test]
    fn test_identity_is_untouched() {
        let frame = RgbImage::from_fn(3, 1, |x, _| Rgb([x as u8 * 50, 0, 0]));
        let out = BasicPreprocessor::new(&config(Flip::None, 1.0, 0.0))
            .process(frame.clone())
            .unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_horizontal_flip() {
        let frame = RgbImage::from_fn(3, 1, |x, _| Rgb([x as u8, 0, 0]));
        let out = BasicPreprocessor::new(&config(Flip::Horizontal, 1.0, 0.0))
            .process(frame)
            .unwrap();
        assert_eq!(out.get_pixel(0, 0)[0], 2);
        assert_eq!(out.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn test_contrast_brightness_saturates() {
        let frame = RgbImage::from_pixel(1, 1, Rgb([10, 100, 200]));
        let out = BasicPreprocessor::new(&config(Flip::None, 1.5, 10.0))
            .process(frame)
            .unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([25, 160, 255]));
    }

    #[test]
    fn test_non_finite_gain_rejected() {
        let frame = RgbImage::new(1, 1);
        assert!(BasicPreprocessor::new(&config(Flip::None, f32::NAN, 0.0))
            .process(frame)
            .is_err());
    }
}
