//! 背景模型 (Background model)
//!
//! 学习阶段对每个像素做指数滑动平均, 结束时固化为静态参考帧。

use image::{Rgb, RgbImage};
use imageproc::map::map_colors2;

use crate::error::GateError;

pub struct BackgroundModel {
    width: u32,
    height: u32,
    accumulator: Vec<f32>, // RGB 交错
    frames: u32,
    learning_rate: f32,
}

impl BackgroundModel {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            width: 0,
            height: 0,
            accumulator: Vec::new(),
            frames: 0,
            learning_rate: learning_rate.clamp(0.0, 1.0),
        }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// 累加一帧
    pub fn learn(&mut self, frame: &RgbImage) -> Result<(), GateError> {
        if self.frames == 0 {
            self.width = frame.width();
            self.height = frame.height();
            self.accumulator = frame.as_raw().iter().map(|&v| v as f32).collect();
            self.frames = 1;
            return Ok(());
        }

        if frame.dimensions() != (self.width, self.height) {
            return Err(GateError::DimensionMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }

        let a = self.learning_rate;
        for (acc, &v) in self.accumulator.iter_mut().zip(frame.as_raw()) {
            *acc = (1.0 - a) * *acc + a * v as f32;
        }
        self.frames += 1;
        Ok(())
    }

    /// 固化为静态参考帧
    pub fn finalize(&self) -> Result<RgbImage, GateError> {
        if self.frames == 0 {
            return Err(GateError::NotLearned);
        }
        let raw = self
            .accumulator
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(self.width, self.height, raw).ok_or(GateError::NotLearned)
    }
}

/// 减去静态背景: 与参考帧各通道差值都不超过阈值的像素置黑
pub fn subtract(frame: &RgbImage, reference: &RgbImage, threshold: u8) -> Result<RgbImage, GateError> {
    if frame.dimensions() != reference.dimensions() {
        return Err(GateError::DimensionMismatch {
            expected: reference.dimensions(),
            actual: frame.dimensions(),
        });
    }

    Ok(map_colors2(frame, reference, |p: Rgb<u8>, q: Rgb<u8>| {
        let diff = p
            .0
            .iter()
            .zip(q.0.iter())
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0);
        if diff > threshold {
            p
        } else {
            Rgb([0, 0, 0])
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn test_first_frame_seeds_accumulator() {
        let mut model = BackgroundModel::new(0.5);
        model.learn(&solid(2, 2, 100)).unwrap();
        model.learn(&solid(2, 2, 200)).unwrap();
        assert_eq!(model.frames(), 2);
        let bg = model.finalize().unwrap();
        assert_eq!(bg.get_pixel(0, 0), &Rgb([150, 150, 150]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut model = BackgroundModel::new(0.1);
        model.learn(&solid(2, 2, 0)).unwrap();
        assert!(matches!(
            model.learn(&solid(3, 2, 0)),
            Err(GateError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_finalize_without_frames() {
        assert!(matches!(
            BackgroundModel::new(0.1).finalize(),
            Err(GateError::NotLearned)
        ));
    }

    #[test]
    fn test_subtract_keeps_foreground_only() {
        let reference = solid(2, 1, 50);
        let mut frame = solid(2, 1, 60);
        frame.put_pixel(1, 0, Rgb([50, 200, 50]));
        let out = subtract(&frame, &reference, 30).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([50, 200, 50]));

        assert!(subtract(&solid(1, 1, 0), &reference, 30).is_err());
    }
}
