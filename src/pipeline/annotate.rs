//! 帧标注: 检测框 + 状态色块 + 提示文字
//!
//! 未配置字体时只画框和色块, 不画文字。

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::info;

use crate::alarm::Status;
use crate::detection::DetectionCandidate;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BADGE_SIZE: u32 = 12;

pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            scale: PxScale::from(18.0),
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed reading font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        info!("🔤 字体已加载: {}", path.display());
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 检测框 "{class}: {confidence:.2}"
    pub fn draw_detections(&self, frame: &mut RgbImage, candidates: &[DetectionCandidate]) {
        for c in candidates {
            let (w, h) = (c.width.round() as u32, c.height.round() as u32);
            if w == 0 || h == 0 {
                continue;
            }
            let x = c.xmin().round() as i32;
            let y = c.ymin().round() as i32;
            draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(w, h), BOX_COLOR);
            self.text(
                frame,
                x,
                (y - self.scale.y as i32).max(0),
                &format!("{}: {:.2}", c.label, c.confidence),
            );
        }
    }

    /// 左上角状态色块 (颜色与指示灯一致) + 状态名
    pub fn draw_status(&self, frame: &mut RgbImage, status: Status) {
        let a = status.actuation();
        let color = Rgb([
            if a.red { 255 } else { 0 },
            if a.green { 255 } else { 0 },
            if a.blue { 255 } else { 0 },
        ]);
        let size = BADGE_SIZE.min(frame.width()).min(frame.height());
        if size > 0 {
            draw_filled_rect_mut(frame, Rect::at(0, 0).of_size(size, size), color);
        }
        self.text(frame, size as i32 + 4, 0, status.as_str());
    }

    /// 底部提示文字
    pub fn draw_overlay(&self, frame: &mut RgbImage, message: &str) {
        let y = frame.height() as i32 - self.scale.y as i32 - 4;
        self.text(frame, 4, y.max(0), message);
    }

    fn text(&self, frame: &mut RgbImage, x: i32, y: i32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(frame, TEXT_COLOR, x, y, self.scale, font, text);
        }
    }
}
