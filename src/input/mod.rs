//! 视频输入 (Video Input)
//!
//! - FrameSource:     帧来源接口 (返回 None 表示输入结束)
//! - DirectorySource: 按文件名顺序回放图片目录, 按帧率节流
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{info, warn};

pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

pub struct DirectorySource {
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl DirectorySource {
    /// fps <= 0 时不节流
    pub fn open(dir: &Path, fps: f64, looping: bool) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("无法读取帧目录 {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        files.sort();
        if files.is_empty() {
            bail!("帧目录 {} 中没有图片", dir.display());
        }
        info!("📂 帧目录: {} ({}帧, 循环={})", dir.display(), files.len(), looping);

        Ok(Self {
            files,
            cursor: 0,
            looping,
            frame_interval: (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps)),
            last_frame: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl FrameSource for DirectorySource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = self.files[self.cursor].clone();
        self.cursor += 1;
        self.pace();

        match image::open(&path) {
            Ok(img) => Ok(Some(img.to_rgb8())),
            Err(e) => {
                warn!("⚠️ 解码失败 {}: {}", path.display(), e);
                Err(e).with_context(|| format!("failed decoding {}", path.display()))
            }
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, values: &[u8]) {
        for (i, v) in values.iter().enumerate() {
            RgbImage::from_pixel(2, 2, Rgb([*v, *v, *v]))
                .save(dir.join(format!("frame_{:03}.png", i)))
                .unwrap();
        }
    }

    #[test]
    fn test_reads_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[10, 20, 30]);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = DirectorySource::open(dir.path(), 0.0, false).unwrap();
        assert_eq!(source.len(), 3);
        let seen: Vec<u8> = std::iter::from_fn(|| source.read_frame().unwrap())
            .map(|f| f.get_pixel(0, 0)[0])
            .collect();
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn test_looping_restarts() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[1, 2]);
        let mut source = DirectorySource::open(dir.path(), 0.0, true).unwrap();
        for expected in [1, 2, 1, 2, 1] {
            let frame = source.read_frame().unwrap().unwrap();
            assert_eq!(frame.get_pixel(0, 0)[0], expected);
        }
    }

    #[test]
    fn test_corrupt_frame_is_an_error_not_the_end() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[5]);
        fs::write(dir.path().join("frame_000a.png"), b"not a png").unwrap();
        let mut source = DirectorySource::open(dir.path(), 0.0, false).unwrap();
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().is_err());
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectorySource::open(dir.path(), 15.0, false).is_err());
    }
}
