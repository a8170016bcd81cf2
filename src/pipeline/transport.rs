//! 帧输出 (Transport)
//!
//! 每帧把标注后的画面与当前状态交给下游。HTTP 实现以 JPEG 上传,
//! 状态放在 `X-Sentinel-Status` 头中。

use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::debug;

use crate::alarm::Status;
use crate::config::TransportConfig;
use crate::encode_jpeg;

pub trait Transport: Send {
    fn publish(&mut self, frame: &RgbImage, status: Status) -> Result<()>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
    jpeg_quality: u8,
}

impl HttpTransport {
    pub fn new(url: String, config: &TransportConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build(),
            url,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Transport for HttpTransport {
    fn publish(&mut self, frame: &RgbImage, status: Status) -> Result<()> {
        let jpeg = encode_jpeg(frame, self.jpeg_quality).context("failed encoding frame")?;
        self.agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .set("X-Sentinel-Status", status.as_str())
            .send_bytes(&jpeg)
            .with_context(|| format!("failed publishing frame to {}", self.url))?;
        Ok(())
    }
}

/// 无下游时只记录状态
#[derive(Debug, Default)]
pub struct NullTransport {
    published: u64,
}

impl NullTransport {
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl Transport for NullTransport {
    fn publish(&mut self, frame: &RgbImage, status: Status) -> Result<()> {
        self.published += 1;
        debug!(
            "📤 帧 #{} {}x{} status={}",
            self.published,
            frame.width(),
            frame.height(),
            status
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_transport_counts_frames() {
        let mut t = NullTransport::default();
        let frame = RgbImage::new(2, 2);
        t.publish(&frame, Status::Standby).unwrap();
        t.publish(&frame, Status::Running).unwrap();
        assert_eq!(t.published(), 2);
    }

    #[test]
    fn test_http_transport_reports_unreachable_endpoint() {
        let mut t = HttpTransport::new(
            "http://127.0.0.1:9/frames".into(),
            &TransportConfig {
                timeout_ms: 200,
                ..TransportConfig::default()
            },
        );
        assert!(t.publish(&RgbImage::new(2, 2), Status::Standby).is_err());
    }
}
