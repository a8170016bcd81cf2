// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 帧 → 候选列表。远程推理有超时, 失败按指数退避重试, 超过次数后熔断。

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::DetectorConfig;
use crate::detection::types::{DetectionCandidate, InferenceResponse};
use crate::error::DetectorError;

/// 检测器统一接口
pub trait Detector: Send {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError> {
        (**self).infer(frame)
    }
}

// ========== 远程HTTP推理 ==========

/// 远程推理: POST JPEG → `{"predictions": [...]}`
pub struct RemoteDetector {
    agent: ureq::Agent,
    url: String,
    jpeg_quality: u8,
}

impl RemoteDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            agent,
            url: config.url.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Detector for RemoteDetector {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError> {
        let body = crate::encode_jpeg(frame, self.jpeg_quality)
            .map_err(|e| DetectorError::Malformed(format!("jpeg encode: {}", e)))?;

        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(&body)
            .map_err(|e| DetectorError::Unavailable(e.to_string()))?;

        let text = response
            .into_string()
            .map_err(|e| DetectorError::Unavailable(e.to_string()))?;

        parse_predictions(&text)
    }
}

pub(crate) fn parse_predictions(text: &str) -> Result<Vec<DetectionCandidate>, DetectorError> {
    serde_json::from_str::<InferenceResponse>(text)
        .map(|r| r.predictions)
        .map_err(|e| DetectorError::Malformed(e.to_string()))
}

// ========== 重试与熔断 ==========

/// 带重试/熔断的检测器包装
///
/// 连续 `max_attempts` 次失败后标记为不可用; 不可用期间每个 `probe_interval`
/// 最多探测一次, 探测成功即恢复。解析失败不重试。
pub struct ResilientDetector<D> {
    inner: D,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    backoff: Duration,
    probe_interval: Duration,
    unavailable_since: Option<Instant>,
    last_probe: Option<Instant>,
}

impl<D: Detector> ResilientDetector<D> {
    pub fn new(inner: D, config: &DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            clock,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            probe_interval: Duration::from_secs_f64(config.probe_interval_secs),
            unavailable_since: None,
            last_probe: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_since.is_none()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn probe(&mut self, frame: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError> {
        let now = self.clock.now();
        if let Some(last) = self.last_probe {
            if now.saturating_duration_since(last) < self.probe_interval {
                return Err(DetectorError::Unavailable("circuit open".into()));
            }
        }
        self.last_probe = Some(now);

        let result = self.inner.infer(frame);
        if result.is_ok() {
            let down_for = self
                .unavailable_since
                .map(|t| now.saturating_duration_since(t).as_secs_f64())
                .unwrap_or_default();
            info!("✅ 检测器恢复 (离线 {:.1}s)", down_for);
            self.unavailable_since = None;
            self.last_probe = None;
        }
        result
    }
}

impl<D: Detector> Detector for ResilientDetector<D> {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError> {
        if self.unavailable_since.is_some() {
            return self.probe(frame);
        }

        let mut delay = self.backoff;
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.inner.infer(frame) {
                Ok(candidates) => return Ok(candidates),
                Err(DetectorError::Malformed(msg)) => return Err(DetectorError::Malformed(msg)),
                Err(DetectorError::Unavailable(msg)) => {
                    warn!(
                        "⚠️ 检测请求失败 ({}/{}): {}",
                        attempt, self.max_attempts, msg
                    );
                    last_error = msg;
                    if attempt < self.max_attempts && !delay.is_zero() {
                        std::thread::sleep(delay);
                        delay *= 2;
                    }
                }
            }
        }

        let now = self.clock.now();
        self.unavailable_since = Some(now);
        self.last_probe = Some(now);
        error!(
            "❌ 检测器不可用 (重试{}次): {}",
            self.max_attempts, last_error
        );
        Err(DetectorError::Unavailable(last_error))
    }
}
