/// 背景门控 (Background gate)
///
/// 决定当前帧是否值得运行检测, 并管理背景学习阶段:
/// - Idle:     未学习 (或学习被运动打断)
/// - Learning: 累积参考帧, 此期间不检测
/// - Aging:    背景已固化, 等待周期性重新学习
pub mod background;

use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{info, warn};

pub use background::BackgroundModel;

use crate::config::BackgroundConfig;

/// 对外可见的门控阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Learning,
    Aging,
}

/// 本帧内发生的阶段变化
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateEvent {
    LearningStarted,
    Finalized,
}

enum Phase {
    Idle { since: Instant },
    Learning { deadline: Instant, model: BackgroundModel },
    Aging { since: Instant },
}

/// 门控输出
pub struct GateOutput {
    pub frame: RgbImage,
    pub run_detection: bool,
    pub overlay: Option<String>,
    pub event: Option<GateEvent>,
}

pub struct BackgroundGate {
    learning: Duration,
    relearn: Duration,
    learning_rate: f32,
    diff_threshold: u8,
    phase: Phase,
    reference: Option<RgbImage>,
}

impl BackgroundGate {
    pub fn new(config: &BackgroundConfig, now: Instant) -> Self {
        Self {
            learning: config.learning(),
            relearn: config.relearn(),
            learning_rate: config.learning_rate,
            diff_threshold: config.diff_threshold,
            phase: Phase::Idle { since: now },
            reference: None,
        }
    }

    pub fn phase(&self) -> GatePhase {
        match self.phase {
            Phase::Idle { .. } => GatePhase::Idle,
            Phase::Learning { .. } => GatePhase::Learning,
            Phase::Aging { .. } => GatePhase::Aging,
        }
    }

    pub fn is_learning(&self) -> bool {
        matches!(self.phase, Phase::Learning { .. })
    }

    /// 已固化的参考帧
    pub fn reference(&self) -> Option<&RgbImage> {
        self.reference.as_ref()
    }

    /// 开始学习 (新的累加器与截止时间)
    pub fn start_learning(&mut self, now: Instant) {
        info!("🧠 开始学习背景 ({:.0}s)", self.learning.as_secs_f64());
        self.phase = Phase::Learning {
            deadline: now + self.learning,
            model: BackgroundModel::new(self.learning_rate),
        };
    }

    /// 外部运动信号: 学习中则立即放弃本次学习, 返回是否打断
    pub fn on_external_motion(&mut self, now: Instant) -> bool {
        if let Phase::Learning { model, .. } = &self.phase {
            warn!(
                "⚠️ 学习背景时检测到运动, 放弃本次学习 (已累积{}帧)",
                model.frames()
            );
            self.phase = Phase::Idle { since: now };
            true
        } else {
            false
        }
    }

    /// 处理一帧
    ///
    /// `relearn_allowed` 为真时 (报警状态空闲), 超过重学间隔会重新进入学习。
    pub fn update(&mut self, frame: &RgbImage, now: Instant, relearn_allowed: bool) -> GateOutput {
        let mut event = None;

        if relearn_allowed {
            if let Phase::Idle { since } | Phase::Aging { since } = self.phase {
                if now.saturating_duration_since(since) > self.relearn {
                    self.start_learning(now);
                    event = Some(GateEvent::LearningStarted);
                }
            }
        }

        let finished = match &mut self.phase {
            Phase::Learning { deadline, model } if now >= *deadline => Some(model.finalize()),
            Phase::Learning { deadline, model } => {
                if let Err(e) = model.learn(frame) {
                    warn!("⚠️ 背景累积失败, 跳过该帧: {}", e);
                }
                let remaining = deadline.saturating_duration_since(now).as_secs();
                return GateOutput {
                    frame: frame.clone(),
                    run_detection: false,
                    overlay: Some(format!("Please be out of the frame for {}s", remaining)),
                    event,
                };
            }
            _ => None,
        };

        if let Some(result) = finished {
            match result {
                Ok(reference) => {
                    info!("✅ 背景学习完成");
                    self.reference = Some(reference);
                }
                Err(e) => warn!("⚠️ 背景固化失败: {}", e),
            }
            self.phase = Phase::Aging { since: now };
            event = Some(GateEvent::Finalized);
        }

        GateOutput {
            frame: self.gated(frame),
            run_detection: true,
            overlay: None,
            event,
        }
    }

    /// 有参考帧时去除背景, 失败时原样返回
    fn gated(&self, frame: &RgbImage) -> RgbImage {
        match &self.reference {
            Some(reference) => background::subtract(frame, reference, self.diff_threshold)
                .unwrap_or_else(|e| {
                    warn!("⚠️ 背景去除失败, 使用原始帧: {}", e);
                    frame.clone()
                }),
            None => frame.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config() -> BackgroundConfig {
        BackgroundConfig {
            learning_secs: 10.0,
            relearn_secs: 300.0,
            learning_rate: 0.5,
            diff_threshold: 20,
        }
    }

    fn solid(v: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([v, v, v]))
    }

    #[test]
    fn test_learning_blocks_detection_and_reports_countdown() {
        let t0 = Instant::now();
        let mut gate = BackgroundGate::new(&config(), t0);
        gate.start_learning(t0);

        let out = gate.update(&solid(10), t0 + Duration::from_millis(2500), true);
        assert!(!out.run_detection);
        assert_eq!(out.overlay.as_deref(), Some("Please be out of the frame for 7s"));
        assert_eq!(out.event, None);
        assert!(gate.reference().is_none());
    }

    #[test]
    fn test_finalizes_at_deadline() {
        let t0 = Instant::now();
        let mut gate = BackgroundGate::new(&config(), t0);
        gate.start_learning(t0);
        gate.update(&solid(10), t0 + Duration::from_secs(1), true);

        let out = gate.update(&solid(10), t0 + Duration::from_secs(10), true);
        assert_eq!(out.event, Some(GateEvent::Finalized));
        assert!(out.run_detection);
        assert!(out.overlay.is_none());
        assert_eq!(gate.phase(), GatePhase::Aging);
        // 与背景相同 → 全黑
        assert_eq!(out.frame.get_pixel(0, 0), &Rgb([0, 0, 0]));

        let out = gate.update(&solid(200), t0 + Duration::from_secs(11), true);
        assert_eq!(out.frame.get_pixel(0, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_motion_aborts_learning_and_restart_gets_fresh_deadline() {
        let t0 = Instant::now();
        let mut gate = BackgroundGate::new(&config(), t0);
        gate.start_learning(t0);
        gate.update(&solid(10), t0 + Duration::from_secs(1), true);

        assert!(gate.on_external_motion(t0 + Duration::from_secs(9)));
        assert_eq!(gate.phase(), GatePhase::Idle);
        assert!(gate.reference().is_none());
        assert!(!gate.on_external_motion(t0 + Duration::from_secs(9)));

        // 放弃后不学习, 原样放行
        let out = gate.update(&solid(10), t0 + Duration::from_secs(10), true);
        assert!(out.run_detection);
        assert_eq!(out.event, None);
        assert_eq!(out.frame.get_pixel(0, 0), &Rgb([10, 10, 10]));

        let t1 = t0 + Duration::from_secs(20);
        gate.start_learning(t1);
        let out = gate.update(&solid(10), t1 + Duration::from_secs(9), true);
        assert!(!out.run_detection);
        assert_eq!(out.overlay.as_deref(), Some("Please be out of the frame for 1s"));
    }

    #[test]
    fn test_periodic_relearn_only_when_allowed() {
        let t0 = Instant::now();
        let mut gate = BackgroundGate::new(&config(), t0);
        gate.start_learning(t0);
        gate.update(&solid(10), t0 + Duration::from_secs(10), true);

        let late = t0 + Duration::from_secs(400);
        let out = gate.update(&solid(10), late, false);
        assert_eq!(out.event, None);
        assert_eq!(gate.phase(), GatePhase::Aging);

        let out = gate.update(&solid(10), late, true);
        assert_eq!(out.event, Some(GateEvent::LearningStarted));
        assert!(!out.run_detection);
        assert!(gate.is_learning());
    }

    #[test]
    fn test_mismatched_frame_passes_through() {
        let t0 = Instant::now();
        let mut gate = BackgroundGate::new(&config(), t0);
        gate.start_learning(t0);
        gate.update(&solid(10), t0 + Duration::from_secs(1), true);
        gate.update(&solid(10), t0 + Duration::from_secs(10), true);

        let odd = RgbImage::from_pixel(2, 2, Rgb([10, 10, 10]));
        let out = gate.update(&odd, t0 + Duration::from_secs(11), true);
        assert!(out.run_detection);
        assert_eq!(out.frame.dimensions(), (2, 2));
        assert_eq!(out.frame.get_pixel(0, 0), &Rgb([10, 10, 10]));
    }
}
