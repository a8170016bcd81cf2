//! 逐帧编排 (DetectionOrchestrator)
//!
//! 门控 → 状态机 tick → (仅 running) 检测 → 过滤 → 动量确认 → 强制 sent → 标注。
//! 单帧内的任何检测/门控失败只记录日志, 帧照常输出。

use std::sync::Arc;

use image::RgbImage;
use tracing::{info, warn};

use crate::alarm::{AlarmStateMachine, Status, Transition};
use crate::clock::Clock;
use crate::config::SentinelConfig;
use crate::detection::{CandidateFilter, DetectionCandidate, Detector, MomentumFilter};
use crate::gate::{BackgroundGate, GateEvent};
use crate::io::SensorIO;
use crate::pipeline::annotate::Annotator;

/// 单帧处理结果
#[derive(Debug)]
pub struct FrameDecision {
    pub status: Status,
    /// 标注后的画面 (检测失败时未标注)
    pub frame: RgbImage,
    pub motion: bool,
    pub ran_detection: bool,
    pub detections: Vec<DetectionCandidate>,
    pub overlay: Option<String>,
    /// 本帧确认触发的迁移
    pub confirmation: Option<Transition>,
}

pub struct DetectionOrchestrator {
    state: Arc<AlarmStateMachine>,
    sensor: Arc<dyn SensorIO>,
    detector: Box<dyn Detector>,
    clock: Arc<dyn Clock>,
    gate: BackgroundGate,
    filter: CandidateFilter,
    momentum: MomentumFilter,
    annotator: Annotator,
}

impl DetectionOrchestrator {
    pub fn new(
        config: &SentinelConfig,
        state: Arc<AlarmStateMachine>,
        sensor: Arc<dyn SensorIO>,
        detector: Box<dyn Detector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            state,
            sensor,
            detector,
            gate: BackgroundGate::new(&config.background, now),
            filter: CandidateFilter::new(&config.classes),
            momentum: MomentumFilter::new(&config.momentum),
            annotator: Annotator::new(),
            clock,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn state(&self) -> &Arc<AlarmStateMachine> {
        &self.state
    }

    pub fn gate(&self) -> &BackgroundGate {
        &self.gate
    }

    pub fn momentum(&self) -> &MomentumFilter {
        &self.momentum
    }

    /// 开机: 进入背景学习
    pub fn start(&mut self) {
        let now = self.clock.now();
        self.gate.start_learning(now);
        self.state.begin_learning(now);
    }

    pub fn process_frame(&mut self, frame: &RgbImage) -> FrameDecision {
        let now = self.clock.now();
        let motion = self.sensor.read_motion();

        // 外部强制进入 learning 时, 门控同步重新学习
        if self.state.current_status() == Status::Learning && !self.gate.is_learning() {
            info!("📚 状态为 learning, 门控重新开始背景学习");
            self.gate.start_learning(now);
        }

        // 学习期间有人进入画面, 本次学习作废
        if motion && self.gate.on_external_motion(now) {
            self.state.end_learning(now);
        }

        let relearn_allowed = self.state.current_status() == Status::Standby;
        let gated = self.gate.update(frame, now, relearn_allowed);
        match gated.event {
            Some(GateEvent::LearningStarted) => {
                self.state.begin_learning(now);
            }
            Some(GateEvent::Finalized) => {
                self.state.end_learning(now);
            }
            None => {}
        }

        let hint = self.state.tick(motion, now);

        let mut detections = Vec::new();
        let mut confirmation = None;
        let ran_detection = gated.run_detection && hint;
        if ran_detection {
            match self.detector.infer(&gated.frame) {
                Ok(candidates) => {
                    let (w, h) = gated.frame.dimensions();
                    detections = self.filter.retain(&candidates, w, h);
                    confirmation = self.confirm(&detections, w, h);
                }
                Err(e) => warn!("⚠️ 检测失败, 本帧不标注: {}", e),
            }
        }

        let status = self.state.current_status();
        let overlay = gated.overlay.or_else(|| {
            self.state
                .alarm_countdown(now)
                .map(|n| format!("Alarm will sound in {} seconds", n))
        });

        let mut out = frame.clone();
        self.annotator.draw_detections(&mut out, &detections);
        self.annotator.draw_status(&mut out, status);
        if let Some(message) = &overlay {
            self.annotator.draw_overlay(&mut out, message);
        }

        FrameDecision {
            status,
            frame: out,
            motion,
            ran_detection,
            detections,
            overlay,
            confirmation,
        }
    }

    /// 最强候选 → 动量样本; 任一层级确认则强制 sent
    fn confirm(&mut self, detections: &[DetectionCandidate], w: u32, h: u32) -> Option<Transition> {
        let strongest = self.filter.strongest(detections, w, h);
        let tier = self
            .momentum
            .observe(CandidateFilter::sample(strongest.as_ref()))?;

        let name = self.momentum.tiers()[tier].name().to_string();
        let context = strongest.map(|c| self.state.alert_context(&c.label));
        info!(
            "🚨 动量确认 (tier={}): {}",
            name,
            context.as_ref().map_or("unknown", |c| c.weapon.as_str())
        );
        Some(
            self.state
                .force_status(Status::Sent, context, self.clock.now()),
        )
    }
}
