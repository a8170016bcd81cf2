//! 候选框过滤 (Candidate filter)
//!
//! 1. 只保留配置中的武器类别 (不区分大小写)
//! 2. 丢弃低于类别置信度下限的候选
//! 3. 丢弃宽或高超过画面比例的巨型框
//! 4. 取置信度最高者作为本帧样本

use crate::config::{ClassConfig, ClassRule};
use crate::detection::momentum::Sample;
use crate::detection::types::DetectionCandidate;

pub struct CandidateFilter {
    rules: Vec<ClassRule>,
    max_box_fraction: f32,
}

impl CandidateFilter {
    pub fn new(config: &ClassConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            max_box_fraction: config.max_box_fraction,
        }
    }

    fn rule_for(&self, label: &str) -> Option<&ClassRule> {
        self.rules
            .iter()
            .find(|r| r.label.eq_ignore_ascii_case(label))
    }

    /// 过滤后保留的候选
    pub fn retain(
        &self,
        candidates: &[DetectionCandidate],
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<DetectionCandidate> {
        let max_w = frame_width as f32 * self.max_box_fraction;
        let max_h = frame_height as f32 * self.max_box_fraction;
        candidates
            .iter()
            .filter(|c| match self.rule_for(&c.label) {
                Some(rule) => c.confidence >= rule.min_confidence,
                None => false,
            })
            .filter(|c| c.width < max_w && c.height < max_h)
            .cloned()
            .collect()
    }

    /// 本帧最强候选
    pub fn strongest(
        &self,
        candidates: &[DetectionCandidate],
        frame_width: u32,
        frame_height: u32,
    ) -> Option<DetectionCandidate> {
        self.retain(candidates, frame_width, frame_height)
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    /// 候选 → 动量样本
    pub fn sample(strongest: Option<&DetectionCandidate>) -> Sample {
        match strongest {
            Some(c) => Sample::new(true, c.confidence),
            None => Sample::absent(),
        }
    }
}
