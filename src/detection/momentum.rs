//! 动量滤波 (Momentum filter)
//!
//! 每个层级维护一个定长队列 `(present, confidence)`, 计算按时间衰减的加权和:
//! 最新样本权重 `decay^0`, 前一个 `decay^1`, 依此类推。
//! 任一层级加权和达到阈值即确认, 确认后清空所有层级队列。

use std::collections::VecDeque;

use tracing::debug;

use crate::config::MomentumConfig;

/// 单帧样本
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub present: bool,
    pub confidence: f32,
}

impl Sample {
    pub fn new(present: bool, confidence: f32) -> Self {
        // NaN 视为 0
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            present,
            confidence,
        }
    }

    pub fn absent() -> Self {
        Self::new(false, 0.0)
    }
}

/// 一个 (阈值, 队列) 层级
#[derive(Clone, Debug)]
pub struct MomentumTier {
    name: String,
    threshold: f32,
    queue: VecDeque<Sample>,
}

impl MomentumTier {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct MomentumFilter {
    decay: f32,
    capacity: usize,
    tiers: Vec<MomentumTier>,
}

impl MomentumFilter {
    pub fn new(config: &MomentumConfig) -> Self {
        let capacity = config.capacity.max(1);
        let tiers = config
            .tiers
            .iter()
            .map(|t| MomentumTier {
                name: t.name.clone(),
                threshold: t.threshold,
                queue: VecDeque::with_capacity(capacity),
            })
            .collect();
        Self {
            decay: config.decay,
            capacity,
            tiers,
        }
    }

    pub fn tiers(&self) -> &[MomentumTier] {
        &self.tiers
    }

    /// 当前层级动量
    pub fn momentum(&self, tier: usize) -> f32 {
        self.tiers
            .get(tier)
            .map(|t| weighted_sum(&t.queue, self.decay))
            .unwrap_or(0.0)
    }

    /// 向单个层级追加样本并判断是否确认
    ///
    /// 确认时所有层级队列被清空。不存在的层级返回 false。
    pub fn confirm(&mut self, tier: usize, sample: Sample) -> bool {
        let capacity = self.capacity;
        let decay = self.decay;
        let Some(t) = self.tiers.get_mut(tier) else {
            return false;
        };

        t.queue.push_back(sample);
        while t.queue.len() > capacity {
            t.queue.pop_front();
        }

        let momentum = weighted_sum(&t.queue, decay);
        debug!(
            tier = %t.name,
            momentum,
            threshold = t.threshold,
            "momentum updated"
        );

        if momentum >= t.threshold {
            self.reset();
            true
        } else {
            false
        }
    }

    /// 依次送入每个层级, 返回第一个确认的层级索引
    ///
    /// 一旦某层级确认, 后续层级不再接收本帧样本 (队列已被清空)。
    pub fn observe(&mut self, sample: Sample) -> Option<usize> {
        (0..self.tiers.len()).find(|&tier| self.confirm(tier, sample))
    }

    /// 清空所有层级
    pub fn reset(&mut self) {
        for tier in &mut self.tiers {
            tier.queue.clear();
        }
    }
}

/// 按时间衰减的置信度加权和 (队列从旧到新)
pub fn weighted_sum<'a, I>(queue: I, decay: f32) -> f32
where
    I: IntoIterator<Item = &'a Sample>,
    I::IntoIter: DoubleEndedIterator,
{
    queue
        .into_iter()
        .rev()
        .enumerate()
        .filter(|(_, s)| s.present)
        .map(|(age, s)| s.confidence * decay.powi(age as i32))
        .sum()
}
