//! 系统配置 - 通过YAML文件调整参数

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "边缘安防监控 - 武器检测与报警", long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/config.yml")]
    pub config: PathBuf,

    /// 回放帧目录 (按文件名排序读取)
    #[arg(short, long, default_value = "frames")]
    pub frames: PathBuf,

    /// 帧率
    #[arg(long, default_value_t = 15.0)]
    pub fps: f64,

    /// 帧目录读完后循环
    #[arg(long, default_value_t = false)]
    pub loop_frames: bool,

    /// 使用模拟传感器/执行器 (无GPIO)
    #[arg(long, default_value_t = false)]
    pub simulate: bool,

    /// 日志过滤器 (RUST_LOG 优先)
    #[arg(long, default_value = "weapon_sentinel=info,sentinel=info")]
    pub log: String,
}

// ========== 动量滤波 ==========

/// 单个动量层级
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    pub name: String,
    pub threshold: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub decay: f32,     // 衰减常数 (0,1]
    pub capacity: usize, // 每层队列容量
    pub tiers: Vec<TierConfig>,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            decay: 0.5,
            capacity: 6,
            // 阈值 = 1.75 × 类别置信度下限 (0.6 / 0.4)
            tiers: vec![
                TierConfig {
                    name: "strict".into(),
                    threshold: 1.05,
                },
                TierConfig {
                    name: "loose".into(),
                    threshold: 0.7,
                },
            ],
        }
    }
}

// ========== 候选过滤 ==========

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassRule {
    pub label: String,
    pub min_confidence: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    pub rules: Vec<ClassRule>,
    pub max_box_fraction: f32, // 超过画面该比例的框视为误检
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                ClassRule {
                    label: "gun".into(),
                    min_confidence: 0.6,
                },
                ClassRule {
                    label: "knife".into(),
                    min_confidence: 0.4,
                },
            ],
            max_box_fraction: 0.7,
        }
    }
}

// ========== 背景学习 ==========

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub learning_secs: f64,
    pub relearn_secs: f64,
    pub learning_rate: f32,
    pub diff_threshold: u8,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            learning_secs: 30.0,
            relearn_secs: 300.0,
            learning_rate: 0.05,
            diff_threshold: 30,
        }
    }
}

impl BackgroundConfig {
    pub fn learning(&self) -> Duration {
        Duration::from_secs_f64(self.learning_secs)
    }

    pub fn relearn(&self) -> Duration {
        Duration::from_secs_f64(self.relearn_secs)
    }
}

// ========== 状态计时器 ==========

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub running_secs: f64, // running → standby
    pub sent_secs: f64,    // sent → alarm
    pub alarm_secs: f64,   // alarm → standby
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            running_secs: 12.0,
            sent_secs: 15.0,
            alarm_secs: 60.0,
        }
    }
}

impl TimerConfig {
    pub fn running(&self) -> Duration {
        Duration::from_secs_f64(self.running_secs)
    }

    pub fn sent(&self) -> Duration {
        Duration::from_secs_f64(self.sent_secs)
    }

    pub fn alarm(&self) -> Duration {
        Duration::from_secs_f64(self.alarm_secs)
    }
}

// ========== 硬件 ==========

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub input_pin: u32,       // PIR 传感器
    pub relay_pin: u32,       // 警笛继电器
    pub led_pins: [u32; 3],   // RGB 指示灯
    pub relay_active_low: bool,
    pub gpio_root: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            input_pin: 17,
            relay_pin: 27,
            led_pins: [22, 23, 24],
            relay_active_low: true,
            gpio_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

// ========== 网络协作方 ==========

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub probe_interval_secs: f64,
    pub jpeg_quality: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9001/detect".into(),
            timeout_ms: 2000,
            max_attempts: 3,
            backoff_ms: 100,
            probe_interval_secs: 5.0,
            jpeg_quality: 85,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub url: Option<String>,      // 报警推送
    pub node_url: Option<String>, // 节点在线状态
    pub timeout_ms: u64,
    pub queue: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            node_url: None,
            timeout_ms: 3000,
            queue: 16,
        }
    }
}

/// 节点身份 (原样透传到报警事件)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeIdentity {
    pub node_id: String,
    pub name: String,
    pub location: String,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            node_id: "0".into(),
            name: "sentinel".into(),
            location: "unknown".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub frame_url: Option<String>,
    pub timeout_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            frame_url: None,
            timeout_ms: 1000,
            jpeg_quality: 80,
        }
    }
}

// ========== 录像/预处理/界面 ==========

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub dir: PathBuf,
    pub interval_ms: u64,
    pub snapshot_dir: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("videos"),
            interval_ms: 50,
            snapshot_dir: PathBuf::from("images"),
            jpeg_quality: 80,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub flip: Flip,
    pub alpha: f32, // 对比度
    pub beta: f32,  // 亮度
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            flip: Flip::None,
            alpha: 1.0,
            beta: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub font: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub password: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            password: "0000".into(),
        }
    }
}

// ========== 总配置 ==========

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub momentum: MomentumConfig,
    pub classes: ClassConfig,
    pub background: BackgroundConfig,
    pub timers: TimerConfig,
    pub hardware: HardwareConfig,
    pub detector: DetectorConfig,
    pub notifier: NotifierConfig,
    pub node: NodeIdentity,
    pub transport: TransportConfig,
    pub recording: RecordingConfig,
    pub preprocessing: PreprocessConfig,
    pub overlay: OverlayConfig,
    pub control: ControlConfig,
}

impl SentinelConfig {
    /// 从YAML文件加载配置, 文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("📝 配置文件 {} 不存在,使用默认值", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config file {}", path.display()))?;
        let config = Self::from_yaml(&raw)
            .with_context(|| format!("failed parsing config file {}", path.display()))?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(
            "🎛️ 动量: decay={:.2} capacity={} tiers={:?}",
            self.momentum.decay,
            self.momentum.capacity,
            self.momentum
                .tiers
                .iter()
                .map(|t| format!("{}:{:.2}", t.name, t.threshold))
                .collect::<Vec<_>>()
        );
        info!(
            "⏱️ 计时器: running={}s sent={}s alarm={}s | 背景学习={}s 重学={}s",
            self.timers.running_secs,
            self.timers.sent_secs,
            self.timers.alarm_secs,
            self.background.learning_secs,
            self.background.relearn_secs
        );
        info!(
            "📍 节点: {} ({} - {})",
            self.node.node_id, self.node.name, self.node.location
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SentinelConfig::default();
        assert_eq!(config.momentum.tiers.len(), 2);
        assert_eq!(config.momentum.capacity, 6);
        assert_eq!(config.timers.running(), Duration::from_secs(12));
        assert_eq!(config.timers.sent(), Duration::from_secs(15));
        assert_eq!(config.timers.alarm(), Duration::from_secs(60));
        assert_eq!(config.background.relearn(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "
timers:
  sent_secs: 5
node:
  node_id: '42'
  location: lobby
preprocessing:
  flip: vertical
";
        let config = SentinelConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.timers.sent(), Duration::from_secs(5));
        assert_eq!(config.timers.running(), Duration::from_secs(12));
        assert_eq!(config.node.node_id, "42");
        assert_eq!(config.node.name, "sentinel");
        assert_eq!(config.preprocessing.flip, Flip::Vertical);
        assert_eq!(config.classes.rules[0].label, "gun");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = SentinelConfig::from_yaml(include_str!("../config/config.yml")).unwrap();
        assert_eq!(config.momentum.tiers[0].name, "strict");
        assert_eq!(config.hardware.led_pins, [22, 23, 24]);
        assert!(config.notifier.url.is_none());
        assert!(config.overlay.font.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SentinelConfig::load(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.control.password, "0000");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "timers: [not, a, map]").unwrap();
        assert!(SentinelConfig::load(&path).is_err());
    }
}
