// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alarm; // 报警状态机与通知
pub mod clock; // 时间源
pub mod config; // 配置参数
pub mod control; // 控制接口 (状态/密码/录像)
pub mod detection; // 检测确认 (动量滤波)
pub mod error; // 错误类型
pub mod gate; // 背景学习门控
pub mod input; // 视频输入
pub mod io; // 传感器与执行器
pub mod pipeline; // 逐帧编排与输出

pub use crate::alarm::{AlarmEvent, AlarmStateMachine, AlertContext, Notifier, Status, Transition};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{Args, SentinelConfig};
pub use crate::control::{ControlApi, ControlRequest, ControlResponse};
pub use crate::detection::{DetectionCandidate, Detector, MomentumFilter};
pub use crate::gate::BackgroundGate;
pub use crate::pipeline::DetectionOrchestrator;

/// 生成时间字符串 (用于录像/截图文件名)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// RGB帧 → JPEG字节
pub fn encode_jpeg(frame: &image::RgbImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality).encode_image(frame)?;
    Ok(buf)
}

/// 首字母大写 ("gun" → "Gun")
pub fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
