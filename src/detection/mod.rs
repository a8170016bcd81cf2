/// 检测确认系统 (Detection Confirmation)
///
/// 把逐帧嘈杂的检测输出变成去抖后的 "确认" 信号
/// - Detector:        检测器接口 (远程HTTP推理 + 重试熔断)
/// - CandidateFilter: 候选框过滤 (巨型框/类别置信度下限)
/// - MomentumFilter:  多层级动量确认
pub mod detector;
pub mod filter;
pub mod momentum;
pub mod types;

pub use detector::{Detector, RemoteDetector, ResilientDetector};
pub use filter::CandidateFilter;
pub use momentum::{MomentumFilter, Sample};
pub use types::DetectionCandidate;
