/// 逐帧处理流水线 (Frame Pipeline)
///
/// 单线程帧循环, 控制请求在另一线程并发修改状态机:
/// - FramePreprocessor:     翻转 + 对比度/亮度
/// - DetectionOrchestrator: 门控/检测/确认/状态推进
/// - Annotator:             检测框 + 状态 + 提示文字
/// - Transport:             帧与状态输出
/// - Recorder:              录像 / 截图
pub mod annotate;
pub mod orchestrator;
pub mod preprocess;
pub mod recorder;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

pub use annotate::Annotator;
pub use orchestrator::{DetectionOrchestrator, FrameDecision};
pub use preprocess::{BasicPreprocessor, FramePreprocessor};
pub use recorder::Recorder;
pub use transport::{HttpTransport, NullTransport, Transport};

use crate::alarm::AlarmStateMachine;
use crate::clock::Clock;
use crate::input::FrameSource;

// ========== 帧循环 ==========

/// 帧循环统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub read_errors: u64,
    pub publish_errors: u64,
}

pub struct FrameLoop {
    source: Box<dyn FrameSource>,
    preprocessor: Box<dyn FramePreprocessor>,
    orchestrator: DetectionOrchestrator,
    transport: Box<dyn Transport>,
    recorder: Arc<Recorder>,
    stop: Arc<AtomicBool>,
}

impl FrameLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        preprocessor: Box<dyn FramePreprocessor>,
        orchestrator: DetectionOrchestrator,
        transport: Box<dyn Transport>,
        recorder: Arc<Recorder>,
    ) -> Self {
        Self {
            source,
            preprocessor,
            orchestrator,
            transport,
            recorder,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 其他线程置位后, 循环在下一帧前退出
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// 运行到输入结束或收到停止信号
    ///
    /// 读帧失败跳过该帧, 不改变状态; 预处理失败使用原始帧。
    pub fn run(&mut self) -> Result<LoopStats> {
        let mut stats = LoopStats::default();
        self.orchestrator.start();
        info!("🎬 帧循环启动");

        while !self.stop.load(Ordering::SeqCst) {
            let raw = match self.source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("📭 输入结束");
                    break;
                }
                Err(e) => {
                    stats.read_errors += 1;
                    warn!("⚠️ 读帧失败, 跳过: {:#}", e);
                    continue;
                }
            };

            let frame = match self.preprocessor.process(raw.clone()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("⚠️ 预处理失败, 使用原始帧: {:#}", e);
                    raw
                }
            };

            let decision = self.orchestrator.process_frame(&frame);
            if let Err(e) = self.transport.publish(&decision.frame, decision.status) {
                stats.publish_errors += 1;
                warn!("⚠️ 帧输出失败: {:#}", e);
            }
            self.recorder.submit(&decision.frame);
            stats.frames += 1;
        }

        info!(
            "🏁 帧循环结束: {}帧, 读帧失败{}次, 输出失败{}次",
            stats.frames, stats.read_errors, stats.publish_errors
        );
        Ok(stats)
    }
}

// ========== 关机 ==========

/// 离开作用域时 (正常退出 / 错误返回 / panic 展开) 停止录像并进入 off
pub struct ShutdownGuard {
    state: Arc<AlarmStateMachine>,
    recorder: Option<Arc<Recorder>>,
    clock: Arc<dyn Clock>,
}

impl ShutdownGuard {
    pub fn new(state: Arc<AlarmStateMachine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state,
            recorder: None,
            clock,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(recorder) = &self.recorder {
            recorder.stop();
        }
        self.state.shutdown(self.clock.now());
        info!("🔌 已关机: 指示灯与继电器已复位");
    }
}
