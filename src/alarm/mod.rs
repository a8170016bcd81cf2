/// 报警生命周期 (Alarm lifecycle)
///
/// - Status:            状态与执行器映射
/// - AlarmStateMachine: 唯一的状态寄存器, 计时迁移 + 进入副作用
/// - Notifier:          报警事件推送
pub mod machine;
pub mod notifier;
pub mod status;

pub use machine::{AlarmEvent, AlarmStateMachine, AlertContext, StatusSnapshot, Transition};
pub use notifier::{HttpNotifier, LogNotifier, Notifier, QueuedNotifier};
pub use status::{Actuation, Status};
