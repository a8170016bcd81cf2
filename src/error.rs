//! 错误类型 (Error types)
//!
//! 调用方需要分支处理的错误使用枚举; 其余管线代码使用 anyhow。

use thiserror::Error;

/// 检测器错误
#[derive(Debug, Error)]
pub enum DetectorError {
    /// 暂时不可用 (超时/连接失败/重试耗尽)
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// 响应无法解析
    #[error("malformed detector response: {0}")]
    Malformed(String),
}

/// 报警通知错误
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notifier unreachable: {0}")]
    Unreachable(String),

    #[error("notifier rejected alert with HTTP {0}")]
    Rejected(u16),

    #[error("notification queue is full")]
    QueueFull,

    #[error("notification worker has stopped")]
    Closed,
}

/// 背景门控错误
#[derive(Debug, Error)]
pub enum GateError {
    #[error("frame is {actual:?}, background is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("background has not been learned")]
    NotLearned,
}

/// 控制请求被拒绝 (带状态码)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Unknown status '{0}'")]
    UnknownStatus(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Password incorrect")]
    Unauthorized,

    #[error("Password must be 4 characters long")]
    InvalidPassword,
}

impl ControlError {
    /// 对外暴露的数字状态码
    pub fn code(&self) -> u16 {
        match self {
            ControlError::UnknownStatus(_) | ControlError::BadRequest(_) => 400,
            ControlError::Unauthorized | ControlError::InvalidPassword => 401,
        }
    }
}
