//! 状态与执行器映射表 (Status → Actuation)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// 报警状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Starting, // 启动中, 尚不信任传感器
    Standby,  // 空闲, 监视传感器
    Learning, // 背景学习
    Running,  // 检测窗口
    Sent,     // 已确认武器, 报警前宽限期
    Alarm,    // 警笛/继电器激活
    Password, // 人工解除
    Off,      // 关机
}

/// 进入状态时的执行器输出 (RGB指示灯 + 继电器)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actuation {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub relay: bool,
}

const fn lights(red: bool, green: bool, blue: bool) -> Actuation {
    Actuation {
        red,
        green,
        blue,
        relay: false,
    }
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::Starting,
        Status::Standby,
        Status::Learning,
        Status::Running,
        Status::Sent,
        Status::Alarm,
        Status::Password,
        Status::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Starting => "starting",
            Status::Standby => "standby",
            Status::Learning => "learning",
            Status::Running => "running",
            Status::Sent => "sent",
            Status::Alarm => "alarm",
            Status::Password => "password",
            Status::Off => "off",
        }
    }

    /// 状态 → 指示灯颜色; 只有 alarm 拉起继电器
    pub fn actuation(&self) -> Actuation {
        match self {
            Status::Starting => lights(true, true, true), // 白
            Status::Standby => lights(false, true, false), // 绿
            Status::Learning => lights(false, false, true), // 蓝
            Status::Running => lights(false, true, true),  // 青
            Status::Sent => lights(true, true, false),     // 黄
            Status::Alarm => Actuation {
                relay: true,
                ..lights(true, false, false) // 红
            },
            Status::Password => lights(true, false, true), // 品红
            Status::Off => lights(false, false, false),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ControlError;

    /// 只接受精确的小写名称, 不做任何纠正
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ControlError::UnknownStatus(s.to_string()))
    }
}
