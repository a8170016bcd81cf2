//! 控制接口 (Control API)
//!
//! 与帧循环并发执行, 只通过状态机的迁移接口修改状态。
//! 所有请求都应答 `{"status": <code>, "message": <value>}`。
//!
//! ```json
//! {"op": "get_status"}
//! {"op": "set_status", "status": "sent", "weapon": "gun"}
//! {"op": "motion"}
//! {"op": "password", "password": "0000"}
//! {"op": "change_password", "old": "0000", "new": "1234"}
//! {"op": "toggle_recording"}
//! {"op": "capture"}
//! ```

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::alarm::{AlarmStateMachine, Status};
use crate::clock::Clock;
use crate::error::ControlError;
use crate::io::SensorIO;
use crate::pipeline::Recorder;

const PASSWORD_LEN: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    GetStatus,
    SetStatus {
        status: String,
        #[serde(default)]
        weapon: Option<String>,
    },
    Motion,
    Password {
        password: String,
    },
    ChangePassword {
        old: String,
        new: String,
    },
    ToggleRecording,
    Capture,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: u16,
    pub message: Value,
}

impl ControlResponse {
    pub fn ok(message: Value) -> Self {
        Self {
            status: 200,
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

impl From<ControlError> for ControlResponse {
    fn from(e: ControlError) -> Self {
        Self {
            status: e.code(),
            message: Value::String(e.to_string()),
        }
    }
}

pub struct ControlApi {
    state: Arc<AlarmStateMachine>,
    sensor: Arc<dyn SensorIO>,
    recorder: Arc<Recorder>,
    clock: Arc<dyn Clock>,
    password: Mutex<String>,
}

impl ControlApi {
    pub fn new(
        state: Arc<AlarmStateMachine>,
        sensor: Arc<dyn SensorIO>,
        recorder: Arc<Recorder>,
        clock: Arc<dyn Clock>,
        password: &str,
    ) -> Self {
        Self {
            state,
            sensor,
            recorder,
            clock,
            password: Mutex::new(password.to_string()),
        }
    }

    pub fn handle(&self, request: ControlRequest) -> ControlResponse {
        match self.dispatch(request) {
            Ok(message) => ControlResponse::ok(message),
            Err(e) => {
                warn!("⚠️ 控制请求被拒绝 ({}): {}", e.code(), e);
                e.into()
            }
        }
    }

    /// 一行 JSON 请求 → 一行 JSON 应答
    pub fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<ControlRequest>(line) {
            Ok(request) => self.handle(request),
            Err(e) => ControlError::BadRequest(e.to_string()).into(),
        };
        serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"status":500,"message":"encode failed"}"#.to_string())
    }

    fn dispatch(&self, request: ControlRequest) -> Result<Value, ControlError> {
        match request {
            ControlRequest::GetStatus => Ok(json!(self.state.current_status())),
            ControlRequest::SetStatus { status, weapon } => self.set_status(&status, weapon),
            ControlRequest::Motion => Ok(json!(self.sensor.read_motion())),
            ControlRequest::Password { password } => {
                self.verify(&password)?;
                self.state
                    .force_status(Status::Password, None, self.clock.now());
                Ok(json!("Password correct"))
            }
            ControlRequest::ChangePassword { old, new } => {
                // 先校验新密码长度, 再校验旧密码
                if new.chars().count() != PASSWORD_LEN {
                    return Err(ControlError::InvalidPassword);
                }
                self.verify(&old)?;
                *self.password.lock().unwrap_or_else(|e| e.into_inner()) = new;
                info!("🔑 密码已修改");
                Ok(json!("Password changed"))
            }
            ControlRequest::ToggleRecording => {
                let recording = self
                    .recorder
                    .toggle()
                    .map_err(|e| ControlError::BadRequest(format!("{:#}", e)))?;
                Ok(json!({ "recording": recording }))
            }
            ControlRequest::Capture => {
                self.recorder.request_snapshot();
                Ok(json!("capture scheduled"))
            }
        }
    }

    /// 未知状态拒绝, 原状态保持不变
    fn set_status(&self, raw: &str, weapon: Option<String>) -> Result<Value, ControlError> {
        let status: Status = raw.parse()?;
        let context = weapon
            .filter(|w| !w.trim().is_empty())
            .map(|w| self.state.alert_context(&w));
        let transition = self.state.force_status(status, context, self.clock.now());
        if transition.degraded() {
            info!("ℹ️ 手动 sent 缺少武器信息, 已降级为 {}", transition.to);
        }
        Ok(json!(format!("Status changed to {}", transition.to)))
    }

    fn verify(&self, candidate: &str) -> Result<(), ControlError> {
        let stored = self.password.lock().unwrap_or_else(|e| e.into_inner());
        if *stored == candidate {
            Ok(())
        } else {
            Err(ControlError::Unauthorized)
        }
    }
}
