//! 报警通知 (Notifier)
//!
//! - HttpNotifier:   直接向服务端推送
//! - QueuedNotifier: 入队后由工作线程推送, 调用方不阻塞
//! - LogNotifier:    未配置服务端时只写日志

use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use serde_json::json;
use tracing::{error, info, warn};

use super::AlarmEvent;
use crate::error::NotificationError;

pub trait Notifier: Send + Sync {
    fn send_alert(&self, event: &AlarmEvent) -> Result<(), NotificationError>;
}

fn map_ureq_error(e: ureq::Error) -> NotificationError {
    match e {
        ureq::Error::Status(code, _) => NotificationError::Rejected(code),
        ureq::Error::Transport(t) => NotificationError::Unreachable(t.to_string()),
    }
}

// ========== HTTP ==========

pub struct HttpNotifier {
    agent: ureq::Agent,
    alert_url: String,
    node_url: Option<String>,
}

impl HttpNotifier {
    pub fn new(alert_url: String, node_url: Option<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            alert_url,
            node_url,
        }
    }

    /// 上报节点在线状态 (PATCH `{status: bool}`)
    pub fn set_online(&self, online: bool) -> Result<(), NotificationError> {
        let Some(url) = &self.node_url else {
            return Ok(());
        };
        self.agent
            .request("PATCH", url)
            .send_json(json!({ "status": online }))
            .map(|_| ())
            .map_err(map_ureq_error)
    }
}

impl Notifier for HttpNotifier {
    fn send_alert(&self, event: &AlarmEvent) -> Result<(), NotificationError> {
        self.agent
            .post(&self.alert_url)
            .send_json(json!({
                "message": event.message(),
                "weapon": event.weapon,
                "node_id": event.node.node_id,
                "location": event.node.location,
                "timestamp": event.timestamp,
            }))
            .map(|_| ())
            .map_err(map_ureq_error)
    }
}

// ========== 日志 ==========

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_alert(&self, event: &AlarmEvent) -> Result<(), NotificationError> {
        warn!("🚨 {}", event.message());
        Ok(())
    }
}

// ========== 队列 ==========

/// 后台推送: 状态机持锁期间只做 `try_send`
pub struct QueuedNotifier {
    tx: Option<Sender<AlarmEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedNotifier {
    pub fn spawn<N: Notifier + 'static>(inner: N, capacity: usize) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<AlarmEvent>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("notifier".into())
            .spawn(move || {
                for event in rx.iter() {
                    match inner.send_alert(&event) {
                        Ok(()) => info!("📨 报警已推送: {}", event.message()),
                        // 不重试, 报警计时与推送结果无关
                        Err(e) => error!("❌ 报警推送失败: {}", e),
                    }
                }
            })
            .context("failed to spawn notifier thread")?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl Notifier for QueuedNotifier {
    fn send_alert(&self, event: &AlarmEvent) -> Result<(), NotificationError> {
        let tx = self.tx.as_ref().ok_or(NotificationError::Closed)?;
        tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::QueueFull,
            TrySendError::Disconnected(_) => NotificationError::Closed,
        })
    }
}

impl Drop for QueuedNotifier {
    fn drop(&mut self) {
        // 关闭通道, 等待已入队的报警发送完
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
