//! 报警状态机 (Alarm state machine)
//!
//! 状态值、进入时间戳和执行器输出在同一把锁内更新, 任何读者都看不到
//! 写了一半的迁移。计时从最近一次进入当前状态算起。
//!
//! | 当前 | 条件 | 下一个 |
//! |---|---|---|
//! | standby | 传感器有运动 | running |
//! | running | 超过 running 窗口 | standby |
//! | sent | 超过 sent 宽限期 | alarm |
//! | alarm | 超过 alarm 时长 | standby |
//! | password | 下一次 tick | standby |
//! | learning | 背景门控结束学习 | standby |

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::notifier::Notifier;
use super::status::{Actuation, Status};
use crate::config::{NodeIdentity, TimerConfig};
use crate::error::NotificationError;
use crate::io::ActuatorIO;
use crate::title_case;

/// 报警上下文 (武器类别 + 节点身份)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertContext {
    pub weapon: String,
    pub node: NodeIdentity,
}

/// 进入 sent 时产生的报警事件
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlarmEvent {
    pub weapon: String,
    pub node: NodeIdentity,
    pub timestamp: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn new(weapon: &str, node: NodeIdentity) -> Self {
        Self {
            weapon: weapon.to_string(),
            node,
            timestamp: Utc::now(),
        }
    }

    /// "Gun detected at Lobby - Floor 1 by node 7"
    pub fn message(&self) -> String {
        format!(
            "{} detected at {} - {} by node {}",
            title_case(&self.weapon),
            self.node.name,
            self.node.location,
            self.node.node_id
        )
    }
}

/// 一次迁移的完整记录 (调用方据此观察副作用)
#[derive(Debug)]
pub struct Transition {
    pub from: Status,
    pub requested: Status,
    pub to: Status,
    pub actuation: Actuation,
    pub event: Option<AlarmEvent>,
    pub notification: Option<Result<(), NotificationError>>,
}

impl Transition {
    /// 请求 sent 但缺少武器上下文, 降级为 standby
    pub fn degraded(&self) -> bool {
        self.requested != self.to
    }
}

/// 状态快照
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: Status,
    pub since: Instant,
    pub weapon: Option<String>,
}

struct Register {
    status: Status,
    since: Instant,
    weapon: Option<String>,
    actuators: Box<dyn ActuatorIO>,
}

pub struct AlarmStateMachine {
    register: Mutex<Register>,
    notifier: Box<dyn Notifier>,
    node: NodeIdentity,
    running_window: Duration,
    sent_grace: Duration,
    alarm_duration: Duration,
}

impl AlarmStateMachine {
    pub fn new(
        actuators: Box<dyn ActuatorIO>,
        notifier: Box<dyn Notifier>,
        node: NodeIdentity,
        timers: &TimerConfig,
        now: Instant,
    ) -> Self {
        let mut register = Register {
            status: Status::Starting,
            since: now,
            weapon: None,
            actuators,
        };
        apply(&mut register, Status::Starting.actuation());
        Self {
            register: Mutex::new(register),
            notifier,
            node,
            running_window: timers.running(),
            sent_grace: timers.sent(),
            alarm_duration: timers.alarm(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Register> {
        self.register.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_status(&self) -> Status {
        self.lock().status
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let reg = self.lock();
        StatusSnapshot {
            status: reg.status,
            since: reg.since,
            weapon: reg.weapon.clone(),
        }
    }

    /// 当前状态已持续时间
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.lock().since)
    }

    /// sent 宽限期剩余秒数 (非 sent 状态为 None)
    pub fn alarm_countdown(&self, now: Instant) -> Option<u64> {
        let reg = self.lock();
        (reg.status == Status::Sent).then(|| {
            let elapsed = now.saturating_duration_since(reg.since).as_secs();
            self.sent_grace.as_secs().saturating_sub(elapsed)
        })
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    pub fn alert_context(&self, weapon: &str) -> AlertContext {
        AlertContext {
            weapon: weapon.to_string(),
            node: self.node.clone(),
        }
    }

    /// 强制设置状态 (绕过计时规则, 重新开始计时)
    ///
    /// 请求 sent 时必须带上下文, 否则降级为 standby。
    pub fn force_status(
        &self,
        status: Status,
        context: Option<AlertContext>,
        now: Instant,
    ) -> Transition {
        let mut reg = self.lock();
        self.enter(&mut reg, status, context, now)
    }

    /// 按计时规则推进一步, 返回发生的迁移
    pub fn step(&self, motion: bool, now: Instant) -> Option<Transition> {
        let mut reg = self.lock();
        let elapsed = now.saturating_duration_since(reg.since);
        let next = match reg.status {
            Status::Standby if motion => Status::Running,
            Status::Running if elapsed > self.running_window => Status::Standby,
            Status::Sent if elapsed > self.sent_grace => Status::Alarm,
            Status::Alarm if elapsed > self.alarm_duration => Status::Standby,
            Status::Password => Status::Standby,
            _ => return None,
        };
        Some(self.enter(&mut reg, next, None, now))
    }

    /// 推进一步, 返回是否应运行检测 (仅 running)
    pub fn tick(&self, motion: bool, now: Instant) -> bool {
        self.step(motion, now);
        self.current_status() == Status::Running
    }

    /// 背景学习开始
    pub fn begin_learning(&self, now: Instant) -> Transition {
        self.force_status(Status::Learning, None, now)
    }

    /// 背景学习结束 (完成或被运动打断): learning → standby
    pub fn end_learning(&self, now: Instant) -> Option<Transition> {
        let mut reg = self.lock();
        (reg.status == Status::Learning)
            .then(|| self.enter(&mut reg, Status::Standby, None, now))
    }

    /// 关机: 状态 off, 所有执行器复位
    pub fn shutdown(&self, now: Instant) -> Transition {
        self.force_status(Status::Off, None, now)
    }

    fn enter(
        &self,
        reg: &mut Register,
        requested: Status,
        context: Option<AlertContext>,
        now: Instant,
    ) -> Transition {
        let from = reg.status;
        let (to, event) = match (requested, context) {
            (Status::Sent, Some(ctx)) => {
                let event = AlarmEvent::new(&ctx.weapon, ctx.node);
                (Status::Sent, Some(event))
            }
            (Status::Sent, None) => {
                warn!("⚠️ 请求 sent 但没有武器信息, 降级为 standby");
                (Status::Standby, None)
            }
            (status, _) => (status, None),
        };

        reg.status = to;
        reg.since = now;
        match (&event, to) {
            (Some(e), _) => reg.weapon = Some(e.weapon.clone()),
            (None, Status::Standby | Status::Off | Status::Learning) => reg.weapon = None,
            _ => {}
        }

        let actuation = to.actuation();
        apply(reg, actuation);

        let notification = event.as_ref().map(|e| {
            let result = self.notifier.send_alert(e);
            if let Err(err) = &result {
                log_notification_error(err);
            }
            result
        });

        info!("🔄 状态: {} → {}", from, to);
        Transition {
            from,
            requested,
            to,
            actuation,
            event,
            notification,
        }
    }
}

fn apply(reg: &mut Register, actuation: Actuation) {
    reg.actuators
        .set_indicators(actuation.red, actuation.green, actuation.blue);
    reg.actuators.set_relay(actuation.relay);
}

fn log_notification_error(err: &NotificationError) {
    warn!("⚠️ 报警通知发送失败 (不重试): {}", err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SimulatedActuators;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<AlarmEvent>>>,
        fail: bool,
    }

    impl Notifier for Recorder {
        fn send_alert(&self, event: &AlarmEvent) -> Result<(), NotificationError> {
            self.events.lock().unwrap().push(event.clone());
            if self.fail {
                Err(NotificationError::Unreachable("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        machine: AlarmStateMachine,
        actuators: SimulatedActuators,
        alerts: Recorder,
        t0: Instant,
    }

    fn fixture_with(fail: bool) -> Fixture {
        let actuators = SimulatedActuators::new();
        let alerts = Recorder {
            fail,
            ..Recorder::default()
        };
        let t0 = Instant::now();
        let node = NodeIdentity {
            node_id: "7".into(),
            name: "Lobby".into(),
            location: "Floor 1".into(),
        };
        let machine = AlarmStateMachine::new(
            Box::new(actuators.clone()),
            Box::new(alerts.clone()),
            node,
            &TimerConfig::default(),
            t0,
        );
        Fixture {
            machine,
            actuators,
            alerts,
            t0,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    fn secs(t0: Instant, s: f64) -> Instant {
        t0 + Duration::from_secs_f64(s)
    }

    #[test]
    fn test_boot_state() {
        let f = fixture();
        assert_eq!(f.machine.current_status(), Status::Starting);
        assert_eq!(f.actuators.state().indicators, (true, true, true));
        assert!(!f.actuators.state().relay);
        // starting 不响应运动
        assert!(!f.machine.tick(true, secs(f.t0, 1.0)));
        assert_eq!(f.machine.current_status(), Status::Starting);
    }

    #[test]
    fn test_motion_opens_running_window_then_expires() {
        let f = fixture();
        f.machine.force_status(Status::Standby, None, f.t0);

        assert!(f.machine.tick(true, secs(f.t0, 1.0)));
        assert_eq!(f.machine.current_status(), Status::Running);

        assert!(f.machine.tick(false, secs(f.t0, 12.9)));
        assert!(f.machine.tick(false, secs(f.t0, 13.0)));
        assert!(!f.machine.tick(false, secs(f.t0, 13.1)));
        assert_eq!(f.machine.current_status(), Status::Standby);
    }

    #[test]
    fn test_forced_sent_dispatches_one_alert_then_alarms() {
        let f = fixture();
        f.machine.force_status(Status::Running, None, f.t0);

        let ctx = f.machine.alert_context("gun");
        let tr = f.machine.force_status(Status::Sent, Some(ctx), f.t0);
        assert_eq!(tr.to, Status::Sent);
        assert!(!tr.degraded());
        assert!(matches!(tr.notification, Some(Ok(()))));
        let events = f.alerts.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].weapon, "gun");
        assert_eq!(events[0].message(), "Gun detected at Lobby - Floor 1 by node 7");
        assert_eq!(f.machine.snapshot().weapon.as_deref(), Some("gun"));
        assert!(!f.machine.tick(false, secs(f.t0, 1.0)));

        // 已过秒数取整后再相减
        assert_eq!(f.machine.alarm_countdown(secs(f.t0, 5.2)), Some(10));
        assert_eq!(f.machine.alarm_countdown(secs(f.t0, 5.0)), Some(10));
        assert_eq!(f.machine.alarm_countdown(secs(f.t0, 14.9)), Some(1));
        f.machine.tick(false, secs(f.t0, 15.0));
        assert_eq!(f.machine.current_status(), Status::Sent);
        f.machine.tick(false, secs(f.t0, 15.1));
        assert_eq!(f.machine.current_status(), Status::Alarm);
        assert!(f.actuators.state().relay);
        assert_eq!(f.alerts.events.lock().unwrap().len(), 1);

        f.machine.tick(false, secs(f.t0, 75.2));
        assert_eq!(f.machine.current_status(), Status::Standby);
        assert!(!f.actuators.state().relay);
        assert_eq!(f.machine.snapshot().weapon, None);
    }

    #[test]
    fn test_forced_sent_from_every_state_dispatches_exactly_one_alert() {
        for start in Status::ALL {
            let f = fixture();
            let ctx = (start == Status::Sent).then(|| f.machine.alert_context("knife"));
            f.machine.force_status(start, ctx, f.t0);
            let before = f.alerts.events.lock().unwrap().len();

            let ctx = f.machine.alert_context("gun");
            let tr = f.machine.force_status(Status::Sent, Some(ctx), secs(f.t0, 1.0));
            assert_eq!(tr.to, Status::Sent, "from {}", start);

            let events = f.alerts.events.lock().unwrap().clone();
            assert_eq!(events.len(), before + 1, "from {}", start);
            assert_eq!(events[before].weapon, "gun");
            assert!(events[before].message().contains("Gun"));
        }
    }

    #[test]
    fn test_sent_without_weapon_degrades_to_standby() {
        let f = fixture();
        let tr = f.machine.force_status(Status::Sent, None, f.t0);
        assert_eq!(tr.requested, Status::Sent);
        assert_eq!(tr.to, Status::Standby);
        assert!(tr.degraded());
        assert!(tr.event.is_none());
        assert!(f.alerts.events.lock().unwrap().is_empty());
        assert_eq!(f.machine.current_status(), Status::Standby);
        assert_eq!(f.actuators.state().indicators, (false, true, false));
    }

    #[test]
    fn test_notification_failure_does_not_stop_lifecycle() {
        let f = fixture_with(true);
        let ctx = f.machine.alert_context("knife");
        let tr = f.machine.force_status(Status::Sent, Some(ctx), f.t0);
        assert!(matches!(tr.notification, Some(Err(_))));
        assert_eq!(f.machine.current_status(), Status::Sent);
        f.machine.tick(false, secs(f.t0, 16.0));
        assert_eq!(f.machine.current_status(), Status::Alarm);
    }

    #[test]
    fn test_password_returns_to_standby_on_next_tick() {
        let f = fixture();
        f.machine.force_status(Status::Alarm, None, f.t0);
        f.machine.force_status(Status::Password, None, secs(f.t0, 2.0));
        assert_eq!(f.actuators.state().relay, false);
        let tr = f.machine.step(false, secs(f.t0, 2.0)).unwrap();
        assert_eq!((tr.from, tr.to), (Status::Password, Status::Standby));
    }

    #[test]
    fn test_learning_only_left_through_end_learning() {
        let f = fixture();
        f.machine.begin_learning(f.t0);
        assert!(!f.machine.tick(true, secs(f.t0, 500.0)));
        assert_eq!(f.machine.current_status(), Status::Learning);

        let tr = f.machine.end_learning(secs(f.t0, 500.0)).unwrap();
        assert_eq!(tr.to, Status::Standby);
        assert!(f.machine.end_learning(secs(f.t0, 501.0)).is_none());
    }

    #[test]
    fn test_reads_do_not_reapply_effects() {
        let f = fixture();
        f.machine.force_status(Status::Standby, None, f.t0);
        let writes = f.actuators.state().writes;
        for _ in 0..5 {
            assert_eq!(f.machine.current_status(), Status::Standby);
            assert!(f.machine.step(false, secs(f.t0, 1.0)).is_none());
        }
        assert_eq!(f.actuators.state().writes, writes);
    }

    #[test]
    fn test_force_restarts_clock() {
        let f = fixture();
        f.machine.force_status(Status::Running, None, f.t0);
        f.machine.force_status(Status::Running, None, secs(f.t0, 10.0));
        f.machine.tick(false, secs(f.t0, 20.0));
        assert_eq!(f.machine.current_status(), Status::Running);
        assert_eq!(f.machine.elapsed(secs(f.t0, 20.0)), Duration::from_secs(10));
    }

    #[test]
    fn test_shutdown_deasserts_everything() {
        let f = fixture();
        f.machine.force_status(Status::Alarm, None, f.t0);
        assert!(f.actuators.state().relay);
        f.machine.shutdown(secs(f.t0, 1.0));
        assert_eq!(f.machine.current_status(), Status::Off);
        let state = f.actuators.state();
        assert_eq!(state.indicators, (false, false, false));
        assert!(!state.relay);
    }

    #[test]
    fn test_concurrent_force_and_tick_never_tear() {
        let f = Arc::new(fixture());
        f.machine.force_status(Status::Standby, None, f.t0);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || {
                    for n in 0..200 {
                        let now = secs(f.t0, n as f64);
                        if i % 2 == 0 {
                            f.machine.force_status(Status::Alarm, None, now);
                        } else {
                            f.machine.force_status(Status::Password, None, now);
                        }
                        f.machine.tick(false, now);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let status = f.machine.current_status();
        assert_eq!(f.actuators.state().relay, status.actuation().relay);
    }
}
