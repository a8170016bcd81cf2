/// 传感器与执行器 (Sensor / Actuator IO)
///
/// - SensorIO:   PIR 运动传感器
/// - ActuatorIO: RGB 指示灯 + 警笛继电器
/// - gpio:       Linux sysfs GPIO 实现
/// - Simulated*: 无硬件时的模拟实现
pub mod gpio;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

pub use gpio::{GpioActuators, GpioSensor, SysfsPin};

pub trait SensorIO: Send + Sync {
    fn read_motion(&self) -> bool;
}

pub trait ActuatorIO: Send {
    fn set_indicators(&mut self, red: bool, green: bool, blue: bool);
    fn set_relay(&mut self, on: bool);
}

impl<S: SensorIO + ?Sized> SensorIO for Arc<S> {
    fn read_motion(&self) -> bool {
        (**self).read_motion()
    }
}

// ========== 模拟实现 ==========

/// 模拟运动传感器 (可由控制接口或测试切换)
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    motion: AtomicBool,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_motion(&self, motion: bool) {
        self.motion.store(motion, Ordering::SeqCst);
    }
}

impl SensorIO for SimulatedSensor {
    fn read_motion(&self) -> bool {
        self.motion.load(Ordering::SeqCst)
    }
}

/// 执行器最近一次输出
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActuatorState {
    pub indicators: (bool, bool, bool),
    pub relay: bool,
    pub writes: usize,
}

/// 模拟执行器: 记录输出, 供日志与测试读取
#[derive(Clone, Debug, Default)]
pub struct SimulatedActuators {
    state: Arc<Mutex<ActuatorState>>,
}

impl SimulatedActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ActuatorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ActuatorIO for SimulatedActuators {
    fn set_indicators(&mut self, red: bool, green: bool, blue: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.indicators = (red, green, blue);
        state.writes += 1;
        debug!("💡 RGB = ({}, {}, {})", red, green, blue);
    }

    fn set_relay(&mut self, on: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.relay = on;
        state.writes += 1;
        debug!("🔔 Relay = {}", on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_sensor_toggles() {
        let sensor = Arc::new(SimulatedSensor::new());
        assert!(!sensor.read_motion());
        sensor.set_motion(true);
        assert!(sensor.read_motion());
    }

    #[test]
    fn test_simulated_actuators_share_state() {
        let actuators = SimulatedActuators::new();
        let mut writer = actuators.clone();
        writer.set_indicators(true, false, true);
        writer.set_relay(true);
        let state = actuators.state();
        assert_eq!(state.indicators, (true, false, true));
        assert!(state.relay);
        assert_eq!(state.writes, 2);
    }
}
