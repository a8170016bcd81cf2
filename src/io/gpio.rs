//! Linux sysfs GPIO
//!
//! 读写失败只记录日志: 读失败视为无运动, 写失败忽略。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{ActuatorIO, SensorIO};
use crate::config::HardwareConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// 单个已导出的引脚
#[derive(Debug)]
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    pub fn export(root: &Path, number: u32, direction: Direction) -> Result<Self> {
        let dir = root.join(format!("gpio{}", number));
        if !dir.exists() {
            fs::write(root.join("export"), number.to_string())
                .with_context(|| format!("failed exporting gpio{}", number))?;
        }
        fs::write(dir.join("direction"), direction.as_str())
            .with_context(|| format!("failed setting gpio{} direction", number))?;
        Ok(Self {
            number,
            value_path: dir.join("value"),
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn read(&self) -> io::Result<bool> {
        Ok(fs::read_to_string(&self.value_path)?.trim() == "1")
    }

    pub fn write(&self, high: bool) -> io::Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
    }
}

/// PIR 传感器
pub struct GpioSensor {
    pin: SysfsPin,
}

impl SensorIO for GpioSensor {
    fn read_motion(&self) -> bool {
        self.pin.read().unwrap_or_else(|e| {
            warn!("⚠️ 读取 gpio{} 失败: {}", self.pin.number(), e);
            false
        })
    }
}

/// RGB 指示灯 + 继电器
pub struct GpioActuators {
    leds: [SysfsPin; 3],
    relay: SysfsPin,
    relay_active_low: bool,
}

impl GpioActuators {
    fn write(pin: &SysfsPin, high: bool) {
        if let Err(e) = pin.write(high) {
            warn!("⚠️ 写入 gpio{} 失败: {}", pin.number(), e);
        }
    }
}

impl ActuatorIO for GpioActuators {
    fn set_indicators(&mut self, red: bool, green: bool, blue: bool) {
        for (pin, value) in self.leds.iter().zip([red, green, blue]) {
            Self::write(pin, value);
        }
    }

    fn set_relay(&mut self, on: bool) {
        // 继电器模块低电平触发
        Self::write(&self.relay, on != self.relay_active_low);
    }
}

/// 按配置导出所有引脚
pub fn open(config: &HardwareConfig) -> Result<(GpioSensor, GpioActuators)> {
    let root = &config.gpio_root;
    let sensor = GpioSensor {
        pin: SysfsPin::export(root, config.input_pin, Direction::In)?,
    };
    let [r, g, b] = config.led_pins;
    let mut actuators = GpioActuators {
        leds: [
            SysfsPin::export(root, r, Direction::Out)?,
            SysfsPin::export(root, g, Direction::Out)?,
            SysfsPin::export(root, b, Direction::Out)?,
        ],
        relay: SysfsPin::export(root, config.relay_pin, Direction::Out)?,
        relay_active_low: config.relay_active_low,
    };
    actuators.set_relay(false);
    info!(
        "✅ GPIO 初始化: PIR={} relay={} leds={:?}",
        config.input_pin, config.relay_pin, config.led_pins
    );
    Ok((sensor, actuators))
}
