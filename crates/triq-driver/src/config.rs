//! 抓取配置（Grip Profile）
//!
//! 以 TOML 描述一套命名的抓取参数：默认模式、全指速度 / 力、
//! 保活周期与链路超时。所有字段均可省略，缺省值见 `Default` 实现。

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use triq_protocol::GraspMode;

use crate::link::LinkSettings;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 一套命名的抓取参数
///
/// ```toml
/// name = "bin-picking"
/// mode = "pinch"
/// speed = 200
/// force = 96
/// keepalive_period_ms = 100
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GripProfile {
    /// 配置名，仅用于日志标识
    pub name: String,
    /// 默认抓取模式
    pub mode: GraspMode,
    /// 全指默认速度（0..=255）
    pub speed: u8,
    /// 全指默认力（0..=255）
    pub force: u8,
    /// 保活周期（毫秒）。设备看门狗约 1 秒无通信即判通信故障，
    /// 周期必须显著小于该值。
    pub keepalive_period_ms: u64,
    /// 写应答等待上限（毫秒）
    pub ack_timeout_ms: u64,
    /// 读应答等待上限（毫秒）
    pub response_timeout_ms: u64,
}

impl Default for GripProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            mode: GraspMode::Basic,
            speed: 0xFF,
            force: 0x80,
            keepalive_period_ms: 100,
            ack_timeout_ms: 100,
            response_timeout_ms: 100,
        }
    }
}

impl GripProfile {
    /// 从 TOML 文本解析
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(text)?)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn keepalive_period(&self) -> Duration {
        Duration::from_millis(self.keepalive_period_ms)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
        }
    }
}
