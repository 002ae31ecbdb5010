//! 分派器与内置 Behavior 的配置。
//!
//! # 教案式说明
//! - **意图（Why）**：失败日志开关、慢调用阈值、缓存容量等参数随部署环境变化，外置到 TOML
//!   文件便于运维调整，而不需要重新编译。
//! - **结构（How）**：[`UseCaseSettings`] 按 `[dispatcher]`、`[timing]`、`[caching]` 三个分节
//!   组织，每个字段都有默认值，缺省的分节或字段回退到默认值。
//! - **契约（What）**：未知字段视为配置错误，避免拼写错误被静默忽略。
//!
//! ```toml
//! [dispatcher]
//! log_failures = true
//! log_target = "orders.usecase"
//!
//! [timing]
//! slow_threshold_ms = 250
//!
//! [caching]
//! ttl_secs = 30
//! max_entries = 512
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::observability::{DEFAULT_TARGET, LogSeverity};

/// 配置加载失败的原因。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败。
    #[error("failed to read settings from `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析或字段校验失败。
    #[error("invalid use case settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 全部配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UseCaseSettings {
    pub dispatcher: DispatcherSettings,
    pub timing: TimingSettings,
    pub caching: CachingSettings,
}

impl UseCaseSettings {
    /// 从 TOML 文本解析。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// 从 TOML 文件加载。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// 分派器与链引擎的失败日志配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherSettings {
    /// 是否在配置了 Logger 时记录失败结果。
    pub log_failures: bool,
    /// 日志目标。
    pub log_target: String,
    /// 失败日志的最低级别；低于该级别的错误不输出。
    pub min_failure_level: LogSeverity,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            log_failures: true,
            log_target: DEFAULT_TARGET.to_owned(),
            min_failure_level: LogSeverity::Trace,
        }
    }
}

/// 计时 Behavior 的配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSettings {
    /// 超过该阈值（毫秒）的调用以 WARN 级别记录。
    pub slow_threshold_ms: u64,
}

impl TimingSettings {
    /// 阈值的 `Duration` 形式。
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 500,
        }
    }
}

/// 缓存 Behavior 的配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CachingSettings {
    /// 缓存条目的存活时间（秒）。
    pub ttl_secs: u64,
    /// 最大条目数，`0` 表示禁用缓存。
    pub max_entries: usize,
}

impl CachingSettings {
    /// 存活时间的 `Duration` 形式。
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CachingSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_entries: 1024,
        }
    }
}
