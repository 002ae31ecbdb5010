//! 日志契约与 `tracing` 桥接。
//!
//! # 教案式说明
//! - **意图（Why）**：核心只需要“记录一条带级别的消息”这一能力，且该能力永远不是正确性的前提；
//!   因此以最小的 [`Logger`] Trait 表达，由宿主决定是否注入。
//! - **结构（How）**：[`LogSeverity`] + [`LogRecord`] + [`Logger`] 组成契约；[`TracingLogger`]
//!   将记录转发到 `tracing` 宏，[`NoopLogger`] 直接丢弃；[`install_fmt_subscriber`] 提供
//!   `fmt + EnvFilter` 的一键安装入口。
//! - **契约（What）**：`Logger::log` 必须是“发出即忘”的，不得阻塞或回传错误。

use std::borrow::Cow;
use std::fmt::Write as _;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// `TracingLogger` 在记录未指定目标时使用的默认目标。
pub const DEFAULT_TARGET: &str = "spark.usecase";

/// 日志级别枚举，取 OpenTelemetry `SeverityNumber` 与 `tracing` 级别的交集。
///
/// - `Info` 表示常规事件，`Warn` 表示潜在风险，`Error` 表示故障，`Fatal` 代表不可恢复错误；
/// - 也作为 [`UseCaseError`](crate::UseCaseError) 的严重度字段，仅用于可选日志输出。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogSeverity {
    /// 返回稳定的小写名称，便于写入结构化字段。
    pub fn as_str(self) -> &'static str {
        match self {
            LogSeverity::Trace => "trace",
            LogSeverity::Debug => "debug",
            LogSeverity::Info => "info",
            LogSeverity::Warn => "warn",
            LogSeverity::Error => "error",
            LogSeverity::Fatal => "fatal",
        }
    }
}

/// 结构化日志字段。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue<'a> {
    pub key: &'a str,
    pub value: Cow<'a, str>,
}

impl<'a> KeyValue<'a> {
    /// 构造字段。
    pub fn new(key: &'a str, value: impl Into<Cow<'a, str>>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// 单条结构化日志记录。
///
/// # 契约说明（What）
/// - `message` 使用 `Cow<'a, str>`，既支持静态字符串也支持动态构建的消息；
/// - `target` 表示日志分类，缺省时由实现方决定；
/// - `attributes` 在 `Logger::log` 返回前必须保持有效。
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub message: Cow<'a, str>,
    pub severity: LogSeverity,
    pub target: Option<&'a str>,
    pub attributes: &'a [KeyValue<'a>],
}

impl<'a> LogRecord<'a> {
    /// 构建新的日志记录。
    pub fn new(
        message: impl Into<Cow<'a, str>>,
        severity: LogSeverity,
        target: Option<&'a str>,
        attributes: &'a [KeyValue<'a>],
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            target,
            attributes,
        }
    }
}

/// 日志接口的核心契约。
///
/// # 逻辑解析（How）
/// - `log` 为唯一必需方法；
/// - `debug`/`info`/`warn`/`error` 与 `log_with_fields` 内部构造 [`LogRecord`] 再调用 `log`，
///   确保所有路径共享同一出口。
///
/// # 契约说明（What）
/// - 实现应保证非阻塞；核心对返回值不做任何假设。
pub trait Logger: Send + Sync + 'static {
    /// 提交结构化日志。
    fn log(&self, record: &LogRecord<'_>);

    /// 以指定级别与字段输出日志。
    fn log_with_fields(
        &self,
        severity: LogSeverity,
        target: Option<&str>,
        message: &str,
        attributes: &[KeyValue<'_>],
    ) {
        let record = LogRecord::new(message, severity, target, attributes);
        self.log(&record);
    }

    /// 输出 DEBUG 日志。
    fn debug(&self, message: &str) {
        self.log_with_fields(LogSeverity::Debug, None, message, &[]);
    }

    /// 输出 INFO 日志。
    fn info(&self, message: &str) {
        self.log_with_fields(LogSeverity::Info, None, message, &[]);
    }

    /// 输出 WARN 日志。
    fn warn(&self, message: &str) {
        self.log_with_fields(LogSeverity::Warn, None, message, &[]);
    }

    /// 输出 ERROR 日志。
    fn error(&self, message: &str) {
        self.log_with_fields(LogSeverity::Error, None, message, &[]);
    }
}

/// 丢弃所有记录的日志实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}

/// 将 [`LogRecord`] 转发到 `tracing` 宏的桥接实现。
///
/// # 教案式说明
/// - **意图（Why）**：宿主通常已经使用 `tracing` 生态，桥接后无需额外配置即可在现有 Subscriber 中看到
///   分派日志；
/// - **逻辑（How）**：`tracing` 的 target 必须是编译期常量，因此记录的 `target` 以
///   `usecase.target` 字段输出，结构化字段拼接为 `key=value` 文本写入 `usecase.fields`；
/// - **契约（What）**：`Fatal` 映射到 `ERROR` 级别。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let target = record.target.unwrap_or(DEFAULT_TARGET);
        let fields = render_fields(record.attributes);
        let message = record.message.as_ref();
        match record.severity {
            LogSeverity::Trace => {
                tracing::trace!(usecase.target = target, usecase.fields = %fields, "{message}")
            }
            LogSeverity::Debug => {
                tracing::debug!(usecase.target = target, usecase.fields = %fields, "{message}")
            }
            LogSeverity::Info => {
                tracing::info!(usecase.target = target, usecase.fields = %fields, "{message}")
            }
            LogSeverity::Warn => {
                tracing::warn!(usecase.target = target, usecase.fields = %fields, "{message}")
            }
            LogSeverity::Error | LogSeverity::Fatal => {
                tracing::error!(usecase.target = target, usecase.fields = %fields, "{message}")
            }
        }
    }
}

fn render_fields(attributes: &[KeyValue<'_>]) -> String {
    let mut rendered = String::new();
    for (index, field) in attributes.iter().enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        let _ = write!(rendered, "{}={}", field.key, field.value);
    }
    rendered
}

/// 订阅器安装失败的原因。
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// 过滤指令无法解析。
    #[error("invalid log filter directive `{directive}`: {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// 全局 Subscriber 已被其他组件设置。
    #[error("a global tracing subscriber is already installed: {0}")]
    SubscriberAlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装 `fmt + EnvFilter` 全局 Subscriber。
///
/// - **逻辑（How）**：优先读取 `RUST_LOG`，未设置时回退到 `default_directive`；
/// - **契约（What）**：只能成功调用一次，重复调用返回 [`ObservabilityError::SubscriberAlreadySet`]。
pub fn install_fmt_subscriber(default_directive: &str) -> Result<(), ObservabilityError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(default_directive).map_err(|source| {
                ObservabilityError::InvalidFilter {
                    directive: default_directive.to_owned(),
                    source,
                }
            })?
        }
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
