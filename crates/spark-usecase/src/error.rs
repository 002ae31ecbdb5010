//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - [`UseCaseError`] 是失败结果携带的结构化错误：有序消息列表、可选数值错误码、日志级别与一次性
//!   “已记录”标记；它是数据而非异常，在管线中按值传播；
//! - [`UseCaseFailure`] 是 `into_result` 出口使用的 `thiserror` 错误，供需要与
//!   `std::error::Error` 生态互操作的调用方使用；
//! - [`TransactionError`] 描述事务协作者的失败。
//!
//! ## 设计要求（What）
//! - 失败错误的消息列表永不为空；
//! - “已记录”标记只会从 `false` 迁移到 `true` 一次，且由同一错误的所有克隆共享。

use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;

use crate::observability::LogSeverity;

/// 构造失败错误却没有提供任何消息时使用的兜底文案。
const UNSPECIFIED_FAILURE: &str = "use case failed without a message";

/// 失败结果携带的结构化错误。
///
/// # 教案式说明
/// - **意图 (Why)**：错误沿嵌套的 Behavior 向外传播时，多个层次都可能想要输出日志；共享的
///   `logged` 标记保证同一错误只被记录一次。
/// - **契约 (What)**：
///   - `messages` 永不为空，构造时若传入空列表会补上兜底文案；
///   - `code` 为可选的数值错误码，由业务自行约定；
///   - `level` 仅用于可选日志输出，默认 [`LogSeverity::Error`]；
///   - 克隆共享同一个 `logged` 原子位。
/// - **风险 (Trade-offs)**：相等性比较忽略 `logged` 标记，只比较可观测的业务字段。
#[derive(Clone)]
pub struct UseCaseError {
    messages: Vec<String>,
    code: Option<i32>,
    level: LogSeverity,
    logged: Arc<AtomicBool>,
}

impl UseCaseError {
    /// 以单条消息构造错误。
    pub fn new(message: impl Into<String>) -> Self {
        Self::from_messages([message.into()])
    }

    /// 以有序消息列表构造错误；空列表会被替换为兜底文案。
    pub fn from_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut messages: Vec<String> = messages.into_iter().map(Into::into).collect();
        if messages.is_empty() {
            messages.push(UNSPECIFIED_FAILURE.to_owned());
        }
        Self {
            messages,
            code: None,
            level: LogSeverity::Error,
            logged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 附带数值错误码。
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// 设置日志级别。
    pub fn with_level(mut self, level: LogSeverity) -> Self {
        self.level = level;
        self
    }

    /// 追加一条消息，返回新的错误。
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// 有序消息列表。
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// 第一条消息。
    pub fn message(&self) -> &str {
        self.messages
            .first()
            .map(String::as_str)
            .unwrap_or(UNSPECIFIED_FAILURE)
    }

    /// 数值错误码。
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// 日志级别。
    pub fn level(&self) -> LogSeverity {
        self.level
    }

    /// 是否已被记录过日志。
    pub fn is_logged(&self) -> bool {
        self.logged.load(Ordering::Acquire)
    }

    /// 尝试把错误标记为“已记录”。
    ///
    /// 返回 `true` 表示调用方赢得了唯一一次记录机会，应当输出日志；返回 `false` 表示其他层已经记录。
    pub fn mark_logged(&self) -> bool {
        self.logged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for UseCaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCaseError")
            .field("messages", &self.messages)
            .field("code", &self.code)
            .field("level", &self.level)
            .field("logged", &self.is_logged())
            .finish()
    }
}

impl fmt::Display for UseCaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join("; "))?;
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

impl PartialEq for UseCaseError {
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages && self.code == other.code && self.level == other.level
    }
}

impl Eq for UseCaseError {}

/// 从结果空间跨入 `std::result::Result` 的唯一出口错误。
///
/// # 教案式说明
/// - **意图 (Why)**：少数调用方需要把失败结果交给基于 `?`/`anyhow` 的代码；本类型实现
///   `std::error::Error`，承载原始错误与可选上下文。
/// - **契约 (What)**：只应在管线之外使用；管线内部始终以 [`UseCaseResult`](crate::UseCaseResult) 传递失败。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UseCaseFailure {
    /// 结果携带显式错误。
    #[error("{}{}", render_context(.context), .error)]
    Failed {
        context: Option<String>,
        error: UseCaseError,
    },
    /// 结果既没有值也没有错误。
    #[error("{}use case completed without a value", render_context(.context))]
    MissingValue { context: Option<String> },
}

impl UseCaseFailure {
    /// 失败携带的结构化错误（若有）。
    pub fn error(&self) -> Option<&UseCaseError> {
        match self {
            UseCaseFailure::Failed { error, .. } => Some(error),
            UseCaseFailure::MissingValue { .. } => None,
        }
    }
}

fn render_context(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|ctx| format!("{ctx}: "))
        .unwrap_or_default()
}

/// 事务协作者返回的错误。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// 开启事务失败。
    #[error("failed to begin transaction: {0}")]
    Begin(String),
    /// 提交失败。
    #[error("failed to commit transaction: {0}")]
    Commit(String),
    /// 回滚失败。
    #[error("failed to roll back transaction: {0}")]
    Rollback(String),
}
