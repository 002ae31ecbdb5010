//! 统一结果容器 [`UseCaseResult`] 及其组合子。
//!
//! # 教案式说明
//! - **意图（Why）**：所有分派与链路操作都返回同一种结果形态，调用方不必区分“业务失败”与“意外故障”
//!   的传递通道；故障在最近的边界被转换为失败数据。
//! - **结构（How）**：内部以 `Option<T>` + `Option<UseCaseError>` 保存，成功判定规则为
//!   “没有错误且值存在”。缺失值的结果即使没有显式错误也视为失败。
//! - **契约（What）**：结果一经创建即不可变；组合子总是返回新结果。

use crate::error::{UseCaseError, UseCaseFailure};

/// 结果既无值也无显式错误时，对外呈现的失败消息。
pub const MISSING_VALUE_MESSAGE: &str = "use case completed without a value";

/// 用例执行结果：类型化的成功值，或结构化错误。
///
/// 非类型化结果以 `UseCaseResult<()>` 表达，参见 [`UseCaseResult::ok`]。
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct UseCaseResult<T> {
    value: Option<T>,
    error: Option<UseCaseError>,
}

impl<T> UseCaseResult<T> {
    /// 构造成功结果。
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    /// 以结构化错误构造失败结果。
    pub fn failure(error: UseCaseError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    /// 以单条消息构造失败结果。
    pub fn fail(message: impl Into<String>) -> Self {
        Self::failure(UseCaseError::new(message))
    }

    /// 由可选值构造结果；`None` 产生“缺失值”状态，它不是成功，但也没有显式错误。
    pub fn from_option(value: Option<T>) -> Self {
        Self { value, error: None }
    }

    /// 是否成功：没有错误且值存在。
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.value.is_some()
    }

    /// 是否失败（包括缺失值状态）。
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// 成功值的引用。
    pub fn value(&self) -> Option<&T> {
        if self.is_success() {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// 显式错误的引用。
    pub fn error(&self) -> Option<&UseCaseError> {
        self.error.as_ref()
    }

    /// 失败时返回错误；缺失值状态合成一条 [`MISSING_VALUE_MESSAGE`] 错误；成功时返回 `None`。
    pub fn error_or_missing(&self) -> Option<UseCaseError> {
        match (&self.error, &self.value) {
            (Some(error), _) => Some(error.clone()),
            (None, None) => Some(UseCaseError::new(MISSING_VALUE_MESSAGE)),
            (None, Some(_)) => None,
        }
    }

    /// 取出成功值。
    pub fn into_value(self) -> Option<T> {
        if self.error.is_none() { self.value } else { None }
    }

    pub(crate) fn into_parts(self) -> (Option<T>, Option<UseCaseError>) {
        (self.value, self.error)
    }

    pub(crate) fn from_parts(value: Option<T>, error: Option<UseCaseError>) -> Self {
        match error {
            Some(error) => Self::failure(error),
            None => Self::from_option(value),
        }
    }

    /// 映射成功值，失败原样传播。
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UseCaseResult<U> {
        match self.error {
            Some(error) => UseCaseResult::failure(error),
            None => UseCaseResult::from_option(self.value.map(f)),
        }
    }

    /// 以成功值继续产生新结果，失败原样传播。
    pub fn and_then<U>(self, f: impl FnOnce(T) -> UseCaseResult<U>) -> UseCaseResult<U> {
        match (self.error, self.value) {
            (Some(error), _) => UseCaseResult::failure(error),
            (None, Some(value)) => f(value),
            (None, None) => UseCaseResult::from_option(None),
        }
    }

    /// 转换显式错误，成功与缺失值状态不受影响。
    pub fn map_error(self, f: impl FnOnce(UseCaseError) -> UseCaseError) -> Self {
        Self {
            value: self.value,
            error: self.error.map(f),
        }
    }

    /// 跨入 `std::result::Result`。
    ///
    /// 这是从结果空间到错误空间的唯一出口，只应在管线外部、需要与基于 `?` 的代码互操作时使用。
    pub fn into_result(self) -> Result<T, UseCaseFailure> {
        self.into_result_inner(None)
    }

    /// 同 [`into_result`](Self::into_result)，并为错误附带上下文描述。
    pub fn into_result_with(self, context: impl Into<String>) -> Result<T, UseCaseFailure> {
        self.into_result_inner(Some(context.into()))
    }

    fn into_result_inner(self, context: Option<String>) -> Result<T, UseCaseFailure> {
        match (self.error, self.value) {
            (Some(error), _) => Err(UseCaseFailure::Failed { context, error }),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(UseCaseFailure::MissingValue { context }),
        }
    }
}

impl UseCaseResult<()> {
    /// 非类型化的成功结果。
    pub fn ok() -> Self {
        Self::success(())
    }
}

/// 不关心值类型时查看结果状态的只读视图，供 [`combine`] 聚合异构结果。
pub trait ResultStatus {
    /// 是否成功。
    fn succeeded(&self) -> bool;

    /// 失败时的错误（缺失值状态合成错误）。
    fn failure_error(&self) -> Option<UseCaseError>;
}

impl<T> ResultStatus for UseCaseResult<T> {
    fn succeeded(&self) -> bool {
        self.is_success()
    }

    fn failure_error(&self) -> Option<UseCaseError> {
        self.error_or_missing()
    }
}

/// 合并多个（可能异构的）结果。
///
/// # 契约说明（What）
/// - 全部成功时返回 [`UseCaseResult::ok`]；
/// - 否则返回失败：消息为各失败结果消息按输入顺序的拼接，错误码取输入顺序中第一个存在的错误码。
pub fn combine(results: &[&dyn ResultStatus]) -> UseCaseResult<()> {
    merge_failures(results.iter().filter_map(|result| result.failure_error()))
        .map_or_else(UseCaseResult::ok, UseCaseResult::failure)
}

/// 合并同类型结果，成功时按输入顺序收集全部值。
pub fn combine_values<T>(results: impl IntoIterator<Item = UseCaseResult<T>>) -> UseCaseResult<Vec<T>> {
    let mut values = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result.error_or_missing() {
            Some(error) => failures.push(error),
            None => values.extend(result.into_value()),
        }
    }
    merge_failures(failures)
        .map_or_else(|| UseCaseResult::success(values), UseCaseResult::failure)
}

fn merge_failures(failures: impl IntoIterator<Item = UseCaseError>) -> Option<UseCaseError> {
    let mut messages = Vec::new();
    let mut code = None;
    let mut level = None;
    for error in failures {
        messages.extend(error.messages().iter().cloned());
        code = code.or(error.code());
        level = level.or(Some(error.level()));
    }
    let level = level?;
    let merged = UseCaseError::from_messages(messages).with_level(level);
    Some(match code {
        Some(code) => merged.with_code(code),
        None => merged,
    })
}
