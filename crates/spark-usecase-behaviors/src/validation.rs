//! 请求校验。

use std::marker::PhantomData;

use spark_usecase::{
    Behavior, InvocationContext, LogSeverity, Next, Request, UseCaseError, UseCaseResult,
    async_trait,
};

/// 校验失败结果携带的错误码。
pub const VALIDATION_FAILED_CODE: i32 = 400;

/// 可自我校验的请求。
pub trait Validate: Request {
    /// 返回全部违反的规则描述；空列表表示通过。
    fn validate(&self) -> Vec<String>;
}

/// 在 Handler 之前执行 [`Validate`] 的 Behavior。
///
/// 校验不通过时以错误码 [`VALIDATION_FAILED_CODE`]、`Warn` 级别短路，列出全部违反项，
/// 续延与 Handler 都不会被调用。
pub struct ValidationBehavior<R> {
    _request: PhantomData<fn(&R)>,
}

impl<R> ValidationBehavior<R> {
    pub fn new() -> Self {
        Self {
            _request: PhantomData,
        }
    }
}

impl<R> Default for ValidationBehavior<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for ValidationBehavior<R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for ValidationBehavior<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationBehavior")
            .field("request", &std::any::type_name::<R>())
            .finish()
    }
}

#[async_trait]
impl<R: Validate> Behavior<R> for ValidationBehavior<R> {
    async fn handle(
        &self,
        request: &R,
        _ctx: &InvocationContext,
        next: Next<'_, R>,
    ) -> UseCaseResult<R::Output> {
        let violations = request.validate();
        if violations.is_empty() {
            return next.run().await;
        }
        UseCaseResult::failure(
            UseCaseError::from_messages(violations)
                .with_code(VALIDATION_FAILED_CODE)
                .with_level(LogSeverity::Warn),
        )
    }
}
