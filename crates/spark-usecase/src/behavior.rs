//! Handler 与 Behavior 契约。
//!
//! # 教案式说明
//! - **意图（Why）**：Handler 承载用例的业务逻辑；Behavior 在 Handler 周围织入横切关注点
//!   （日志、计时、校验、事务、缓存），两者通过续延 [`Next`] 串联成“洋葱”式管线。
//! - **结构（How）**：
//!   - [`Handler`]/[`Behavior`] 针对具体请求类型实现，注册表按 `TypeId` 存取；
//!   - [`UniversalBehavior`] 以类型擦除的 [`RequestRef`] 与 [`Outcome`] 工作，只需注册一次便对
//!     所有请求类型生效，分派时由 [`UniversalAdapter`] 适配为具体的 `Behavior<R>`；
//! - **契约（What）**：Behavior 可以短路（不调用续延）、改写续延的结果，或让故障继续向外传播；
//!   调用上下文在整条管线中原样传递。

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::UseCaseError;
use crate::request::{Request, RequestRef};
use crate::result::UseCaseResult;
use crate::scope::InvocationContext;

/// 用例处理器：针对一种请求类型产出结果。
#[async_trait]
pub trait Handler<R: Request>: Send + Sync + 'static {
    /// 执行业务逻辑。预期内的失败应以失败结果返回，而不是 panic。
    async fn handle(&self, request: &R, ctx: &InvocationContext) -> UseCaseResult<R::Output>;
}

/// 以同步闭包实现的处理器，供 [`Registry::register_handler_fn`](crate::Registry::register_handler_fn) 使用。
pub struct FnHandler<R, F> {
    func: F,
    _request: PhantomData<fn(&R)>,
}

impl<R, F> FnHandler<R, F> {
    /// 包装闭包。
    pub fn new(func: F) -> Self {
        Self {
            func,
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R, F> Handler<R> for FnHandler<R, F>
where
    R: Request,
    F: Fn(&R) -> UseCaseResult<R::Output> + Send + Sync + 'static,
{
    async fn handle(&self, request: &R, _ctx: &InvocationContext) -> UseCaseResult<R::Output> {
        (self.func)(request)
    }
}

/// 管线中的续延：调用它即执行下一个 Behavior，或在最内层执行 Handler。
///
/// 续延只能被消费一次；Behavior 不调用它即构成短路。
pub struct Next<'a, R: Request> {
    run: Box<dyn FnOnce() -> BoxFuture<'a, UseCaseResult<R::Output>> + Send + 'a>,
}

impl<'a, R: Request> Next<'a, R> {
    /// 以闭包构造续延。
    pub fn new<F>(run: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, UseCaseResult<R::Output>> + Send + 'a,
    {
        Self { run: Box::new(run) }
    }

    /// 执行续延。
    pub fn run(self) -> BoxFuture<'a, UseCaseResult<R::Output>> {
        (self.run)()
    }
}

/// 围绕某一请求类型的横切行为。
///
/// # 教案式说明
/// - **意图 (Why)**：把与业务无关的关注点从 Handler 中剥离，按确定的顺序组合；
/// - **契约 (What)**：
///   - `applies_to` 在分派前调用，返回 `false` 的 Behavior 不会进入管线；
///   - `handle` 必须至多调用一次 `next.run()`；
///   - 实现应当无单次调用状态，可以持有共享协作者。
#[async_trait]
pub trait Behavior<R: Request>: Send + Sync + 'static {
    /// 是否作用于给定请求，默认总是作用。
    fn applies_to(&self, _request: &R) -> bool {
        true
    }

    /// 包裹续延执行。
    async fn handle(
        &self,
        request: &R,
        ctx: &InvocationContext,
        next: Next<'_, R>,
    ) -> UseCaseResult<R::Output>;
}

/// 类型擦除的执行结果，供 [`UniversalBehavior`] 观察或短路。
///
/// # 契约说明（What）
/// - 来自续延的结果保留原始类型化结果，适配器会原样还原，值不会丢失；
/// - 通过 [`Outcome::failure`] 构造的结果代表短路失败。
pub struct Outcome {
    succeeded: bool,
    error: Option<UseCaseError>,
    payload: Option<Box<dyn Any + Send>>,
}

impl Outcome {
    /// 包装类型化结果。
    pub fn from_result<T: Send + 'static>(result: UseCaseResult<T>) -> Self {
        Self {
            succeeded: result.is_success(),
            error: result.error_or_missing(),
            payload: Some(Box::new(result)),
        }
    }

    /// 短路失败。
    pub fn failure(error: UseCaseError) -> Self {
        Self {
            succeeded: false,
            error: Some(error),
            payload: None,
        }
    }

    /// 是否成功。
    pub fn is_success(&self) -> bool {
        self.succeeded
    }

    /// 失败时的错误（缺失值状态为合成错误）。
    pub fn error(&self) -> Option<&UseCaseError> {
        self.error.as_ref()
    }

    /// 还原为类型化结果。
    pub(crate) fn into_result<T: 'static>(self) -> UseCaseResult<T> {
        let fallback = self.error;
        match self.payload.map(|payload| payload.downcast::<UseCaseResult<T>>()) {
            Some(Ok(result)) => *result,
            _ => UseCaseResult::failure(fallback.unwrap_or_else(|| {
                UseCaseError::new("universal behavior returned an outcome of a different request")
            })),
        }
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outcome")
            .field("succeeded", &self.succeeded)
            .field("error", &self.error)
            .finish()
    }
}

/// 类型擦除的续延。
pub struct ErasedNext<'a> {
    run: Box<dyn FnOnce() -> BoxFuture<'a, Outcome> + Send + 'a>,
}

impl<'a> ErasedNext<'a> {
    fn new<F>(run: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Outcome> + Send + 'a,
    {
        Self { run: Box::new(run) }
    }

    /// 执行续延。
    pub fn run(self) -> BoxFuture<'a, Outcome> {
        (self.run)()
    }
}

/// 对所有请求类型生效的通用 Behavior。
///
/// 只注册一次；分派时由 [`UniversalAdapter`] 适配到具体请求类型。
#[async_trait]
pub trait UniversalBehavior: Send + Sync + 'static {
    /// 是否作用于给定请求，默认总是作用。
    fn applies_to(&self, _request: RequestRef<'_>) -> bool {
        true
    }

    /// 包裹续延执行。
    async fn handle(
        &self,
        request: RequestRef<'_>,
        ctx: &InvocationContext,
        next: ErasedNext<'_>,
    ) -> Outcome;
}

/// 把 [`UniversalBehavior`] 适配为任意请求类型的 [`Behavior`]。
#[derive(Clone)]
pub struct UniversalAdapter {
    inner: Arc<dyn UniversalBehavior>,
}

impl UniversalAdapter {
    /// 包装通用 Behavior。
    pub fn new(inner: Arc<dyn UniversalBehavior>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for UniversalAdapter {
    fn applies_to(&self, request: &R) -> bool {
        self.inner.applies_to(RequestRef::new(request))
    }

    async fn handle(
        &self,
        request: &R,
        ctx: &InvocationContext,
        next: Next<'_, R>,
    ) -> UseCaseResult<R::Output> {
        let erased = ErasedNext::new(move || {
            Box::pin(async move { Outcome::from_result(next.run().await) })
        });
        self.inner
            .handle(RequestRef::new(request), ctx, erased)
            .await
            .into_result::<R::Output>()
    }
}
