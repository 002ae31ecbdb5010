//! 链式执行引擎。
//!
//! # 教案式说明
//! - **意图（Why）**：把多个请求串成一个工作单元，上一步的成功值成为下一步请求的构造输入，
//!   任一步失败即停止；作用域感知的 Behavior（例如事务）据此把整条链视为一个单元。
//! - **结构（How）**：
//!   - [`Chain`] 是持久化值：步骤以 `Arc` 单链表保存，追加步骤返回共享既有步骤的新链，
//!     原链保持不变，可以重复执行；
//!   - 每一步把“请求构造闭包 + 单步 Behavior”擦除为统一签名，值以 `Box<dyn Any + Send>` 传递；
//!   - 执行时才确定总步数，从而计算每一步的 `is_first`/`is_last`。
//! - **契约（What）**：
//!   - 每一步之前检查取消信号，已取消则以 `chain execution was cancelled` 失败结束；
//!   - 首个失败立即终止后续步骤；配置了 [`Chain::on_error`] 时由其决定最终结果，否则原样返回；
//!   - 步骤中逃逸的故障（请求构造或管线）在链级被捕获一次，转换为
//!     `exception during chain execution: <message>`；
//!   - 无论以何种方式结束，执行末尾都会以链是否成功为参数运行链句柄上登记的收尾回调，
//!     回调返回的错误会把成功的链转为失败；
//!   - 执行结果不做记忆，重复执行会重新运行每一步。

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::behavior::Behavior;
use crate::cancellation::Cancellation;
use crate::dispatcher::Dispatcher;
use crate::error::UseCaseError;
use crate::fault::panic_message;
use crate::registry::{Registry, ServiceResolver};
use crate::request::Request;
use crate::result::UseCaseResult;
use crate::scope::{ChainHandle, ExecutionScope};

/// 链在步骤之间被取消时的失败消息。
pub const CHAIN_CANCELLED_MESSAGE: &str = "chain execution was cancelled";

/// 链级捕获故障后的消息前缀。
pub const CHAIN_FAULT_MESSAGE: &str = "exception during chain execution";

type ErasedValue = Box<dyn Any + Send>;
type StepFuture = BoxFuture<'static, UseCaseResult<ErasedValue>>;
type StepFn<S> =
    Arc<dyn Fn(Dispatcher<S>, ErasedValue, ExecutionScope, Cancellation) -> StepFuture + Send + Sync>;
type ErrorHandler<T> = dyn Fn(UseCaseError) -> UseCaseResult<T> + Send + Sync;

struct StepNode<S: ServiceResolver> {
    run: StepFn<S>,
    previous: Option<Arc<StepNode<S>>>,
}

/// 由若干步骤组成、最终产出 `T` 的请求链。
///
/// 空链以 `()` 作为种子值，执行结果为 `success(())`。
pub struct Chain<T, S: ServiceResolver = Registry> {
    dispatcher: Dispatcher<S>,
    last: Option<Arc<StepNode<S>>>,
    len: usize,
    _output: PhantomData<fn() -> T>,
}

impl<S: ServiceResolver> Chain<(), S> {
    /// 基于分派器创建空链。
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self {
            dispatcher,
            last: None,
            len: 0,
            _output: PhantomData,
        }
    }
}

impl<T, S> Chain<T, S>
where
    T: Send + 'static,
    S: ServiceResolver,
{
    /// 追加一步：以上一步的成功值构造下一个请求。
    pub fn then<R, F>(&self, builder: F) -> Chain<R::Output, S>
    where
        R: Request,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.then_with(builder, Vec::new())
    }

    /// 追加一步：请求不依赖上一步的值。
    pub fn then_request<R, F>(&self, builder: F) -> Chain<R::Output, S>
    where
        R: Request,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.then_with(move |_previous: T| builder(), Vec::new())
    }

    /// 追加一步，并附带只作用于该步的 Behavior。
    pub fn then_with<R, F>(&self, builder: F, behaviors: Vec<Arc<dyn Behavior<R>>>) -> Chain<R::Output, S>
    where
        R: Request,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let builder = Arc::new(builder);
        let behaviors: Arc<[Arc<dyn Behavior<R>>]> = behaviors.into();
        let run: StepFn<S> = Arc::new(
            move |dispatcher: Dispatcher<S>,
                  input: ErasedValue,
                  scope: ExecutionScope,
                  cancellation: Cancellation|
                  -> StepFuture {
                let builder = Arc::clone(&builder);
                let behaviors = behaviors.to_vec();
                Box::pin(async move {
                    let previous = match input.downcast::<T>() {
                        Ok(previous) => *previous,
                        Err(_) => {
                            return UseCaseResult::fail(format!(
                                "chain step expected a value of type {}",
                                type_name::<T>()
                            ));
                        }
                    };
                    let request = (*builder)(previous);
                    dispatcher
                        .dispatch(request, scope, cancellation, behaviors)
                        .await
                        .map(|output| Box::new(output) as ErasedValue)
                })
            },
        );
        Chain {
            dispatcher: self.dispatcher.clone(),
            last: Some(Arc::new(StepNode {
                run,
                previous: self.last.clone(),
            })),
            len: self.len + 1,
            _output: PhantomData,
        }
    }

    /// 步骤数。
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否没有任何步骤。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 为链配置失败处理：链失败时以其返回值作为最终结果。
    pub fn on_error<F>(&self, handler: F) -> RecoveringChain<T, S>
    where
        F: Fn(UseCaseError) -> UseCaseResult<T> + Send + Sync + 'static,
    {
        RecoveringChain {
            chain: self.clone(),
            handler: Arc::new(handler),
        }
    }

    /// 执行整条链。
    pub async fn execute(&self, cancellation: &Cancellation) -> UseCaseResult<T> {
        self.run(cancellation, None).await
    }

    async fn run(
        &self,
        cancellation: &Cancellation,
        recover: Option<&ErrorHandler<T>>,
    ) -> UseCaseResult<T> {
        let steps = self.steps();
        let handle = ChainHandle::new();

        let execution = AssertUnwindSafe(self.run_steps(&steps, &handle, cancellation))
            .catch_unwind()
            .await;

        let mut result = match execution {
            Ok(erased) => restore::<T>(erased),
            Err(payload) => UseCaseResult::fail(format!(
                "{CHAIN_FAULT_MESSAGE}: {}",
                panic_message(payload.as_ref())
            )),
        };
        if let Some(error) = self.finalize(&handle, result.is_success()).await {
            result = UseCaseResult::failure(error);
        }
        if result.is_success() {
            return result;
        }
        if let Some(error) = result.error() {
            self.dispatcher.report_failure(error, "chain");
        }
        match (recover, result.error_or_missing()) {
            (Some(handler), Some(error)) => {
                match std::panic::catch_unwind(AssertUnwindSafe(|| handler(error))) {
                    Ok(recovered) => recovered,
                    Err(payload) => UseCaseResult::fail(format!(
                        "{CHAIN_FAULT_MESSAGE}: {}",
                        panic_message(payload.as_ref())
                    )),
                }
            }
            _ => result,
        }
    }

    async fn run_steps(
        &self,
        steps: &[StepFn<S>],
        handle: &Arc<ChainHandle>,
        cancellation: &Cancellation,
    ) -> UseCaseResult<ErasedValue> {
        let total = steps.len();
        let mut value: ErasedValue = Box::new(());
        for (index, step) in steps.iter().enumerate() {
            if cancellation.is_cancelled() {
                return UseCaseResult::fail(CHAIN_CANCELLED_MESSAGE);
            }
            let scope = ExecutionScope::chain_step(Arc::clone(handle), index, total);
            let outcome = (**step)(self.dispatcher.clone(), value, scope, cancellation.clone()).await;
            match outcome.into_parts() {
                (Some(next), None) => value = next,
                (stopped, error) => return UseCaseResult::from_parts(stopped, error),
            }
        }
        UseCaseResult::success(value)
    }

    /// 按逆序运行收尾回调。
    ///
    /// 链成功时，第一个失败或 panic 的回调决定返回的错误，其后的回调看到的是失败的链；
    /// 链已失败时，回调的错误只记录日志。
    async fn finalize(&self, handle: &ChainHandle, succeeded: bool) -> Option<UseCaseError> {
        let mut failure: Option<UseCaseError> = None;
        for finalizer in handle.take_finalizers() {
            let still_succeeded = succeeded && failure.is_none();
            let outcome = AssertUnwindSafe(async move { finalizer(still_succeeded).await })
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(payload) => UseCaseError::new(format!(
                    "{CHAIN_FAULT_MESSAGE}: {}",
                    panic_message(payload.as_ref())
                )),
            };
            if still_succeeded {
                failure = Some(error);
            } else {
                self.dispatcher.report_failure(&error, "chain finalizer");
            }
        }
        failure
    }

    fn steps(&self) -> Vec<StepFn<S>> {
        let mut steps = Vec::with_capacity(self.len);
        let mut cursor = self.last.as_ref();
        while let Some(node) = cursor {
            steps.push(Arc::clone(&node.run));
            cursor = node.previous.as_ref();
        }
        steps.reverse();
        steps
    }
}

fn restore<T: 'static>(erased: UseCaseResult<ErasedValue>) -> UseCaseResult<T> {
    match erased.into_parts() {
        (_, Some(error)) => UseCaseResult::failure(error),
        (None, None) => UseCaseResult::from_option(None),
        (Some(value), None) => match value.downcast::<T>() {
            Ok(value) => UseCaseResult::success(*value),
            Err(_) => UseCaseResult::fail(format!(
                "chain produced a value that is not of type {}",
                type_name::<T>()
            )),
        },
    }
}

impl<T, S: ServiceResolver> Clone for Chain<T, S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            last: self.last.clone(),
            len: self.len,
            _output: PhantomData,
        }
    }
}

impl<T, S: ServiceResolver> fmt::Debug for Chain<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.len)
            .field("output", &type_name::<T>())
            .finish()
    }
}

/// 配置了失败处理的链，只能执行。
pub struct RecoveringChain<T, S: ServiceResolver = Registry> {
    chain: Chain<T, S>,
    handler: Arc<ErrorHandler<T>>,
}

impl<T, S> RecoveringChain<T, S>
where
    T: Send + 'static,
    S: ServiceResolver,
{
    /// 执行整条链，失败时交由处理器决定最终结果。
    pub async fn execute(&self, cancellation: &Cancellation) -> UseCaseResult<T> {
        self.chain.run(cancellation, Some(self.handler.as_ref())).await
    }

    /// 底层链的步骤数。
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// 底层链是否为空。
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl<T, S: ServiceResolver> Clone for RecoveringChain<T, S> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T, S: ServiceResolver> fmt::Debug for RecoveringChain<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveringChain")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}
