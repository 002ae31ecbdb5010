//! 分派器：解析 Handler 与 Behavior，组合管线并执行。
//!
//! # 教案式说明
//! - **意图（Why）**：调用方只面对 `execute(request, cancellation)` 一个入口，得到统一的
//!   [`UseCaseResult`]；配置错误（缺少 Handler）与意外故障（panic）都在此边界转换为失败结果。
//! - **逻辑（How）**：
//!   1. 通过 [`ServiceResolver`] 解析请求类型唯一的 Handler，缺失则返回
//!      `no handler registered for <type>`；
//!   2. 按“单次调用 Behavior 在前、全局 Behavior 在后”的顺序收集作用于该请求的 Behavior；
//!   3. 交给 [`compose`] 组合并执行，以 `catch_unwind` 捕获逃逸的 panic，转换为
//!      `error executing use case: <message>`。
//! - **契约（What）**：请求按值传入，因此“缺失请求”在类型层面不可能出现；分派不做幂等保证。

use std::any::type_name;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::behavior::{Behavior, Next};
use crate::cancellation::Cancellation;
use crate::chain::Chain;
use crate::config::DispatcherSettings;
use crate::error::UseCaseError;
use crate::fault::panic_message;
use crate::observability::{KeyValue, Logger};
use crate::pipeline::compose;
use crate::registry::{Registry, ServiceResolver};
use crate::request::Request;
use crate::result::UseCaseResult;
use crate::scope::{ExecutionScope, InvocationContext};

/// 缺少 Handler 时失败消息的前缀。
pub const NO_HANDLER_MESSAGE: &str = "no handler registered for";

/// 管线中逃逸的故障被转换后的消息前缀。
pub const EXECUTION_FAULT_MESSAGE: &str = "error executing use case";

/// 用例分派器。
///
/// 克隆代价低廉：解析器、Logger 与配置均以 `Arc` 共享。
pub struct Dispatcher<S: ServiceResolver = Registry> {
    resolver: Arc<S>,
    logger: Option<Arc<dyn Logger>>,
    settings: Arc<DispatcherSettings>,
}

impl<S: ServiceResolver> Dispatcher<S> {
    /// 以解析器构造分派器，默认不输出日志。
    pub fn new(resolver: S) -> Self {
        Self::from_shared(Arc::new(resolver))
    }

    /// 以已共享的解析器构造分派器。
    pub fn from_shared(resolver: Arc<S>) -> Self {
        Self {
            resolver,
            logger: None,
            settings: Arc::new(DispatcherSettings::default()),
        }
    }

    /// 注入 Logger，用于记录失败结果。
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 替换失败日志配置。
    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// 解析器。
    pub fn resolver(&self) -> &S {
        &self.resolver
    }

    /// 已注入的 Logger。
    pub fn logger(&self) -> Option<&Arc<dyn Logger>> {
        self.logger.as_ref()
    }

    /// 失败日志配置。
    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// 执行单个请求。
    pub async fn execute<R: Request>(
        &self,
        request: R,
        cancellation: &Cancellation,
    ) -> UseCaseResult<R::Output> {
        self.execute_with(request, cancellation, Vec::new()).await
    }

    /// 执行单个请求，并附带只对本次调用生效的 Behavior。
    ///
    /// 单次调用 Behavior 位于全局 Behavior 之外，按给定顺序由外向内执行。
    pub async fn execute_with<R: Request>(
        &self,
        request: R,
        cancellation: &Cancellation,
        behaviors: Vec<Arc<dyn Behavior<R>>>,
    ) -> UseCaseResult<R::Output> {
        self.dispatch(
            request,
            ExecutionScope::single(),
            cancellation.clone(),
            behaviors,
        )
        .await
    }

    /// 以当前分派器开启一条空链。
    pub fn chain(&self) -> Chain<(), S> {
        Chain::new(self.clone())
    }

    pub(crate) async fn dispatch<R: Request>(
        &self,
        request: R,
        scope: ExecutionScope,
        cancellation: Cancellation,
        per_call: Vec<Arc<dyn Behavior<R>>>,
    ) -> UseCaseResult<R::Output> {
        let request_name = request.name();
        let Some(handler) = self.resolver.resolve_handler::<R>() else {
            let result = UseCaseResult::fail(format!("{NO_HANDLER_MESSAGE} {}", type_name::<R>()));
            self.report_result(&result, request_name);
            return result;
        };

        let ctx = InvocationContext::new(scope, cancellation);
        let invocation = async {
            let mut behaviors: Vec<Arc<dyn Behavior<R>>> = per_call
                .into_iter()
                .filter(|behavior| behavior.applies_to(&request))
                .collect();
            behaviors.extend(self.resolver.resolve_behaviors(&request));
            let terminal = Next::new(|| handler.handle(&request, &ctx));
            compose(&request, &ctx, &behaviors, terminal).run().await
        };

        let result = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => UseCaseResult::fail(format!(
                "{EXECUTION_FAULT_MESSAGE}: {}",
                panic_message(payload.as_ref())
            )),
        };
        self.report_result(&result, request_name);
        result
    }

    fn report_result<T>(&self, result: &UseCaseResult<T>, origin: &str) {
        if let Some(error) = result.error_or_missing() {
            self.report_failure(&error, origin);
        }
    }

    /// 在满足配置条件时记录失败，每个错误至多记录一次。
    pub(crate) fn report_failure(&self, error: &UseCaseError, origin: &str) {
        let Some(logger) = self.logger.as_ref() else {
            return;
        };
        if !self.settings.log_failures || error.level() < self.settings.min_failure_level {
            return;
        }
        if !error.mark_logged() {
            return;
        }
        let code = error.code().map(|code| code.to_string()).unwrap_or_default();
        let fields = [
            KeyValue::new("usecase.origin", origin),
            KeyValue::new("usecase.code", code),
        ];
        logger.log_with_fields(
            error.level(),
            Some(self.settings.log_target.as_str()),
            &error.to_string(),
            &fields,
        );
    }
}

impl<S: ServiceResolver> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            logger: self.logger.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S: ServiceResolver + fmt::Debug> fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resolver", &self.resolver)
            .field("has_logger", &self.logger.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
