use std::borrow::Cow;
use std::sync::Arc;

use spark_usecase::{
    DispatcherSettings, ErasedNext, InvocationContext, KeyValue, LogSeverity, Logger, Outcome,
    RequestRef, UniversalBehavior, async_trait,
};

/// 日志字段键常量，保持跨请求的命名一致性。
const ATTR_REQUEST: &str = "spark.usecase.logging.request";
const ATTR_OUTPUT: &str = "spark.usecase.logging.output";
const ATTR_EVENT: &str = "spark.usecase.logging.event";
const ATTR_CODE: &str = "spark.usecase.logging.code";
const ATTR_CHAIN: &str = "spark.usecase.logging.chain";

/// 日志 Behavior 的配置。
///
/// # 教案式说明
/// - **意图（Why）**：不同业务对日志目标与级别的要求不同，配置将差异外部化，Behavior 本身保持无状态。
/// - **契约（What）**：
///   - `target`：面向日志后端的分类标签；
///   - `severity`：开始/完成事件的日志级别，失败事件使用错误自身携带的级别。
/// - **风险提示（Trade-offs）**：高频用例若使用 `Info` 级别可能造成日志风暴，可调低为 `Debug`。
#[derive(Clone, Debug)]
pub struct LoggingBehaviorConfig {
    pub target: Cow<'static, str>,
    pub severity: LogSeverity,
}

impl LoggingBehaviorConfig {
    /// 从分派器配置派生：沿用其日志目标。
    pub fn from_settings(settings: &DispatcherSettings) -> Self {
        Self {
            target: Cow::Owned(settings.log_target.clone()),
            ..Self::default()
        }
    }
}

impl Default for LoggingBehaviorConfig {
    fn default() -> Self {
        Self {
            target: Cow::Borrowed("spark.usecase.logging"),
            severity: LogSeverity::Info,
        }
    }
}

/// 记录用例开始、完成与失败的通用 Behavior。
///
/// # 教案式说明
/// - **意图（Why）**：统一在管线中记录用例生命周期，避免各 Handler 手写重复的日志代码。
/// - **逻辑（How）**：续延前记录 `started`；续延后成功记录 `completed`，失败时仅当赢得错误的
///   一次性“已记录”标记才输出，避免嵌套层次重复记录同一错误。
/// - **契约（What）**：从不改写结果。
#[derive(Clone)]
pub struct LoggingBehavior {
    inner: Arc<LoggingBehaviorInner>,
}

struct LoggingBehaviorInner {
    config: LoggingBehaviorConfig,
    logger: Arc<dyn Logger>,
}

impl LoggingBehavior {
    /// 基于配置与 Logger 构造。
    pub fn new(config: LoggingBehaviorConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            inner: Arc::new(LoggingBehaviorInner { config, logger }),
        }
    }

    /// 以默认配置构造。
    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        Self::new(LoggingBehaviorConfig::default(), logger)
    }

    fn log_event(&self, severity: LogSeverity, message: &str, attributes: &[KeyValue<'_>]) {
        self.inner.logger.log_with_fields(
            severity,
            Some(self.inner.config.target.as_ref()),
            message,
            attributes,
        );
    }
}

#[async_trait]
impl UniversalBehavior for LoggingBehavior {
    async fn handle(
        &self,
        request: RequestRef<'_>,
        ctx: &InvocationContext,
        next: ErasedNext<'_>,
    ) -> Outcome {
        let chain = ctx
            .scope()
            .chain_id()
            .map(|id| id.to_string())
            .unwrap_or_default();
        let started = [
            KeyValue::new(ATTR_EVENT, "started"),
            KeyValue::new(ATTR_REQUEST, request.name()),
            KeyValue::new(ATTR_OUTPUT, request.output_type()),
            KeyValue::new(ATTR_CHAIN, chain.as_str()),
        ];
        self.log_event(self.inner.config.severity, "use case started", &started);

        let outcome = next.run().await;

        match outcome.error() {
            None => {
                let fields = [
                    KeyValue::new(ATTR_EVENT, "completed"),
                    KeyValue::new(ATTR_REQUEST, request.name()),
                ];
                self.log_event(self.inner.config.severity, "use case completed", &fields);
            }
            Some(error) if error.mark_logged() => {
                let code = error.code().map(|code| code.to_string()).unwrap_or_default();
                let fields = [
                    KeyValue::new(ATTR_EVENT, "failed"),
                    KeyValue::new(ATTR_REQUEST, request.name()),
                    KeyValue::new(ATTR_CODE, code),
                ];
                self.log_event(error.level(), &error.to_string(), &fields);
            }
            Some(_) => {}
        }
        outcome
    }
}
