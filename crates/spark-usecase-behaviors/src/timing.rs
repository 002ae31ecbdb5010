use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spark_usecase::{
    ErasedNext, InvocationContext, KeyValue, LogSeverity, Logger, Outcome, RequestRef,
    TimingSettings, UniversalBehavior, async_trait,
};

const ATTR_REQUEST: &str = "spark.usecase.timing.request";
const ATTR_ELAPSED_MS: &str = "spark.usecase.timing.elapsed_ms";
const ATTR_SUCCEEDED: &str = "spark.usecase.timing.succeeded";

/// 耗时观测的接收方，例如指标系统。
pub trait TimingSink: Send + Sync + 'static {
    /// 记录一次调用的耗时。
    fn record(&self, request: &'static str, elapsed: Duration, succeeded: bool);
}

/// 计时 Behavior 的配置。
#[derive(Clone, Debug)]
pub struct TimingBehaviorConfig {
    pub target: Cow<'static, str>,
    /// 超过该阈值的调用以 WARN 级别记录，其余以 DEBUG 级别记录。
    pub slow_threshold: Duration,
}

impl TimingBehaviorConfig {
    /// 从计时配置派生。
    pub fn from_settings(settings: &TimingSettings) -> Self {
        Self {
            slow_threshold: settings.slow_threshold(),
            ..Self::default()
        }
    }
}

impl Default for TimingBehaviorConfig {
    fn default() -> Self {
        Self {
            target: Cow::Borrowed("spark.usecase.timing"),
            slow_threshold: TimingSettings::default().slow_threshold(),
        }
    }
}

/// 测量续延耗时的通用 Behavior。
///
/// - **逻辑（How）**：以单调时钟 [`Instant`] 包围续延，结束后写日志并通知可选的 [`TimingSink`]；
/// - **契约（What）**：从不改写结果；续延 panic 时不产生记录。
#[derive(Clone)]
pub struct TimingBehavior {
    config: TimingBehaviorConfig,
    logger: Arc<dyn Logger>,
    sink: Option<Arc<dyn TimingSink>>,
}

impl TimingBehavior {
    /// 基于配置与 Logger 构造。
    pub fn new(config: TimingBehaviorConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            config,
            logger,
            sink: None,
        }
    }

    /// 附加耗时接收方。
    pub fn with_sink(mut self, sink: Arc<dyn TimingSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

#[async_trait]
impl UniversalBehavior for TimingBehavior {
    async fn handle(
        &self,
        request: RequestRef<'_>,
        _ctx: &InvocationContext,
        next: ErasedNext<'_>,
    ) -> Outcome {
        let started = Instant::now();
        let outcome = next.run().await;
        let elapsed = started.elapsed();

        let slow = elapsed > self.config.slow_threshold;
        let (severity, message) = if slow {
            (LogSeverity::Warn, "slow use case")
        } else {
            (LogSeverity::Debug, "use case timed")
        };
        let succeeded = if outcome.is_success() { "true" } else { "false" };
        let fields = [
            KeyValue::new(ATTR_REQUEST, request.name()),
            KeyValue::new(ATTR_ELAPSED_MS, elapsed.as_millis().to_string()),
            KeyValue::new(ATTR_SUCCEEDED, succeeded),
        ];
        self.logger.log_with_fields(
            severity,
            Some(self.config.target.as_ref()),
            message,
            &fields,
        );
        if let Some(sink) = &self.sink {
            sink.record(request.name(), elapsed, outcome.is_success());
        }
        outcome
    }
}
