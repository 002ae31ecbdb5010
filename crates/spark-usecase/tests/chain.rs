//! 链式执行：值传递、快速失败、失败处理、取消与链级故障捕获。

mod support;

use std::sync::Arc;

use spark_usecase::{
    Behavior, Cancellation, Dispatcher, InvocationContext, Next, UseCaseError, UseCaseResult,
    async_trait,
};
use support::{Echo, Increment, Parse, RecordingLogger, Trace, Tracer, registry_with_handlers};

fn dispatcher(trace: &Trace) -> Dispatcher {
    Dispatcher::new(registry_with_handlers(trace))
}

#[tokio::test]
async fn empty_chain_succeeds_with_unit() {
    let chain = dispatcher(&Trace::default()).chain();
    assert!(chain.is_empty());
    assert!(chain.execute(&Cancellation::new()).await.is_success());
}

#[tokio::test]
async fn values_flow_from_step_to_step() {
    let trace = Trace::default();
    let chain = dispatcher(&trace)
        .chain()
        .then_request(|| Echo("20".to_owned()))
        .then(Parse)
        .then(Increment)
        .then(Increment);

    let result = chain.execute(&Cancellation::new()).await;

    assert_eq!(chain.len(), 4);
    assert_eq!(result.into_value(), Some(22));
    assert_eq!(
        trace.events(),
        ["echo:20", "parse:20", "increment:20", "increment:21"]
    );
}

#[tokio::test]
async fn failure_at_step_k_stops_the_chain_unchanged() {
    let trace = Trace::default();
    let chain = dispatcher(&trace)
        .chain()
        .then_request(|| Echo("x".to_owned()))
        .then(|text: String| Parse(text))
        .then(Increment)
        .then(Increment);

    let result = chain.execute(&Cancellation::new()).await;

    assert_eq!(result.error().map(UseCaseError::message), Some("bad input"));
    assert_eq!(trace.events(), ["echo:x", "parse:x"]);
}

#[tokio::test]
async fn on_error_fallback_replaces_the_failure() {
    let chain = dispatcher(&Trace::default())
        .chain()
        .then_request(|| Echo("x".to_owned()))
        .then(Parse)
        .on_error(|error| {
            assert_eq!(error.message(), "bad input");
            UseCaseResult::success(-1)
        });

    let result = chain.execute(&Cancellation::new()).await;

    assert_eq!(result.into_value(), Some(-1));
}

#[tokio::test]
async fn on_error_is_not_consulted_on_success() {
    let chain = dispatcher(&Trace::default())
        .chain()
        .then_request(|| Echo("7".to_owned()))
        .then(Parse)
        .on_error(|_| UseCaseResult::fail("unreachable"));

    assert_eq!(chain.execute(&Cancellation::new()).await.into_value(), Some(7));
}

#[tokio::test]
async fn chains_are_persistent_and_re_executable() {
    let trace = Trace::default();
    let base = dispatcher(&trace)
        .chain()
        .then_request(|| Echo("1".to_owned()))
        .then(Parse);
    let extended = base.then(Increment);

    assert_eq!(base.len(), 2);
    assert_eq!(extended.len(), 3);
    assert_eq!(base.execute(&Cancellation::new()).await.into_value(), Some(1));
    assert_eq!(extended.execute(&Cancellation::new()).await.into_value(), Some(2));
    assert_eq!(extended.execute(&Cancellation::new()).await.into_value(), Some(2));
    assert_eq!(trace.events().len(), 2 + 3 + 3);
}

struct CancelAfter {
    cancellation: Cancellation,
}

#[async_trait]
impl Behavior<Parse> for CancelAfter {
    async fn handle(
        &self,
        _request: &Parse,
        _ctx: &InvocationContext,
        next: Next<'_, Parse>,
    ) -> UseCaseResult<i64> {
        let result = next.run().await;
        self.cancellation.cancel();
        result
    }
}

#[tokio::test]
async fn cancellation_between_steps_yields_a_distinct_failure() {
    let trace = Trace::default();
    let cancellation = Cancellation::new();
    let cancel_after_parse: Arc<dyn Behavior<Parse>> = Arc::new(CancelAfter {
        cancellation: cancellation.clone(),
    });
    let chain = dispatcher(&trace)
        .chain()
        .then_request(|| Echo("3".to_owned()))
        .then_with(Parse, vec![cancel_after_parse])
        .then(Increment);

    let result = chain.execute(&cancellation).await;

    assert_eq!(
        result.error().map(UseCaseError::message),
        Some("chain execution was cancelled")
    );
    assert_eq!(trace.events(), ["echo:3", "parse:3"]);
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let trace = Trace::default();
    let cancellation = Cancellation::new();
    cancellation.cancel();
    let chain = dispatcher(&trace)
        .chain()
        .then_request(|| Echo("3".to_owned()));

    let result = chain.execute(&cancellation).await;

    assert_eq!(
        result.error().map(UseCaseError::message),
        Some("chain execution was cancelled")
    );
    assert!(trace.events().is_empty());
}

#[tokio::test]
async fn builder_panic_is_caught_at_chain_level() {
    let chain = dispatcher(&Trace::default())
        .chain()
        .then_request(|| Echo("5".to_owned()))
        .then(|_text: String| -> Parse { panic!("builder exploded") });

    let result = chain.execute(&Cancellation::new()).await;

    assert_eq!(
        result.error().map(UseCaseError::message),
        Some("exception during chain execution: builder exploded")
    );
}

#[tokio::test]
async fn chain_level_fault_is_routed_through_on_error() {
    let chain = dispatcher(&Trace::default())
        .chain()
        .then_request(|| -> Echo { panic!("no request today") })
        .on_error(|error| UseCaseResult::success(format!("recovered from {}", error.message())));

    let result = chain.execute(&Cancellation::new()).await;

    assert_eq!(
        result.into_value().as_deref(),
        Some("recovered from exception during chain execution: no request today")
    );
}

#[tokio::test]
async fn step_behaviors_see_chain_scope() {
    let trace = Trace::default();
    let scopes = Trace::default();

    struct ScopeRecorder(Trace);

    #[async_trait]
    impl Behavior<Increment> for ScopeRecorder {
        async fn handle(
            &self,
            _request: &Increment,
            ctx: &InvocationContext,
            next: Next<'_, Increment>,
        ) -> UseCaseResult<i64> {
            let scope = ctx.scope();
            self.0.push(format!(
                "chain={} first={} last={}",
                scope.is_chain(),
                scope.is_first(),
                scope.is_last()
            ));
            next.run().await
        }
    }

    let recorder: Arc<dyn Behavior<Increment>> = Arc::new(ScopeRecorder(scopes.clone()));
    let chain = dispatcher(&trace)
        .chain()
        .then_request(|| Increment(0))
        .then_with(Increment, vec![Arc::clone(&recorder)])
        .then_with(Increment, vec![recorder]);

    assert_eq!(chain.execute(&Cancellation::new()).await.into_value(), Some(3));
    assert_eq!(
        scopes.events(),
        [
            "chain=true first=false last=false",
            "chain=true first=false last=true",
        ]
    );
}

#[tokio::test]
async fn per_step_behaviors_apply_only_to_their_step() {
    let trace = Trace::default();
    let chain = dispatcher(&trace)
        .chain()
        .then_request(|| Echo("9".to_owned()))
        .then_with(Parse, vec![Tracer::shared::<Parse>("step2", &trace)]);

    assert_eq!(chain.execute(&Cancellation::new()).await.into_value(), Some(9));
    assert_eq!(
        trace.events(),
        ["echo:9", "step2:before", "parse:9", "step2:after"]
    );
}

#[tokio::test]
async fn chain_failure_is_logged_exactly_once() {
    let logger = RecordingLogger::default();
    let chain = Dispatcher::new(registry_with_handlers(&Trace::default()))
        .with_logger(Arc::new(logger.clone()))
        .chain()
        .then_request(|| Echo("x".to_owned()))
        .then(Parse);

    let result = chain.execute(&Cancellation::new()).await;

    assert!(!result.is_success());
    assert_eq!(logger.messages(), ["bad input"]);
}
