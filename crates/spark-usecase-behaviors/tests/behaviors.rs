//! 内置 Behavior 在真实分派器中的表现。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use spark_usecase::{
    Behavior, Cancellation, Dispatcher, LogRecord, LogSeverity, Logger, Registry, Request,
    UseCaseError, UseCaseResult,
};
use spark_usecase_behaviors::{
    Cacheable, CachingBehavior, CachingBehaviorConfig, LoggingBehavior, TimingBehavior,
    TimingBehaviorConfig, TimingSink, VALIDATION_FAILED_CODE, Validate, ValidationBehavior,
};

#[derive(Clone, Default)]
struct RecordingLogger {
    records: Arc<Mutex<Vec<(LogSeverity, String)>>>,
}

impl RecordingLogger {
    fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn severities(&self) -> Vec<LogSeverity> {
        self.records.lock().iter().map(|(severity, _)| *severity).collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        self.records
            .lock()
            .push((record.severity, record.message.to_string()));
    }
}

struct CreateUser {
    name: String,
    age: u32,
}

impl Request for CreateUser {
    type Output = u64;
}

impl Validate for CreateUser {
    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.name.trim().is_empty() {
            violations.push("name is required".to_owned());
        }
        if self.age < 18 {
            violations.push("age must be at least 18".to_owned());
        }
        violations
    }
}

struct Square(u64);

impl Request for Square {
    type Output = u64;
}

impl Cacheable for Square {
    type Key = u64;

    fn cache_key(&self) -> u64 {
        self.0
    }
}

fn registry(calls: &Arc<AtomicUsize>) -> Registry {
    let mut registry = Registry::new();
    let create_calls = Arc::clone(calls);
    let square_calls = Arc::clone(calls);
    registry
        .register_handler_fn::<CreateUser, _>(move |_request| {
            create_calls.fetch_add(1, Ordering::SeqCst);
            UseCaseResult::success(7)
        })
        .register_handler_fn::<Square, _>(move |request| {
            square_calls.fetch_add(1, Ordering::SeqCst);
            if request.0 == 13 {
                UseCaseResult::fail("unlucky")
            } else {
                UseCaseResult::success(request.0 * request.0)
            }
        });
    registry
}

#[tokio::test]
async fn validation_short_circuits_with_every_violation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = registry(&calls);
    registry.register_behavior::<CreateUser, _>(ValidationBehavior::<CreateUser>::new());
    let dispatcher = Dispatcher::new(registry);

    let rejected = dispatcher
        .execute(
            CreateUser {
                name: " ".to_owned(),
                age: 12,
            },
            &Cancellation::new(),
        )
        .await;

    let error = rejected.error().expect("validation failure");
    assert_eq!(error.messages(), ["name is required", "age must be at least 18"]);
    assert_eq!(error.code(), Some(VALIDATION_FAILED_CODE));
    assert_eq!(error.level(), LogSeverity::Warn);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let accepted = dispatcher
        .execute(
            CreateUser {
                name: "ada".to_owned(),
                age: 36,
            },
            &Cancellation::new(),
        )
        .await;
    assert_eq!(accepted.into_value(), Some(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caching_serves_repeated_requests_without_the_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CachingBehavior::<Square>::new(CachingBehaviorConfig::default());
    let mut registry = registry(&calls);
    registry.register_behavior::<Square, _>(cache.clone());
    let dispatcher = Dispatcher::new(registry);
    let cancellation = Cancellation::new();

    assert_eq!(dispatcher.execute(Square(4), &cancellation).await.into_value(), Some(16));
    assert_eq!(dispatcher.execute(Square(4), &cancellation).await.into_value(), Some(16));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    cache.invalidate(&4);
    assert_eq!(dispatcher.execute(Square(4), &cancellation).await.into_value(), Some(16));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn caching_never_stores_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CachingBehavior::<Square>::new(CachingBehaviorConfig::default());
    let mut registry = registry(&calls);
    registry.register_behavior::<Square, _>(cache.clone());
    let dispatcher = Dispatcher::new(registry);
    let cancellation = Cancellation::new();

    for _ in 0..2 {
        let result = dispatcher.execute(Square(13), &cancellation).await;
        assert_eq!(result.error().map(UseCaseError::message), Some("unlucky"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn caching_respects_ttl_and_capacity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CachingBehavior::<Square>::new(CachingBehaviorConfig {
        ttl: Duration::from_millis(250),
        max_entries: 2,
    });
    let mut registry = registry(&calls);
    registry.register_behavior::<Square, _>(cache.clone());
    let dispatcher = Dispatcher::new(registry);
    let cancellation = Cancellation::new();

    for n in 1..=3 {
        assert!(dispatcher.execute(Square(n), &cancellation).await.is_success());
    }
    assert_eq!(cache.len(), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let before = calls.load(Ordering::SeqCst);
    assert!(dispatcher.execute(Square(3), &cancellation).await.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_never_exceed_capacity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CachingBehavior::<Square>::new(CachingBehaviorConfig {
        ttl: Duration::from_secs(60),
        max_entries: 4,
    });
    let mut registry = registry(&calls);
    registry.register_behavior::<Square, _>(cache.clone());
    let dispatcher = Dispatcher::new(registry);

    let mut tasks = Vec::new();
    for n in 100..164_u64 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher.execute(Square(n), &Cancellation::new()).await
        }));
    }
    for task in tasks {
        assert!(task.await.expect("cache task").is_success());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 64);
    assert!(cache.len() <= 4);
}

#[tokio::test]
async fn zero_capacity_disables_caching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CachingBehavior::<Square>::new(CachingBehaviorConfig {
        ttl: Duration::from_secs(60),
        max_entries: 0,
    });
    let per_call: Vec<Arc<dyn Behavior<Square>>> = vec![Arc::new(cache.clone())];
    let dispatcher = Dispatcher::new(registry(&calls));
    let cancellation = Cancellation::new();

    for _ in 0..3 {
        let result = dispatcher
            .execute_with(Square(2), &cancellation, per_call.clone())
            .await;
        assert!(result.is_success());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn logging_records_lifecycle_and_failures_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let logger = RecordingLogger::default();
    let mut registry = registry(&calls);
    registry.register_universal(LoggingBehavior::with_logger(Arc::new(logger.clone())));
    let dispatcher = Dispatcher::new(registry).with_logger(Arc::new(logger.clone()));
    let cancellation = Cancellation::new();

    assert!(dispatcher.execute(Square(2), &cancellation).await.is_success());
    assert!(!dispatcher.execute(Square(13), &cancellation).await.is_success());

    assert_eq!(
        logger.messages(),
        [
            "use case started",
            "use case completed",
            "use case started",
            "unlucky",
        ]
    );
    assert_eq!(
        logger.severities(),
        [
            LogSeverity::Info,
            LogSeverity::Info,
            LogSeverity::Info,
            LogSeverity::Error,
        ]
    );
}

#[derive(Default)]
struct RecordingSink {
    samples: Mutex<Vec<(&'static str, bool)>>,
}

impl TimingSink for RecordingSink {
    fn record(&self, request: &'static str, _elapsed: Duration, succeeded: bool) {
        self.samples.lock().push((request, succeeded));
    }
}

#[tokio::test]
async fn timing_reports_to_sink_and_warns_on_slow_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let logger = RecordingLogger::default();
    let sink = Arc::new(RecordingSink::default());
    let timing = TimingBehavior::new(
        TimingBehaviorConfig {
            slow_threshold: Duration::ZERO,
            ..TimingBehaviorConfig::default()
        },
        Arc::new(logger.clone()),
    )
    .with_sink(sink.clone());
    let mut registry = registry(&calls);
    registry.register_universal(timing);
    let dispatcher = Dispatcher::new(registry);
    let cancellation = Cancellation::new();

    assert!(dispatcher.execute(Square(3), &cancellation).await.is_success());
    assert!(!dispatcher.execute(Square(13), &cancellation).await.is_success());

    let samples = sink.samples.lock().clone();
    assert_eq!(samples.len(), 2);
    assert!(samples[0].0.ends_with("Square") && samples[0].1);
    assert!(!samples[1].1);
    assert!(
        logger
            .severities()
            .iter()
            .all(|severity| *severity == LogSeverity::Warn || *severity == LogSeverity::Debug)
    );
}
