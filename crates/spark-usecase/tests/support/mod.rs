//! 集成测试共用的请求、Handler 与探针。
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use spark_usecase::{
    Behavior, Cancellation, InvocationContext, LogRecord, LogSeverity, Logger, Next, Request,
    Transaction, TransactionError, TransactionManager, UseCaseResult, async_trait,
};

/// 记录事件顺序的探针。
#[derive(Clone, Default)]
pub struct Trace {
    events: Arc<Mutex<Vec<String>>>,
}

impl Trace {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// 把输入原样返回。
pub struct Echo(pub String);

impl Request for Echo {
    type Output = String;
}

/// 把文本解析为整数，非数字输入以 `bad input` 失败。
pub struct Parse(pub String);

impl Request for Parse {
    type Output = i64;
}

/// 对整数加一。
pub struct Increment(pub i64);

impl Request for Increment {
    type Output = i64;
}

/// Handler 内部 panic 的请求。
pub struct Explode;

impl Request for Explode {
    type Output = ();
}

/// 未注册 Handler 的请求。
pub struct Unregistered;

impl Request for Unregistered {
    type Output = u8;
}

/// 在续延前后记录事件的 Behavior。
pub struct Tracer {
    label: &'static str,
    trace: Trace,
}

impl Tracer {
    pub fn new(label: &'static str, trace: &Trace) -> Self {
        Self {
            label,
            trace: trace.clone(),
        }
    }

    pub fn shared<R: Request>(label: &'static str, trace: &Trace) -> Arc<dyn Behavior<R>> {
        Arc::new(Self::new(label, trace))
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for Tracer {
    async fn handle(
        &self,
        _request: &R,
        _ctx: &InvocationContext,
        next: Next<'_, R>,
    ) -> UseCaseResult<R::Output> {
        self.trace.push(format!("{}:before", self.label));
        let result = next.run().await;
        self.trace.push(format!("{}:after", self.label));
        result
    }
}

/// 构造已注册 `Echo`、`Parse`、`Increment`、`Explode` Handler 的注册表，Handler 执行时写入探针。
pub fn registry_with_handlers(trace: &Trace) -> spark_usecase::Registry {
    let mut registry = spark_usecase::Registry::new();
    let echo_trace = trace.clone();
    let parse_trace = trace.clone();
    let increment_trace = trace.clone();
    registry
        .register_handler_fn::<Echo, _>(move |request| {
            echo_trace.push(format!("echo:{}", request.0));
            UseCaseResult::success(request.0.clone())
        })
        .register_handler_fn::<Parse, _>(move |request| {
            parse_trace.push(format!("parse:{}", request.0));
            match request.0.parse::<i64>() {
                Ok(value) => UseCaseResult::success(value),
                Err(_) => UseCaseResult::fail("bad input"),
            }
        })
        .register_handler_fn::<Increment, _>(move |request| {
            increment_trace.push(format!("increment:{}", request.0));
            UseCaseResult::success(request.0 + 1)
        })
        .register_handler_fn::<Explode, _>(|_request| panic!("kaboom"));
    registry
}

/// 收集日志记录的 Logger。
#[derive(Clone, Default)]
pub struct RecordingLogger {
    records: Arc<Mutex<Vec<(LogSeverity, String)>>>,
}

impl RecordingLogger {
    pub fn records(&self) -> Vec<(LogSeverity, String)> {
        self.records.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|(_, message)| message).collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        self.records
            .lock()
            .push((record.severity, record.message.to_string()));
    }
}

/// 事务调用计数。
#[derive(Default)]
pub struct TransactionCounters {
    pub begin: AtomicUsize,
    pub commit: AtomicUsize,
    pub rollback: AtomicUsize,
    pub release: AtomicUsize,
}

impl TransactionCounters {
    /// `(begin, commit, rollback, release)` 快照。
    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.begin.load(Ordering::SeqCst),
            self.commit.load(Ordering::SeqCst),
            self.rollback.load(Ordering::SeqCst),
            self.release.load(Ordering::SeqCst),
        )
    }
}

/// 可配置故障的事务管理器替身。
#[derive(Clone, Default)]
pub struct FakeTransactions {
    pub counters: Arc<TransactionCounters>,
    pub fail_rollback: bool,
    pub fail_commit: bool,
    pub fail_begin: bool,
    pub panic_rollback: bool,
    pub panic_commit: bool,
}

impl FakeTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_rollback() -> Self {
        Self {
            fail_rollback: true,
            ..Self::default()
        }
    }

    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::default()
        }
    }

    pub fn failing_begin() -> Self {
        Self {
            fail_begin: true,
            ..Self::default()
        }
    }

    pub fn panicking_rollback() -> Self {
        Self {
            panic_rollback: true,
            ..Self::default()
        }
    }

    pub fn panicking_commit() -> Self {
        Self {
            panic_commit: true,
            ..Self::default()
        }
    }
}

struct FakeTransaction {
    counters: Arc<TransactionCounters>,
    fail_rollback: bool,
    fail_commit: bool,
    panic_rollback: bool,
    panic_commit: bool,
}

#[async_trait]
impl Transaction for FakeTransaction {
    async fn commit(&mut self, _cancellation: &Cancellation) -> Result<(), TransactionError> {
        self.counters.commit.fetch_add(1, Ordering::SeqCst);
        if self.panic_commit {
            panic!("driver crashed during commit");
        }
        if self.fail_commit {
            return Err(TransactionError::Commit("disk full".to_owned()));
        }
        Ok(())
    }

    async fn rollback(&mut self, _cancellation: &Cancellation) -> Result<(), TransactionError> {
        self.counters.rollback.fetch_add(1, Ordering::SeqCst);
        if self.panic_rollback {
            panic!("driver crashed during rollback");
        }
        if self.fail_rollback {
            return Err(TransactionError::Rollback("connection lost".to_owned()));
        }
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.counters.release.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionManager for FakeTransactions {
    async fn begin(
        &self,
        _cancellation: &Cancellation,
    ) -> Result<Box<dyn Transaction>, TransactionError> {
        self.counters.begin.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin {
            return Err(TransactionError::Begin("pool exhausted".to_owned()));
        }
        Ok(Box::new(FakeTransaction {
            counters: Arc::clone(&self.counters),
            fail_rollback: self.fail_rollback,
            fail_commit: self.fail_commit,
            panic_rollback: self.panic_rollback,
            panic_commit: self.panic_commit,
        }))
    }
}
