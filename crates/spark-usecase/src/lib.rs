#![deny(unsafe_code)]
//! # spark-usecase
//!
//! ## 定位与职责（Why）
//! - 面向“用例”式业务操作的请求分派核心：调用方构造不可变请求，交给 [`Dispatcher`]，得到统一的
//!   [`UseCaseResult`]，预期内的失败永远以结果数据返回，而不是 panic；
//! - 在 Handler 周围以确定的顺序织入横切 Behavior，并支持把多个请求组合为 [`Chain`]，
//!   上一步的输出成为下一步的输入；
//! - [`TransactionBehavior`] 根据 [`ExecutionScope`] 区分“单个请求一个事务”与“整条链一个事务”。
//!
//! ## 架构嵌入（Where）
//! - `result`/`error`：结果容器与结构化错误；
//! - `behavior`/`pipeline`：Handler、Behavior 契约与洋葱式组合；
//! - `registry`：按请求类型解析 Handler 与全局 Behavior 的接缝及默认实现；
//! - `dispatcher`/`chain`：单次分派与链式执行引擎；
//! - `transaction`：作用域感知的事务协调器；
//! - `observability`/`config`：日志契约与 TOML 配置。
//!
//! ## 运行时策略（Trade-offs）
//! - 库本身不依赖任何异步运行时，也不派生线程；所有 Future 由调用方的执行器驱动。

/// Handler、Behavior 与通用 Behavior 的契约。
pub mod behavior;

/// 协作式取消信号。
pub mod cancellation;

/// 链式执行引擎。
pub mod chain;

/// TOML 配置。
pub mod config;

/// 单次分派入口。
pub mod dispatcher;

/// 结构化错误与边界错误类型。
pub mod error;

mod fault;

/// 日志契约与 `tracing` 桥接。
pub mod observability;

/// Behavior 管线组合器。
pub mod pipeline;

/// Handler 与 Behavior 的注册与解析。
pub mod registry;

/// 请求描述符契约。
pub mod request;

/// 统一结果容器。
pub mod result;

/// 执行作用域与调用上下文。
pub mod scope;

/// 作用域感知的事务协调器。
pub mod transaction;

pub use async_trait::async_trait;

pub use behavior::{
    Behavior, ErasedNext, FnHandler, Handler, Next, Outcome, UniversalAdapter, UniversalBehavior,
};
pub use cancellation::Cancellation;
pub use chain::{CHAIN_CANCELLED_MESSAGE, CHAIN_FAULT_MESSAGE, Chain, RecoveringChain};
pub use config::{CachingSettings, ConfigError, DispatcherSettings, TimingSettings, UseCaseSettings};
pub use dispatcher::{Dispatcher, EXECUTION_FAULT_MESSAGE, NO_HANDLER_MESSAGE};
pub use error::{TransactionError, UseCaseError, UseCaseFailure};
pub use observability::{
    KeyValue, LogRecord, LogSeverity, Logger, NoopLogger, ObservabilityError, TracingLogger,
    install_fmt_subscriber,
};
pub use pipeline::compose;
pub use registry::{Registry, ServiceResolver};
pub use request::{Request, RequestRef};
pub use result::{MISSING_VALUE_MESSAGE, ResultStatus, UseCaseResult, combine, combine_values};
pub use scope::{ChainHandle, ChainId, ChainPosition, ExecutionScope, InvocationContext};
pub use transaction::{ChainTransactions, Transaction, TransactionBehavior, TransactionManager};
