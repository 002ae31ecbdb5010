//! 作用域感知的事务协调器。
//!
//! # 教案式说明
//! - **意图（Why）**：同一个事务 Behavior 既要支持“每个请求一个事务”，也要支持“整条链一个事务”。
//!   它读取调用上下文中的 [`ExecutionScope`] 决定工作单元的边界，而不是由调用方手工切换。
//! - **结构（How）**：
//!   - [`TransactionManager`]/[`Transaction`] 是外部协作者接口：开启、提交、回滚、释放；
//!   - [`ChainTransactions`] 以 `DashMap` 按链标识保存进行中的链事务，实例归协调器所有，
//!     不存在进程级全局状态；
//!   - [`TransactionBehavior`] 同时实现 [`Behavior`] 与 [`UniversalBehavior`]，既可作为单次调用
//!     Behavior，也可全局注册一次作用于所有请求。
//! - **契约（What）**：
//!   - 单次模式：开启 → 执行续延 → 成功提交，失败或故障回滚 → 恰好释放一次；回滚失败只记录日志，
//!     对外仍报告原始失败，故障在释放后继续向外传播；
//!   - 链模式：仅在第一步开启并登记；每一步执行续延；在最后一步，或某一步失败/故障时，原子地
//!     取出事务并提交或回滚，然后释放；
//!   - 每条链恰好开启一次，并恰好执行一次提交或回滚；若最后一步没有经过本 Behavior（链提前停止，
//!     或最后一步的请求不匹配），由链句柄上的收尾回调按链的最终结果提交或回滚；
//!   - 提交或回滚中的 panic 同样被捕获：释放总会发生，提交 panic 视为提交失败，回滚 panic 只记录日志。

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::behavior::{Behavior, ErasedNext, Next, Outcome, UniversalBehavior};
use crate::cancellation::Cancellation;
use crate::error::{TransactionError, UseCaseError};
use crate::fault::panic_message;
use crate::observability::{KeyValue, LogSeverity, Logger, TracingLogger};
use crate::request::{Request, RequestRef};
use crate::result::UseCaseResult;
use crate::scope::{ChainId, InvocationContext};

/// 日志目标。
const TRANSACTION_TARGET: &str = "spark.usecase.transaction";

/// 进行中的事务。
///
/// `commit` 与 `rollback` 至多调用其一；无论结果如何，协调器随后都会调用一次 `release`。
#[async_trait]
pub trait Transaction: Send + 'static {
    /// 提交。
    async fn commit(&mut self, cancellation: &Cancellation) -> Result<(), TransactionError>;

    /// 回滚。
    async fn rollback(&mut self, cancellation: &Cancellation) -> Result<(), TransactionError>;

    /// 释放底层资源，例如归还连接。
    fn release(self: Box<Self>) {}
}

/// 事务的开启能力。
#[async_trait]
pub trait TransactionManager: Send + Sync + 'static {
    /// 开启新事务。
    async fn begin(&self, cancellation: &Cancellation) -> Result<Box<dyn Transaction>, TransactionError>;
}

/// 按链标识保存的进行中链事务。
///
/// 每个链标识至多一个条目；`take` 原子地移除并返回条目，保证结束动作只发生一次。
#[derive(Default)]
pub struct ChainTransactions {
    active: DashMap<ChainId, Mutex<Box<dyn Transaction>>>,
}

impl ChainTransactions {
    /// 创建空表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记链事务；若该链已有事务则返回被拒绝的新事务。
    fn insert(&self, chain: ChainId, transaction: Box<dyn Transaction>) -> Result<(), Box<dyn Transaction>> {
        match self.active.entry(chain) {
            Entry::Occupied(_) => Err(transaction),
            Entry::Vacant(slot) => {
                slot.insert(Mutex::new(transaction));
                Ok(())
            }
        }
    }

    /// 原子地取出链事务。
    fn take(&self, chain: ChainId) -> Option<Box<dyn Transaction>> {
        self.active
            .remove(&chain)
            .map(|(_, transaction)| transaction.into_inner())
    }

    /// 是否存在该链的事务。
    pub fn contains(&self, chain: ChainId) -> bool {
        self.active.contains_key(&chain)
    }

    /// 进行中的链事务数量。
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// 是否没有进行中的链事务。
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl fmt::Debug for ChainTransactions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainTransactions")
            .field("active", &self.active.len())
            .finish()
    }
}

/// 事务的结束方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Completion {
    Commit,
    Rollback,
}

/// 作用域感知的事务 Behavior。
#[derive(Clone)]
pub struct TransactionBehavior {
    manager: Arc<dyn TransactionManager>,
    chains: Arc<ChainTransactions>,
    logger: Arc<dyn Logger>,
}

impl TransactionBehavior {
    /// 以事务管理器构造，日志默认转发到 `tracing`。
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            manager,
            chains: Arc::new(ChainTransactions::new()),
            logger: Arc::new(TracingLogger),
        }
    }

    /// 替换 Logger。
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// 进行中的链事务表。
    pub fn chain_transactions(&self) -> &ChainTransactions {
        &self.chains
    }

    /// 围绕续延执行事务协议。
    ///
    /// `succeeded` 判定续延结果是否成功；`failure` 在事务无法开启或提交时构造失败结果。
    async fn coordinate<O, Fut>(
        &self,
        ctx: &InvocationContext,
        next: Fut,
        succeeded: fn(&O) -> bool,
        failure: fn(UseCaseError) -> O,
    ) -> O
    where
        Fut: Future<Output = O> + Send,
        O: Send,
    {
        let cancellation = ctx.cancellation();
        let Some(position) = ctx.scope().chain() else {
            let transaction = match self.manager.begin(cancellation).await {
                Ok(transaction) => transaction,
                Err(err) => return failure(UseCaseError::new(err.to_string())),
            };
            let outcome = AssertUnwindSafe(next).catch_unwind().await;
            let completion = completion_of(&outcome, succeeded);
            let finished = finish(transaction, completion, cancellation, self.logger.as_ref(), None).await;
            return conclude(outcome, finished, failure);
        };

        let chain = position.handle().id();
        if ctx.scope().is_first() {
            let transaction = match self.manager.begin(cancellation).await {
                Ok(transaction) => transaction,
                Err(err) => return failure(UseCaseError::new(err.to_string())),
            };
            if let Err(duplicate) = self.chains.insert(chain, transaction) {
                rollback_and_release(duplicate, cancellation, self.logger.as_ref(), Some(chain)).await;
                return failure(UseCaseError::new(format!(
                    "a transaction is already active for {chain}"
                )));
            }
            let chains = Arc::clone(&self.chains);
            let logger = Arc::clone(&self.logger);
            let cancellation = cancellation.clone();
            position.handle().on_complete(move |succeeded| {
                Box::pin(async move {
                    let Some(transaction) = chains.take(chain) else {
                        return Ok(());
                    };
                    if succeeded {
                        return commit_and_release(transaction, &cancellation)
                            .await
                            .map_err(|err| UseCaseError::new(err.to_string()));
                    }
                    logger.log_with_fields(
                        LogSeverity::Warn,
                        Some(TRANSACTION_TARGET),
                        "chain failed before its last step, rolling back",
                        &[KeyValue::new("usecase.chain", chain.to_string())],
                    );
                    rollback_and_release(transaction, &cancellation, logger.as_ref(), Some(chain))
                        .await;
                    Ok(())
                })
            });
        }

        let outcome = AssertUnwindSafe(next).catch_unwind().await;
        let completion = completion_of(&outcome, succeeded);
        if completion == Completion::Commit && !ctx.scope().is_last() {
            return conclude(outcome, Ok(()), failure);
        }
        let finished = match self.chains.take(chain) {
            Some(transaction) => {
                finish(transaction, completion, cancellation, self.logger.as_ref(), Some(chain)).await
            }
            None => Ok(()),
        };
        conclude(outcome, finished, failure)
    }
}

impl fmt::Debug for TransactionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBehavior")
            .field("chains", &self.chains)
            .finish_non_exhaustive()
    }
}

fn completion_of<O>(
    outcome: &Result<O, Box<dyn std::any::Any + Send>>,
    succeeded: fn(&O) -> bool,
) -> Completion {
    match outcome {
        Ok(output) if succeeded(output) => Completion::Commit,
        _ => Completion::Rollback,
    }
}

/// 结束事务并释放。
///
/// 提交失败以 `Err` 返回，由调用方转换为失败结果；回滚失败只记录日志。
async fn finish(
    transaction: Box<dyn Transaction>,
    completion: Completion,
    cancellation: &Cancellation,
    logger: &dyn Logger,
    chain: Option<ChainId>,
) -> Result<(), TransactionError> {
    match completion {
        Completion::Commit => commit_and_release(transaction, cancellation).await,
        Completion::Rollback => {
            rollback_and_release(transaction, cancellation, logger, chain).await;
            Ok(())
        }
    }
}

/// 提交并释放；提交中的 panic 转换为 [`TransactionError::Commit`]。
async fn commit_and_release(
    mut transaction: Box<dyn Transaction>,
    cancellation: &Cancellation,
) -> Result<(), TransactionError> {
    let committed = AssertUnwindSafe(transaction.commit(cancellation))
        .catch_unwind()
        .await;
    transaction.release();
    match committed {
        Ok(result) => result,
        Err(payload) => Err(TransactionError::Commit(panic_message(payload.as_ref()))),
    }
}

/// 回滚并释放；回滚的错误或 panic 只记录日志，不影响调用方看到的结果。
async fn rollback_and_release(
    mut transaction: Box<dyn Transaction>,
    cancellation: &Cancellation,
    logger: &dyn Logger,
    chain: Option<ChainId>,
) {
    let rolled_back = AssertUnwindSafe(transaction.rollback(cancellation))
        .catch_unwind()
        .await;
    transaction.release();
    let err = match rolled_back {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(payload) => TransactionError::Rollback(panic_message(payload.as_ref())),
    };
    let chain = chain.map(|id| id.to_string()).unwrap_or_default();
    logger.log_with_fields(
        LogSeverity::Error,
        Some(TRANSACTION_TARGET),
        &err.to_string(),
        &[KeyValue::new("usecase.chain", chain)],
    );
}

/// 合成最终结果：故障继续传播，提交失败覆盖成功结果，其余原样返回。
fn conclude<O>(
    outcome: Result<O, Box<dyn std::any::Any + Send>>,
    finished: Result<(), TransactionError>,
    failure: fn(UseCaseError) -> O,
) -> O {
    match (outcome, finished) {
        (Err(payload), _) => std::panic::resume_unwind(payload),
        (Ok(_), Err(err)) => failure(UseCaseError::new(err.to_string())),
        (Ok(output), Ok(())) => output,
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for TransactionBehavior {
    async fn handle(
        &self,
        _request: &R,
        ctx: &InvocationContext,
        next: Next<'_, R>,
    ) -> UseCaseResult<R::Output> {
        self.coordinate(ctx, next.run(), UseCaseResult::is_success, UseCaseResult::failure)
            .await
    }
}

#[async_trait]
impl UniversalBehavior for TransactionBehavior {
    async fn handle(
        &self,
        _request: RequestRef<'_>,
        ctx: &InvocationContext,
        next: ErasedNext<'_>,
    ) -> Outcome {
        self.coordinate(ctx, next.run(), Outcome::is_success, Outcome::failure)
            .await
    }
}
