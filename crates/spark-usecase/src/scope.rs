//! 执行作用域：描述一次分派是独立调用还是链路中的某一步。
//!
//! # 教案式说明
//! - **意图（Why）**：事务等作用域感知的 Behavior 需要区分“单个请求”与“整条链”两种工作单元；
//!   作用域由链引擎（或分派器的默认值）在每次调用时重新计算，Behavior 只读消费。
//! - **结构（How）**：[`ExecutionScope`] 携带可选的 [`ChainPosition`]；链内所有步骤共享同一个
//!   [`ChainHandle`]，其中保存链标识与链结束时需要执行的收尾回调。
//! - **契约（What）**：作用域在整条管线中原样传递，任何 Behavior 都不得改写它。

use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::cancellation::Cancellation;
use crate::error::UseCaseError;

/// 进程内唯一的链标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    /// 分配下一个链标识。
    pub fn next() -> Self {
        static SEQUENCE: AtomicU64 = AtomicU64::new(1);
        Self(SEQUENCE.fetch_add(1, Ordering::Relaxed))
    }

    /// 数值形式。
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// 链结束时执行的异步收尾回调。
///
/// 参数为链此时是否成功；返回的错误会把成功的链转为失败，对已失败的链只会被记录。
pub type ChainFinalizer =
    Box<dyn FnOnce(bool) -> BoxFuture<'static, Result<(), UseCaseError>> + Send>;

/// 一次链执行共享的句柄。
///
/// # 教案式注释
/// - **意图 (Why)**：作用域感知的 Behavior 未必会在链的最后一步运行：链可能提前停止（失败、取消、
///   请求构造故障），最后一步也可能根本不匹配该 Behavior。收尾回调让它们在链结束时依据最终结果收尾。
/// - **契约 (What)**：每次链执行创建新的句柄；收尾回调在执行结束时按登记的逆序执行且只执行一次，
///   参数为链在此刻是否成功。
pub struct ChainHandle {
    id: ChainId,
    finalizers: Mutex<Vec<ChainFinalizer>>,
}

impl ChainHandle {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ChainId::next(),
            finalizers: Mutex::new(Vec::new()),
        })
    }

    /// 链标识。
    pub fn id(&self) -> ChainId {
        self.id
    }

    /// 登记链结束时执行的收尾回调。
    pub fn on_complete<F>(&self, finalizer: F)
    where
        F: FnOnce(bool) -> BoxFuture<'static, Result<(), UseCaseError>> + Send + 'static,
    {
        self.finalizers.lock().push(Box::new(finalizer));
    }

    pub(crate) fn take_finalizers(&self) -> Vec<ChainFinalizer> {
        let mut finalizers = std::mem::take(&mut *self.finalizers.lock());
        finalizers.reverse();
        finalizers
    }
}

impl fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainHandle")
            .field("id", &self.id)
            .field("pending_finalizers", &self.finalizers.lock().len())
            .finish()
    }
}

/// 某一步在链中的位置。
#[derive(Clone, Debug)]
pub struct ChainPosition {
    handle: Arc<ChainHandle>,
    index: usize,
    total: usize,
}

impl ChainPosition {
    /// 所属链的句柄。
    pub fn handle(&self) -> &Arc<ChainHandle> {
        &self.handle
    }

    /// 从 0 开始的步骤序号。
    pub fn index(&self) -> usize {
        self.index
    }

    /// 链的步骤总数。
    pub fn total(&self) -> usize {
        self.total
    }
}

/// 一次分派调用的执行作用域。
#[derive(Clone, Debug, Default)]
pub struct ExecutionScope {
    chain: Option<ChainPosition>,
}

impl ExecutionScope {
    /// 独立调用（非链）的作用域。
    pub fn single() -> Self {
        Self { chain: None }
    }

    pub(crate) fn chain_step(handle: Arc<ChainHandle>, index: usize, total: usize) -> Self {
        Self {
            chain: Some(ChainPosition {
                handle,
                index,
                total,
            }),
        }
    }

    /// 是否属于某条链。
    pub fn is_chain(&self) -> bool {
        self.chain.is_some()
    }

    /// 是否为链的第一步；独立调用视为自身的第一步。
    pub fn is_first(&self) -> bool {
        self.chain.as_ref().is_none_or(|pos| pos.index == 0)
    }

    /// 是否为链的最后一步；独立调用视为自身的最后一步。
    pub fn is_last(&self) -> bool {
        self.chain
            .as_ref()
            .is_none_or(|pos| pos.index + 1 == pos.total)
    }

    /// 链标识。
    pub fn chain_id(&self) -> Option<ChainId> {
        self.chain.as_ref().map(|pos| pos.handle.id())
    }

    /// 链位置信息。
    pub fn chain(&self) -> Option<&ChainPosition> {
        self.chain.as_ref()
    }
}

/// 传递给每个 Behavior 与 Handler 的调用上下文：作用域 + 取消信号。
#[derive(Clone, Debug, Default)]
pub struct InvocationContext {
    scope: ExecutionScope,
    cancellation: Cancellation,
}

impl InvocationContext {
    /// 构造上下文。
    pub fn new(scope: ExecutionScope, cancellation: Cancellation) -> Self {
        Self {
            scope,
            cancellation,
        }
    }

    /// 执行作用域。
    pub fn scope(&self) -> &ExecutionScope {
        &self.scope
    }

    /// 取消信号。
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}
