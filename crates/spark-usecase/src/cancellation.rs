//! 用例调用的协作式取消信号。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// 调用方持有、随请求向下传递的取消信号。
///
/// # 教案式说明
/// - **意图（Why）**：链执行可能很长，调用方需要在两步之间叫停后续请求；单次分派则只把信号
///   转交给 Handler、Behavior 与事务协作者，由它们自行决定是否提前结束。
/// - **逻辑（How）**：
///   - [`Dispatcher`](crate::Dispatcher) 把信号的克隆放入每次调用的
///     [`InvocationContext`](crate::InvocationContext)；
///   - [`Chain`](crate::Chain) 在启动每一步之前读取一次，已取消则不再分派，
///     以 [`CHAIN_CANCELLED_MESSAGE`](crate::CHAIN_CANCELLED_MESSAGE) 失败结束；
///   - 正在执行的一步不会被打断。
/// - **契约（What）**：所有克隆共享同一个标志位，取消不可撤销。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    /// 未取消的新信号。
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已取消。
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 发出取消；仅首次调用返回 `true`。
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// 交给下游协作者的句柄，与当前信号共享标志位。
    pub fn child(&self) -> Self {
        self.clone()
    }
}
