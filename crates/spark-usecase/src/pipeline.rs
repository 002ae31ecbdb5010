//! Behavior 管线组合器。
//!
//! # 教案式说明
//! - **意图（Why）**：把 Handler 与一组按执行顺序排列的 Behavior 组合为一个可调用的续延，
//!   使 `B1` 最先进入、最后退出。
//! - **逻辑（How）**：从最内层的终端续延开始，自右向左折叠：
//!   `Tn = B1(req, || B2(req, … Bn(req, T0)))`。
//! - **契约（What）**：组合本身不执行任何 Behavior；请求与调用上下文以共享引用传给每一层。

use std::sync::Arc;

use crate::behavior::{Behavior, Next};
use crate::request::Request;
use crate::scope::InvocationContext;

/// 将 `behaviors`（按执行顺序，最外层在前）包裹在 `terminal` 之外。
pub fn compose<'a, R: Request>(
    request: &'a R,
    ctx: &'a InvocationContext,
    behaviors: &'a [Arc<dyn Behavior<R>>],
    terminal: Next<'a, R>,
) -> Next<'a, R> {
    behaviors.iter().rev().fold(terminal, |next, behavior| {
        Next::new(move || behavior.handle(request, ctx, next))
    })
}
