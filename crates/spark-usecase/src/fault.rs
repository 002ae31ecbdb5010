//! 故障（panic）载荷的文本化。
//!
//! 分派器、链引擎与事务协调器在各自边界以 `catch_unwind` 捕获故障后，需要把载荷转换为人类可读的
//! 消息写入失败结果。

use std::any::Any;

/// 载荷既不是 `&str` 也不是 `String` 时使用的占位文本。
const UNKNOWN_PAYLOAD: &str = "<unknown panic payload>";

/// 将 panic 载荷解析为消息文本。
///
/// - **逻辑（How）**：依次尝试 `&str` 与 `String`，其余类型返回占位文本；
/// - **契约（What）**：调用方必须处于 `catch_unwind` 的错误分支中，函数本身不会 panic。
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        UNKNOWN_PAYLOAD.to_owned()
    }
}
