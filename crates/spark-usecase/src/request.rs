//! 请求描述符契约。

use std::any::{Any, TypeId, type_name};
use std::fmt;

/// 不可变的用例请求描述符。
///
/// # 契约说明（What）
/// - `Output` 是请求声明的结果类型；请求类型本身即分派键，因此“请求类型 + 结果类型”二元组
///   由 `Self` 唯一确定；
/// - 请求在整条管线中以共享引用传递，Behavior 与 Handler 均不可修改它。
pub trait Request: Send + Sync + 'static {
    /// 成功时携带的值类型。
    type Output: Send + 'static;

    /// 用于诊断与日志的请求名称，默认取类型的完整路径。
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// 类型擦除的请求视图，供对所有请求类型生效的通用 Behavior 使用。
#[derive(Clone, Copy)]
pub struct RequestRef<'a> {
    name: &'static str,
    type_id: TypeId,
    output_type: &'static str,
    request: &'a (dyn Any + Send + Sync),
}

impl<'a> RequestRef<'a> {
    /// 从具体请求构造视图。
    pub fn new<R: Request>(request: &'a R) -> Self {
        Self {
            name: request.name(),
            type_id: TypeId::of::<R>(),
            output_type: type_name::<R::Output>(),
            request,
        }
    }

    /// 请求名称。
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 请求的具体类型标识。
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 声明的结果类型名称。
    pub fn output_type(&self) -> &'static str {
        self.output_type
    }

    /// 尝试还原为具体请求类型。
    pub fn downcast_ref<R: Request>(&self) -> Option<&'a R> {
        self.request.downcast_ref::<R>()
    }

    /// 是否为指定请求类型。
    pub fn is<R: Request>(&self) -> bool {
        self.type_id == TypeId::of::<R>()
    }
}

impl fmt::Debug for RequestRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRef")
            .field("name", &self.name)
            .field("output_type", &self.output_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping(u8);

    impl Request for Ping {
        type Output = u8;
    }

    struct Pong;

    impl Request for Pong {
        type Output = ();

        fn name(&self) -> &'static str {
            "pong"
        }
    }

    #[test]
    fn request_ref_downcasts_to_the_concrete_type() {
        let ping = Ping(7);
        let view = RequestRef::new(&ping);
        assert!(view.is::<Ping>());
        assert!(!view.is::<Pong>());
        assert_eq!(view.downcast_ref::<Ping>().map(|p| p.0), Some(7));
        assert!(view.name().ends_with("Ping"));
        assert_eq!(view.output_type(), "u8");
        assert_eq!(RequestRef::new(&Pong).name(), "pong");
    }
}
