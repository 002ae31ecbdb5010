//! 能力注册表：按请求类型解析 Handler 与全局 Behavior。
//!
//! # 教案式说明
//! - **意图（Why）**：分派器只需要两项能力，“解析请求类型 `R` 的 Handler”与“解析作用于 `R`
//!   的全部全局 Behavior”。[`ServiceResolver`] 把这两项能力抽象为接缝，宿主可以接入自己的
//!   容器；[`Registry`] 是基于 `TypeId` 的默认实现。
//! - **结构（How）**：Handler 以 `TypeId` 为键保存类型擦除后的 `Arc<dyn Handler<R>>`；全局
//!   Behavior 保存在单一有序列表中，类型化 Behavior 与通用 Behavior 混合排列，保持注册顺序。
//! - **契约（What）**：
//!   - 每种请求类型至多一个 Handler，重复注册会覆盖先前的注册；
//!   - `resolve_behaviors` 按注册顺序返回，最先注册者位于最外层。

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::behavior::{Behavior, FnHandler, Handler, UniversalAdapter, UniversalBehavior};
use crate::request::Request;
use crate::result::UseCaseResult;

/// 分派器依赖的解析能力。
pub trait ServiceResolver: Send + Sync + 'static {
    /// 解析请求类型 `R` 的唯一 Handler。
    fn resolve_handler<R: Request>(&self) -> Option<Arc<dyn Handler<R>>>;

    /// 解析作用于 `request` 的全局 Behavior，按执行顺序排列。
    fn resolve_behaviors<R: Request>(&self, request: &R) -> Vec<Arc<dyn Behavior<R>>>;
}

enum GlobalBehavior {
    Typed {
        request: TypeId,
        behavior: Box<dyn Any + Send + Sync>,
    },
    Universal(UniversalAdapter),
}

struct HandlerEntry {
    request: &'static str,
    handler: Box<dyn Any + Send + Sync>,
}

/// 基于 `TypeId` 的默认注册表。
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<TypeId, HandlerEntry>,
    behaviors: Vec<GlobalBehavior>,
}

impl Registry {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册请求类型 `R` 的 Handler。
    pub fn register_handler<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: Request,
        H: Handler<R>,
    {
        let handler: Arc<dyn Handler<R>> = Arc::new(handler);
        self.handlers.insert(
            TypeId::of::<R>(),
            HandlerEntry {
                request: type_name::<R>(),
                handler: Box::new(handler),
            },
        );
        self
    }

    /// 以同步闭包注册 Handler。
    pub fn register_handler_fn<R, F>(&mut self, func: F) -> &mut Self
    where
        R: Request,
        F: Fn(&R) -> UseCaseResult<R::Output> + Send + Sync + 'static,
    {
        self.register_handler::<R, _>(FnHandler::new(func))
    }

    /// 注册只作用于请求类型 `R` 的全局 Behavior。
    pub fn register_behavior<R, B>(&mut self, behavior: B) -> &mut Self
    where
        R: Request,
        B: Behavior<R>,
    {
        let behavior: Arc<dyn Behavior<R>> = Arc::new(behavior);
        self.behaviors.push(GlobalBehavior::Typed {
            request: TypeId::of::<R>(),
            behavior: Box::new(behavior),
        });
        self
    }

    /// 注册对所有请求类型生效的全局 Behavior。
    pub fn register_universal<B>(&mut self, behavior: B) -> &mut Self
    where
        B: UniversalBehavior,
    {
        self.register_universal_arc(Arc::new(behavior))
    }

    /// 同 [`register_universal`](Self::register_universal)，接受已共享的实例。
    pub fn register_universal_arc(&mut self, behavior: Arc<dyn UniversalBehavior>) -> &mut Self {
        self.behaviors
            .push(GlobalBehavior::Universal(UniversalAdapter::new(behavior)));
        self
    }

    /// 是否已注册请求类型 `R` 的 Handler。
    pub fn has_handler<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    /// 已注册的 Handler 数量。
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// 已注册的全局 Behavior 数量（类型化与通用之和）。
    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }
}

impl ServiceResolver for Registry {
    fn resolve_handler<R: Request>(&self) -> Option<Arc<dyn Handler<R>>> {
        self.handlers
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.handler.downcast_ref::<Arc<dyn Handler<R>>>())
            .cloned()
    }

    fn resolve_behaviors<R: Request>(&self, request: &R) -> Vec<Arc<dyn Behavior<R>>> {
        let request_type = TypeId::of::<R>();
        self.behaviors
            .iter()
            .filter_map(|entry| match entry {
                GlobalBehavior::Typed {
                    request: registered,
                    behavior,
                } if *registered == request_type => {
                    behavior.downcast_ref::<Arc<dyn Behavior<R>>>().cloned()
                }
                GlobalBehavior::Typed { .. } => None,
                GlobalBehavior::Universal(adapter) => {
                    Some(Arc::new(adapter.clone()) as Arc<dyn Behavior<R>>)
                }
            })
            .filter(|behavior| behavior.applies_to(request))
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&str> = self.handlers.values().map(|entry| entry.request).collect();
        handlers.sort_unstable();
        f.debug_struct("Registry")
            .field("handlers", &handlers)
            .field("behaviors", &self.behaviors.len())
            .finish()
    }
}
