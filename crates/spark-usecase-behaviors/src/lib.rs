#![deny(unsafe_code)]
//! spark-usecase-behaviors: 面向 `spark-usecase` 分派管线的可复用 Behavior 组件库。
//!
//! # 教案式概览
//! - **意图（Why）**：为业务团队提供现成的日志、计时、校验与缓存 Behavior，避免在每个用例中重复编写
//!   横切样板代码。
//! - **结构（How）**：按关注点拆分为 [`logging`]、[`timing`]、[`validation`] 与 [`caching`] 四个模块；
//!   日志与计时实现 [`spark_usecase::UniversalBehavior`]，注册一次即作用于所有请求；校验与缓存依赖
//!   请求类型上的额外契约，实现类型化的 [`spark_usecase::Behavior`]。
//! - **契约（What）**：每个 Behavior 都提供 `*Config` 结构体，带 `Default` 与 `from_settings` 构造器，
//!   可直接从 [`spark_usecase::UseCaseSettings`] 派生。

pub mod caching;
pub mod logging;
pub mod timing;
pub mod validation;

pub use caching::{Cacheable, CachingBehavior, CachingBehaviorConfig};
pub use logging::{LoggingBehavior, LoggingBehaviorConfig};
pub use timing::{TimingBehavior, TimingBehaviorConfig, TimingSink};
pub use validation::{VALIDATION_FAILED_CODE, Validate, ValidationBehavior};
