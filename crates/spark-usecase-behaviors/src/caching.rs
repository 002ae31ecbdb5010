use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use spark_usecase::{
    Behavior, CachingSettings, InvocationContext, Next, Request, UseCaseResult, async_trait,
};

/// 可被缓存的请求：声明缓存键。
pub trait Cacheable: Request {
    /// 缓存键类型。
    type Key: Eq + Hash + Clone + Send + Sync + 'static;

    /// 计算请求的缓存键；键相同的请求被视为等价。
    fn cache_key(&self) -> Self::Key;
}

/// 缓存 Behavior 的配置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachingBehaviorConfig {
    /// 条目存活时间。
    pub ttl: Duration,
    /// 最大条目数，`0` 表示不缓存。
    pub max_entries: usize,
}

impl CachingBehaviorConfig {
    /// 从缓存配置派生。
    pub fn from_settings(settings: &CachingSettings) -> Self {
        Self {
            ttl: settings.ttl(),
            max_entries: settings.max_entries,
        }
    }
}

impl Default for CachingBehaviorConfig {
    fn default() -> Self {
        Self::from_settings(&CachingSettings::default())
    }
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// 缓存成功结果的 Behavior。
///
/// # 教案式说明
/// - **意图（Why）**：查询类用例往往对相同输入返回相同结果，在 Handler 之外缓存可以避免重复计算。
/// - **逻辑（How）**：
///   - 命中未过期条目时直接返回克隆值，续延不会被调用；
///   - 未命中时执行续延，仅缓存成功结果，失败结果不入缓存；
///   - 写入前若达到容量上限，先清理过期条目，仍然满则淘汰最早写入的条目。
/// - **契约（What）**：
///   - 缓存表由 `DashMap` 承载，实例可在多个分派器间共享；
///   - 淘汰与写入在同一把写锁下完成，并发未命中也不会让条目数超过 `max_entries`；读取不加锁。
/// - **风险提示（Trade-offs）**：淘汰最早条目需要一次全表扫描，适合中小规模缓存。
pub struct CachingBehavior<R: Cacheable> {
    config: CachingBehaviorConfig,
    entries: Arc<DashMap<R::Key, CacheEntry<R::Output>>>,
    writer: Arc<Mutex<()>>,
    _request: PhantomData<fn(&R)>,
}

impl<R> CachingBehavior<R>
where
    R: Cacheable,
    R::Output: Clone + Sync,
{
    /// 基于配置构造空缓存。
    pub fn new(config: CachingBehaviorConfig) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
            writer: Arc::new(Mutex::new(())),
            _request: PhantomData,
        }
    }

    /// 当前条目数（含尚未清理的过期条目）。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 使某个键失效。
    pub fn invalidate(&self, key: &R::Key) {
        self.entries.remove(key);
    }

    /// 清空缓存。
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn lookup(&self, key: &R::Key) -> Option<R::Output> {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let hit = self
            .entries
            .get(key)
            .filter(|entry| now.duration_since(entry.stored_at) < ttl)
            .map(|entry| entry.value.clone());
        if hit.is_none() {
            self.entries
                .remove_if(key, |_, entry| now.duration_since(entry.stored_at) >= ttl);
        }
        hit
    }

    fn store(&self, key: R::Key, value: R::Output) {
        let _writer = self.writer.lock();
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(&key) {
            let ttl = self.config.ttl;
            let now = Instant::now();
            self.entries
                .retain(|_, entry| now.duration_since(entry.stored_at) < ttl);
            if self.entries.len() >= self.config.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.value().stored_at)
                    .map(|entry| entry.key().clone());
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}

impl<R: Cacheable> Clone for CachingBehavior<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            entries: Arc::clone(&self.entries),
            writer: Arc::clone(&self.writer),
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R> Behavior<R> for CachingBehavior<R>
where
    R: Cacheable,
    R::Output: Clone + Sync,
{
    async fn handle(
        &self,
        request: &R,
        _ctx: &InvocationContext,
        next: Next<'_, R>,
    ) -> UseCaseResult<R::Output> {
        if self.config.max_entries == 0 {
            return next.run().await;
        }
        let key = request.cache_key();
        if let Some(value) = self.lookup(&key) {
            return UseCaseResult::success(value);
        }
        let result = next.run().await;
        if let Some(value) = result.value() {
            self.store(key, value.clone());
        }
        result
    }
}
