use std::any::type_name;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::Rc;

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, warn};

use crate::error::Result;
use crate::{
    AssetSource, NoHooks, PlacementHooks, PoolConfig, PoolError, PoolHooks, PoolKey,
    PoolSnapshot, PooledHandle, ResourcePool, ResourcePoolBuilder,
};

/// The keyed collection of pools that callers go through to get instances.
///
/// The registry creates each pool the first time its key is requested and hands out the same
/// pool on every later request. Configuration only applies when a pool is created; requests
/// for an existing pool ignore the configuration they carry.
///
/// All pools of a registry share one [`AssetSource`]. A registry is constructed explicitly
/// and owned by whatever drives the application's update loop; there is no global instance.
///
/// # Examples
///
/// ```
/// # use futures::FutureExt;
/// # use futures::future::LocalBoxFuture;
/// # use recycling_pool::{AssetSource, Poolable, TemplateLoadError};
/// # struct Bullet;
/// # impl Poolable for Bullet {}
/// # struct Armory;
/// # impl AssetSource for Armory {
/// #     type Key = &'static str;
/// #     type Template = ();
/// #     type Instance = Bullet;
/// #     fn load(&self, _: &&'static str) -> LocalBoxFuture<'static, Result<(), TemplateLoadError>> {
/// #         async { Ok(()) }.boxed_local()
/// #     }
/// #     fn instantiate(&self, _: &&'static str, _: &()) -> Bullet { Bullet }
/// # }
/// use std::rc::Rc;
///
/// use recycling_pool::PoolRegistry;
///
/// # futures::executor::block_on(async {
/// let registry = PoolRegistry::new(Rc::new(Armory));
///
/// let bullet = registry.acquire("tracer").await.unwrap();
/// assert_eq!(registry.len(), 1);
///
/// assert!(registry.release(&bullet));
/// # });
/// ```
pub struct PoolRegistry<A: AssetSource> {
    assets: Rc<A>,
    default_config: PoolConfig<A::Key>,
    pools: RefCell<HashMap<PoolKey<A::Key>, ResourcePool<A>>>,
}

impl<A: AssetSource> PoolRegistry<A> {
    /// Creates an empty registry whose pools use the default configuration unless told
    /// otherwise.
    #[must_use]
    pub fn new(assets: Rc<A>) -> Self {
        Self::with_default_config(assets, PoolConfig::default())
    }

    /// Creates an empty registry whose pools use `config` unless told otherwise.
    #[must_use]
    pub fn with_default_config(assets: Rc<A>, config: PoolConfig<A::Key>) -> Self {
        Self {
            assets,
            default_config: config,
            pools: RefCell::new(HashMap::new()),
        }
    }

    /// The configuration applied to pools created without an explicit one.
    #[must_use]
    pub fn default_config(&self) -> &PoolConfig<A::Key> {
        &self.default_config
    }

    /// Returns the standard pool for `template`, creating and initializing it with the default
    /// configuration if needed.
    ///
    /// Returns `None` (and logs the reason) if the template cannot be loaded. The pool stays
    /// registered in that case and a later call tries to load the template again.
    pub async fn get_or_create(&self, template: A::Key) -> Option<ResourcePool<A>> {
        self.get_or_create_with(template, self.default_config.clone())
            .await
    }

    /// Returns the standard pool for `template`, creating and initializing it with `config`
    /// if needed.
    ///
    /// See [`get_or_create()`][Self::get_or_create] for details.
    pub async fn get_or_create_with(
        &self,
        template: A::Key,
        config: PoolConfig<A::Key>,
    ) -> Option<ResourcePool<A>> {
        self.try_get_or_create(PoolKey::standard(template), config, || Box::new(NoHooks))
            .await
            .inspect_err(|error| warn!(%error, "pool is not available"))
            .ok()
    }

    /// Returns the placement-aware pool for `template`, creating and initializing it with
    /// `config` and `hooks` if needed.
    ///
    /// The placement-aware pool is distinct from the standard pool for the same template. If
    /// the pool already exists, `hooks` is dropped unused.
    ///
    /// See [`get_or_create()`][Self::get_or_create] for details.
    pub async fn get_or_create_placement<H, C>(
        &self,
        template: A::Key,
        config: PoolConfig<A::Key>,
        hooks: PlacementHooks<H, C>,
    ) -> Option<ResourcePool<A>>
    where
        PlacementHooks<H, C>: PoolHooks<A::Instance> + 'static,
    {
        self.try_get_or_create(PoolKey::placement(template), config, || Box::new(hooks))
            .await
            .inspect_err(|error| warn!(%error, "placement pool is not available"))
            .ok()
    }

    /// Returns the pool identified by `key`, creating it with `config` and the hooks made by
    /// `hooks` if it is not registered yet, then waits for it to be initialized.
    ///
    /// Concurrent calls for the same key share one pool and one template load.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TemplateLoad`] if loading fails under
    /// [`ErrorStrategy::ThrowException`][crate::ErrorStrategy::ThrowException] and
    /// [`PoolError::Uninitialized`] if loading fails under any other strategy.
    pub async fn try_get_or_create(
        &self,
        key: PoolKey<A::Key>,
        config: PoolConfig<A::Key>,
        hooks: impl FnOnce() -> Box<dyn PoolHooks<A::Instance>>,
    ) -> Result<ResourcePool<A>> {
        let pool = self.register(key, config, hooks);

        if pool.initialize().await? {
            Ok(pool)
        } else {
            Err(PoolError::Uninitialized {
                key: pool.key().to_string(),
            })
        }
    }

    fn register(
        &self,
        key: PoolKey<A::Key>,
        config: PoolConfig<A::Key>,
        hooks: impl FnOnce() -> Box<dyn PoolHooks<A::Instance>>,
    ) -> ResourcePool<A> {
        if let Some(existing) = self.pools.borrow().get(&key) {
            return existing.clone();
        }

        // `hooks()` may run arbitrary code, so the map is not borrowed while it runs.
        let pool = ResourcePoolBuilder::new(Rc::clone(&self.assets), key.template().clone())
            .key(key.clone())
            .config(config)
            .boxed_hooks(hooks())
            .build();

        match self.pools.borrow_mut().entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(pool = %entry.key(), "registered pool");
                entry.insert(pool).clone()
            }
        }
    }

    /// Acquires an instance of `template` from its standard pool, creating and initializing
    /// the pool if needed.
    ///
    /// Returns `None` (and logs the reason) if the template cannot be loaded or the pool is
    /// exhausted.
    pub async fn acquire(&self, template: A::Key) -> Option<PooledHandle<A>> {
        self.get_or_create(template).await?.acquire()
    }

    /// Returns an instance to the pool it came from.
    ///
    /// The owning pool is found through the handle, so this works for any pool, including
    /// pools not registered here. Returns `false` (and logs the reason) if the handle is stale.
    #[expect(
        clippy::unused_self,
        reason = "callers release through the registry they acquired from"
    )]
    pub fn release(&self, handle: &PooledHandle<A>) -> bool {
        handle.release()
    }

    /// The pool registered under `key`, if any. This neither creates nor initializes a pool.
    #[must_use]
    pub fn pool(&self, key: &PoolKey<A::Key>) -> Option<ResourcePool<A>> {
        self.pools.borrow().get(key).cloned()
    }

    /// Whether a pool is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &PoolKey<A::Key>) -> bool {
        self.pools.borrow().contains_key(key)
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.borrow().len()
    }

    /// Whether no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.borrow().is_empty()
    }

    /// Keys of all registered pools, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<PoolKey<A::Key>> {
        self.pools.borrow().keys().cloned().collect()
    }

    /// Clears the pool registered under `key` and removes it from the registry.
    ///
    /// Returns `false` if no such pool is registered.
    pub fn clear(&self, key: &PoolKey<A::Key>) -> bool {
        let removed = self.pools.borrow_mut().remove(key);

        removed.is_some_and(|pool| {
            pool.clear();
            true
        })
    }

    /// Clears every registered pool and empties the registry.
    pub fn clear_all(&self) {
        let pools = self.pools.borrow_mut().drain().collect::<Vec<_>>();

        debug!(count = pools.len(), "clearing all pools");

        for (_, pool) in pools {
            pool.clear();
        }
    }

    /// Trims every registered pool, returning the total number of destroyed instances.
    ///
    /// Pools only trim on release by themselves, so an idle pool keeps its instances until
    /// this is called. Call it on a coarse timer.
    pub fn trim_all(&self) -> usize {
        self.all_pools()
            .iter()
            .map(ResourcePool::trim_excess)
            .fold(0, usize::saturating_add)
    }

    /// Runs due deferred work in every registered pool, returning the total number of
    /// destroyed instances.
    pub fn tick(&self) -> usize {
        self.all_pools()
            .iter()
            .map(ResourcePool::tick)
            .fold(0, usize::saturating_add)
    }

    /// Snapshots of all registered pools, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PoolSnapshot<A::Key>> {
        self.all_pools().iter().map(ResourcePool::snapshot).collect()
    }

    fn all_pools(&self) -> Vec<ResourcePool<A>> {
        self.pools.borrow().values().cloned().collect()
    }
}

impl<A: AssetSource> fmt::Debug for PoolRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(type_name::<Self>());

        if let Ok(pools) = self.pools.try_borrow() {
            debug.field("pools", &pools.keys().collect::<Vec<_>>());
        }

        debug
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use futures::executor::block_on;
    use tokio::time::advance;

    use super::*;
    use crate::test_support::{RecordingHost, TestAssets};
    use crate::{ErrorConfig, ErrorStrategy, PlacementConfig, SizeConfig, TrimConfig};

    fn small_config() -> PoolConfig<&'static str> {
        PoolConfig::default().with_size(SizeConfig::default().with_initial_size(2))
    }

    #[test]
    fn get_or_create_registers_and_initializes_once() {
        let assets = TestAssets::new();
        let registry = PoolRegistry::with_default_config(Rc::clone(&assets), small_config());

        let first = block_on(registry.get_or_create("widget")).unwrap();
        let second = block_on(registry.get_or_create_with(
            "widget",
            PoolConfig::default().with_size(SizeConfig::default().with_initial_size(9)),
        ))
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(assets.load_calls.get(), 1);
        assert_eq!(first.free_count(), 2);

        // The second request's configuration is ignored.
        assert_eq!(second.config().size.initial_size, 2);
        assert_eq!(second.free_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_load() {
        let assets = TestAssets::new();
        assets.load_delay.set(Some(Duration::from_millis(50)));
        let registry = PoolRegistry::with_default_config(Rc::clone(&assets), small_config());

        let (a, b) = futures::join!(
            registry.get_or_create("widget"),
            registry.get_or_create("widget")
        );

        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(assets.load_calls.get(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pool(&PoolKey::standard("widget")).unwrap().free_count(), 2);
    }

    #[test]
    fn failed_pool_stays_registered_and_retries() {
        let assets = TestAssets::new();
        assets.fail_times("widget", 1);
        let registry = PoolRegistry::with_default_config(Rc::clone(&assets), small_config());

        assert!(block_on(registry.get_or_create("widget")).is_none());
        assert!(registry.contains(&PoolKey::standard("widget")));

        assert!(block_on(registry.get_or_create("widget")).is_some());
        assert_eq!(assets.load_calls.get(), 2);
    }

    #[test]
    fn try_get_or_create_reports_failures() {
        let assets = TestAssets::new();
        assets.fail_always("widget");
        let registry = PoolRegistry::new(Rc::clone(&assets));

        let degraded = block_on(registry.try_get_or_create(
            PoolKey::standard("widget"),
            PoolConfig::default(),
            || Box::new(NoHooks),
        ));
        assert!(matches!(degraded, Err(PoolError::Uninitialized { .. })));

        let thrown = block_on(registry.try_get_or_create(
            PoolKey::standard("gadget"),
            PoolConfig::default().with_error(
                ErrorConfig::default().with_strategy(ErrorStrategy::ThrowException),
            ),
            || Box::new(NoHooks),
        ));
        assert!(thrown.is_ok(), "gadget does not fail to load");

        assets.fail_always("gizmo");
        let thrown = block_on(registry.try_get_or_create(
            PoolKey::standard("gizmo"),
            PoolConfig::default().with_error(
                ErrorConfig::default().with_strategy(ErrorStrategy::ThrowException),
            ),
            || Box::new(NoHooks),
        ));
        assert!(matches!(thrown, Err(PoolError::TemplateLoad(_))));
    }

    #[test]
    fn acquire_and_release_through_registry() {
        let registry = PoolRegistry::with_default_config(TestAssets::new(), small_config());

        let handle = block_on(registry.acquire("widget")).unwrap();
        assert_eq!(handle.template(), &"widget");

        assert!(registry.release(&handle));
        assert!(!registry.release(&handle));

        let pool = registry.pool(&PoolKey::standard("widget")).unwrap();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn placement_pool_is_distinct_from_standard_pool() {
        let assets = TestAssets::new();
        let registry = PoolRegistry::with_default_config(Rc::clone(&assets), small_config());

        let standard = block_on(registry.get_or_create("widget")).unwrap();
        let hooks =
            PlacementHooks::new(RecordingHost::default(), PlacementConfig::new("stage", "wings"));
        let counter = hooks.counter();
        let placement =
            block_on(registry.get_or_create_placement("widget", small_config(), hooks)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(assets.load_calls.get(), 2);
        assert_ne!(standard.key(), placement.key());

        let handle = placement.acquire().unwrap();
        assert_eq!(counter.attached(), 1);
        assert!(handle.release());
        assert_eq!(counter.attached(), 0);

        let keys = registry.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&PoolKey::standard("widget")));
        assert!(keys.contains(&PoolKey::placement("widget")));
    }

    #[test]
    fn clear_removes_pool() {
        let assets = TestAssets::new();
        let registry = PoolRegistry::with_default_config(Rc::clone(&assets), small_config());
        block_on(registry.get_or_create("widget")).unwrap();
        block_on(registry.get_or_create("gadget")).unwrap();

        assert!(registry.clear(&PoolKey::standard("widget")));
        assert!(!registry.clear(&PoolKey::standard("widget")));

        assert_eq!(registry.len(), 1);
        assert_eq!(assets.destroyed.get(), 2);
        assert_eq!(*assets.unloaded.borrow(), vec!["widget"]);

        registry.clear_all();
        assert!(registry.is_empty());
        assert_eq!(assets.destroyed.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn trim_all_reaches_every_pool() {
        let config = PoolConfig::default()
            .with_size(SizeConfig::default().with_initial_size(4))
            .with_trim(
                TrimConfig::default()
                    .with_retain_ratio(0.0)
                    .with_minimum_retain(1),
            );
        let registry = PoolRegistry::with_default_config(TestAssets::new(), config);
        registry.get_or_create("widget").await.unwrap();
        registry.get_or_create("gadget").await.unwrap();

        assert_eq!(registry.trim_all(), 0, "nothing has been idle long enough");

        advance(Duration::from_secs(60)).await;

        assert_eq!(registry.trim_all(), 6);
        assert!(registry.snapshot().iter().all(|s| s.free == 1));
        assert_eq!(registry.tick(), 0);
    }

    #[test]
    fn debug_output_lists_pools() {
        let registry = PoolRegistry::with_default_config(TestAssets::new(), small_config());
        block_on(registry.get_or_create("widget")).unwrap();

        assert!(format!("{registry:?}").contains("widget"));
    }
}
