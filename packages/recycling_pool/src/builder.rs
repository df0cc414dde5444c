use std::any::type_name;
use std::fmt;
use std::rc::Rc;

use crate::{
    AssetSource, ErrorConfig, NoHooks, PlacementHooks, PoolConfig, PoolHooks, PoolKey,
    ResourcePool, SizeConfig, TrimConfig,
};

/// Builder for creating an instance of [`ResourcePool`].
///
/// The asset source and the template key are mandatory and given to
/// [`ResourcePool::builder()`]. Everything else is optional and falls back to the defaults of
/// [`PoolConfig`] and [`NoHooks`].
///
/// # Examples
///
/// ```
/// # use futures::FutureExt;
/// # use futures::future::LocalBoxFuture;
/// # use recycling_pool::{AssetSource, Poolable, TemplateLoadError};
/// # struct Coin;
/// # impl Poolable for Coin {}
/// # struct Treasury;
/// # impl AssetSource for Treasury {
/// #     type Key = u32;
/// #     type Template = ();
/// #     type Instance = Coin;
/// #     fn load(&self, _: &u32) -> LocalBoxFuture<'static, Result<(), TemplateLoadError>> {
/// #         async { Ok(()) }.boxed_local()
/// #     }
/// #     fn instantiate(&self, _: &u32, _: &()) -> Coin { Coin }
/// # }
/// use std::rc::Rc;
///
/// use recycling_pool::{RecyclingPolicy, ResourcePool, SizeConfig, TrimConfig};
///
/// let pool = ResourcePool::builder(Rc::new(Treasury), 7)
///     .size(
///         SizeConfig::default()
///             .with_max_size(16)
///             .with_recycling_policy(RecyclingPolicy::RecycleLeastRecentlyUsed),
///     )
///     .trim(TrimConfig::default().with_enabled(false))
///     .build();
///
/// assert_eq!(pool.config().size.max_size, 16);
/// ```
#[must_use]
pub struct ResourcePoolBuilder<A: AssetSource> {
    assets: Rc<A>,
    key: PoolKey<A::Key>,
    config: PoolConfig<A::Key>,
    hooks: Box<dyn PoolHooks<A::Instance>>,
}

impl<A: AssetSource> ResourcePoolBuilder<A> {
    pub(crate) fn new(assets: Rc<A>, template: A::Key) -> Self {
        Self {
            assets,
            key: PoolKey::standard(template),
            config: PoolConfig::default(),
            hooks: Box::new(NoHooks),
        }
    }

    /// Replaces the whole pool configuration.
    pub fn config(mut self, config: PoolConfig<A::Key>) -> Self {
        self.config = config;
        self
    }

    /// Sets the size limits and exhaustion behavior.
    pub fn size(mut self, size: SizeConfig) -> Self {
        self.config.size = size;
        self
    }

    /// Sets the trimming behavior.
    pub fn trim(mut self, trim: TrimConfig) -> Self {
        self.config.trim = trim;
        self
    }

    /// Sets how template load failures are handled.
    pub fn error(mut self, error: ErrorConfig<A::Key>) -> Self {
        self.config.error = error;
        self
    }

    /// Sets the hooks that run on every acquire and release.
    pub fn hooks(mut self, hooks: impl PoolHooks<A::Instance> + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Makes this a placement-aware pool that attaches instances to a container while they
    /// are active.
    ///
    /// The pool is identified by [`PoolKey::placement()`] instead of [`PoolKey::standard()`].
    pub fn placement<H, C>(mut self, hooks: PlacementHooks<H, C>) -> Self
    where
        PlacementHooks<H, C>: PoolHooks<A::Instance> + 'static,
    {
        self.key = PoolKey::placement(self.key.template().clone());
        self.hooks = Box::new(hooks);
        self
    }

    pub(crate) fn key(mut self, key: PoolKey<A::Key>) -> Self {
        self.key = key;
        self
    }

    pub(crate) fn boxed_hooks(mut self, hooks: Box<dyn PoolHooks<A::Instance>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Builds the pool. The pool is uninitialized until
    /// [`initialize()`][ResourcePool::initialize] completes.
    #[must_use]
    pub fn build(self) -> ResourcePool<A> {
        ResourcePool::new(self.assets, self.key, self.config, self.hooks)
    }
}

impl<A: AssetSource> fmt::Debug for ResourcePoolBuilder<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::test_support::{RecordingHost, TestAssets};
    use crate::{PlacementConfig, PoolVariant, RecyclingPolicy};

    #[test]
    fn defaults_to_standard_pool_with_default_config() {
        let pool = ResourcePool::builder(TestAssets::new(), "widget").build();

        assert_eq!(pool.key(), &PoolKey::standard("widget"));
        assert_eq!(pool.config().size, SizeConfig::default());
        assert!(!pool.is_initialized());
    }

    #[test]
    fn later_settings_override_earlier_ones() {
        let pool = ResourcePool::builder(TestAssets::new(), "widget")
            .size(SizeConfig::default().with_max_size(3))
            .config(PoolConfig::default().with_size(
                SizeConfig::default().with_recycling_policy(RecyclingPolicy::ReturnNull),
            ))
            .build();

        assert_eq!(pool.config().size.max_size, 100);
        assert_eq!(pool.config().size.recycling_policy, RecyclingPolicy::ReturnNull);
    }

    #[test]
    fn build_normalizes_config() {
        let pool = ResourcePool::builder(TestAssets::new(), "widget")
            .size(SizeConfig::default().with_initial_size(8).with_max_size(2))
            .build();

        assert_eq!(pool.config().size.initial_size, 2);
    }

    #[test]
    fn placement_changes_pool_identity() {
        let hooks = PlacementHooks::new(
            RecordingHost::default(),
            PlacementConfig::new("stage", "wings"),
        );

        let pool = ResourcePool::builder(TestAssets::new(), "widget")
            .placement(hooks)
            .build();

        assert_eq!(pool.key().variant(), PoolVariant::Placement);
        assert_eq!(pool.key().template(), &"widget");
    }

    #[test]
    fn debug_output_includes_key() {
        let builder = ResourcePool::builder(TestAssets::new(), "widget");

        assert!(format!("{builder:?}").contains("widget"));
    }
}
