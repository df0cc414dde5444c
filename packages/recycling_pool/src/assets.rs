use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use tokio::runtime::Handle;
use tracing::warn;

use crate::TemplateLoadError;

/// The asset system a pool loads its templates from and creates its instances with.
///
/// A registry owns one asset source that serves every pool it creates. Loading is
/// asynchronous and happens at most once per pool initialization; instance creation and
/// destruction are synchronous because they happen inside `acquire()`, `trim_excess()` and
/// `clear()`.
///
/// Implementations must not call back into the pool that invoked them.
///
/// # Examples
///
/// ```
/// use futures::FutureExt;
/// use futures::future::LocalBoxFuture;
/// use recycling_pool::{AssetSource, Poolable, TemplateLoadError};
///
/// #[derive(Debug)]
/// struct Bullet {
///     damage: u32,
/// }
///
/// impl Poolable for Bullet {}
///
/// struct Armory;
///
/// impl AssetSource for Armory {
///     type Key = &'static str;
///     type Template = u32;
///     type Instance = Bullet;
///
///     fn load(&self, key: &&'static str) -> LocalBoxFuture<'static, Result<u32, TemplateLoadError>> {
///         let result = match *key {
///             "bullet" => Ok(10),
///             other => Err(TemplateLoadError::unavailable(&other, "no such weapon")),
///         };
///         async move { result }.boxed_local()
///     }
///
///     fn instantiate(&self, _key: &&'static str, damage: &u32) -> Bullet {
///         Bullet { damage: *damage }
///     }
/// }
/// ```
pub trait AssetSource: 'static {
    /// Identifies a template. Each pool manages instances of exactly one template key.
    type Key: Clone + Eq + Hash + Debug + 'static;

    /// The loaded blueprint that instances are created from.
    type Template: 'static;

    /// The reusable object handed out by the pool.
    type Instance: Poolable + 'static;

    /// Starts loading the template identified by `key`.
    ///
    /// The returned future is driven by whoever awaits pool initialization. It is never
    /// cancelled by the pool: if every awaiter goes away, the pool keeps the partially
    /// completed load and resumes it on the next initialization attempt.
    fn load(&self, key: &Self::Key)
    -> LocalBoxFuture<'static, Result<Self::Template, TemplateLoadError>>;

    /// Creates a new instance from a loaded template.
    fn instantiate(&self, key: &Self::Key, template: &Self::Template) -> Self::Instance;

    /// Destroys an instance the pool no longer needs.
    ///
    /// By default the instance is simply dropped.
    fn destroy(&self, instance: Self::Instance) {
        drop(instance);
    }

    /// Releases a template when the pool that loaded it is cleared.
    ///
    /// By default this does nothing.
    fn unload(&self, key: &Self::Key, template: &Self::Template) {
        _ = (key, template);
    }

    /// Waits between two template load attempts under
    /// [`ErrorStrategy::RetryWithTimeout`][crate::ErrorStrategy::RetryWithTimeout].
    ///
    /// The default sleeps on the Tokio timer when called from within a Tokio runtime (which
    /// must then have its time driver enabled). Outside of one, the delay is skipped and the
    /// next attempt starts immediately. Override this to wait on the timer of another
    /// executor.
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        if Handle::try_current().is_ok() {
            tokio::time::sleep(duration).boxed_local()
        } else {
            warn!(
                ?duration,
                "no Tokio runtime to wait on, retrying template load without delay"
            );
            future::ready(()).boxed_local()
        }
    }
}

/// Notifications an instance receives as it moves between the free and live sets.
///
/// Both methods default to doing nothing, so `impl Poolable for MyType {}` is enough for
/// instances that do not care.
pub trait Poolable {
    /// Called after the instance has been handed out by `acquire()`.
    fn on_acquired(&mut self) {}

    /// Called before the instance is returned to the free set, whether it was released by its
    /// holder or forcibly recycled.
    fn on_released(&mut self) {}
}
