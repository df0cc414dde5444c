#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Reuse pools for runtime instances that are expensive to create.
//!
//! Instances are created from a template that is loaded once per pool, asynchronously, through
//! an [`AssetSource`]. A [`ResourcePool`] lends its instances out and takes them back instead
//! of creating and destroying them on every use, while a [`PoolRegistry`] keeps one pool per
//! template and is the usual entry point for callers.
//!
//! # Lifecycle
//!
//! An instance is created the first time demand exceeds the free instances of its pool. It
//! then cycles between free and active until it is destroyed, which only happens when the pool
//! trims instances that have been idle for too long or when the pool is cleared.
//!
//! Free instances are reused last-in-first-out. When a pool is exhausted, its
//! [`RecyclingPolicy`] decides whether the acquisition fails, takes over the least recently used
//! active instance or temporarily grows the pool beyond its size limit.
//!
//! # Template loading
//!
//! Loading happens at most once per pool initialization. Concurrent callers await the same
//! load. Failures are resolved by the pool's [`ErrorStrategy`]: they are logged, retried,
//! replaced by a fallback template or, if asked for, returned to the caller.
//!
//! # Threading
//!
//! Pools and registries are single-threaded. All state changes happen on the thread that
//! drives the application's update loop and asynchronous loads resume on that same thread, so
//! none of the types here are [`Send`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//!
//! use futures::FutureExt;
//! use futures::future::LocalBoxFuture;
//! use recycling_pool::{AssetSource, PoolRegistry, Poolable, TemplateLoadError};
//!
//! struct Projectile {
//!     speed: f32,
//!     fired: u32,
//! }
//!
//! impl Poolable for Projectile {
//!     fn on_acquired(&mut self) {
//!         self.fired += 1;
//!     }
//! }
//!
//! struct Armory;
//!
//! impl AssetSource for Armory {
//!     type Key = &'static str;
//!     type Template = f32;
//!     type Instance = Projectile;
//!
//!     fn load(&self, key: &&'static str) -> LocalBoxFuture<'static, Result<f32, TemplateLoadError>> {
//!         let result = match *key {
//!             "arrow" => Ok(40.0),
//!             other => Err(TemplateLoadError::unavailable(&other, "no such projectile")),
//!         };
//!
//!         async move { result }.boxed_local()
//!     }
//!
//!     fn instantiate(&self, _key: &&'static str, speed: &f32) -> Projectile {
//!         Projectile { speed: *speed, fired: 0 }
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let registry = PoolRegistry::new(Rc::new(Armory));
//!
//! let arrow = registry.acquire("arrow").await.unwrap();
//! assert_eq!(arrow.with(|p| p.fired), Some(1));
//! assert!(registry.release(&arrow));
//!
//! // The same instance comes back on the next acquisition.
//! let again = registry.acquire("arrow").await.unwrap();
//! assert_eq!(again.with(|p| p.fired), Some(2));
//!
//! // Unknown templates do not produce instances.
//! assert!(registry.acquire("boulder").await.is_none());
//! # });
//! ```

mod assets;
mod builder;
mod config;
mod error;
mod handle;
mod hooks;
mod key;
mod metrics;
mod placement;
mod pool;
mod registry;
mod snapshot;

#[cfg(test)]
mod test_support;

pub use assets::*;
pub use builder::*;
pub use config::*;
pub use error::{PoolError, TemplateLoadError};
pub use handle::*;
pub use hooks::*;
pub use key::*;
pub use placement::*;
pub use pool::ResourcePool;
pub(crate) use pool::PoolShared;
pub use registry::*;
pub use snapshot::*;
