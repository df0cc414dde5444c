use std::any::type_name;
use std::fmt;
use std::ptr;
use std::rc::{Rc, Weak};

use tokio::time::Instant;
use tracing::warn;

use crate::{AssetSource, PoolError, PoolShared, ResourcePool};

/// Caller-facing reference to an instance that was acquired from a [`ResourcePool`].
///
/// The handle binds the instance to its owning pool for the duration of one acquire/release
/// cycle. The instance itself stays inside the pool; it is lent to the holder of the handle,
/// who accesses it via [`with()`][Self::with] and [`with_mut()`][Self::with_mut].
///
/// A handle is valid only while its instance is active. It becomes stale when the instance is
/// released (through any clone of the handle), forcibly recycled by the pool or destroyed by
/// [`ResourcePool::clear()`]. Operations on a stale handle fail instead of touching whatever
/// instance currently occupies the same storage.
///
/// Cloning a handle is cheap and all clones refer to the same acquisition.
pub struct PooledHandle<A: AssetSource> {
    owner: Weak<PoolShared<A>>,
    slot: usize,
    generation: u64,
    template: A::Key,
}

impl<A: AssetSource> PooledHandle<A> {
    pub(crate) fn new(
        owner: Weak<PoolShared<A>>,
        slot: usize,
        generation: u64,
        template: A::Key,
    ) -> Self {
        Self {
            owner,
            slot,
            generation,
            template,
        }
    }

    /// The template key the owning pool was created for.
    #[must_use]
    pub fn template(&self) -> &A::Key {
        &self.template
    }

    /// The pool that owns the instance, if that pool still exists.
    #[must_use]
    pub fn pool(&self) -> Option<ResourcePool<A>> {
        self.owner.upgrade().map(ResourcePool::from_shared)
    }

    /// Whether the instance is still lent out under this handle.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.pool().is_some_and(|pool| pool.is_active(self))
    }

    /// When the instance was last acquired or [touched][Self::touch], if the handle is active.
    #[must_use]
    pub fn last_access(&self) -> Option<Instant> {
        self.pool().and_then(|pool| pool.last_access(self))
    }

    /// Marks the instance as recently used, protecting it from least-recently-used recycling.
    ///
    /// Returns `false` if the handle is stale.
    pub fn touch(&self) -> bool {
        self.pool().is_some_and(|pool| pool.touch(self))
    }

    /// Calls `f` with shared access to the instance. Returns `None` if the handle is stale.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls back into the owning pool.
    pub fn with<R>(&self, f: impl FnOnce(&A::Instance) -> R) -> Option<R> {
        self.pool()?.with_instance(self, |instance| f(instance))
    }

    /// Calls `f` with exclusive access to the instance. Returns `None` if the handle is stale.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls back into the owning pool.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut A::Instance) -> R) -> Option<R> {
        self.pool()?.with_instance(self, f)
    }

    /// Returns the instance to its pool.
    ///
    /// This is the same as calling [`ResourcePool::release()`] on the owning pool and is how an
    /// instance that holds its own handle releases itself. Returns `false` (and logs the
    /// reason) if the handle is stale or its pool no longer exists.
    pub fn release(&self) -> bool {
        if let Some(pool) = self.pool() {
            pool.release(self)
        } else {
            let error = PoolError::NotOwned {
                key: format!("{:?}", self.template),
            };
            warn!(%error, "release rejected: the owning pool no longer exists");
            false
        }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_owned_by(&self, shared: &Rc<PoolShared<A>>) -> bool {
        ptr::eq(self.owner.as_ptr(), Rc::as_ptr(shared))
    }
}

impl<A: AssetSource> Clone for PooledHandle<A> {
    fn clone(&self) -> Self {
        Self {
            owner: Weak::clone(&self.owner),
            slot: self.slot,
            generation: self.generation,
            template: self.template.clone(),
        }
    }
}

impl<A: AssetSource> fmt::Debug for PooledHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("template", &self.template)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
