/// Pool-level extension points that run on every acquire and release.
///
/// The pool engine calls both hooks unconditionally; the defaults do nothing. A pool variant
/// customizes instance setup and teardown by supplying its own implementation when the pool
/// is built, as [`PlacementHooks`][crate::PlacementHooks] does.
///
/// On acquire, `on_acquire()` runs before [`Poolable::on_acquired()`][crate::Poolable]. On
/// release, [`Poolable::on_released()`][crate::Poolable] runs before `on_release()`.
///
/// Hooks must not call back into the pool that invoked them.
pub trait PoolHooks<I> {
    /// Post-acquire setup, called once per acquisition.
    fn on_acquire(&mut self, instance: &mut I) {
        _ = instance;
    }

    /// Pre-release teardown, called once per release, including forced recycling.
    fn on_release(&mut self, instance: &mut I) {
        _ = instance;
    }
}

/// Hooks that do nothing, used by standard pools.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoHooks;

impl<I> PoolHooks<I> for NoHooks {}
