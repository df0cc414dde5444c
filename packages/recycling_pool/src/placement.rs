//! Placement-aware pools.
//!
//! Some instances only make sense while they are part of a larger structure: a scene node in
//! a scene graph, a widget in a layout tree, a connection in a routing table. While such an
//! instance is free it is parked in a holding container where it has no effect; while it is
//! active it lives in a target container.
//!
//! [`PlacementHooks`] moves instances between the two on every acquire and release. It plugs
//! into a pool as ordinary [`PoolHooks`], so a placement-aware pool runs exactly the same
//! engine as a standard one. See [`ResourcePoolBuilder::placement()`][crate::ResourcePoolBuilder::placement]
//! and [`PoolRegistry::get_or_create_placement()`][crate::PoolRegistry::get_or_create_placement].

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::PoolHooks;

/// The structure that instances are attached to while they are in use.
///
/// `I` is the pooled instance type. The host owns whatever bookkeeping attachment requires;
/// the pool only tells it when to move an instance.
pub trait ContainerHost<I> {
    /// Identifies a place an instance can be attached to.
    type Container;

    /// Attaches `instance` to `container`.
    fn attach(&mut self, instance: &mut I, container: &Self::Container);

    /// Detaches `instance` from wherever it is and parks it in `container`.
    fn detach(&mut self, instance: &mut I, container: &Self::Container);
}

impl<I, H: ContainerHost<I>> ContainerHost<I> for Rc<RefCell<H>> {
    type Container = H::Container;

    fn attach(&mut self, instance: &mut I, container: &Self::Container) {
        self.borrow_mut().attach(instance, container);
    }

    fn detach(&mut self, instance: &mut I, container: &Self::Container) {
        self.borrow_mut().detach(instance, container);
    }
}

/// Instance-side state that depends on placement.
pub trait Placeable {
    /// Restores the instance's placement (position, transform, layout slot) to its neutral
    /// value.
    fn reset_placement(&mut self) {}

    /// Enables or disables subsystems that only run while the instance is placed.
    fn set_placement_active(&mut self, _active: bool) {}
}

/// Where placement-aware instances go and which resets are applied.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PlacementConfig<C> {
    /// Container that active instances are attached to.
    pub target: C,

    /// Container that free instances are parked in.
    pub holding: C,

    /// Whether placement is reset after an instance is attached to the target.
    pub reset_on_acquire: bool,

    /// Whether placement is reset after an instance is parked in the holding container.
    pub reset_on_release: bool,
}

impl<C> PlacementConfig<C> {
    /// Creates a configuration that resets placement on both acquire and release.
    #[must_use]
    pub fn new(target: C, holding: C) -> Self {
        Self {
            target,
            holding,
            reset_on_acquire: true,
            reset_on_release: true,
        }
    }

    /// Sets whether placement is reset on acquire.
    #[must_use]
    pub fn with_reset_on_acquire(mut self, reset: bool) -> Self {
        self.reset_on_acquire = reset;
        self
    }

    /// Sets whether placement is reset on release.
    #[must_use]
    pub fn with_reset_on_release(mut self, reset: bool) -> Self {
        self.reset_on_release = reset;
        self
    }
}

/// Observes how many instances a [`PlacementHooks`] has attached.
///
/// Obtained from [`PlacementHooks::counter()`] before the hooks are handed to a pool; all
/// clones observe the same hooks.
#[derive(Clone, Debug, Default)]
pub struct PlacementCounter {
    attached: Rc<Cell<usize>>,
    total: Rc<Cell<u64>>,
}

impl PlacementCounter {
    /// Number of instances currently attached to the target container.
    #[must_use]
    pub fn attached(&self) -> usize {
        self.attached.get()
    }

    /// Number of attachments since the hooks were created.
    #[must_use]
    pub fn total_attachments(&self) -> u64 {
        self.total.get()
    }

    fn on_attached(&self) {
        self.attached.set(self.attached.get().saturating_add(1));
        self.total.set(self.total.get().saturating_add(1));
    }

    fn on_detached(&self) {
        self.attached.set(self.attached.get().saturating_sub(1));
    }
}

/// Pool hooks that attach active instances to a target container and park free instances in
/// a holding container.
///
/// After acquisition, the instance is attached to the target, its placement is optionally
/// reset and its placement-dependent subsystems are enabled. Before release, the subsystems
/// are disabled, the instance is parked in the holding container and its placement is
/// optionally reset.
///
/// # Examples
///
/// ```
/// use recycling_pool::{ContainerHost, Placeable, PlacementConfig, PlacementHooks, PoolHooks};
///
/// #[derive(Default)]
/// struct Stage {
///     on_stage: Vec<u32>,
/// }
///
/// struct Actor {
///     id: u32,
///     visible: bool,
/// }
///
/// impl Placeable for Actor {
///     fn set_placement_active(&mut self, active: bool) {
///         self.visible = active;
///     }
/// }
///
/// impl ContainerHost<Actor> for Stage {
///     type Container = &'static str;
///
///     fn attach(&mut self, actor: &mut Actor, container: &&'static str) {
///         if *container == "stage" {
///             self.on_stage.push(actor.id);
///         }
///     }
///
///     fn detach(&mut self, actor: &mut Actor, _: &&'static str) {
///         self.on_stage.retain(|id| *id != actor.id);
///     }
/// }
///
/// let mut hooks = PlacementHooks::new(Stage::default(), PlacementConfig::new("stage", "wings"));
/// let counter = hooks.counter();
///
/// let mut actor = Actor { id: 1, visible: false };
/// hooks.on_acquire(&mut actor);
///
/// assert!(actor.visible);
/// assert_eq!(counter.attached(), 1);
/// ```
pub struct PlacementHooks<H, C> {
    host: H,
    config: PlacementConfig<C>,
    counter: PlacementCounter,
}

impl<H, C> PlacementHooks<H, C> {
    /// Creates hooks that move instances through `host` as configured.
    #[must_use]
    pub fn new(host: H, config: PlacementConfig<C>) -> Self {
        Self {
            host,
            config,
            counter: PlacementCounter::default(),
        }
    }

    /// The placement configuration.
    #[must_use]
    pub fn config(&self) -> &PlacementConfig<C> {
        &self.config
    }

    /// A counter that keeps observing these hooks after they are moved into a pool.
    #[must_use]
    pub fn counter(&self) -> PlacementCounter {
        self.counter.clone()
    }
}

impl<I, H, C> PoolHooks<I> for PlacementHooks<H, C>
where
    I: Placeable,
    H: ContainerHost<I, Container = C>,
{
    fn on_acquire(&mut self, instance: &mut I) {
        self.host.attach(instance, &self.config.target);
        self.counter.on_attached();

        if self.config.reset_on_acquire {
            instance.reset_placement();
        }

        instance.set_placement_active(true);

        trace!(attached = self.counter.attached(), "attached instance to target container");
    }

    fn on_release(&mut self, instance: &mut I) {
        instance.set_placement_active(false);

        self.host.detach(instance, &self.config.holding);
        self.counter.on_detached();

        if self.config.reset_on_release {
            instance.reset_placement();
        }

        trace!(attached = self.counter.attached(), "parked instance in holding container");
    }
}

impl<H, C: fmt::Debug> fmt::Debug for PlacementHooks<H, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("config", &self.config)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}
