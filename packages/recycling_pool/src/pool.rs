use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::time::Duration;

use foldhash::{HashSet, HashSetExt};
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::metrics::{ACQUIRED, ACQUIRE_FAILED, CREATED, LOAD_ATTEMPTS, RELEASED, TRIMMED};
use crate::{
    AssetSource, ErrorConfig, ErrorStrategy, PoolConfig, PoolError, PoolHooks, PoolKey,
    PoolSnapshot, Poolable, PooledHandle, RecyclingPolicy, ResourcePoolBuilder,
    TemplateLoadError,
};

/// How long after a temporary overflow the pool checks whether it can shrink back.
pub(crate) const OVERFLOW_SHRINK_DELAY: Duration = Duration::from_secs(30);

/// The deferred overflow check only shrinks the pool once the live count has dropped below
/// `max_size * NUMERATOR / DENOMINATOR`.
const OVERFLOW_SHRINK_NUMERATOR: usize = 4;
const OVERFLOW_SHRINK_DENOMINATOR: usize = 5;

const SLOT_INVARIANT: &str = "slot indices tracked by the pool always refer to existing slots";

/// Owns the instances of one template and hands them out for reuse.
///
/// A pool goes through these steps:
///
/// 1. [`initialize()`][Self::initialize] loads the template through the [`AssetSource`] and
///    creates the configured number of instances up front.
/// 2. [`acquire()`][Self::acquire] hands out a free instance, creating one if the size limits
///    allow it or applying the [`RecyclingPolicy`] if they do not.
/// 3. [`release()`][Self::release] takes an instance back into the free set and occasionally
///    destroys instances that have been idle for a long time.
/// 4. [`clear()`][Self::clear] destroys everything and returns the pool to its uninitialized
///    state.
///
/// Free instances are reused last-in-first-out, so the instance released most recently is the
/// next one handed out.
///
/// `ResourcePool` is a cheap handle: clones refer to the same pool. The pool is meant to be
/// driven from a single logical thread (e.g. an application's update loop) and is neither
/// [`Send`] nor [`Sync`].
///
/// # Examples
///
/// ```
/// # use futures::FutureExt;
/// # use futures::future::LocalBoxFuture;
/// # use recycling_pool::{AssetSource, Poolable, TemplateLoadError};
/// # #[derive(Debug)]
/// # struct Spark;
/// # impl Poolable for Spark {}
/// # struct Effects;
/// # impl AssetSource for Effects {
/// #     type Key = &'static str;
/// #     type Template = ();
/// #     type Instance = Spark;
/// #     fn load(&self, _: &&'static str) -> LocalBoxFuture<'static, Result<(), TemplateLoadError>> {
/// #         async { Ok(()) }.boxed_local()
/// #     }
/// #     fn instantiate(&self, _: &&'static str, _: &()) -> Spark { Spark }
/// # }
/// use std::rc::Rc;
///
/// use recycling_pool::{ResourcePool, SizeConfig};
///
/// # futures::executor::block_on(async {
/// let pool = ResourcePool::builder(Rc::new(Effects), "spark")
///     .size(SizeConfig::default().with_initial_size(2).with_max_size(4))
///     .build();
///
/// assert!(pool.initialize().await.unwrap());
/// assert_eq!(pool.free_count(), 2);
///
/// let spark = pool.acquire().unwrap();
/// assert_eq!(pool.live_count(), 1);
///
/// assert!(pool.release(&spark));
/// assert_eq!(pool.free_count(), 2);
/// # });
/// ```
pub struct ResourcePool<A: AssetSource> {
    shared: Rc<PoolShared<A>>,
}

pub(crate) struct PoolShared<A: AssetSource> {
    key: PoolKey<A::Key>,
    config: PoolConfig<A::Key>,
    assets: Rc<A>,
    hooks: RefCell<Box<dyn PoolHooks<A::Instance>>>,
    state: RefCell<PoolState<A>>,
}

struct LoadedTemplate<A: AssetSource> {
    /// The template actually in use, which differs from the requested one after a fallback.
    key: A::Key,
    template: Rc<A::Template>,
    is_fallback: bool,
}

impl<A: AssetSource> Clone for LoadedTemplate<A> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            template: Rc::clone(&self.template),
            is_fallback: self.is_fallback,
        }
    }
}

type LoadOutcome<A> = std::result::Result<LoadedTemplate<A>, TemplateLoadError>;
type SharedLoad<A> = Shared<LocalBoxFuture<'static, LoadOutcome<A>>>;

struct PendingLoad<A: AssetSource> {
    id: u64,
    future: SharedLoad<A>,
}

struct AttachedTemplate<A: AssetSource> {
    load_id: u64,
    loaded: LoadedTemplate<A>,
}

struct Slot<I> {
    /// `None` if the slot is vacant.
    instance: Option<I>,
    active: bool,

    /// Identifies the current acquisition. Handles from earlier acquisitions carry an older
    /// generation and are rejected.
    generation: u64,

    last_access: Instant,

    /// Tie-breaker for instances accessed within the same clock tick.
    access_seq: u64,

    idle_since: Instant,
}

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    created_total: u64,
    acquired_total: u64,
    released_total: u64,
    peak_live: usize,
    failed_acquires: u64,
    recycled_total: u64,
    trimmed_total: u64,
}

struct PoolState<A: AssetSource> {
    template: Option<AttachedTemplate<A>>,
    pending_load: Option<PendingLoad<A>>,
    next_load_id: u64,

    slots: Vec<Slot<A::Instance>>,
    vacant: Vec<usize>,

    /// Stack of free slot indices; the top is reused first.
    free: Vec<usize>,
    live: HashSet<usize>,

    /// Never reset, not even by `clear()`, so handles cannot outlive a clear.
    next_generation: u64,
    next_access_seq: u64,

    counters: Counters,
    last_trim: Instant,
    overflow_active: bool,
    shrink_check_at: Option<Instant>,
}

impl<A: AssetSource> PoolState<A> {
    fn new(now: Instant) -> Self {
        Self {
            template: None,
            pending_load: None,
            next_load_id: 0,
            slots: Vec::new(),
            vacant: Vec::new(),
            free: Vec::new(),
            live: HashSet::new(),
            next_generation: 0,
            next_access_seq: 0,
            counters: Counters::default(),
            last_trim: now,
            overflow_active: false,
            shrink_check_at: None,
        }
    }

    fn total(&self) -> usize {
        self.live.len().saturating_add(self.free.len())
    }

    fn slot(&self, index: usize) -> &Slot<A::Instance> {
        self.slots.get(index).expect(SLOT_INVARIANT)
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot<A::Instance> {
        self.slots.get_mut(index).expect(SLOT_INVARIANT)
    }

    fn is_active(&self, handle: &PooledHandle<A>) -> bool {
        self.slots.get(handle.slot()).is_some_and(|slot| {
            slot.active && slot.instance.is_some() && slot.generation == handle.generation()
        })
    }

    fn issue_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        // A u64 incremented once per acquisition does not wrap in practice.
        self.next_generation = generation.wrapping_add(1);
        generation
    }

    fn issue_access_seq(&mut self) -> u64 {
        let seq = self.next_access_seq;
        self.next_access_seq = seq.wrapping_add(1);
        seq
    }

    fn least_recently_used(&self) -> Option<usize> {
        self.live.iter().copied().min_by_key(|&index| {
            let slot = self.slot(index);
            (slot.last_access, slot.access_seq)
        })
    }

    fn sort_oldest_idle_first(&self, indices: &mut [usize]) {
        indices.sort_by_key(|&index| (self.slot(index).idle_since, index));
    }

    /// Drops indices of destroyed instances from the free stack, preserving the order of the
    /// remaining ones.
    fn retain_free_instances(&mut self) {
        let Self { free, slots, .. } = self;
        free.retain(|&index| slots.get(index).is_some_and(|slot| slot.instance.is_some()));
    }
}

impl<A: AssetSource> PoolShared<A> {
    fn create_instance(
        &self,
        state: &mut PoolState<A>,
        template_key: &A::Key,
        template: &A::Template,
        now: Instant,
    ) -> usize {
        let slot = Slot {
            instance: Some(self.assets.instantiate(template_key, template)),
            active: false,
            generation: 0,
            last_access: now,
            access_seq: 0,
            idle_since: now,
        };

        let index = if let Some(index) = state.vacant.pop() {
            *state.slot_mut(index) = slot;
            index
        } else {
            state.slots.push(slot);
            state.slots.len().wrapping_sub(1)
        };

        state.counters.created_total = state.counters.created_total.wrapping_add(1);
        CREATED.with(|e| e.observe_once());

        index
    }

    /// Moves an instance that is not in the free set into the live set and runs the
    /// post-acquire hooks. Returns the generation of the new acquisition.
    fn activate(&self, state: &mut PoolState<A>, index: usize, now: Instant) -> u64 {
        let generation = state.issue_generation();
        let access_seq = state.issue_access_seq();

        let inserted = state.live.insert(index);
        debug_assert!(inserted, "instance was already live");

        let slot = state.slot_mut(index);
        slot.active = true;
        slot.generation = generation;
        slot.last_access = now;
        slot.access_seq = access_seq;

        let instance = slot.instance.as_mut().expect(SLOT_INVARIANT);
        self.hooks.borrow_mut().on_acquire(instance);
        instance.on_acquired();

        let counters = &mut state.counters;
        counters.acquired_total = counters.acquired_total.wrapping_add(1);
        counters.peak_live = counters.peak_live.max(state.live.len());
        ACQUIRED.with(|e| e.observe_once());

        generation
    }

    /// Moves a live instance into the free set, running the pre-release hooks.
    fn deactivate(&self, state: &mut PoolState<A>, index: usize, now: Instant) {
        let removed = state.live.remove(&index);
        debug_assert!(removed, "instance was not live");

        let slot = state.slot_mut(index);
        slot.active = false;
        slot.idle_since = now;

        if let Some(instance) = slot.instance.as_mut() {
            instance.on_released();
            self.hooks.borrow_mut().on_release(instance);
        }

        state.free.push(index);
        state.counters.released_total = state.counters.released_total.wrapping_add(1);
        RELEASED.with(|e| e.observe_once());
    }

    /// Destroys the instance in a slot. The caller is responsible for removing the index from
    /// the free stack or live set.
    fn destroy(&self, state: &mut PoolState<A>, index: usize) {
        let slot = state.slot_mut(index);
        slot.active = false;

        if let Some(instance) = slot.instance.take() {
            state.vacant.push(index);
            self.assets.destroy(instance);
        }
    }

    fn recycle_least_recently_used(&self, state: &mut PoolState<A>, now: Instant) -> Option<usize> {
        let victim = state.least_recently_used()?;

        debug!(pool = %self.key, slot = victim, "force-releasing least recently used instance");

        self.deactivate(state, victim, now);
        state.counters.recycled_total = state.counters.recycled_total.wrapping_add(1);

        let reused = state.free.pop();
        debug_assert_eq!(reused, Some(victim));
        reused
    }

    fn create_overflow_instance(
        &self,
        state: &mut PoolState<A>,
        template_key: &A::Key,
        template: &A::Template,
        now: Instant,
    ) -> usize {
        // Without growth, creation under the limit also lands here and is not an overflow.
        if state.total() < self.config.size.max_size {
            return self.create_instance(state, template_key, template, now);
        }

        let index = self.create_instance(state, template_key, template, now);
        state.overflow_active = true;

        warn!(
            pool = %self.key,
            total = state.total().saturating_add(1),
            max_size = self.config.size.max_size,
            "pool temporarily exceeds its size limit"
        );

        // One pending check at a time. A new overflow while a check is pending does not
        // reschedule it.
        if state.shrink_check_at.is_none() {
            state.shrink_check_at = Some(now.checked_add(OVERFLOW_SHRINK_DELAY).unwrap_or(now));
        }

        index
    }

    /// Destroys the oldest eligible free instances while keeping the share requested by the
    /// trim configuration.
    fn trim(&self, state: &mut PoolState<A>, now: Instant) -> usize {
        let trim = &self.config.trim;
        state.last_trim = now;

        if state.free.len() <= trim.minimum_retain {
            return 0;
        }

        let mut eligible = state
            .free
            .iter()
            .copied()
            .filter(|&index| {
                now.saturating_duration_since(state.slot(index).idle_since)
                    >= trim.inactivity_threshold
            })
            .collect::<Vec<_>>();

        let keep = trim
            .minimum_retain
            .max(retained_share(eligible.len(), trim.retain_ratio));
        let excess = eligible.len().saturating_sub(keep);

        if excess == 0 {
            return 0;
        }

        state.sort_oldest_idle_first(&mut eligible);
        self.destroy_free(state, eligible.get(..excess).unwrap_or_default());

        debug!(
            pool = %self.key,
            destroyed = excess,
            remaining = state.free.len(),
            "trimmed idle instances"
        );

        excess
    }

    /// Destroys free instances, oldest idle first, until the pool is back within its size
    /// limit. The inactivity threshold does not apply but the minimum retention does.
    fn shrink_to_limit(&self, state: &mut PoolState<A>) -> usize {
        let excess = state.total().saturating_sub(self.config.size.max_size);
        let removable = state.free.len().saturating_sub(self.config.trim.minimum_retain);
        let count = excess.min(removable);

        if count == 0 {
            return 0;
        }

        let mut candidates = state.free.clone();
        state.sort_oldest_idle_first(&mut candidates);
        self.destroy_free(state, candidates.get(..count).unwrap_or_default());

        debug!(
            pool = %self.key,
            destroyed = count,
            total = state.total(),
            "shrank pool after temporary overflow"
        );

        count
    }

    fn destroy_free(&self, state: &mut PoolState<A>, indices: &[usize]) {
        for &index in indices {
            self.destroy(state, index);
        }

        state.retain_free_instances();

        let destroyed = indices.len();
        state.counters.trimmed_total = state
            .counters
            .trimmed_total
            .wrapping_add(u64::try_from(destroyed).unwrap_or(u64::MAX));
        TRIMMED.with(|e| e.observe(destroyed));

        if state.total() <= self.config.size.max_size {
            state.overflow_active = false;
        }
    }

    /// Runs the one-shot overflow check if it is due.
    fn run_shrink_check(&self, state: &mut PoolState<A>, now: Instant) -> usize {
        let Some(due) = state.shrink_check_at else {
            return 0;
        };

        if now < due {
            return 0;
        }

        state.shrink_check_at = None;

        let live = state.live.len();
        let max_size = self.config.size.max_size;

        let destroyed = if live.saturating_mul(OVERFLOW_SHRINK_DENOMINATOR)
            < max_size.saturating_mul(OVERFLOW_SHRINK_NUMERATOR)
        {
            self.shrink_to_limit(state)
        } else {
            debug!(
                pool = %self.key,
                live,
                max_size,
                "demand still high at overflow check, pool stays oversized"
            );
            0
        };

        if state.total() <= max_size {
            state.overflow_active = false;
        }

        destroyed
    }

    fn attach(&self, state: &mut PoolState<A>, load_id: u64, loaded: LoadedTemplate<A>) {
        let now = Instant::now();
        let warm = self.config.size.initial_size;

        for _ in 0..warm {
            let index = self.create_instance(state, &loaded.key, &loaded.template, now);
            state.free.push(index);
        }

        state.last_trim = now;

        debug!(
            pool = %self.key,
            template = ?loaded.key,
            fallback = loaded.is_fallback,
            warm,
            "pool initialized"
        );

        state.template = Some(AttachedTemplate { load_id, loaded });
    }

    fn not_owned(&self) -> PoolError {
        PoolError::NotOwned {
            key: self.key.to_string(),
        }
    }
}

/// The share of `count` items that survives a trim, rounded up.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    reason = "ratio is clamped to [0, 1] so the result is within [0, count]"
)]
fn retained_share(count: usize, ratio: f64) -> usize {
    ((count as f64) * ratio).ceil() as usize
}

/// Loads a template and applies the error strategy to any failure.
///
/// This is the single load operation of a pool initialization. It is shared by every caller
/// that awaits the initialization, so each failed attempt is logged and reported exactly once.
async fn load_with_policy<A: AssetSource>(
    assets: Rc<A>,
    key: A::Key,
    config: ErrorConfig<A::Key>,
) -> LoadOutcome<A> {
    let attempt_limit = config.attempt_limit();
    let mut attempt: u32 = 0;

    let failure = loop {
        attempt = attempt.saturating_add(1);
        LOAD_ATTEMPTS.with(|e| e.observe_once());

        match assets.load(&key).await {
            Ok(template) => {
                return Ok(LoadedTemplate {
                    key,
                    template: Rc::new(template),
                    is_fallback: false,
                });
            }
            Err(failure) => {
                error!(template = ?key, attempt, attempt_limit, error = %failure, "template load attempt failed");
                config.notify(&failure);

                if attempt >= attempt_limit {
                    break failure;
                }

                if !config.retry_delay.is_zero() {
                    assets.delay(config.retry_delay).await;
                }
            }
        }
    };

    if config.strategy == ErrorStrategy::ReturnFallback {
        if let Some(fallback) = config.fallback_template.clone() {
            LOAD_ATTEMPTS.with(|e| e.observe_once());

            match assets.load(&fallback).await {
                Ok(template) => {
                    warn!(template = ?key, fallback = ?fallback, "substituting fallback template");

                    return Ok(LoadedTemplate {
                        key: fallback,
                        template: Rc::new(template),
                        is_fallback: true,
                    });
                }
                Err(fallback_failure) => {
                    error!(template = ?key, fallback = ?fallback, error = %fallback_failure, "fallback template failed to load");
                    config.notify(&fallback_failure);
                }
            }
        } else {
            warn!(template = ?key, "no fallback template configured");
        }
    }

    error!(template = ?key, strategy = ?config.strategy, error = %failure, "template unavailable, pool stays uninitialized");

    Err(failure)
}

impl<A: AssetSource> ResourcePool<A> {
    /// Creates a builder for a standalone pool of `template`.
    ///
    /// Pools are usually created through a [`PoolRegistry`][crate::PoolRegistry], which shares
    /// one asset source between many pools.
    pub fn builder(assets: Rc<A>, template: A::Key) -> ResourcePoolBuilder<A> {
        ResourcePoolBuilder::new(assets, template)
    }

    pub(crate) fn new(
        assets: Rc<A>,
        key: PoolKey<A::Key>,
        config: PoolConfig<A::Key>,
        hooks: Box<dyn PoolHooks<A::Instance>>,
    ) -> Self {
        Self {
            shared: Rc::new(PoolShared {
                key,
                config: config.normalized(),
                assets,
                hooks: RefCell::new(hooks),
                state: RefCell::new(PoolState::new(Instant::now())),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Rc<PoolShared<A>>) -> Self {
        Self { shared }
    }

    /// The identity of this pool.
    #[must_use]
    pub fn key(&self) -> &PoolKey<A::Key> {
        &self.shared.key
    }

    /// The configuration the pool was created with, after normalization.
    #[must_use]
    pub fn config(&self) -> &PoolConfig<A::Key> {
        &self.shared.config
    }

    /// Whether the template has been loaded and instances can be acquired.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.state.borrow().template.is_some()
    }

    /// Number of instances currently lent out.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared.state.borrow().live.len()
    }

    /// Number of instances waiting to be reused.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.shared.state.borrow().free.len()
    }

    /// Loads the template and creates the initial instances.
    ///
    /// The load is memoized: concurrent callers await the same operation and a pool that is
    /// already initialized returns immediately. If the load fails, the memo is discarded so
    /// that a later call starts over.
    ///
    /// Returns `Ok(true)` if the pool is initialized, including when a fallback template was
    /// substituted, and `Ok(false)` if the template is unavailable and the error strategy
    /// swallowed the failure (it is logged).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TemplateLoad`] if loading fails and the error strategy is
    /// [`ErrorStrategy::ThrowException`].
    pub async fn initialize(&self) -> Result<bool> {
        let (load_id, load) = {
            let mut state = self.shared.state.borrow_mut();

            if state.template.is_some() {
                return Ok(true);
            }

            if let Some(pending) = &state.pending_load {
                (pending.id, pending.future.clone())
            } else {
                let id = state.next_load_id;
                state.next_load_id = id.wrapping_add(1);

                let future = load_with_policy(
                    Rc::clone(&self.shared.assets),
                    self.shared.key.template().clone(),
                    self.shared.config.error.clone(),
                )
                .boxed_local()
                .shared();

                debug!(pool = %self.shared.key, "loading template");

                state.pending_load = Some(PendingLoad {
                    id,
                    future: future.clone(),
                });

                (id, future)
            }
        };

        let outcome = load.await;

        let mut state = self.shared.state.borrow_mut();

        // The first awaiter to resume applies the outcome. Later awaiters of the same load
        // only report it.
        let claimed = state
            .pending_load
            .as_ref()
            .is_some_and(|pending| pending.id == load_id);

        if claimed {
            state.pending_load = None;
        }

        match outcome {
            Ok(loaded) => {
                if claimed {
                    self.shared.attach(&mut state, load_id, loaded);
                    Ok(true)
                } else if state
                    .template
                    .as_ref()
                    .is_some_and(|attached| attached.load_id == load_id)
                {
                    Ok(true)
                } else {
                    debug!(pool = %self.shared.key, "pool was cleared while its template was loading");
                    Ok(false)
                }
            }
            Err(failure) => {
                if self.shared.config.error.strategy == ErrorStrategy::ThrowException {
                    Err(failure.into())
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Initializes the pool if needed, then acquires an instance.
    ///
    /// Dropping the returned future before it completes abandons the acquisition. A template
    /// load that was already started is not cancelled: the pool keeps it and the next
    /// initialization resumes it.
    pub async fn acquire_async(&self) -> Option<PooledHandle<A>> {
        match self.initialize().await {
            Ok(true) => self.acquire(),
            Ok(false) => {
                warn!(pool = %self.shared.key, "cannot acquire, template is unavailable");
                None
            }
            Err(error) => {
                warn!(pool = %self.shared.key, %error, "cannot acquire, template is unavailable");
                None
            }
        }
    }

    /// Acquires an instance, logging the reason and returning `None` on failure.
    ///
    /// See [`try_acquire()`][Self::try_acquire] for details.
    #[must_use]
    pub fn acquire(&self) -> Option<PooledHandle<A>> {
        match self.try_acquire() {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!(%error, "acquire failed");
                None
            }
        }
    }

    /// Acquires an instance.
    ///
    /// The most recently released free instance is reused first. Without free instances, a
    /// new one is created if growth is allowed and the pool is below its size limit. Otherwise
    /// the [`RecyclingPolicy`] decides.
    ///
    /// This never suspends and never creates more than one instance.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Uninitialized`] if the pool has not been initialized and
    /// [`PoolError::Exhausted`] if the recycling policy cannot supply an instance.
    pub fn try_acquire(&self) -> Result<PooledHandle<A>> {
        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();

        let Some((template_key, template)) = state
            .template
            .as_ref()
            .map(|attached| (attached.loaded.key.clone(), Rc::clone(&attached.loaded.template)))
        else {
            ACQUIRE_FAILED.with(|e| e.observe_once());
            return Err(PoolError::Uninitialized {
                key: shared.key.to_string(),
            });
        };

        let now = Instant::now();
        let size = &shared.config.size;

        let index = if let Some(index) = state.free.pop() {
            Some(index)
        } else if size.allow_growth && state.total() < size.max_size {
            Some(shared.create_instance(&mut state, &template_key, &template, now))
        } else {
            match size.recycling_policy {
                RecyclingPolicy::ReturnNull => None,
                RecyclingPolicy::RecycleLeastRecentlyUsed => {
                    shared.recycle_least_recently_used(&mut state, now)
                }
                RecyclingPolicy::ExceedMaxSizeTemporarily => Some(
                    shared.create_overflow_instance(&mut state, &template_key, &template, now),
                ),
            }
        };

        let Some(index) = index else {
            state.counters.failed_acquires = state.counters.failed_acquires.wrapping_add(1);
            ACQUIRE_FAILED.with(|e| e.observe_once());
            return Err(PoolError::Exhausted {
                key: shared.key.to_string(),
            });
        };

        let generation = shared.activate(&mut state, index, now);

        trace!(pool = %shared.key, slot = index, generation, "acquired instance");

        Ok(PooledHandle::new(
            Rc::downgrade(shared),
            index,
            generation,
            shared.key.template().clone(),
        ))
    }

    /// Returns an instance to the pool, logging the reason and returning `false` on failure.
    ///
    /// See [`try_release()`][Self::try_release] for details.
    pub fn release(&self, handle: &PooledHandle<A>) -> bool {
        match self.try_release(handle) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "release rejected");
                false
            }
        }
    }

    /// Returns an instance to the pool.
    ///
    /// The pre-release hooks run, the instance is pushed onto the free stack and, if trimming
    /// is enabled and the check interval has elapsed since the last trim, idle instances are
    /// trimmed. A due overflow check also runs here.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotOwned`] if the handle belongs to another pool or no longer
    /// refers to an active instance of this pool.
    pub fn try_release(&self, handle: &PooledHandle<A>) -> Result<()> {
        let shared = &self.shared;

        if !handle.is_owned_by(shared) {
            return Err(shared.not_owned());
        }

        let mut state = shared.state.borrow_mut();

        if !state.is_active(handle) {
            return Err(shared.not_owned());
        }

        let now = Instant::now();
        shared.deactivate(&mut state, handle.slot(), now);

        trace!(pool = %shared.key, slot = handle.slot(), "released instance");

        let trim = &shared.config.trim;
        if trim.enabled && now.saturating_duration_since(state.last_trim) >= trim.check_interval {
            shared.trim(&mut state, now);
        }

        shared.run_shrink_check(&mut state, now);

        Ok(())
    }

    /// Calls `f` with the instance behind an active handle. Returns `None` if the handle is
    /// stale or belongs to another pool.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls back into this pool.
    pub fn with_instance<R>(
        &self,
        handle: &PooledHandle<A>,
        f: impl FnOnce(&mut A::Instance) -> R,
    ) -> Option<R> {
        if !handle.is_owned_by(&self.shared) {
            return None;
        }

        let mut state = self.shared.state.borrow_mut();

        if !state.is_active(handle) {
            return None;
        }

        state.slot_mut(handle.slot()).instance.as_mut().map(f)
    }

    /// Destroys free instances that have been idle for at least the inactivity threshold,
    /// keeping `max(minimum_retain, ceil(eligible * retain_ratio))` of them.
    ///
    /// This runs regardless of whether release-triggered trimming is enabled. Instances idle
    /// for less than the threshold are never destroyed. Returns the number of destroyed
    /// instances, which is purely informational.
    pub fn trim_excess(&self) -> usize {
        let mut state = self.shared.state.borrow_mut();
        self.shared.trim(&mut state, Instant::now())
    }

    /// Runs deferred work that has become due, i.e. the one-shot check scheduled after the
    /// pool temporarily exceeded its size limit.
    ///
    /// Call this from the host's update loop. Returns the number of destroyed instances.
    pub fn tick(&self) -> usize {
        let mut state = self.shared.state.borrow_mut();
        self.shared.run_shrink_check(&mut state, Instant::now())
    }

    /// Destroys every instance, live or free, unloads the template and resets all counters.
    ///
    /// Live instances are destroyed without running their release hooks and all outstanding
    /// handles become stale. An in-flight template load is abandoned. The pool returns to its
    /// uninitialized state and may be initialized again. Calling this on a pool that is
    /// already clear does nothing.
    pub fn clear(&self) {
        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();

        if state.template.is_none() && state.pending_load.is_none() && state.slots.is_empty() {
            return;
        }

        let slots = mem::take(&mut state.slots);
        state.vacant.clear();
        state.free.clear();
        state.live.clear();
        state.pending_load = None;
        state.counters = Counters::default();
        state.overflow_active = false;
        state.shrink_check_at = None;
        let template = state.template.take();

        drop(state);

        let mut destroyed: usize = 0;
        for instance in slots.into_iter().filter_map(|slot| slot.instance) {
            shared.assets.destroy(instance);
            destroyed = destroyed.wrapping_add(1);
        }

        if let Some(attached) = template {
            shared
                .assets
                .unload(&attached.loaded.key, &attached.loaded.template);
        }

        debug!(pool = %shared.key, destroyed, "pool cleared");
    }

    /// Captures the pool's counters and state for inspection.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot<A::Key> {
        let state = self.shared.state.borrow();
        let counters = state.counters;

        PoolSnapshot {
            key: self.shared.key.clone(),
            template: state
                .template
                .as_ref()
                .map(|attached| attached.loaded.key.clone()),
            is_fallback: state
                .template
                .as_ref()
                .is_some_and(|attached| attached.loaded.is_fallback),
            initialized: state.template.is_some(),
            loading: state.pending_load.is_some(),
            live: state.live.len(),
            free: state.free.len(),
            created_total: counters.created_total,
            acquired_total: counters.acquired_total,
            released_total: counters.released_total,
            peak_live: counters.peak_live,
            failed_acquires: counters.failed_acquires,
            recycled_total: counters.recycled_total,
            trimmed_total: counters.trimmed_total,
            overflow_active: state.overflow_active,
        }
    }

    pub(crate) fn is_active(&self, handle: &PooledHandle<A>) -> bool {
        handle.is_owned_by(&self.shared) && self.shared.state.borrow().is_active(handle)
    }

    pub(crate) fn last_access(&self, handle: &PooledHandle<A>) -> Option<Instant> {
        if !handle.is_owned_by(&self.shared) {
            return None;
        }

        let state = self.shared.state.borrow();

        state
            .is_active(handle)
            .then(|| state.slot(handle.slot()).last_access)
    }

    pub(crate) fn touch(&self, handle: &PooledHandle<A>) -> bool {
        if !handle.is_owned_by(&self.shared) {
            return false;
        }

        let mut state = self.shared.state.borrow_mut();

        if !state.is_active(handle) {
            return false;
        }

        let access_seq = state.issue_access_seq();
        let slot = state.slot_mut(handle.slot());
        slot.last_access = Instant::now();
        slot.access_seq = access_seq;

        true
    }
}

impl<A: AssetSource> Clone for ResourcePool<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<A: AssetSource> fmt::Debug for ResourcePool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(type_name::<Self>());
        debug.field("key", &self.shared.key);

        // The state may be borrowed if we are formatted from inside a hook.
        if let Ok(state) = self.shared.state.try_borrow() {
            debug
                .field("initialized", &state.template.is_some())
                .field("live", &state.live.len())
                .field("free", &state.free.len());
        }

        debug.finish_non_exhaustive()
    }
}
