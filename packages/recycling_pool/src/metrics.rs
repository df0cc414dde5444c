//! Process-wide metrics for recycling pools.
//!
//! These complement the per-pool counters in [`PoolSnapshot`][crate::PoolSnapshot] with
//! aggregate events that end up in an `nm` report. The events are per-thread, matching the
//! single-threaded usage model of the pools themselves.

use nm::{Event, Magnitude};

/// Histogram buckets for the number of instances destroyed by one trim.
const TRIMMED_INSTANCES_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 20, 50, 100];

thread_local! {
    /// An instance was handed out by a pool.
    pub(crate) static ACQUIRED: Event = Event::builder()
        .name("recycling_pool_acquired")
        .build();

    /// An acquisition failed because the pool was exhausted or not initialized.
    pub(crate) static ACQUIRE_FAILED: Event = Event::builder()
        .name("recycling_pool_acquire_failed")
        .build();

    /// An instance was returned to its pool, whether by its holder or by forced recycling.
    pub(crate) static RELEASED: Event = Event::builder()
        .name("recycling_pool_released")
        .build();

    /// A pool created a new instance from its template.
    pub(crate) static CREATED: Event = Event::builder()
        .name("recycling_pool_created")
        .build();

    /// A trim completed. The magnitude is the number of instances destroyed.
    pub(crate) static TRIMMED: Event = Event::builder()
        .name("recycling_pool_trimmed")
        .histogram(TRIMMED_INSTANCES_BUCKETS)
        .build();

    /// The asset source was asked to load a template.
    pub(crate) static LOAD_ATTEMPTS: Event = Event::builder()
        .name("recycling_pool_load_attempts")
        .build();
}
