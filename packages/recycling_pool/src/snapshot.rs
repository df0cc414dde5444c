use crate::PoolKey;

/// Point-in-time view of one pool's state and counters.
///
/// This is the read-only query surface for dashboards and inspection tools. Taking a snapshot
/// has no effect on the pool. All counters are reset when the pool is cleared.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PoolSnapshot<K> {
    /// Identity of the pool.
    pub key: PoolKey<K>,

    /// The template the pool creates instances from, if it is initialized. This differs from
    /// the requested template when a fallback was substituted.
    pub template: Option<K>,

    /// Whether the pool runs on a fallback template.
    pub is_fallback: bool,

    /// Whether the template is loaded.
    pub initialized: bool,

    /// Whether a template load is in flight.
    pub loading: bool,

    /// Instances currently lent out.
    pub live: usize,

    /// Instances waiting to be reused.
    pub free: usize,

    /// Instances created since the pool was (re)initialized.
    pub created_total: u64,

    /// Successful acquisitions.
    pub acquired_total: u64,

    /// Releases, including forced ones.
    pub released_total: u64,

    /// Highest number of simultaneously live instances.
    pub peak_live: usize,

    /// Acquisitions that failed because the pool was exhausted.
    pub failed_acquires: u64,

    /// Active instances forcibly released to satisfy another acquisition.
    pub recycled_total: u64,

    /// Free instances destroyed by trimming or by shrinking after an overflow.
    pub trimmed_total: u64,

    /// Whether the pool currently exceeds its size limit.
    pub overflow_active: bool,
}

impl<K> PoolSnapshot<K> {
    /// Live plus free instances.
    #[must_use]
    pub fn total(&self) -> usize {
        self.live.saturating_add(self.free)
    }

    /// Share of instances that are lent out, in `[0, 1]`. Zero for an empty pool.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "instance counts are far below the range where f64 loses integer precision"
    )]
    pub fn utilization(&self) -> f64 {
        let total = self.total();

        if total == 0 {
            0.0
        } else {
            self.live as f64 / total as f64
        }
    }
}
