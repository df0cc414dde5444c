use std::fmt::{self, Debug, Display};

/// Distinguishes pools that serve the same template with different hook behavior.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum PoolVariant {
    /// A pool without placement bookkeeping.
    #[default]
    Standard,

    /// A pool whose instances are attached to and detached from containers on every cycle.
    Placement,
}

/// Identity of a pool within a [`PoolRegistry`][crate::PoolRegistry].
///
/// A standard pool and a placement-aware pool for the same template are distinct pools.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PoolKey<K> {
    template: K,
    variant: PoolVariant,
}

impl<K> PoolKey<K> {
    /// Identifies the standard pool for a template.
    #[must_use]
    pub fn standard(template: K) -> Self {
        Self {
            template,
            variant: PoolVariant::Standard,
        }
    }

    /// Identifies the placement-aware pool for a template.
    #[must_use]
    pub fn placement(template: K) -> Self {
        Self {
            template,
            variant: PoolVariant::Placement,
        }
    }

    /// The requested template key.
    #[must_use]
    pub fn template(&self) -> &K {
        &self.template
    }

    /// Which kind of pool this key identifies.
    #[must_use]
    pub fn variant(&self) -> PoolVariant {
        self.variant
    }
}

impl<K: Debug> Display for PoolKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            PoolVariant::Standard => write!(f, "{:?}", self.template),
            PoolVariant::Placement => write!(f, "{:?} (placement)", self.template),
        }
    }
}
