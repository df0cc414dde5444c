use std::fmt::Debug;

use thiserror::Error;

/// Why a template could not be loaded by an [`AssetSource`][crate::AssetSource].
///
/// Load failures are resolved by the pool's [`ErrorConfig`][crate::ErrorConfig] and only reach
/// the caller of [`ResourcePool::initialize()`][crate::ResourcePool::initialize] when
/// [`ErrorStrategy::ThrowException`][crate::ErrorStrategy::ThrowException] is selected.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum TemplateLoadError {
    /// The asset system does not know the template or cannot currently provide it.
    #[error("template {key} is not available: {reason}")]
    Unavailable {
        /// The template key, rendered for diagnostics.
        key: String,

        /// A human-readable description of the problem.
        reason: String,
    },

    /// The template data was found but could not be decoded.
    #[error("template {key} is corrupt: {reason}")]
    Corrupt {
        /// The template key, rendered for diagnostics.
        key: String,

        /// A human-readable description of the problem.
        reason: String,
    },

    /// The template data could not be transferred from wherever it is stored.
    #[error("template {key} could not be transferred: {reason}")]
    Transport {
        /// The template key, rendered for diagnostics.
        key: String,

        /// A human-readable description of the problem.
        reason: String,
    },
}

impl TemplateLoadError {
    /// Creates an [`Unavailable`][Self::Unavailable] error for the given template key.
    pub fn unavailable(key: &impl Debug, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            key: format!("{key:?}"),
            reason: reason.into(),
        }
    }

    /// Creates a [`Corrupt`][Self::Corrupt] error for the given template key.
    pub fn corrupt(key: &impl Debug, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: format!("{key:?}"),
            reason: reason.into(),
        }
    }

    /// Creates a [`Transport`][Self::Transport] error for the given template key.
    pub fn transport(key: &impl Debug, reason: impl Into<String>) -> Self {
        Self::Transport {
            key: format!("{key:?}"),
            reason: reason.into(),
        }
    }

    /// The rendered key of the template that failed to load.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Unavailable { key, .. } | Self::Corrupt { key, .. } | Self::Transport { key, .. } => {
                key
            }
        }
    }
}

/// Errors reported by [`ResourcePool`][crate::ResourcePool] and
/// [`PoolRegistry`][crate::PoolRegistry] operations.
///
/// None of these are fatal. The infallible operation variants (`acquire()`, `release()`,
/// `get_or_create()`) log the error and return an empty or `false` result instead.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum PoolError {
    /// The template could not be loaded and the error strategy asked for the failure to be
    /// propagated to the caller.
    #[error(transparent)]
    TemplateLoad(#[from] TemplateLoadError),

    /// The pool has no free instances and its recycling policy does not allow it to supply one.
    #[error("pool {key} is exhausted")]
    Exhausted {
        /// The pool key, rendered for diagnostics.
        key: String,
    },

    /// The handle does not refer to an active instance of this pool. Either it belongs to a
    /// different pool, it was already released, its instance was forcibly recycled or the pool
    /// has been cleared since.
    #[error("instance is not an active member of pool {key}")]
    NotOwned {
        /// The pool key, rendered for diagnostics.
        key: String,
    },

    /// The pool was used before it was successfully initialized.
    #[error("pool {key} is not initialized")]
    Uninitialized {
        /// The pool key, rendered for diagnostics.
        key: String,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`PoolError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, PoolError>;
