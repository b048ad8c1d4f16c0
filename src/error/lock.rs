//! Errors raised by the [`LockManager`](crate::lock_manager::LockManager).

use derive_more::with_trait::{Display, Error};

/// Errors from named/wildcard lock acquisition.
#[derive(Debug, Display, Error)]
pub enum LockError {
    /// The lock owner panicked while holding the lock, poisoning it.
    #[display("lock {name} poisoned by a panicking holder")]
    Poisoned {
        /// The lock name (or `*` for the wildcard).
        #[error(not(source))]
        name: String,
    },
}

impl LockError {
    /// Builds a [`LockError::Poisoned`].
    #[must_use]
    pub fn poisoned(name: impl Into<String>) -> Self {
        Self::Poisoned { name: name.into() }
    }
}
