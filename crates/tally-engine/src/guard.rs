//! Reentrancy guard for entry points that call out to the host.
//!
//! Harvest and claim hand control to the production venue and the token
//! sink while ledger state is partially updated. Every such entry point
//! runs inside [`non_reentrant`], which takes the lock before the body and
//! releases it on every exit path.

use crate::{EngineError, Result};

/// Lock flag owned by a component with guarded entry points.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    locked: bool,
}

impl ReentrancyGuard {
    /// Take the lock. Fails if it is already held.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Reentrant`] if the lock is held
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(EngineError::Reentrant);
        }
        self.locked = true;
        Ok(())
    }

    /// Release the lock.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Components that carry a [`ReentrancyGuard`].
pub trait Guarded {
    /// The component's guard.
    fn guard(&mut self) -> &mut ReentrancyGuard;
}

/// Run `body` with the instance's guard held.
///
/// The guard is released whether `body` succeeds or fails.
pub fn non_reentrant<I, T, E, F>(instance: &mut I, body: F) -> std::result::Result<T, E>
where
    I: Guarded,
    E: From<EngineError>,
    F: FnOnce(&mut I) -> std::result::Result<T, E>,
{
    instance.guard().lock()?;
    let res = body(instance);
    instance.guard().unlock();
    res
}
