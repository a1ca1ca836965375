//! Per-share extra-reward accounting.
//!
//! The tracker keeps one accumulator, the extra reward earned by a single
//! share since the vault opened, as a fixed-point number scaled by
//! [`scale`]. A holder's pending reward grows by
//!
//! ```text
//! share_balance * (per_share - last_seen) / SCALE
//! ```
//!
//! whenever it is brought up to date, which must happen before every change
//! to its share balance using the balance held before the change.
//!
//! While no shares exist a distribution cannot be expressed per share. The
//! amount is carried and folded into the next distribution made while
//! shares exist.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use tally_engine::undo::{UndoMap, UndoMark};
use tally_types::{Address, Amount};

use crate::{Result, VaultError};

/// Decimal exponent of the fixed-point scale.
pub const SCALE_DECIMALS: usize = 30;

/// Fixed-point scale of the per-share accumulator (10^30).
pub fn scale() -> U256 {
    U256::exp10(SCALE_DECIMALS)
}

/// Extra-reward state of one share holder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderExtra {
    /// Extra reward earned and not yet claimed.
    pub pending: Amount,
    /// Accumulator value at the holder's last update.
    pub last_seen: U256,
}

/// Outcome of [`ExtraRewardTracker::distribute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Distribution {
    /// Amount folded into the accumulator, carried amount included.
    pub distributed: Amount,
    /// Amount carried after this call.
    pub carried: Amount,
    /// Accumulator before.
    pub prev_per_share: U256,
    /// Accumulator after.
    pub per_share: U256,
}

/// Outcome of [`ExtraRewardTracker::update_holder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HolderUpdate {
    /// Pending before.
    pub prev_pending: Amount,
    /// Pending after.
    pub pending: Amount,
    /// Whether the accumulator moved since the holder's last update.
    pub advanced: bool,
}

/// Per-share accumulator and holder states.
#[derive(Clone, Debug, Default)]
pub struct ExtraRewardTracker {
    per_share: U256,
    carried: Amount,
    holders: UndoMap<Address, HolderExtra>,
}

/// Tracker position to roll back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerMark {
    per_share: U256,
    carried: Amount,
    holders: UndoMark,
}

impl ExtraRewardTracker {
    /// Current accumulator, carry and holder undo-log position.
    pub fn mark(&self) -> TrackerMark {
        TrackerMark {
            per_share: self.per_share,
            carried: self.carried,
            holders: self.holders.mark(),
        }
    }

    /// Undo every change made after `mark`.
    pub fn rollback(&mut self, mark: TrackerMark) {
        self.per_share = mark.per_share;
        self.carried = mark.carried;
        self.holders.rollback(mark.holders);
    }

    /// Drop the holder undo log.
    pub fn commit(&mut self) {
        self.holders.commit();
    }

    /// Fold `net` (plus anything carried) into the accumulator over
    /// `total_shares`. With no shares the amount is carried instead and the
    /// accumulator is left unchanged.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Overflow`] on arithmetic overflow
    pub fn distribute(&mut self, net: Amount, total_shares: Amount) -> Result<Distribution> {
        let prev_per_share = self.per_share;
        if total_shares == 0 {
            self.carried = self
                .carried
                .checked_add(net)
                .ok_or(VaultError::Overflow("carried extra reward"))?;
            return Ok(Distribution {
                distributed: 0,
                carried: self.carried,
                prev_per_share,
                per_share: prev_per_share,
            });
        }

        let distributed = net
            .checked_add(self.carried)
            .ok_or(VaultError::Overflow("distributed extra reward"))?;
        let increment = U256::from(distributed)
            .checked_mul(scale())
            .ok_or(VaultError::Overflow("per-share increment"))?
            / U256::from(total_shares);
        self.per_share = self
            .per_share
            .checked_add(increment)
            .ok_or(VaultError::Overflow("per-share accumulator"))?;
        self.carried = 0;

        Ok(Distribution {
            distributed,
            carried: 0,
            prev_per_share,
            per_share: self.per_share,
        })
    }

    /// Bring `holder` up to date at `share_balance`, the balance held since
    /// its last update.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Overflow`] on arithmetic overflow
    pub fn update_holder(&mut self, holder: &Address, share_balance: Amount) -> Result<HolderUpdate> {
        let per_share = self.per_share;
        let state = self.holders.get_or_default(*holder);
        let prev_pending = state.pending;
        let advanced = per_share != state.last_seen;

        let earned = U256::from(share_balance)
            .checked_mul(per_share.saturating_sub(state.last_seen))
            .ok_or(VaultError::Overflow("holder extra reward"))?
            / scale();
        if earned > U256::from(u128::MAX) {
            return Err(VaultError::Overflow("holder extra reward"));
        }
        state.pending = state
            .pending
            .checked_add(earned.low_u128())
            .ok_or(VaultError::Overflow("pending extra reward"))?;
        state.last_seen = per_share;

        Ok(HolderUpdate {
            prev_pending,
            pending: state.pending,
            advanced,
        })
    }

    /// Zero `holder`'s pending reward and return it.
    pub fn take_pending(&mut self, holder: &Address) -> Amount {
        self.holders
            .get_mut(holder)
            .map(|state| std::mem::take(&mut state.pending))
            .unwrap_or(0)
    }

    /// Pending reward of `holder` as of its last update.
    pub fn pending_of(&self, holder: &Address) -> Amount {
        self.holders.get(holder).map_or(0, |state| state.pending)
    }

    /// Current accumulator.
    pub fn per_share(&self) -> U256 {
        self.per_share
    }

    /// Amount waiting for shares to exist.
    pub fn carried(&self) -> Amount {
        self.carried
    }
}
