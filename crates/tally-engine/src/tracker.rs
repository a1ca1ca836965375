//! Global and per-holder accrual state.
//!
//! [`GlobalTracker`] keeps one [`AccrualState`] per producer asset, keyed
//! to total supply. [`HolderTracker`] keeps one per (asset, holder), keyed
//! to that holder's balance. Both are [`UndoMap`] stores; the engine
//! decides when to accrue them, reads balances from the host, and marks or
//! rolls them back around each transaction.
//!
//! Conservation: since the balances of all holders never exceed total
//! supply, and the engine accrues the global state whenever it accrues a
//! holder, `global.rewards >= sum(holder.rewards)` for every asset.

use crate::accumulator::{AccrualDelta, AccrualState};
use crate::undo::{UndoMap, UndoMark};
use crate::{Address, Amount, AssetId, EngineError, Points, Result, Timestamp};

/// Global accrual state per producer asset.
#[derive(Clone, Debug, Default)]
pub struct GlobalTracker {
    states: UndoMap<AssetId, AccrualState>,
}

impl GlobalTracker {
    /// Start tracking `asset` at `now` with `supply` outstanding.
    pub fn register(&mut self, asset: AssetId, now: Timestamp, supply: Amount) {
        self.states
            .insert(asset, AccrualState::starting_at(now, supply));
    }

    /// Undo-log position.
    pub fn mark(&self) -> UndoMark {
        self.states.mark()
    }

    /// Undo every change made after `mark`.
    pub fn rollback(&mut self, mark: UndoMark) {
        self.states.rollback(mark);
    }

    /// Drop the undo log.
    pub fn commit(&mut self) {
        self.states.commit();
    }

    /// Current state of `asset`, if registered.
    pub fn get(&self, asset: &AssetId) -> Option<&AccrualState> {
        self.states.get(asset)
    }

    /// Accrue `asset` up to `now` and adopt `supply` as the new baseline.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownAsset`] if `asset` is not tracked
    /// - [`EngineError::Overflow`] on accumulator overflow
    pub fn accrue(
        &mut self,
        asset: &AssetId,
        now: Timestamp,
        supply: Amount,
    ) -> Result<AccrualDelta> {
        self.states
            .get_mut(asset)
            .ok_or(EngineError::UnknownAsset(*asset))?
            .accrue(now, supply)
    }

    /// Remove `points` from the asset's running total after a settlement.
    ///
    /// Returns the totals before and after.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownAsset`] if `asset` is not tracked
    /// - [`EngineError::Overflow`] if `points` exceeds the running total
    pub fn consume(&mut self, asset: &AssetId, points: Points) -> Result<(Points, Points)> {
        let state = self
            .states
            .get_mut(asset)
            .ok_or(EngineError::UnknownAsset(*asset))?;
        let before = state.rewards;
        state.rewards = before
            .checked_sub(points)
            .ok_or(EngineError::Overflow("global rewards consumed"))?;
        Ok((before, state.rewards))
    }
}

/// Per-(asset, holder) accrual state.
#[derive(Clone, Debug, Default)]
pub struct HolderTracker {
    states: UndoMap<(AssetId, Address), AccrualState>,
}

impl HolderTracker {
    /// Undo-log position.
    pub fn mark(&self) -> UndoMark {
        self.states.mark()
    }

    /// Undo every change made after `mark`.
    pub fn rollback(&mut self, mark: UndoMark) {
        self.states.rollback(mark);
    }

    /// Drop the undo log.
    pub fn commit(&mut self) {
        self.states.commit();
    }

    /// State of `holder` for `asset`; holders never seen have the default
    /// (zero) state.
    pub fn get(&self, asset: &AssetId, holder: &Address) -> AccrualState {
        self.states
            .get(&(*asset, *holder))
            .copied()
            .unwrap_or_default()
    }

    /// Accrue `holder` up to `now` and adopt `balance` as the new baseline.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Overflow`] on accumulator overflow
    pub fn accrue(
        &mut self,
        asset: &AssetId,
        holder: &Address,
        now: Timestamp,
        balance: Amount,
    ) -> Result<AccrualDelta> {
        self.states
            .get_or_default((*asset, *holder))
            .accrue(now, balance)
    }

    /// Zero the holder's points and return what they were.
    pub fn take_rewards(&mut self, asset: &AssetId, holder: &Address) -> Points {
        match self.states.get_mut(&(*asset, *holder)) {
            Some(state) => std::mem::take(&mut state.rewards),
            None => 0,
        }
    }

    /// Sum of all holders' points for `asset`.
    pub fn total_rewards(&self, asset: &AssetId) -> Points {
        self.states
            .range((*asset, Address::ZERO)..=(*asset, Address::MAX))
            .fold(0u128, |acc, (_, state)| acc.saturating_add(state.rewards))
    }
}
