//! Undistributed reward-token balances.
//!
//! One entry per (producer asset, reward token). Harvests credit it,
//! settlements debit it; it never goes negative.

use crate::undo::{UndoMap, UndoMark};
use crate::{Amount, AssetId, EngineError, Result};

/// Pool of harvested reward tokens awaiting settlement.
#[derive(Clone, Debug, Default)]
pub struct RewardLedger {
    balances: UndoMap<(AssetId, AssetId), Amount>,
}

impl RewardLedger {
    /// Undistributed balance of `reward_token` earned by `asset` holders.
    pub fn balance(&self, asset: &AssetId, reward_token: &AssetId) -> Amount {
        self.balances
            .get(&(*asset, *reward_token))
            .copied()
            .unwrap_or(0)
    }

    /// Add harvested tokens. Returns the balances before and after.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Overflow`] if the balance would overflow
    pub fn credit(
        &mut self,
        asset: &AssetId,
        reward_token: &AssetId,
        amount: Amount,
    ) -> Result<(Amount, Amount)> {
        let entry = self.balances.get_or_default((*asset, *reward_token));
        let before = *entry;
        *entry = before
            .checked_add(amount)
            .ok_or(EngineError::Overflow("ledger credit"))?;
        Ok((before, *entry))
    }

    /// Remove settled tokens. Returns the balances before and after.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Overflow`] if `amount` exceeds the balance
    pub fn debit(
        &mut self,
        asset: &AssetId,
        reward_token: &AssetId,
        amount: Amount,
    ) -> Result<(Amount, Amount)> {
        let before = self.balance(asset, reward_token);
        let after = before
            .checked_sub(amount)
            .ok_or(EngineError::Overflow("ledger debit"))?;
        self.balances.insert((*asset, *reward_token), after);
        Ok((before, after))
    }

    /// Undo-log position.
    pub fn mark(&self) -> UndoMark {
        self.balances.mark()
    }

    /// Undo every change made after `mark`.
    pub fn rollback(&mut self, mark: UndoMark) {
        self.balances.rollback(mark);
    }

    /// Drop the undo log.
    pub fn commit(&mut self) {
        self.balances.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;

    #[test]
    fn test_credit_debit() {
        let mut ledger = RewardLedger::default();
        let asset = Address::derive("glp");
        let weth = Address::derive("weth");

        assert_eq!(ledger.balance(&asset, &weth), 0);
        assert_eq!(ledger.credit(&asset, &weth, 1000).expect("credit"), (0, 1000));
        assert_eq!(ledger.debit(&asset, &weth, 250).expect("debit"), (1000, 750));
        assert_eq!(ledger.balance(&asset, &weth), 750);
    }

    #[test]
    fn test_debit_below_zero_rejected() {
        let mut ledger = RewardLedger::default();
        let asset = Address::derive("glp");
        let weth = Address::derive("weth");
        ledger.credit(&asset, &weth, 10).expect("credit");
        assert!(ledger.debit(&asset, &weth, 11).is_err());
        assert_eq!(ledger.balance(&asset, &weth), 10);
    }

    #[test]
    fn test_rollback_after_credit_and_debit() {
        let mut ledger = RewardLedger::default();
        let asset = Address::derive("glp");
        let weth = Address::derive("weth");
        ledger.credit(&asset, &weth, 10).expect("credit");
        ledger.commit();

        let mark = ledger.mark();
        ledger.credit(&asset, &weth, 5).expect("credit");
        ledger.debit(&asset, &weth, 12).expect("debit");
        ledger.rollback(mark);
        assert_eq!(ledger.balance(&asset, &weth), 10);
    }
}
