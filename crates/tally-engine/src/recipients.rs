//! Reward redirection.
//!
//! By default a holder's settlement is paid to the holder. A holder may bind
//! a different recipient per reward token for itself. An administrator may
//! bind a recipient for a contract holder (pooled-liquidity contracts cannot
//! claim for themselves); that binding is scoped to (contract, asset, reward
//! token) and always wins over the contract's own self-binding.

use crate::undo::{UndoMap, UndoMark};
use crate::{Address, AssetId, EngineError, Result};

/// Self-service and privileged recipient bindings.
#[derive(Clone, Debug, Default)]
pub struct RecipientRegistry {
    own: UndoMap<(Address, AssetId), Address>,
    privileged: UndoMap<(Address, AssetId, AssetId), Address>,
}

/// Undo-log positions of both binding tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryMark {
    own: UndoMark,
    privileged: UndoMark,
}

impl RecipientRegistry {
    /// Undo-log positions.
    pub fn mark(&self) -> RegistryMark {
        RegistryMark {
            own: self.own.mark(),
            privileged: self.privileged.mark(),
        }
    }

    /// Undo every binding change made after `mark`.
    pub fn rollback(&mut self, mark: RegistryMark) {
        self.own.rollback(mark.own);
        self.privileged.rollback(mark.privileged);
    }

    /// Drop the undo logs.
    pub fn commit(&mut self) {
        self.own.commit();
        self.privileged.commit();
    }

    /// Bind `recipient` for `holder`'s `reward_token` payouts.
    ///
    /// Returns the previous binding.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `holder` is null
    /// - [`EngineError::InvalidRecipient`] if `recipient` is null
    pub fn set(
        &mut self,
        holder: Address,
        reward_token: AssetId,
        recipient: Address,
    ) -> Result<Option<Address>> {
        if holder.is_zero() {
            return Err(EngineError::InvalidHolder);
        }
        if recipient.is_zero() {
            return Err(EngineError::InvalidRecipient);
        }
        Ok(self.own.insert((holder, reward_token), recipient))
    }

    /// Clear `holder`'s binding for `reward_token`.
    pub fn unset(&mut self, holder: &Address, reward_token: &AssetId) -> Option<Address> {
        self.own.remove(&(*holder, *reward_token))
    }

    /// Bind `recipient` for rewards `contract` earns from `asset`.
    ///
    /// The caller is responsible for authorization and for verifying that
    /// `contract` is a contract.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `contract` is null
    /// - [`EngineError::InvalidRecipient`] if `recipient` is null
    pub fn set_privileged(
        &mut self,
        contract: Address,
        asset: AssetId,
        reward_token: AssetId,
        recipient: Address,
    ) -> Result<Option<Address>> {
        if contract.is_zero() {
            return Err(EngineError::InvalidHolder);
        }
        if recipient.is_zero() {
            return Err(EngineError::InvalidRecipient);
        }
        Ok(self
            .privileged
            .insert((contract, asset, reward_token), recipient))
    }

    /// Clear a privileged binding.
    pub fn unset_privileged(
        &mut self,
        contract: &Address,
        asset: &AssetId,
        reward_token: &AssetId,
    ) -> Option<Address> {
        self.privileged.remove(&(*contract, *asset, *reward_token))
    }

    /// Where `holder`'s `reward_token` payout from `asset` goes: privileged
    /// binding, else self binding, else the holder.
    pub fn resolve(&self, holder: &Address, asset: &AssetId, reward_token: &AssetId) -> Address {
        self.privileged
            .get(&(*holder, *asset, *reward_token))
            .or_else(|| self.own.get(&(*holder, *reward_token)))
            .copied()
            .unwrap_or(*holder)
    }
}
