//! Pro-rata claim settlement.
//!
//! A claim converts a holder's accrued points into reward tokens. For every
//! reward token of the asset the holder receives
//!
//! ```text
//! ledger * holder_points / global_points
//! ```
//!
//! rounded down, after which the holder's points are removed from both the
//! holder and the global tracker. Rounding down leaves dust in the ledger
//! rather than overdrawing it, whatever order holders claim in.

use primitive_types::U256;
use tally_types::EngineEvent;

use crate::auth::AdminAction;
use crate::guard::non_reentrant;
use crate::host::{EventSink, Host};
use crate::{Address, Amount, AssetId, EngineError, Points, RewardEngine, Result};

/// Floor of `ledger * holder_points / global_points`.
///
/// `holder_points` is clamped to `global_points`, so the payout never
/// exceeds the ledger. A zero `global_points` pays nothing.
///
/// # Errors
///
/// - [`EngineError::Overflow`] if the result does not fit in [`Amount`]
pub fn pro_rata_payout(ledger: Amount, holder_points: Points, global_points: Points) -> Result<Amount> {
    if global_points == 0 {
        return Ok(0);
    }
    let holder = holder_points.min(global_points);
    let payout = U256::from(ledger)
        .checked_mul(U256::from(holder))
        .ok_or(EngineError::Overflow("pro-rata payout"))?
        / U256::from(global_points);
    if payout > U256::from(u128::MAX) {
        return Err(EngineError::Overflow("pro-rata payout"));
    }
    Ok(payout.low_u128())
}

/// One reward token paid by a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payout {
    /// Reward token paid.
    pub reward_token: AssetId,
    /// Resolved recipient.
    pub recipient: Address,
    /// Amount paid.
    pub amount: Amount,
}

/// Result of settling one holder's claim on one producer asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    /// Producer asset settled.
    pub asset: AssetId,
    /// Holder whose points were consumed.
    pub holder: Address,
    /// Points removed from the holder and the global tracker.
    pub points_consumed: Points,
    /// Non-zero payouts in reward-token registration order.
    pub payouts: Vec<Payout>,
}

impl ClaimReceipt {
    /// Total paid in `reward_token`.
    pub fn amount_of(&self, reward_token: &AssetId) -> Amount {
        self.payouts
            .iter()
            .filter(|p| &p.reward_token == reward_token)
            .fold(0, |acc, p| acc.saturating_add(p.amount))
    }
}

impl<H: Host, S: EventSink> RewardEngine<H, S> {
    /// Harvest, then settle `caller`'s own claim on `asset`.
    ///
    /// A holder with nothing accrued gets an empty receipt. Any transfer
    /// failure rolls the whole claim back, harvest included.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `caller` is null
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    /// - [`EngineError::TransferFailed`] if a payout is rejected
    /// - [`EngineError::Reentrant`] if called from a guarded entry point
    /// - any harvest error
    pub fn claim(&mut self, caller: &Address, asset: &AssetId) -> Result<ClaimReceipt> {
        self.guarded_claim(asset, caller)
    }

    /// Settle `holder`'s claim on its behalf.
    ///
    /// Payouts follow `holder`'s recipient bindings, never the caller. This
    /// is how rewards of a pooled contract reach its privileged recipient.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not settle for others
    /// - everything [`RewardEngine::claim`] returns
    pub fn claim_for(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        holder: &Address,
    ) -> Result<ClaimReceipt> {
        self.authorize(caller, AdminAction::ClaimFor)?;
        self.guarded_claim(asset, holder)
    }

    /// Settle `caller`'s claims on several assets after a single harvest.
    /// Either every claim settles or none does.
    ///
    /// # Errors
    ///
    /// - everything [`RewardEngine::claim`] returns, for any of the assets
    pub fn claim_many(&mut self, caller: &Address, assets: &[AssetId]) -> Result<Vec<ClaimReceipt>> {
        non_reentrant(self, |engine| {
            engine.transaction(|engine| {
                engine.harvest_inner()?;
                assets
                    .iter()
                    .map(|asset| engine.settle(asset, caller))
                    .collect()
            })
        })
    }

    /// What `holder` would receive from `asset` if it claimed now, without
    /// harvesting or touching state.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `holder` is null
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    pub fn preview_claim(&self, asset: &AssetId, holder: &Address) -> Result<ClaimReceipt> {
        if holder.is_zero() {
            return Err(EngineError::InvalidHolder);
        }
        let now = self.host.now();
        let global_points = self.global_state(asset)?.projected(now)?;
        let holder_points = self.holder_state(asset, holder).projected(now)?.min(global_points);

        let mut payouts = Vec::new();
        for reward_token in &self.producer(asset)?.reward_tokens {
            let ledger = self.state.ledger.balance(asset, reward_token);
            let amount = pro_rata_payout(ledger, holder_points, global_points)?;
            if amount > 0 {
                payouts.push(Payout {
                    reward_token: *reward_token,
                    recipient: self.state.recipients.resolve(holder, asset, reward_token),
                    amount,
                });
            }
        }
        Ok(ClaimReceipt {
            asset: *asset,
            holder: *holder,
            points_consumed: holder_points,
            payouts,
        })
    }

    fn guarded_claim(&mut self, asset: &AssetId, holder: &Address) -> Result<ClaimReceipt> {
        non_reentrant(self, |engine| {
            engine.transaction(|engine| {
                engine.harvest_inner()?;
                engine.settle(asset, holder)
            })
        })
    }

    /// Settle `holder`'s points on `asset` against the current ledger.
    /// Must run inside a transaction.
    pub(crate) fn settle(&mut self, asset: &AssetId, holder: &Address) -> Result<ClaimReceipt> {
        if holder.is_zero() {
            return Err(EngineError::InvalidHolder);
        }
        let reward_tokens = self.producer(asset)?.reward_tokens.clone();
        self.accrue_holder(asset, holder)?;

        let global_points = self.global_state(asset)?.rewards;
        let holder_points = self
            .state
            .holders
            .get(asset, holder)
            .rewards
            .min(global_points);

        let custody = self.custody;
        let mut payouts = Vec::with_capacity(reward_tokens.len());
        for reward_token in reward_tokens {
            let ledger = self.state.ledger.balance(asset, &reward_token);
            let amount = pro_rata_payout(ledger, holder_points, global_points)?;
            if amount == 0 {
                continue;
            }

            let (ledger_before, ledger_after) =
                self.state.ledger.debit(asset, &reward_token, amount)?;
            let recipient = self.state.recipients.resolve(holder, asset, &reward_token);
            self.host
                .transfer(&reward_token, &custody, &recipient, amount)
                .map_err(|source| EngineError::TransferFailed {
                    token: reward_token,
                    to: recipient,
                    amount,
                    source,
                })?;

            tracing::info!(%asset, %holder, %reward_token, %recipient, amount, "reward paid");
            self.emit(EngineEvent::Claimed {
                asset: *asset,
                holder: *holder,
                reward_token,
                recipient,
                amount,
                ledger_before,
                ledger_after,
            });
            payouts.push(Payout {
                reward_token,
                recipient,
                amount,
            });
        }

        self.state.holders.take_rewards(asset, holder);
        if holder_points > 0 {
            let (global_rewards_before, global_rewards_after) =
                self.state.global.consume(asset, holder_points)?;
            self.emit(EngineEvent::ClaimSettled {
                asset: *asset,
                holder: *holder,
                points_consumed: holder_points,
                global_rewards_before,
                global_rewards_after,
            });
        }

        Ok(ClaimReceipt {
            asset: *asset,
            holder: *holder,
            points_consumed: holder_points,
            payouts,
        })
    }
}
