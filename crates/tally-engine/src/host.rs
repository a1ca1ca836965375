//! Collaborator interfaces implemented by the host.
//!
//! The engine owns no balances and moves no tokens itself. It reads
//! supplies and balances from a [`BalanceSource`], pulls rewards from a
//! [`Producer`], pays out through a [`TokenSink`], and asks an
//! [`AccountInspector`] whether an address is a contract. All calls are
//! synchronous and must reflect prior mutations immediately.
//!
//! [`HostTransaction`] lets a host take part in the engine's all-or-nothing
//! transactions: the engine checkpoints before every public operation and
//! reverts on failure, so payouts already made earlier in a failed claim
//! are undone along with the engine's own state.

use tally_types::EngineEvent;

use crate::{Address, Amount, AssetId, Timestamp};

/// Error returned by a [`TokenSink`] transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Sender does not hold enough of the token.
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Balance held by the sender.
        available: Amount,
        /// Amount requested.
        required: Amount,
    },

    /// The receiving account rejected the transfer.
    #[error("transfer rejected by receiver {0}")]
    Rejected(Address),
}

/// Error returned by the production venue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProducerError {
    /// The venue is unavailable.
    #[error("production venue unavailable: {0}")]
    Unavailable(String),
}

/// Wall clock used for accrual.
pub trait Clock {
    /// Current timestamp in seconds.
    fn now(&self) -> Timestamp;
}

/// Outstanding balances of producer assets.
pub trait BalanceSource {
    /// Total outstanding supply of `asset`.
    fn total_supply(&self, asset: &AssetId) -> Amount;

    /// Balance of `holder` in `asset`.
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount;
}

/// Rewards delivered by one venue claim, as three parallel sequences.
///
/// Entry `i` says `amounts[i]` of `reward_tokens[i]` was produced for the
/// holders of `producer_assets[i]`. An amount may legitimately be zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerClaim {
    /// Producer asset of each entry.
    pub producer_assets: Vec<AssetId>,
    /// Reward token of each entry.
    pub reward_tokens: Vec<AssetId>,
    /// Amount delivered for each entry.
    pub amounts: Vec<Amount>,
}

impl ProducerClaim {
    /// Append one entry.
    pub fn push(&mut self, asset: AssetId, reward_token: AssetId, amount: Amount) {
        self.producer_assets.push(asset);
        self.reward_tokens.push(reward_token);
        self.amounts.push(amount);
    }

    /// Whether the three sequences have the same length.
    pub fn is_well_formed(&self) -> bool {
        self.producer_assets.len() == self.reward_tokens.len()
            && self.reward_tokens.len() == self.amounts.len()
    }

    /// Iterate entries as `(asset, reward_token, amount)`.
    pub fn entries(&self) -> impl Iterator<Item = (&AssetId, &AssetId, Amount)> {
        self.producer_assets
            .iter()
            .zip(self.reward_tokens.iter())
            .zip(self.amounts.iter())
            .map(|((asset, token), amount)| (asset, token, *amount))
    }
}

/// External production venue.
pub trait Producer {
    /// Claim everything produced since the last claim at `venue`, delivering
    /// the tokens to `receiver`.
    fn claim_rewards(
        &mut self,
        venue: &Address,
        receiver: &Address,
    ) -> std::result::Result<ProducerClaim, ProducerError>;
}

/// Reward-token transfer endpoint.
pub trait TokenSink {
    /// Move `amount` of `token` from `from` to `to`.
    fn transfer(
        &mut self,
        token: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> std::result::Result<(), TransferError>;

    /// Balance of `token` held by `owner`.
    fn token_balance(&self, token: &AssetId, owner: &Address) -> Amount;
}

/// Account classification.
pub trait AccountInspector {
    /// Whether `address` is a contract rather than a plain account.
    fn is_contract(&self, address: &Address) -> bool;
}

/// Participation in the engine's transactions.
///
/// Calls nest: every `checkpoint` is matched by exactly one `revert` or
/// `release`.
pub trait HostTransaction {
    /// Start a nested unit of work.
    fn checkpoint(&mut self) {}

    /// Undo everything since the matching checkpoint.
    fn revert(&mut self) {}

    /// Keep everything since the matching checkpoint.
    fn release(&mut self) {}
}

/// Everything the engine needs from its host.
pub trait Host:
    Clock + BalanceSource + Producer + TokenSink + AccountInspector + HostTransaction
{
}

impl<T> Host for T where
    T: Clock + BalanceSource + Producer + TokenSink + AccountInspector + HostTransaction
{
}

/// Receiver of committed audit events.
pub trait EventSink {
    /// Deliver one event.
    fn emit(&mut self, event: &EngineEvent);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn emit(&mut self, event: &EngineEvent) {
        (**self).emit(event);
    }
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&mut self, _event: &EngineEvent) {}
}

/// Collects events in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    /// Events in delivery order.
    pub events: Vec<EngineEvent>,
}

impl VecSink {
    /// Remove and return everything collected so far.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for VecSink {
    fn emit(&mut self, event: &EngineEvent) {
        self.events.push(event.clone());
    }
}
