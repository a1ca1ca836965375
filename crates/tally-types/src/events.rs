//! Structured audit events.
//!
//! Every state transition of the engine and the vault layer emits one of
//! these, carrying the pre- and post-state needed to replay the accrual
//! history. Events are delivered only for committed transactions.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, AssetId, Points, Timestamp};

/// An audit event emitted by the engine or the vault layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A producer asset was registered.
    AssetRegistered {
        asset: AssetId,
        reward_tokens: Vec<AssetId>,
        supply: Amount,
        timestamp: Timestamp,
    },

    /// A reward token was appended to a producer asset.
    RewardTokenPushed { asset: AssetId, reward_token: AssetId },

    /// The last reward token of a producer asset was removed.
    RewardTokenPopped { asset: AssetId, reward_token: AssetId },

    /// The production venue address changed.
    ProducerVenueSet {
        previous: Option<Address>,
        venue: Address,
    },

    /// Global accrual for a producer asset.
    GlobalAccrued {
        asset: AssetId,
        timestamp: Timestamp,
        elapsed: u64,
        prev_supply: Amount,
        supply: Amount,
        prev_rewards: Points,
        rewards: Points,
    },

    /// Accrual for one holder of a producer asset.
    HolderAccrued {
        asset: AssetId,
        holder: Address,
        timestamp: Timestamp,
        elapsed: u64,
        prev_balance: Amount,
        balance: Amount,
        prev_rewards: Points,
        rewards: Points,
    },

    /// Harvested reward tokens were credited to the ledger.
    Harvested {
        asset: AssetId,
        reward_token: AssetId,
        amount: Amount,
        ledger_before: Amount,
        ledger_after: Amount,
    },

    /// One reward token paid out by a claim.
    Claimed {
        asset: AssetId,
        holder: Address,
        reward_token: AssetId,
        recipient: Address,
        amount: Amount,
        ledger_before: Amount,
        ledger_after: Amount,
    },

    /// A claim consumed the holder's reward points.
    ClaimSettled {
        asset: AssetId,
        holder: Address,
        points_consumed: Points,
        global_rewards_before: Points,
        global_rewards_after: Points,
    },

    /// A holder bound a redirect recipient for one reward token.
    RecipientSet {
        holder: Address,
        reward_token: AssetId,
        recipient: Address,
    },

    /// A holder cleared its redirect recipient.
    RecipientUnset { holder: Address, reward_token: AssetId },

    /// An administrator redirected a contract holder's rewards.
    PrivilegedRecipientSet {
        contract: Address,
        asset: AssetId,
        reward_token: AssetId,
        recipient: Address,
    },

    /// An administrator cleared a privileged redirect.
    PrivilegedRecipientUnset {
        contract: Address,
        asset: AssetId,
        reward_token: AssetId,
    },

    /// A vault compound cycle folded secondary rewards into the per-share
    /// accumulator (or carried them while no shares exist).
    ExtraRewardCompounded {
        vault: Address,
        reward_token: AssetId,
        gross: Amount,
        platform_fee: Amount,
        caller_incentive: Amount,
        net: Amount,
        total_shares: Amount,
        carried: Amount,
        prev_per_share: U256,
        per_share: U256,
    },

    /// A vault holder's pending extra reward was brought up to date.
    ExtraRewardUpdated {
        vault: Address,
        holder: Address,
        share_balance: Amount,
        prev_pending: Amount,
        pending: Amount,
        per_share: U256,
    },

    /// A vault holder withdrew its pending extra reward.
    ExtraRewardClaimed {
        vault: Address,
        holder: Address,
        receiver: Address,
        amount: Amount,
    },

    /// Vault fee configuration changed.
    VaultFeesSet {
        vault: Address,
        platform_fee_bps: u16,
        caller_incentive_bps: u16,
    },
}

impl EngineEvent {
    /// Short event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::AssetRegistered { .. } => "asset_registered",
            EngineEvent::RewardTokenPushed { .. } => "reward_token_pushed",
            EngineEvent::RewardTokenPopped { .. } => "reward_token_popped",
            EngineEvent::ProducerVenueSet { .. } => "producer_venue_set",
            EngineEvent::GlobalAccrued { .. } => "global_accrued",
            EngineEvent::HolderAccrued { .. } => "holder_accrued",
            EngineEvent::Harvested { .. } => "harvested",
            EngineEvent::Claimed { .. } => "claimed",
            EngineEvent::ClaimSettled { .. } => "claim_settled",
            EngineEvent::RecipientSet { .. } => "recipient_set",
            EngineEvent::RecipientUnset { .. } => "recipient_unset",
            EngineEvent::PrivilegedRecipientSet { .. } => "privileged_recipient_set",
            EngineEvent::PrivilegedRecipientUnset { .. } => "privileged_recipient_unset",
            EngineEvent::ExtraRewardCompounded { .. } => "extra_reward_compounded",
            EngineEvent::ExtraRewardUpdated { .. } => "extra_reward_updated",
            EngineEvent::ExtraRewardClaimed { .. } => "extra_reward_claimed",
            EngineEvent::VaultFeesSet { .. } => "vault_fees_set",
        }
    }
}
