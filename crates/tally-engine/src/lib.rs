//! # tally-engine
//!
//! Per-second reward accrual and settlement.
//!
//! Each registered producer asset accrues reward points equal to the
//! integral of its total supply over time; each holder accrues points equal
//! to the integral of its own balance. Reward tokens harvested from the
//! production venue are pooled in a ledger and paid out pro rata to
//! `holder_points / global_points` on claim, after which the holder's points
//! are consumed. Floor rounding keeps the ledger non-negative across any
//! claim ordering.
//!
//! ## Modules
//!
//! - [`accumulator`]: time-weighted balance integrals
//! - [`tracker`]: global and per-holder accrual state
//! - [`undo`]: keyed stores with an undo log for transaction rollback
//! - [`ledger`]: undistributed reward-token balances
//! - [`recipients`]: reward redirection (self-service and privileged)
//! - [`harvest`]: pulling rewards from the production venue
//! - [`settlement`]: pro-rata claim settlement
//! - [`engine`]: the transactional engine tying the above together
//! - [`auth`]: admin authorization policy
//! - [`guard`]: reentrancy guard
//! - [`routes`]: (asset kind, reward kind) route table
//! - [`host`]: collaborator traits implemented by the host
//! - [`memory`]: in-memory host for tests and simulation
//! - [`config`]: TOML engine configuration

pub mod accumulator;
pub mod auth;
pub mod config;
pub mod engine;
pub mod guard;
pub mod harvest;
pub mod host;
pub mod ledger;
pub mod memory;
pub mod recipients;
pub mod routes;
pub mod settlement;
pub mod tracker;
pub mod undo;

pub use engine::RewardEngine;
pub use tally_types::{Address, Amount, AssetId, EngineEvent, Points, Timestamp};

use crate::host::{ProducerError, TransferError};

/// Error types for accrual and settlement operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation on a producer asset that was never registered.
    #[error("unknown producer asset {0}")]
    UnknownAsset(AssetId),

    /// The producer asset is already registered.
    #[error("producer asset {0} already registered")]
    AssetAlreadyRegistered(AssetId),

    /// Holder address is null.
    #[error("invalid holder: null address")]
    InvalidHolder,

    /// Receiver address is null.
    #[error("invalid receiver: null address")]
    InvalidReceiver,

    /// Recipient address is null.
    #[error("invalid recipient: null address")]
    InvalidRecipient,

    /// A quantity that must be non-zero was zero.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// Admin-only call from an unauthorized caller.
    #[error("caller {caller} is not authorized for {action}")]
    NotAuthorized {
        /// The rejected caller.
        caller: Address,
        /// The attempted admin action.
        action: String,
    },

    /// A configuration value is outside its allowed bounds.
    #[error("{what} exceeds maximum: {value} > {max}")]
    ExceedsMax {
        /// Name of the bounded value.
        what: &'static str,
        /// The rejected value.
        value: u128,
        /// The bound.
        max: u128,
    },

    /// A payout to a token sink was rejected.
    #[error("transfer of {amount} {token} to {to} failed")]
    TransferFailed {
        /// The reward token being paid.
        token: AssetId,
        /// Intended recipient.
        to: Address,
        /// Amount that failed to transfer.
        amount: Amount,
        /// Sink error.
        #[source]
        source: TransferError,
    },

    /// The production venue failed to deliver a harvest.
    #[error("harvest failed")]
    HarvestFailed(#[source] ProducerError),

    /// The venue returned parallel sequences of different lengths.
    #[error("malformed harvest: {assets} assets, {tokens} tokens, {amounts} amounts")]
    MalformedHarvest {
        /// Number of producer assets returned.
        assets: usize,
        /// Number of reward tokens returned.
        tokens: usize,
        /// Number of amounts returned.
        amounts: usize,
    },

    /// Address expected to be a contract is a plain account.
    #[error("{0} is not a contract")]
    NotContract(Address),

    /// Producer asset has no reward tokens to pop.
    #[error("producer asset {0} has no reward tokens")]
    NoRewardTokens(AssetId),

    /// No route configured for the requested (asset kind, reward kind).
    #[error("no route for {0}")]
    UnknownRoute(String),

    /// Two routes share the same key.
    #[error("duplicate route for {0}")]
    DuplicateRoute(String),

    /// A guarded entry point was entered while already executing.
    #[error("reentrant call")]
    Reentrant,

    /// Arithmetic overflow or underflow in accrual math.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
