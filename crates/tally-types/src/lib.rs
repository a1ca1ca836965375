//! # tally-types
//!
//! Shared domain types used across the tally workspace: account and asset
//! identifiers, the numeric units of the accrual engine, and the structured
//! audit events emitted on every state transition.

pub mod address;
pub mod events;

pub use address::{Address, AddressParseError};
pub use events::EngineEvent;

/// Identifier of a token or producer asset. Assets live in the same address
/// space as accounts.
pub type AssetId = Address;

/// Token quantity in the asset's smallest unit.
pub type Amount = u128;

/// Reward points: the integral of a balance over time, in `Amount * seconds`.
pub type Points = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Basis-point denominator (100% = 10,000 bps).
pub const BPS_DENOMINATOR: u128 = 10_000;
