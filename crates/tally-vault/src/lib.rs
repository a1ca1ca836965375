//! # tally-vault
//!
//! Secondary-reward layer of an auto-compounding vault.
//!
//! The vault holds producer assets on behalf of its share holders and is
//! itself a holder in the accrual engine. Its primary reward is compounded
//! back into the underlying position by the host; the secondary ("extra")
//! reward cannot be, so it is distributed to share holders through a
//! per-share accumulator instead.
//!
//! ## Modules
//!
//! - [`tracker`]: per-share extra-reward accounting
//! - [`split`]: attributing one received total between two sources
//! - [`vault`]: compound cycle, share-mutation hooks and claims

pub mod split;
pub mod tracker;
pub mod vault;

pub use vault::{ExtraRewardVault, VaultConfig};

use tally_engine::EngineError;

/// Error types for vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The vault configuration is inconsistent.
    #[error("invalid vault configuration: {0}")]
    Config(String),

    /// Arithmetic overflow in per-share math.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
