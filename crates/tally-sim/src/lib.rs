//! # tally-sim
//!
//! Scenario runner for the accrual engine and the extra-reward vault.
//!
//! A scenario is a TOML file naming accounts and assets by label, the
//! engine and vault configuration, and a list of steps (clock advances,
//! balance changes, venue emissions, harvests, claims, vault deposits and
//! withdrawals). The runner drives everything against the in-memory host,
//! streams committed events to a sink and returns a summary of the final
//! balances.
//!
//! ## Modules
//!
//! - [`scenario`]: scenario file format
//! - [`runner`]: step execution and summary
//! - [`bus`]: broadcast event bus feeding subscribers

pub mod bus;
pub mod runner;
pub mod scenario;

pub use bus::{BusSink, EventBus};
pub use runner::{run, Summary};
pub use scenario::{Scenario, Step};

use tally_engine::host::TransferError;
use tally_engine::EngineError;
use tally_vault::VaultError;

/// Error types for scenario loading and execution.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The scenario file could not be read or parsed.
    #[error("invalid scenario: {0}")]
    Parse(String),

    /// A vault step was used without a `[vault]` section.
    #[error("scenario has no vault")]
    NoVault,

    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A vault operation failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A host balance change failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A step failed.
    #[error("step {index} ({op}) failed: {source}")]
    Step {
        /// Zero-based step index.
        index: usize,
        /// Step operation name.
        op: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<ScenarioError>,
    },
}

/// Convenience result type for scenario operations.
pub type Result<T> = std::result::Result<T, ScenarioError>;
