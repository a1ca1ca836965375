//! Engine configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! custody = "0x..."
//! producer_venue = "0x..."
//! max_reward_tokens = 10
//!
//! [authorization]
//! kind = "owner_only"
//! owner = "0x..."
//!
//! [[routes]]
//! asset_kind = "liquidity"
//! reward_kind = "secondary"
//! asset = "0x..."
//! reward_token = "0x..."
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth::AuthorizationPolicy;
use crate::routes::RouteEntry;
use crate::{Address, EngineError, Result};

/// Default cap on reward tokens per producer asset.
pub const DEFAULT_MAX_REWARD_TOKENS: usize = 10;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Who may perform admin actions.
    pub authorization: AuthorizationPolicy,
    /// Account holding harvested reward tokens until settlement.
    pub custody: Address,
    /// Production venue to harvest from. None = harvesting disabled.
    #[serde(default)]
    pub producer_venue: Option<Address>,
    /// Maximum reward tokens per producer asset.
    #[serde(default = "default_max_reward_tokens")]
    pub max_reward_tokens: usize,
    /// (asset kind, reward kind) routes.
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

fn default_max_reward_tokens() -> usize {
    DEFAULT_MAX_REWARD_TOKENS
}

impl EngineConfig {
    /// Minimal configuration with a single owner.
    pub fn new(owner: Address, custody: Address) -> Self {
        Self {
            authorization: AuthorizationPolicy::owner(owner),
            custody,
            producer_venue: None,
            max_reward_tokens: default_max_reward_tokens(),
            routes: Vec::new(),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if the TOML is malformed or invalid
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Check invariants not expressible in the schema.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if the custody address is null or the
    ///   reward-token cap is zero
    pub fn validate(&self) -> Result<()> {
        if self.custody.is_zero() {
            return Err(EngineError::Config("custody address is null".to_string()));
        }
        if self.max_reward_tokens == 0 {
            return Err(EngineError::Config(
                "max_reward_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
