//! Scenario file format.
//!
//! ```toml
//! start = 1700000000
//! owner = "owner"
//! custody = "custody"
//! venue = "venue"
//!
//! [[assets]]
//! name = "glp"
//! reward_tokens = ["weth", "esgmx"]
//!
//! [[routes]]
//! asset_kind = "liquidity"
//! reward_kind = "secondary"
//! asset = "glp"
//! reward_token = "esgmx"
//!
//! [vault]
//! name = "vault"
//! share_asset = "vglp"
//! treasury = "treasury"
//! sources = [{ asset_kind = "liquidity", reward_kind = "secondary" }]
//!
//! [[steps]]
//! op = "mint"
//! asset = "glp"
//! to = "alice"
//! amount = 100
//! ```
//!
//! Every name is turned into an address with [`Address::derive`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use tally_engine::config::{EngineConfig, DEFAULT_MAX_REWARD_TOKENS};
use tally_engine::routes::{AssetKind, RewardKind, RouteEntry, RouteKey};
use tally_types::{Address, Amount, Timestamp};
use tally_vault::vault::{DEFAULT_CALLER_INCENTIVE_BPS, DEFAULT_PLATFORM_FEE_BPS};
use tally_vault::VaultConfig;

use crate::{Result, ScenarioError};

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Clock at the start of the run.
    #[serde(default = "default_start")]
    pub start: Timestamp,
    /// Owner of the engine (single-owner policy).
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Engine custody account.
    #[serde(default = "default_custody")]
    pub custody: String,
    /// Production venue. Omit to disable harvesting.
    #[serde(default)]
    pub venue: Option<String>,
    /// Reward-token cap per asset.
    #[serde(default = "default_max_reward_tokens")]
    pub max_reward_tokens: usize,
    /// Producer assets registered before the first step.
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    /// Route table.
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    /// Optional extra-reward vault.
    #[serde(default)]
    pub vault: Option<VaultSpec>,
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_start() -> Timestamp {
    1_700_000_000
}

fn default_owner() -> String {
    "owner".to_string()
}

fn default_custody() -> String {
    "custody".to_string()
}

fn default_max_reward_tokens() -> usize {
    DEFAULT_MAX_REWARD_TOKENS
}

/// A producer asset and its reward tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Asset name.
    pub name: String,
    /// Reward token names.
    #[serde(default)]
    pub reward_tokens: Vec<String>,
}

/// One route, by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Asset kind.
    pub asset_kind: AssetKind,
    /// Reward kind.
    pub reward_kind: RewardKind,
    /// Producer asset name.
    pub asset: String,
    /// Reward token name.
    pub reward_token: String,
}

/// Vault section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSpec {
    /// Vault account name.
    pub name: String,
    /// Share asset name.
    pub share_asset: String,
    /// Treasury account name.
    pub treasury: String,
    /// Extra-reward sources. The first source's asset backs deposits.
    pub sources: Vec<RouteKey>,
    /// Platform fee in bps.
    #[serde(default = "default_platform_fee_bps")]
    pub platform_fee_bps: u16,
    /// Caller incentive in bps.
    #[serde(default = "default_caller_incentive_bps")]
    pub caller_incentive_bps: u16,
}

fn default_platform_fee_bps() -> u16 {
    DEFAULT_PLATFORM_FEE_BPS
}

fn default_caller_incentive_bps() -> u16 {
    DEFAULT_CALLER_INCENTIVE_BPS
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Move the clock forward.
    Advance { secs: u64 },
    /// Mint `amount` of `asset` to `to`.
    Mint {
        asset: String,
        to: String,
        #[serde(with = "amount")]
        amount: Amount,
    },
    /// Burn `amount` of `asset` held by `from`.
    Burn {
        asset: String,
        from: String,
        #[serde(with = "amount")]
        amount: Amount,
    },
    /// Transfer `amount` of `asset`.
    Transfer {
        asset: String,
        from: String,
        to: String,
        #[serde(with = "amount")]
        amount: Amount,
    },
    /// Queue a venue emission for `asset` holders.
    Emit {
        asset: String,
        reward_token: String,
        #[serde(with = "amount")]
        amount: Amount,
    },
    /// Harvest the venue.
    Harvest,
    /// `holder` claims on `asset`.
    Claim { holder: String, asset: String },
    /// `holder` redirects its `reward_token` payouts.
    SetRecipient {
        holder: String,
        reward_token: String,
        recipient: String,
    },
    /// Deposit into the vault.
    VaultDeposit {
        holder: String,
        #[serde(with = "amount")]
        amount: Amount,
    },
    /// Withdraw from the vault.
    VaultWithdraw {
        holder: String,
        #[serde(with = "amount")]
        amount: Amount,
    },
    /// Run a vault compound cycle, paying the incentive to `caller` if set.
    VaultHarvest {
        #[serde(default)]
        caller: Option<String>,
    },
    /// Claim pending extra reward, to `receiver` or the holder.
    VaultClaim {
        holder: String,
        #[serde(default)]
        receiver: Option<String>,
    },
}

impl Step {
    /// Operation name, matching the serialized `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            Step::Advance { .. } => "advance",
            Step::Mint { .. } => "mint",
            Step::Burn { .. } => "burn",
            Step::Transfer { .. } => "transfer",
            Step::Emit { .. } => "emit",
            Step::Harvest => "harvest",
            Step::Claim { .. } => "claim",
            Step::SetRecipient { .. } => "set_recipient",
            Step::VaultDeposit { .. } => "vault_deposit",
            Step::VaultWithdraw { .. } => "vault_withdraw",
            Step::VaultHarvest { .. } => "vault_harvest",
            Step::VaultClaim { .. } => "vault_claim",
        }
    }
}

/// Step amounts in TOML.
///
/// TOML integers stop at `i64`, so amounts are written either as an integer
/// or, above `u64::MAX`, as a decimal string.
mod amount {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use tally_types::Amount;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        match u64::try_from(*amount) {
            Ok(value) => serializer.serialize_u64(value),
            Err(_) => serializer.serialize_str(&amount.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(Amount::from(value)),
            Raw::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| D::Error::custom(format!("invalid amount {text:?}: {e}"))),
        }
    }
}

/// Address of a named account or asset.
pub fn addr(name: &str) -> Address {
    Address::derive(name)
}

impl Scenario {
    /// Parse a scenario from TOML.
    ///
    /// # Errors
    ///
    /// - [`ScenarioError::Parse`] if the TOML is malformed
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ScenarioError::Parse(e.to_string()))
    }

    /// Load a scenario file.
    ///
    /// # Errors
    ///
    /// - [`ScenarioError::Parse`] if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScenarioError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Engine configuration described by the scenario.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            producer_venue: self.venue.as_deref().map(addr),
            max_reward_tokens: self.max_reward_tokens,
            routes: self
                .routes
                .iter()
                .map(|route| RouteEntry {
                    asset_kind: route.asset_kind,
                    reward_kind: route.reward_kind,
                    asset: addr(&route.asset),
                    reward_token: addr(&route.reward_token),
                })
                .collect(),
            ..EngineConfig::new(addr(&self.owner), addr(&self.custody))
        }
    }

    /// Vault configuration described by the scenario, if any.
    pub fn vault_config(&self) -> Option<VaultConfig> {
        self.vault.as_ref().map(|vault| VaultConfig {
            vault: addr(&vault.name),
            share_asset: addr(&vault.share_asset),
            extra_reward_sources: vault.sources.clone(),
            treasury: addr(&vault.treasury),
            platform_fee_bps: vault.platform_fee_bps,
            caller_incentive_bps: vault.caller_incentive_bps,
        })
    }

    /// Every name the scenario mentions, for labelling output.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.owner.clone(), self.custody.clone()];
        names.extend(self.venue.iter().cloned());
        for asset in &self.assets {
            names.push(asset.name.clone());
            names.extend(asset.reward_tokens.iter().cloned());
        }
        for route in &self.routes {
            names.push(route.asset.clone());
            names.push(route.reward_token.clone());
        }
        if let Some(vault) = &self.vault {
            names.push(vault.name.clone());
            names.push(vault.share_asset.clone());
            names.push(vault.treasury.clone());
        }
        for step in &self.steps {
            match step {
                Step::Advance { .. } | Step::Harvest => {}
                Step::Mint { asset, to, .. } => names.extend([asset.clone(), to.clone()]),
                Step::Burn { asset, from, .. } => names.extend([asset.clone(), from.clone()]),
                Step::Transfer { asset, from, to, .. } => {
                    names.extend([asset.clone(), from.clone(), to.clone()])
                }
                Step::Emit {
                    asset, reward_token, ..
                } => names.extend([asset.clone(), reward_token.clone()]),
                Step::Claim { holder, asset } => names.extend([holder.clone(), asset.clone()]),
                Step::SetRecipient {
                    holder,
                    reward_token,
                    recipient,
                } => names.extend([holder.clone(), reward_token.clone(), recipient.clone()]),
                Step::VaultDeposit { holder, .. } | Step::VaultWithdraw { holder, .. } => {
                    names.push(holder.clone())
                }
                Step::VaultHarvest { caller } => names.extend(caller.iter().cloned()),
                Step::VaultClaim { holder, receiver } => {
                    names.push(holder.clone());
                    names.extend(receiver.iter().cloned());
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
venue = "venue"

[[assets]]
name = "glp"
reward_tokens = ["weth"]

[[steps]]
op = "mint"
asset = "glp"
to = "alice"
amount = 100

[[steps]]
op = "advance"
secs = 1000

[[steps]]
op = "harvest"

[[steps]]
op = "vault_claim"
holder = "alice"
"#;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_toml_str(SCENARIO).expect("parse");
        assert_eq!(scenario.start, default_start());
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(
            scenario.steps[0],
            Step::Mint {
                asset: "glp".to_string(),
                to: "alice".to_string(),
                amount: 100
            }
        );
        assert_eq!(scenario.steps[2], Step::Harvest);
        assert_eq!(scenario.steps[3].op(), "vault_claim");
        assert!(scenario.vault.is_none());
    }

    #[test]
    fn test_engine_config_uses_derived_addresses() {
        let scenario = Scenario::from_toml_str(SCENARIO).expect("parse");
        let config = scenario.engine_config();
        assert_eq!(config.custody, addr("custody"));
        assert_eq!(config.producer_venue, Some(addr("venue")));
        config.validate().expect("valid");
    }

    #[test]
    fn test_names_are_collected() {
        let scenario = Scenario::from_toml_str(SCENARIO).expect("parse");
        let names = scenario.names();
        for name in ["alice", "glp", "weth", "venue", "owner", "custody"] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    #[test]
    fn test_amounts_beyond_toml_integers() {
        let content = r#"
[[steps]]
op = "emit"
asset = "glp"
reward_token = "weth"
amount = "340282366920938463463374607431768211455"

[[steps]]
op = "vault_deposit"
holder = "alice"
amount = 9223372036854775807
"#;
        let scenario = Scenario::from_toml_str(content).expect("parse");
        assert_eq!(
            scenario.steps[0],
            Step::Emit {
                asset: "glp".to_string(),
                reward_token: "weth".to_string(),
                amount: Amount::MAX,
            }
        );
        assert_eq!(
            scenario.steps[1],
            Step::VaultDeposit {
                holder: "alice".to_string(),
                amount: i64::MAX as Amount,
            }
        );

        let bad = "[[steps]]\nop = \"mint\"\nasset = \"glp\"\nto = \"a\"\namount = \"lots\"\n";
        assert!(matches!(
            Scenario::from_toml_str(bad),
            Err(ScenarioError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let bad = "[[steps]]\nop = \"teleport\"\n";
        assert!(matches!(
            Scenario::from_toml_str(bad),
            Err(ScenarioError::Parse(_))
        ));
    }
}
