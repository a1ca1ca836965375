//! Route table from (asset kind, reward kind) to concrete assets.
//!
//! Integrations such as the vault layer refer to reward streams by kind
//! ("the secondary reward of the liquidity asset") rather than by address.
//! The table is built once from configuration; lookups never branch on
//! flags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AssetId, EngineError, Result};

/// Kind of producer asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A staked governance-style token.
    Staked,
    /// A liquidity-index token.
    Liquidity,
}

/// Kind of reward stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// The main reward, compounded by vaults.
    Primary,
    /// The secondary (extra) reward, distributed per share by vaults.
    Secondary,
}

/// Lookup key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    /// Producer asset kind.
    pub asset_kind: AssetKind,
    /// Reward stream kind.
    pub reward_kind: RewardKind,
}

impl RouteKey {
    /// Key for `asset_kind` × `reward_kind`.
    pub fn new(asset_kind: AssetKind, reward_kind: RewardKind) -> Self {
        Self {
            asset_kind,
            reward_kind,
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.asset_kind, self.reward_kind)
    }
}

/// Concrete producer asset and reward token of a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Producer asset whose holders earn the reward.
    pub asset: AssetId,
    /// Reward token paid out.
    pub reward_token: AssetId,
}

/// One configured route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Producer asset kind.
    pub asset_kind: AssetKind,
    /// Reward stream kind.
    pub reward_kind: RewardKind,
    /// Producer asset.
    pub asset: AssetId,
    /// Reward token.
    pub reward_token: AssetId,
}

/// Immutable route table.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: BTreeMap<RouteKey, Route>,
}

impl RouteTable {
    /// Build the table from configured entries.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateRoute`] if two entries share a key
    pub fn from_entries(entries: &[RouteEntry]) -> Result<Self> {
        let mut routes = BTreeMap::new();
        for entry in entries {
            let key = RouteKey::new(entry.asset_kind, entry.reward_kind);
            let route = Route {
                asset: entry.asset,
                reward_token: entry.reward_token,
            };
            if routes.insert(key, route).is_some() {
                return Err(EngineError::DuplicateRoute(key.to_string()));
            }
        }
        Ok(Self { routes })
    }

    /// Route for `key`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownRoute`] if no route is configured
    pub fn resolve(&self, key: RouteKey) -> Result<Route> {
        self.routes
            .get(&key)
            .copied()
            .ok_or_else(|| EngineError::UnknownRoute(key.to_string()))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
