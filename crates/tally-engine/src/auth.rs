//! Admin authorization policy.
//!
//! One capability object gates every admin-only operation of the engine and
//! the vault layer. It is either a single owner or a set of role grants;
//! holder self-service operations (claim, recipient binding) never consult
//! it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, EngineError, Result};

/// Admin-only actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    /// Register a producer asset.
    RegisterAsset,
    /// Push or pop reward tokens.
    ManageRewardTokens,
    /// Set or clear a privileged recipient.
    SetPrivilegedRecipient,
    /// Change the production venue address.
    SetProducerVenue,
    /// Settle a claim on behalf of another holder.
    ClaimFor,
    /// Change vault fee configuration.
    ConfigureVault,
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdminAction::RegisterAsset => "register_asset",
            AdminAction::ManageRewardTokens => "manage_reward_tokens",
            AdminAction::SetPrivilegedRecipient => "set_privileged_recipient",
            AdminAction::SetProducerVenue => "set_producer_venue",
            AdminAction::ClaimFor => "claim_for",
            AdminAction::ConfigureVault => "configure_vault",
        };
        f.write_str(name)
    }
}

/// Roles that can be granted under [`AuthorizationPolicy::Roles`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Every admin action.
    Admin,
    /// Asset registration and reward-token management.
    AssetManager,
    /// Privileged recipient bindings.
    RecipientManager,
    /// Keeper settlement on behalf of holders.
    Keeper,
}

impl Role {
    /// Whether this role permits `action`.
    pub fn permits(&self, action: AdminAction) -> bool {
        match self {
            Role::Admin => true,
            Role::AssetManager => matches!(
                action,
                AdminAction::RegisterAsset
                    | AdminAction::ManageRewardTokens
                    | AdminAction::SetProducerVenue
            ),
            Role::RecipientManager => action == AdminAction::SetPrivilegedRecipient,
            Role::Keeper => action == AdminAction::ClaimFor,
        }
    }
}

/// Who may perform admin actions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizationPolicy {
    /// A single owner may do everything.
    OwnerOnly {
        /// The owner.
        owner: Address,
    },
    /// Accounts hold roles; an action is allowed if any held role permits it.
    Roles {
        /// Role grants per account.
        #[serde(default)]
        grants: BTreeMap<Address, BTreeSet<Role>>,
    },
}

impl AuthorizationPolicy {
    /// Single-owner policy.
    pub fn owner(owner: Address) -> Self {
        AuthorizationPolicy::OwnerOnly { owner }
    }

    /// Empty role-based policy.
    pub fn roles() -> Self {
        AuthorizationPolicy::Roles {
            grants: BTreeMap::new(),
        }
    }

    /// Grant `role` to `account`. No effect on an owner-only policy.
    pub fn grant(mut self, account: Address, role: Role) -> Self {
        if let AuthorizationPolicy::Roles { grants } = &mut self {
            grants.entry(account).or_default().insert(role);
        }
        self
    }

    /// Check that `caller` may perform `action`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if the policy does not allow it
    pub fn authorize(&self, caller: &Address, action: AdminAction) -> Result<()> {
        let allowed = match self {
            AuthorizationPolicy::OwnerOnly { owner } => owner == caller,
            AuthorizationPolicy::Roles { grants } => grants
                .get(caller)
                .is_some_and(|roles| roles.iter().any(|role| role.permits(action))),
        };
        if allowed {
            Ok(())
        } else {
            tracing::warn!(%caller, %action, "unauthorized admin call");
            Err(EngineError::NotAuthorized {
                caller: *caller,
                action: action.to_string(),
            })
        }
    }
}
