//! Step execution.

use std::collections::BTreeMap;

use serde::Serialize;

use tally_engine::host::{EventSink, TokenSink};
use tally_engine::memory::MemoryHost;
use tally_engine::RewardEngine;
use tally_types::{Address, Amount, AssetId};
use tally_vault::ExtraRewardVault;

use crate::scenario::{addr, Scenario, Step};
use crate::{Result, ScenarioError};

/// Undistributed ledger balance at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerLine {
    /// Producer asset name.
    pub asset: String,
    /// Reward token name.
    pub reward_token: String,
    /// Amount left in the ledger.
    pub amount: Amount,
}

/// Non-zero reward-token balance of a named account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceLine {
    /// Account name.
    pub account: String,
    /// Reward token name.
    pub token: String,
    /// Balance.
    pub amount: Amount,
}

/// Vault state at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultSummary {
    /// Net extra reward waiting for shares.
    pub carried: Amount,
    /// Pending extra reward per depositor, as of its last update.
    pub pending: BTreeMap<String, Amount>,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Steps executed.
    pub steps: usize,
    /// Ledger balances per (asset, reward token).
    pub ledger: Vec<LedgerLine>,
    /// Reward-token balances of named accounts.
    pub balances: Vec<BalanceLine>,
    /// Vault state, if the scenario has a vault.
    pub vault: Option<VaultSummary>,
}

impl Summary {
    /// Ledger balance of (`asset`, `reward_token`), by name.
    pub fn ledger_of(&self, asset: &str, reward_token: &str) -> Amount {
        self.ledger
            .iter()
            .find(|line| line.asset == asset && line.reward_token == reward_token)
            .map_or(0, |line| line.amount)
    }

    /// `token` balance of `account`, by name.
    pub fn balance_of(&self, account: &str, token: &str) -> Amount {
        self.balances
            .iter()
            .find(|line| line.account == account && line.token == token)
            .map_or(0, |line| line.amount)
    }
}

/// Run `scenario` against a fresh in-memory host, delivering committed
/// events to `sink`.
///
/// # Errors
///
/// - [`ScenarioError::Engine`] or [`ScenarioError::Vault`] if setup fails
/// - [`ScenarioError::Step`] wrapping the first failing step
pub fn run<S: EventSink>(scenario: &Scenario, sink: S) -> Result<Summary> {
    let mut engine = RewardEngine::new(
        scenario.engine_config(),
        MemoryHost::new(scenario.start),
        sink,
    )?;
    let owner = addr(&scenario.owner);
    for asset in &scenario.assets {
        let reward_tokens = asset.reward_tokens.iter().map(|t| addr(t)).collect();
        engine.register_asset(&owner, addr(&asset.name), reward_tokens)?;
    }
    let mut vault = scenario
        .vault_config()
        .map(|config| ExtraRewardVault::new(config, engine.routes()))
        .transpose()?;

    for (index, step) in scenario.steps.iter().enumerate() {
        tracing::debug!(index, op = step.op(), "scenario step");
        apply(&mut engine, vault.as_mut(), step).map_err(|e| ScenarioError::Step {
            index,
            op: step.op(),
            source: Box::new(e),
        })?;
    }

    let summary = summarize(scenario, &engine, vault.as_ref());
    tracing::info!(steps = summary.steps, "scenario complete");
    Ok(summary)
}

fn apply<S: EventSink>(
    engine: &mut RewardEngine<MemoryHost, S>,
    vault: Option<&mut ExtraRewardVault>,
    step: &Step,
) -> Result<()> {
    match step {
        Step::Advance { secs } => engine.host_mut().advance(*secs),
        Step::Mint { asset, to, amount } => {
            let (asset, to) = (addr(asset), addr(to));
            engine.host_mut().mint(&asset, &to, *amount);
            balance_changed(engine, &asset, &[to])?;
        }
        Step::Burn {
            asset,
            from,
            amount,
        } => {
            let (asset, from) = (addr(asset), addr(from));
            engine.host_mut().burn(&asset, &from, *amount)?;
            balance_changed(engine, &asset, &[from])?;
        }
        Step::Transfer {
            asset,
            from,
            to,
            amount,
        } => {
            let (asset, from, to) = (addr(asset), addr(from), addr(to));
            engine.host_mut().send(&asset, &from, &to, *amount)?;
            balance_changed(engine, &asset, &[from, to])?;
        }
        Step::Emit {
            asset,
            reward_token,
            amount,
        } => engine
            .host_mut()
            .queue_emission(addr(asset), addr(reward_token), *amount),
        Step::Harvest => {
            engine.harvest()?;
        }
        Step::Claim { holder, asset } => {
            engine.claim(&addr(holder), &addr(asset))?;
        }
        Step::SetRecipient {
            holder,
            reward_token,
            recipient,
        } => engine.set_reward_recipient(&addr(holder), addr(reward_token), addr(recipient))?,
        Step::VaultDeposit { holder, amount } => {
            let vault = vault.ok_or(ScenarioError::NoVault)?;
            let holder = addr(holder);
            let backing = backing_asset(vault)?;
            vault.before_deposit(engine, &holder)?;
            engine.host_mut().mint(&vault.share_asset(), &holder, *amount);
            engine.host_mut().mint(&backing, &vault.address(), *amount);
            balance_changed(engine, &backing, &[vault.address()])?;
        }
        Step::VaultWithdraw { holder, amount } => {
            let vault = vault.ok_or(ScenarioError::NoVault)?;
            let holder = addr(holder);
            let backing = backing_asset(vault)?;
            vault.before_withdraw(engine, &holder)?;
            engine
                .host_mut()
                .burn(&vault.share_asset(), &holder, *amount)?;
            engine
                .host_mut()
                .burn(&backing, &vault.address(), *amount)?;
            balance_changed(engine, &backing, &[vault.address()])?;
        }
        Step::VaultHarvest { caller } => {
            let vault = vault.ok_or(ScenarioError::NoVault)?;
            match caller {
                Some(caller) => vault.harvest(engine, &addr(caller))?,
                None => vault.compound(engine)?,
            };
        }
        Step::VaultClaim { holder, receiver } => {
            let vault = vault.ok_or(ScenarioError::NoVault)?;
            let holder = addr(holder);
            let receiver = receiver.as_deref().map_or(holder, addr);
            vault.claim_extra_reward(engine, &holder, &receiver)?;
        }
    }
    Ok(())
}

/// Accrue the engine for a balance change if `asset` is a producer asset.
fn balance_changed<S: EventSink>(
    engine: &mut RewardEngine<MemoryHost, S>,
    asset: &AssetId,
    holders: &[Address],
) -> Result<()> {
    if engine.is_registered(asset) {
        engine.on_balance_change(asset, holders)?;
    }
    Ok(())
}

fn backing_asset(vault: &ExtraRewardVault) -> Result<AssetId> {
    vault
        .sources()
        .first()
        .map(|route| route.asset)
        .ok_or(ScenarioError::NoVault)
}

fn summarize<S: EventSink>(
    scenario: &Scenario,
    engine: &RewardEngine<MemoryHost, S>,
    vault: Option<&ExtraRewardVault>,
) -> Summary {
    let names = scenario.names();

    let ledger = scenario
        .assets
        .iter()
        .flat_map(|asset| {
            asset.reward_tokens.iter().map(move |token| LedgerLine {
                asset: asset.name.clone(),
                reward_token: token.clone(),
                amount: engine.ledger_balance(&addr(&asset.name), &addr(token)),
            })
        })
        .collect();

    let mut tokens: Vec<&String> = scenario
        .assets
        .iter()
        .flat_map(|asset| asset.reward_tokens.iter())
        .chain(scenario.routes.iter().map(|route| &route.reward_token))
        .collect();
    tokens.sort();
    tokens.dedup();

    let mut balances = Vec::new();
    for account in &names {
        for token in &tokens {
            let amount = engine.host().token_balance(&addr(token), &addr(account));
            if amount > 0 {
                balances.push(BalanceLine {
                    account: account.clone(),
                    token: (*token).clone(),
                    amount,
                });
            }
        }
    }

    let vault = vault.map(|vault| {
        let pending = scenario
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::VaultDeposit { holder, .. } => Some(holder.clone()),
                _ => None,
            })
            .map(|holder| {
                let amount = vault.pending_of(&addr(&holder));
                (holder, amount)
            })
            .collect();
        VaultSummary {
            carried: vault.carried(),
            pending,
        }
    });

    Summary {
        steps: scenario.steps.len(),
        ledger,
        balances,
        vault,
    }
}
