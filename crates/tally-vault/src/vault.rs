//! The extra-reward vault.
//!
//! [`ExtraRewardVault`] claims the secondary reward of its configured
//! sources through the engine (the vault is an ordinary holder there),
//! takes the platform fee and an optional caller incentive, and folds the
//! rest into the per-share tracker. Every share mutation must be preceded
//! by the matching hook ([`ExtraRewardVault::before_deposit`],
//! [`ExtraRewardVault::before_withdraw`],
//! [`ExtraRewardVault::before_transfer`]) so holders are brought up to date
//! at their pre-mutation share balance.
//!
//! Each entry point is guarded by the vault's own reentrancy lock and runs
//! inside an engine transaction; on failure the vault state is restored
//! along with the engine and the host.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use tally_engine::auth::AdminAction;
use tally_engine::guard::{non_reentrant, Guarded, ReentrancyGuard};
use tally_engine::host::{EventSink, Host};
use tally_engine::routes::{Route, RouteKey, RouteTable};
use tally_engine::{EngineError, RewardEngine};
use tally_types::{Address, Amount, AssetId, EngineEvent, BPS_DENOMINATOR};

use crate::split::split_by_estimate;
use crate::tracker::{Distribution, ExtraRewardTracker, TrackerMark};
use crate::{Result, VaultError};

/// Upper bound on the platform fee (10%).
pub const MAX_PLATFORM_FEE_BPS: u16 = 1_000;

/// Upper bound on the harvest caller incentive (1%).
pub const MAX_CALLER_INCENTIVE_BPS: u16 = 100;

/// Default platform fee (4.5%).
pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 450;

/// Default harvest caller incentive (0.5%).
pub const DEFAULT_CALLER_INCENTIVE_BPS: u16 = 50;

/// Maximum number of extra-reward sources.
pub const MAX_SOURCES: usize = 2;

/// Vault configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// The vault's account; holds the underlying producer assets.
    pub vault: Address,
    /// Asset whose balances are the vault shares.
    pub share_asset: AssetId,
    /// Routes of the extra reward, one per source producer asset. All must
    /// pay the same reward token.
    pub extra_reward_sources: Vec<RouteKey>,
    /// Recipient of the platform fee.
    pub treasury: Address,
    /// Platform fee in basis points.
    #[serde(default = "default_platform_fee_bps")]
    pub platform_fee_bps: u16,
    /// Incentive paid to an explicit harvest caller, in basis points.
    #[serde(default = "default_caller_incentive_bps")]
    pub caller_incentive_bps: u16,
}

fn default_platform_fee_bps() -> u16 {
    DEFAULT_PLATFORM_FEE_BPS
}

fn default_caller_incentive_bps() -> u16 {
    DEFAULT_CALLER_INCENTIVE_BPS
}

impl VaultConfig {
    /// Check addresses, source count and fee bounds.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Config`] on a null address or a bad source count
    /// - [`EngineError::ExceedsMax`] if a fee is out of bounds
    pub fn validate(&self) -> Result<()> {
        if self.vault.is_zero() || self.treasury.is_zero() || self.share_asset.is_zero() {
            return Err(VaultError::Config(
                "vault, treasury and share asset must be non-null".to_string(),
            ));
        }
        if self.extra_reward_sources.is_empty() || self.extra_reward_sources.len() > MAX_SOURCES {
            return Err(VaultError::Config(format!(
                "expected 1 to {MAX_SOURCES} extra-reward sources, got {}",
                self.extra_reward_sources.len()
            )));
        }
        check_fees(self.platform_fee_bps, self.caller_incentive_bps)
    }
}

fn check_fees(platform_fee_bps: u16, caller_incentive_bps: u16) -> Result<()> {
    if platform_fee_bps > MAX_PLATFORM_FEE_BPS {
        return Err(EngineError::ExceedsMax {
            what: "platform fee bps",
            value: platform_fee_bps.into(),
            max: MAX_PLATFORM_FEE_BPS.into(),
        }
        .into());
    }
    if caller_incentive_bps > MAX_CALLER_INCENTIVE_BPS {
        return Err(EngineError::ExceedsMax {
            what: "caller incentive bps",
            value: caller_incentive_bps.into(),
            max: MAX_CALLER_INCENTIVE_BPS.into(),
        }
        .into());
    }
    Ok(())
}

fn bps_of(amount: Amount, bps: u16) -> Amount {
    // bps <= BPS_DENOMINATOR, so the quotient fits back into u128.
    (U256::from(amount) * U256::from(bps) / U256::from(BPS_DENOMINATOR)).low_u128()
}

/// What one compound cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompoundReport {
    /// Extra reward that arrived in the vault this cycle.
    pub gross: Amount,
    /// Sent to the treasury.
    pub platform_fee: Amount,
    /// Sent to the harvest caller.
    pub caller_incentive: Amount,
    /// Left for share holders.
    pub net: Amount,
    /// `gross` attributed to each source producer asset.
    pub attributed: Vec<(AssetId, Amount)>,
    /// Tracker outcome, if anything was distributed or carried.
    pub distribution: Option<Distribution>,
}

/// State rolled back by a failed vault operation.
#[derive(Debug)]
struct VaultState {
    tracker: ExtraRewardTracker,
    platform_fee_bps: u16,
    caller_incentive_bps: u16,
}

#[derive(Clone, Copy, Debug)]
struct VaultMark {
    tracker: TrackerMark,
    platform_fee_bps: u16,
    caller_incentive_bps: u16,
}

impl VaultState {
    fn mark(&self) -> VaultMark {
        VaultMark {
            tracker: self.tracker.mark(),
            platform_fee_bps: self.platform_fee_bps,
            caller_incentive_bps: self.caller_incentive_bps,
        }
    }

    fn rollback(&mut self, mark: VaultMark) {
        self.tracker.rollback(mark.tracker);
        self.platform_fee_bps = mark.platform_fee_bps;
        self.caller_incentive_bps = mark.caller_incentive_bps;
    }
}

/// Secondary-reward distribution for one vault.
#[derive(Debug)]
pub struct ExtraRewardVault {
    vault: Address,
    share_asset: AssetId,
    treasury: Address,
    reward_token: AssetId,
    sources: Vec<Route>,
    state: VaultState,
    guard: ReentrancyGuard,
}

impl Guarded for ExtraRewardVault {
    fn guard(&mut self) -> &mut ReentrancyGuard {
        &mut self.guard
    }
}

impl ExtraRewardVault {
    /// Build a vault, resolving its sources through `routes`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Config`] if the configuration is invalid or the
    ///   sources pay different reward tokens
    /// - [`EngineError::UnknownRoute`] if a source has no route
    pub fn new(config: VaultConfig, routes: &RouteTable) -> Result<Self> {
        config.validate()?;
        let sources = config
            .extra_reward_sources
            .iter()
            .map(|key| routes.resolve(*key))
            .collect::<tally_engine::Result<Vec<Route>>>()?;

        let reward_token = sources
            .first()
            .map(|route| route.reward_token)
            .ok_or_else(|| VaultError::Config("no extra-reward sources".to_string()))?;
        if sources.iter().any(|route| route.reward_token != reward_token) {
            return Err(VaultError::Config(
                "extra-reward sources pay different reward tokens".to_string(),
            ));
        }

        tracing::info!(
            vault = %config.vault,
            %reward_token,
            sources = sources.len(),
            platform_fee_bps = config.platform_fee_bps,
            caller_incentive_bps = config.caller_incentive_bps,
            "extra-reward vault initialised"
        );
        Ok(Self {
            vault: config.vault,
            share_asset: config.share_asset,
            treasury: config.treasury,
            reward_token,
            sources,
            state: VaultState {
                tracker: ExtraRewardTracker::default(),
                platform_fee_bps: config.platform_fee_bps,
                caller_incentive_bps: config.caller_incentive_bps,
            },
            guard: ReentrancyGuard::default(),
        })
    }

    /// Run `body` guarded and atomically with `engine`.
    fn atomically<H, S, T, F>(&mut self, engine: &mut RewardEngine<H, S>, body: F) -> Result<T>
    where
        H: Host,
        S: EventSink,
        F: FnOnce(&mut Self, &mut RewardEngine<H, S>) -> Result<T>,
    {
        non_reentrant(self, |vault| {
            let mark = vault.state.mark();
            let res = engine.transaction(|engine| body(vault, engine));
            match res {
                Ok(_) => vault.state.tracker.commit(),
                Err(_) => vault.state.rollback(mark),
            }
            res
        })
    }

    /// Run a compound cycle without a caller incentive.
    ///
    /// # Errors
    ///
    /// - any engine claim or transfer error
    pub fn compound<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
    ) -> Result<CompoundReport> {
        self.atomically(engine, |vault, engine| vault.compound_inner(engine, None))
    }

    /// Run a compound cycle on behalf of `caller`, who receives the caller
    /// incentive.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidReceiver`] if `caller` is null
    /// - any engine claim or transfer error
    pub fn harvest<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        caller: &Address,
    ) -> Result<CompoundReport> {
        if caller.is_zero() {
            return Err(EngineError::InvalidReceiver.into());
        }
        let caller = *caller;
        self.atomically(engine, |vault, engine| vault.compound_inner(engine, Some(caller)))
    }

    /// Hook run before shares are minted to `holder`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `holder` is null
    /// - any compound error
    pub fn before_deposit<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        holder: &Address,
    ) -> Result<()> {
        self.before_share_change(engine, holder, &Address::ZERO)
    }

    /// Hook run before shares of `holder` are burned.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `holder` is null
    /// - any compound error
    pub fn before_withdraw<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        holder: &Address,
    ) -> Result<()> {
        self.before_share_change(engine, holder, &Address::ZERO)
    }

    /// Hook run before shares move from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `from` is null
    /// - any compound error
    pub fn before_transfer<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        from: &Address,
        to: &Address,
    ) -> Result<()> {
        self.before_share_change(engine, from, to)
    }

    fn before_share_change<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        holder: &Address,
        counterparty: &Address,
    ) -> Result<()> {
        if holder.is_zero() {
            return Err(EngineError::InvalidHolder.into());
        }
        let (holder, counterparty) = (*holder, *counterparty);
        self.atomically(engine, |vault, engine| {
            vault.compound_inner(engine, None)?;
            vault.update_holder(engine, &holder)?;
            if !counterparty.is_zero() && counterparty != holder {
                vault.update_holder(engine, &counterparty)?;
            }
            Ok(())
        })
    }

    /// Pay `caller`'s pending extra reward to `receiver`.
    ///
    /// Runs a compound cycle first. Returns the amount paid; nothing
    /// pending is not an error.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidReceiver`] if `receiver` is null
    /// - [`EngineError::TransferFailed`] if the payout is rejected
    /// - any compound error
    pub fn claim_extra_reward<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        caller: &Address,
        receiver: &Address,
    ) -> Result<Amount> {
        if receiver.is_zero() {
            return Err(EngineError::InvalidReceiver.into());
        }
        if caller.is_zero() {
            return Err(EngineError::InvalidHolder.into());
        }
        let (caller, receiver) = (*caller, *receiver);
        self.atomically(engine, |vault, engine| {
            vault.compound_inner(engine, None)?;
            vault.update_holder(engine, &caller)?;

            let amount = vault.state.tracker.take_pending(&caller);
            if amount == 0 {
                return Ok(0);
            }
            vault.pay(engine, &receiver, amount)?;

            tracing::info!(vault = %vault.vault, holder = %caller, %receiver, amount, "extra reward claimed");
            engine.emit(EngineEvent::ExtraRewardClaimed {
                vault: vault.vault,
                holder: caller,
                receiver,
                amount,
            });
            Ok(amount)
        })
    }

    /// Change the fee configuration.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not configure vaults
    /// - [`EngineError::ExceedsMax`] if a fee is out of bounds
    pub fn set_fees<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        caller: &Address,
        platform_fee_bps: u16,
        caller_incentive_bps: u16,
    ) -> Result<()> {
        engine.authorize(caller, AdminAction::ConfigureVault)?;
        check_fees(platform_fee_bps, caller_incentive_bps)?;
        self.atomically(engine, |vault, engine| {
            vault.state.platform_fee_bps = platform_fee_bps;
            vault.state.caller_incentive_bps = caller_incentive_bps;
            tracing::info!(vault = %vault.vault, platform_fee_bps, caller_incentive_bps, "vault fees set");
            engine.emit(EngineEvent::VaultFeesSet {
                vault: vault.vault,
                platform_fee_bps,
                caller_incentive_bps,
            });
            Ok(())
        })
    }

    fn compound_inner<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        caller: Option<Address>,
    ) -> Result<CompoundReport> {
        let before = engine.host().token_balance(&self.reward_token, &self.vault);
        let assets: Vec<AssetId> = self.sources.iter().map(|route| route.asset).collect();
        let receipts = engine.claim_many(&self.vault, &assets)?;
        let gross = engine
            .host()
            .token_balance(&self.reward_token, &self.vault)
            .saturating_sub(before);

        let estimates: Vec<Amount> = receipts
            .iter()
            .map(|receipt| {
                receipt
                    .payouts
                    .iter()
                    .filter(|p| p.reward_token == self.reward_token && p.recipient == self.vault)
                    .fold(0u128, |acc, p| acc.saturating_add(p.amount))
            })
            .collect();
        let attributed = match (assets.as_slice(), estimates.as_slice()) {
            ([a, b], [est_a, est_b]) => {
                let (first, second) = split_by_estimate(gross, *est_a, *est_b);
                vec![(*a, first), (*b, second)]
            }
            _ => assets.iter().map(|asset| (*asset, gross)).take(1).collect(),
        };

        let total_shares = engine.host().total_supply(&self.share_asset);
        let carried = self.state.tracker.carried();
        if gross == 0 && (carried == 0 || total_shares == 0) {
            return Ok(CompoundReport {
                attributed,
                ..CompoundReport::default()
            });
        }

        let platform_fee = bps_of(gross, self.state.platform_fee_bps);
        let caller_incentive = match caller {
            Some(_) => bps_of(gross, self.state.caller_incentive_bps),
            None => 0,
        };
        let net = gross - platform_fee - caller_incentive;

        if platform_fee > 0 {
            let treasury = self.treasury;
            self.pay(engine, &treasury, platform_fee)?;
        }
        if let Some(caller) = caller.filter(|_| caller_incentive > 0) {
            self.pay(engine, &caller, caller_incentive)?;
        }

        let distribution = self.state.tracker.distribute(net, total_shares)?;
        if total_shares == 0 {
            tracing::warn!(vault = %self.vault, carried = distribution.carried, "no shares outstanding, extra reward carried");
        } else {
            tracing::info!(
                vault = %self.vault,
                gross,
                platform_fee,
                caller_incentive,
                distributed = distribution.distributed,
                total_shares,
                "extra reward compounded"
            );
        }
        engine.emit(EngineEvent::ExtraRewardCompounded {
            vault: self.vault,
            reward_token: self.reward_token,
            gross,
            platform_fee,
            caller_incentive,
            net,
            total_shares,
            carried: distribution.carried,
            prev_per_share: distribution.prev_per_share,
            per_share: distribution.per_share,
        });

        Ok(CompoundReport {
            gross,
            platform_fee,
            caller_incentive,
            net,
            attributed,
            distribution: Some(distribution),
        })
    }

    fn update_holder<H: Host, S: EventSink>(
        &mut self,
        engine: &mut RewardEngine<H, S>,
        holder: &Address,
    ) -> Result<()> {
        let share_balance = engine.host().balance_of(&self.share_asset, holder);
        let update = self.state.tracker.update_holder(holder, share_balance)?;
        if update.advanced {
            tracing::debug!(vault = %self.vault, %holder, share_balance, pending = update.pending, "extra reward updated");
            engine.emit(EngineEvent::ExtraRewardUpdated {
                vault: self.vault,
                holder: *holder,
                share_balance,
                prev_pending: update.prev_pending,
                pending: update.pending,
                per_share: self.state.tracker.per_share(),
            });
        }
        Ok(())
    }

    fn pay<H: Host, S: EventSink>(
        &self,
        engine: &mut RewardEngine<H, S>,
        to: &Address,
        amount: Amount,
    ) -> Result<()> {
        engine
            .host_mut()
            .transfer(&self.reward_token, &self.vault, to, amount)
            .map_err(|source| EngineError::TransferFailed {
                token: self.reward_token,
                to: *to,
                amount,
                source,
            })?;
        Ok(())
    }

    /// Pending extra reward of `holder` as of its last update.
    pub fn pending_of(&self, holder: &Address) -> Amount {
        self.state.tracker.pending_of(holder)
    }

    /// Current per-share accumulator.
    pub fn per_share(&self) -> U256 {
        self.state.tracker.per_share()
    }

    /// Net extra reward waiting for shares to exist.
    pub fn carried(&self) -> Amount {
        self.state.tracker.carried()
    }

    /// Current `(platform_fee_bps, caller_incentive_bps)`.
    pub fn fees(&self) -> (u16, u16) {
        (self.state.platform_fee_bps, self.state.caller_incentive_bps)
    }

    /// The vault account.
    pub fn address(&self) -> Address {
        self.vault
    }

    /// The share asset.
    pub fn share_asset(&self) -> AssetId {
        self.share_asset
    }

    /// The extra reward token.
    pub fn reward_token(&self) -> AssetId {
        self.reward_token
    }

    /// Resolved sources.
    pub fn sources(&self) -> &[Route] {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_engine::config::EngineConfig;
    use tally_engine::host::{TokenSink, VecSink};
    use tally_engine::memory::MemoryHost;
    use tally_engine::routes::{AssetKind, RewardKind, RouteEntry};

    const START: u64 = 1_700_000_000;

    type Engine = RewardEngine<MemoryHost, VecSink>;

    fn owner() -> Address {
        Address::derive("owner")
    }

    fn vault_addr() -> Address {
        Address::derive("vault")
    }

    fn treasury() -> Address {
        Address::derive("treasury")
    }

    fn glp() -> AssetId {
        Address::derive("glp")
    }

    fn gmx() -> AssetId {
        Address::derive("gmx")
    }

    fn esgmx() -> AssetId {
        Address::derive("esgmx")
    }

    fn shares() -> AssetId {
        Address::derive("vglp")
    }

    fn alice() -> Address {
        Address::derive("alice")
    }

    fn bob() -> Address {
        Address::derive("bob")
    }

    fn route(asset_kind: AssetKind, asset: AssetId) -> RouteEntry {
        RouteEntry {
            asset_kind,
            reward_kind: RewardKind::Secondary,
            asset,
            reward_token: esgmx(),
        }
    }

    fn setup(platform_fee_bps: u16, caller_incentive_bps: u16) -> (Engine, ExtraRewardVault) {
        let config = EngineConfig {
            producer_venue: Some(Address::derive("venue")),
            routes: vec![
                route(AssetKind::Liquidity, glp()),
                route(AssetKind::Staked, gmx()),
            ],
            ..EngineConfig::new(owner(), Address::derive("custody"))
        };
        let mut engine =
            RewardEngine::new(config, MemoryHost::new(START), VecSink::default()).expect("engine");
        engine.register_asset(&owner(), glp(), vec![esgmx()]).expect("glp");
        engine.register_asset(&owner(), gmx(), vec![esgmx()]).expect("gmx");

        let vault = ExtraRewardVault::new(
            VaultConfig {
                vault: vault_addr(),
                share_asset: shares(),
                extra_reward_sources: vec![RouteKey::new(AssetKind::Liquidity, RewardKind::Secondary)],
                treasury: treasury(),
                platform_fee_bps,
                caller_incentive_bps,
            },
            engine.routes(),
        )
        .expect("vault");
        (engine, vault)
    }

    /// Mint `amount` shares to `holder`, backed one-to-one by glp held by
    /// the vault.
    fn deposit(engine: &mut Engine, vault: &mut ExtraRewardVault, holder: &Address, amount: Amount) {
        vault.before_deposit(engine, holder).expect("hook");
        engine.host_mut().mint(&shares(), holder, amount);
        engine.host_mut().mint(&glp(), &vault_addr(), amount);
        engine.on_balance_change(&glp(), &[vault_addr()]).expect("engine hook");
    }

    #[test]
    fn test_holders_share_extra_reward() {
        let (mut engine, mut vault) = setup(0, 0);
        deposit(&mut engine, &mut vault, &alice(), 100);
        deposit(&mut engine, &mut vault, &bob(), 300);
        engine.host_mut().advance(1000);
        engine.host_mut().queue_emission(glp(), esgmx(), 1_000);

        let paid = vault
            .claim_extra_reward(&mut engine, &alice(), &alice())
            .expect("alice");
        assert_eq!(paid, 250);
        let paid = vault
            .claim_extra_reward(&mut engine, &bob(), &bob())
            .expect("bob");
        assert_eq!(paid, 750);
        assert_eq!(engine.host().token_balance(&esgmx(), &alice()), 250);
        assert_eq!(engine.host().token_balance(&esgmx(), &vault_addr()), 0);
    }

    #[test]
    fn test_fees_and_caller_incentive() {
        let (mut engine, mut vault) = setup(500, 50);
        deposit(&mut engine, &mut vault, &alice(), 100);
        engine.host_mut().advance(1000);
        engine.host_mut().queue_emission(glp(), esgmx(), 1_000);

        let keeper = Address::derive("keeper");
        let report = vault.harvest(&mut engine, &keeper).expect("harvest");
        assert_eq!(report.gross, 1_000);
        assert_eq!(report.platform_fee, 50);
        assert_eq!(report.caller_incentive, 5);
        assert_eq!(report.net, 945);
        assert_eq!(report.attributed, vec![(glp(), 1_000)]);
        assert_eq!(engine.host().token_balance(&esgmx(), &treasury()), 50);
        assert_eq!(engine.host().token_balance(&esgmx(), &keeper), 5);

        let paid = vault
            .claim_extra_reward(&mut engine, &alice(), &alice())
            .expect("claim");
        assert_eq!(paid, 945);
    }

    #[test]
    fn test_hook_compound_pays_no_incentive() {
        let (mut engine, mut vault) = setup(500, 50);
        deposit(&mut engine, &mut vault, &alice(), 100);
        engine.host_mut().advance(1000);
        engine.host_mut().queue_emission(glp(), esgmx(), 1_000);
        let report = vault.compound(&mut engine).expect("compound");
        assert_eq!(report.caller_incentive, 0);
        assert_eq!(report.net, 950);
    }

    #[test]
    fn test_zero_shares_carries_reward() {
        let (mut engine, mut vault) = setup(0, 0);
        // Underlying held by the vault with no shares outstanding.
        engine.host_mut().mint(&glp(), &vault_addr(), 50);
        engine.on_balance_change(&glp(), &[vault_addr()]).expect("hook");
        engine.host_mut().advance(100);
        engine.host_mut().queue_emission(glp(), esgmx(), 1_000);

        let report = vault.compound(&mut engine).expect("compound");
        assert_eq!(report.gross, 1_000);
        assert_eq!(vault.per_share(), U256::zero());
        assert_eq!(vault.carried(), 1_000);

        deposit(&mut engine, &mut vault, &alice(), 10);
        assert_eq!(vault.carried(), 1_000);

        let paid = vault
            .claim_extra_reward(&mut engine, &alice(), &alice())
            .expect("claim");
        assert_eq!(paid, 1_000);
        assert_eq!(vault.carried(), 0);
    }

    #[test]
    fn test_transfer_hook_uses_pre_transfer_balances() {
        let (mut engine, mut vault) = setup(0, 0);
        deposit(&mut engine, &mut vault, &alice(), 100);
        engine.host_mut().advance(100);
        engine.host_mut().queue_emission(glp(), esgmx(), 100);

        vault
            .before_transfer(&mut engine, &alice(), &bob())
            .expect("hook");
        engine
            .host_mut()
            .send(&shares(), &alice(), &bob(), 100)
            .expect("move shares");
        assert_eq!(vault.pending_of(&alice()), 100);
        assert_eq!(vault.pending_of(&bob()), 0);

        engine.host_mut().advance(100);
        engine.host_mut().queue_emission(glp(), esgmx(), 60);
        vault.compound(&mut engine).expect("compound");
        assert_eq!(
            vault
                .claim_extra_reward(&mut engine, &bob(), &bob())
                .expect("bob"),
            60
        );
        assert_eq!(
            vault
                .claim_extra_reward(&mut engine, &alice(), &alice())
                .expect("alice"),
            100
        );
    }

    #[test]
    fn test_claim_null_receiver() {
        let (mut engine, mut vault) = setup(0, 0);
        assert!(matches!(
            vault.claim_extra_reward(&mut engine, &alice(), &Address::ZERO),
            Err(VaultError::Engine(EngineError::InvalidReceiver))
        ));
    }

    #[test]
    fn test_claim_nothing_pending_is_noop() {
        let (mut engine, mut vault) = setup(0, 0);
        engine.sink_mut().drain();
        let paid = vault
            .claim_extra_reward(&mut engine, &alice(), &alice())
            .expect("claim");
        assert_eq!(paid, 0);
        assert!(!engine
            .sink()
            .events
            .iter()
            .any(|e| matches!(e, EngineEvent::ExtraRewardClaimed { .. })));
    }

    #[test]
    fn test_failed_claim_restores_vault_state() {
        let (mut engine, mut vault) = setup(0, 0);
        deposit(&mut engine, &mut vault, &alice(), 100);
        engine.host_mut().advance(100);
        engine.host_mut().queue_emission(glp(), esgmx(), 500);
        vault.compound(&mut engine).expect("compound");
        let per_share = vault.per_share();

        let cold = Address::derive("alice-cold");
        engine.host_mut().reject_transfers_to(cold);
        assert!(matches!(
            vault.claim_extra_reward(&mut engine, &alice(), &cold),
            Err(VaultError::Engine(EngineError::TransferFailed { .. }))
        ));
        assert_eq!(vault.per_share(), per_share);
        assert_eq!(vault.pending_of(&alice()), 0);

        engine.host_mut().accept_transfers_to(cold);
        assert_eq!(
            vault
                .claim_extra_reward(&mut engine, &alice(), &cold)
                .expect("retry"),
            500
        );
    }

    #[test]
    fn test_set_fees_bounds_and_auth() {
        let (mut engine, mut vault) = setup(0, 0);
        assert!(matches!(
            vault.set_fees(&mut engine, &Address::derive("mallory"), 10, 10),
            Err(VaultError::Engine(EngineError::NotAuthorized { .. }))
        ));
        assert!(matches!(
            vault.set_fees(&mut engine, &owner(), MAX_PLATFORM_FEE_BPS + 1, 0),
            Err(VaultError::Engine(EngineError::ExceedsMax { .. }))
        ));
        assert!(matches!(
            vault.set_fees(&mut engine, &owner(), 0, MAX_CALLER_INCENTIVE_BPS + 1),
            Err(VaultError::Engine(EngineError::ExceedsMax { .. }))
        ));
        vault
            .set_fees(&mut engine, &owner(), MAX_PLATFORM_FEE_BPS, MAX_CALLER_INCENTIVE_BPS)
            .expect("at bounds");
        assert_eq!(vault.fees(), (MAX_PLATFORM_FEE_BPS, MAX_CALLER_INCENTIVE_BPS));
    }

    #[test]
    fn test_two_sources_attributed() {
        let (mut engine, _) = setup(0, 0);
        let mut vault = ExtraRewardVault::new(
            VaultConfig {
                vault: vault_addr(),
                share_asset: shares(),
                extra_reward_sources: vec![
                    RouteKey::new(AssetKind::Liquidity, RewardKind::Secondary),
                    RouteKey::new(AssetKind::Staked, RewardKind::Secondary),
                ],
                treasury: treasury(),
                platform_fee_bps: 0,
                caller_incentive_bps: 0,
            },
            engine.routes(),
        )
        .expect("vault");
        deposit(&mut engine, &mut vault, &alice(), 10);
        engine.host_mut().mint(&gmx(), &vault_addr(), 10);
        engine.on_balance_change(&gmx(), &[vault_addr()]).expect("hook");
        engine.host_mut().advance(10);
        engine.host_mut().queue_emission(glp(), esgmx(), 300);
        engine.host_mut().queue_emission(gmx(), esgmx(), 100);

        let report = vault.compound(&mut engine).expect("compound");
        assert_eq!(report.gross, 400);
        assert_eq!(report.attributed, vec![(glp(), 300), (gmx(), 100)]);
    }

    #[test]
    fn test_guard_rejects_nested_entry() {
        let (mut engine, mut vault) = setup(0, 0);
        vault.guard().lock().expect("lock");
        assert!(matches!(
            vault.compound(&mut engine),
            Err(VaultError::Engine(EngineError::Reentrant))
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let toml = format!(
            r#"
vault = "{}"
share_asset = "{}"
treasury = "{}"
extra_reward_sources = [{{ asset_kind = "liquidity", reward_kind = "secondary" }}]
"#,
            vault_addr(),
            shares(),
            treasury()
        );
        let config: VaultConfig = toml::from_str(&toml).expect("parse");
        assert_eq!(config.platform_fee_bps, DEFAULT_PLATFORM_FEE_BPS);
        assert_eq!(config.caller_incentive_bps, DEFAULT_CALLER_INCENTIVE_BPS);
        config.validate().expect("valid");
    }

    #[test]
    fn test_sources_must_share_reward_token() {
        let (engine, _) = setup(0, 0);
        let mut routes = vec![route(AssetKind::Liquidity, glp())];
        routes.push(RouteEntry {
            reward_token: Address::derive("weth"),
            ..route(AssetKind::Staked, gmx())
        });
        let table = RouteTable::from_entries(&routes).expect("routes");
        let res = ExtraRewardVault::new(
            VaultConfig {
                vault: vault_addr(),
                share_asset: shares(),
                extra_reward_sources: vec![
                    RouteKey::new(AssetKind::Liquidity, RewardKind::Secondary),
                    RouteKey::new(AssetKind::Staked, RewardKind::Secondary),
                ],
                treasury: treasury(),
                platform_fee_bps: 0,
                caller_incentive_bps: 0,
            },
            &table,
        );
        assert!(matches!(res, Err(VaultError::Config(_))));
        assert_eq!(engine.routes().len(), 2);
    }
}
