//! The transactional accrual engine.
//!
//! [`RewardEngine`] owns all accrual state and the host collaborators. Every
//! public mutating operation runs inside [`RewardEngine::transaction`]: on
//! failure the engine state, the host (via
//! [`HostTransaction`](crate::host::HostTransaction)) and the buffered
//! events are all rolled back, so callers never observe a partial harvest
//! or claim. Engine state is rolled back through the undo logs of its
//! stores, so a rollback costs what the transaction wrote. Operations that call out to the production venue or
//! the token sink are additionally reentrancy-guarded.
//!
//! Harvest lives in [`crate::harvest`], settlement in [`crate::settlement`].

use serde::{Deserialize, Serialize};
use tally_types::EngineEvent;

use crate::accumulator::{AccrualDelta, AccrualState};
use crate::auth::{AdminAction, AuthorizationPolicy};
use crate::config::EngineConfig;
use crate::guard::{Guarded, ReentrancyGuard};
use crate::host::{EventSink, Host, NoopSink};
use crate::ledger::RewardLedger;
use crate::recipients::{RecipientRegistry, RegistryMark};
use crate::routes::RouteTable;
use crate::tracker::{GlobalTracker, HolderTracker};
use crate::undo::{UndoMap, UndoMark};
use crate::{Address, Amount, AssetId, EngineError, Points, Result};

/// A registered producer asset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerAsset {
    /// Reward tokens in registration order. Duplicates are not checked.
    pub reward_tokens: Vec<AssetId>,
}

/// Everything rolled back by a failed transaction.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) assets: UndoMap<AssetId, ProducerAsset>,
    pub(crate) global: GlobalTracker,
    pub(crate) holders: HolderTracker,
    pub(crate) ledger: RewardLedger,
    pub(crate) recipients: RecipientRegistry,
    pub(crate) producer_venue: Option<Address>,
}

/// Undo-log positions of every store at transaction entry.
#[derive(Clone, Copy, Debug)]
struct StateMark {
    assets: UndoMark,
    global: UndoMark,
    holders: UndoMark,
    ledger: UndoMark,
    recipients: RegistryMark,
    producer_venue: Option<Address>,
}

impl EngineState {
    fn mark(&self) -> StateMark {
        StateMark {
            assets: self.assets.mark(),
            global: self.global.mark(),
            holders: self.holders.mark(),
            ledger: self.ledger.mark(),
            recipients: self.recipients.mark(),
            producer_venue: self.producer_venue,
        }
    }

    fn rollback(&mut self, mark: StateMark) {
        self.assets.rollback(mark.assets);
        self.global.rollback(mark.global);
        self.holders.rollback(mark.holders);
        self.ledger.rollback(mark.ledger);
        self.recipients.rollback(mark.recipients);
        self.producer_venue = mark.producer_venue;
    }

    fn commit(&mut self) {
        self.assets.commit();
        self.global.commit();
        self.holders.commit();
        self.ledger.commit();
        self.recipients.commit();
    }
}

/// Events buffered until the outermost transaction commits.
#[derive(Debug, Default)]
struct Journal {
    depth: usize,
    pending: Vec<EngineEvent>,
}

/// Accrual and settlement engine over a host `H`, delivering committed
/// events to `S`.
pub struct RewardEngine<H: Host, S: EventSink = NoopSink> {
    pub(crate) host: H,
    sink: S,
    policy: AuthorizationPolicy,
    routes: RouteTable,
    pub(crate) custody: Address,
    max_reward_tokens: usize,
    pub(crate) state: EngineState,
    journal: Journal,
    guard: ReentrancyGuard,
}

impl<H: Host, S: EventSink> Guarded for RewardEngine<H, S> {
    fn guard(&mut self) -> &mut ReentrancyGuard {
        &mut self.guard
    }
}

impl<H: Host, S: EventSink> RewardEngine<H, S> {
    /// Build an engine from configuration.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if the configuration is invalid
    /// - [`EngineError::DuplicateRoute`] if two routes share a key
    pub fn new(config: EngineConfig, host: H, sink: S) -> Result<Self> {
        config.validate()?;
        let routes = RouteTable::from_entries(&config.routes)?;
        let state = EngineState {
            producer_venue: config.producer_venue,
            ..EngineState::default()
        };
        tracing::info!(
            custody = %config.custody,
            routes = routes.len(),
            max_reward_tokens = config.max_reward_tokens,
            "reward engine initialised"
        );
        Ok(Self {
            host,
            sink,
            policy: config.authorization,
            routes,
            custody: config.custody,
            max_reward_tokens: config.max_reward_tokens,
            state,
            journal: Journal::default(),
            guard: ReentrancyGuard::default(),
        })
    }

    // ------------------------------------------------------------------
    // Transactions and events
    // ------------------------------------------------------------------

    /// Run `body` atomically.
    ///
    /// On error the engine state and the host are restored to their values
    /// before the call and events emitted inside `body` are discarded. On
    /// success the events are delivered to the sink once the outermost
    /// transaction commits. Transactions nest.
    pub fn transaction<T, E, F>(&mut self, body: F) -> std::result::Result<T, E>
    where
        E: From<EngineError>,
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
    {
        let state_mark = self.state.mark();
        let mark = self.journal.pending.len();
        self.journal.depth += 1;
        self.host.checkpoint();

        let res = body(self);

        self.journal.depth -= 1;
        match res {
            Ok(value) => {
                self.host.release();
                if self.journal.depth == 0 {
                    self.state.commit();
                    for event in std::mem::take(&mut self.journal.pending) {
                        self.sink.emit(&event);
                    }
                }
                Ok(value)
            }
            Err(e) => {
                self.state.rollback(state_mark);
                self.host.revert();
                let discarded = self.journal.pending.len() - mark;
                self.journal.pending.truncate(mark);
                tracing::warn!(
                    depth = self.journal.depth,
                    discarded,
                    "transaction rolled back"
                );
                Err(e)
            }
        }
    }

    /// Record an audit event. Inside a transaction the event is held until
    /// commit; outside one it is delivered immediately.
    pub fn emit(&mut self, event: EngineEvent) {
        if self.journal.depth > 0 {
            self.journal.pending.push(event);
        } else {
            self.sink.emit(&event);
        }
    }

    /// Check that `caller` may perform `action` under the engine's policy.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if not permitted
    pub fn authorize(&self, caller: &Address, action: AdminAction) -> Result<()> {
        self.policy.authorize(caller, action)
    }

    // ------------------------------------------------------------------
    // Producer asset administration
    // ------------------------------------------------------------------

    /// Register a producer asset with its initial reward tokens. Accrual
    /// starts now, at the asset's current total supply.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not register assets
    /// - [`EngineError::AssetAlreadyRegistered`] on a second registration
    /// - [`EngineError::ExceedsMax`] if too many reward tokens are given
    pub fn register_asset(
        &mut self,
        caller: &Address,
        asset: AssetId,
        reward_tokens: Vec<AssetId>,
    ) -> Result<()> {
        self.authorize(caller, AdminAction::RegisterAsset)?;
        self.transaction(|engine| {
            if engine.state.assets.contains_key(&asset) {
                return Err(EngineError::AssetAlreadyRegistered(asset));
            }
            engine.check_reward_token_cap(reward_tokens.len())?;

            let now = engine.host.now();
            let supply = engine.host.total_supply(&asset);
            engine.state.global.register(asset, now, supply);
            engine.state.assets.insert(
                asset,
                ProducerAsset {
                    reward_tokens: reward_tokens.clone(),
                },
            );

            tracing::info!(%asset, supply, reward_tokens = reward_tokens.len(), "producer asset registered");
            engine.emit(EngineEvent::AssetRegistered {
                asset,
                reward_tokens,
                supply,
                timestamp: now,
            });
            Ok(())
        })
    }

    /// Append a reward token to `asset`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not manage tokens
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    /// - [`EngineError::ExceedsMax`] if the cap is reached
    pub fn push_reward_token(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        reward_token: AssetId,
    ) -> Result<()> {
        self.authorize(caller, AdminAction::ManageRewardTokens)?;
        self.transaction(|engine| {
            let count = engine.producer(asset)?.reward_tokens.len();
            engine.check_reward_token_cap(count + 1)?;
            engine.producer_mut(asset)?.reward_tokens.push(reward_token);

            tracing::info!(%asset, %reward_token, "reward token pushed");
            engine.emit(EngineEvent::RewardTokenPushed {
                asset: *asset,
                reward_token,
            });
            Ok(())
        })
    }

    /// Remove the last reward token of `asset`. Its undistributed ledger
    /// balance is kept and resumes distribution if the token is pushed
    /// again.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not manage tokens
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    /// - [`EngineError::NoRewardTokens`] if the list is empty
    pub fn pop_reward_token(&mut self, caller: &Address, asset: &AssetId) -> Result<AssetId> {
        self.authorize(caller, AdminAction::ManageRewardTokens)?;
        self.transaction(|engine| {
            let reward_token = engine
                .producer_mut(asset)?
                .reward_tokens
                .pop()
                .ok_or(EngineError::NoRewardTokens(*asset))?;

            tracing::info!(%asset, %reward_token, "reward token popped");
            engine.emit(EngineEvent::RewardTokenPopped {
                asset: *asset,
                reward_token,
            });
            Ok(reward_token)
        })
    }

    fn check_reward_token_cap(&self, count: usize) -> Result<()> {
        if count > self.max_reward_tokens {
            return Err(EngineError::ExceedsMax {
                what: "reward tokens",
                value: count as u128,
                max: self.max_reward_tokens as u128,
            });
        }
        Ok(())
    }

    pub(crate) fn producer(&self, asset: &AssetId) -> Result<&ProducerAsset> {
        self.state
            .assets
            .get(asset)
            .ok_or(EngineError::UnknownAsset(*asset))
    }

    fn producer_mut(&mut self, asset: &AssetId) -> Result<&mut ProducerAsset> {
        self.state
            .assets
            .get_mut(asset)
            .ok_or(EngineError::UnknownAsset(*asset))
    }

    // ------------------------------------------------------------------
    // Accrual
    // ------------------------------------------------------------------

    /// Accrue the global tracker of `asset` up to now.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    pub fn global_accrue(&mut self, asset: &AssetId) -> Result<AccrualDelta> {
        self.transaction(|engine| engine.accrue_global(asset))
    }

    /// Accrue `holder`'s tracker for `asset` up to now.
    ///
    /// Must be called after every change to `holder`'s balance: the balance
    /// stored at the previous accrual (the pre-change balance) is applied to
    /// the elapsed period and the current balance becomes the new baseline.
    /// The global tracker is accrued first in the same call.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `holder` is null
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    pub fn holder_accrue(&mut self, asset: &AssetId, holder: &Address) -> Result<AccrualDelta> {
        self.transaction(|engine| engine.accrue_holder(asset, holder))
    }

    /// Hook for the balance-owning asset after a mint, burn or transfer.
    ///
    /// Accrues the global tracker (supply may have changed) and every
    /// affected holder. Null entries (the missing side of a mint or burn)
    /// are skipped.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    pub fn on_balance_change(&mut self, asset: &AssetId, holders: &[Address]) -> Result<()> {
        self.transaction(|engine| {
            engine.accrue_global(asset)?;
            for holder in holders.iter().filter(|h| !h.is_zero()) {
                engine.accrue_holder(asset, holder)?;
            }
            Ok(())
        })
    }

    pub(crate) fn accrue_global(&mut self, asset: &AssetId) -> Result<AccrualDelta> {
        let now = self.host.now();
        let supply = self.host.total_supply(asset);
        let delta = self.state.global.accrue(asset, now, supply)?;

        if delta.elapsed > 0 || delta.prev_balance != delta.balance {
            tracing::debug!(
                %asset,
                elapsed = delta.elapsed,
                supply,
                points = delta.points(),
                rewards = delta.rewards,
                "global accrued"
            );
            self.emit(EngineEvent::GlobalAccrued {
                asset: *asset,
                timestamp: now,
                elapsed: delta.elapsed,
                prev_supply: delta.prev_balance,
                supply: delta.balance,
                prev_rewards: delta.prev_rewards,
                rewards: delta.rewards,
            });
        }
        Ok(delta)
    }

    pub(crate) fn accrue_holder(&mut self, asset: &AssetId, holder: &Address) -> Result<AccrualDelta> {
        if holder.is_zero() {
            return Err(EngineError::InvalidHolder);
        }
        self.accrue_global(asset)?;

        let now = self.host.now();
        let balance = self.host.balance_of(asset, holder);
        let delta = self.state.holders.accrue(asset, holder, now, balance)?;

        if delta.elapsed > 0 || delta.prev_balance != delta.balance {
            tracing::debug!(
                %asset,
                %holder,
                elapsed = delta.elapsed,
                balance,
                points = delta.points(),
                rewards = delta.rewards,
                "holder accrued"
            );
            self.emit(EngineEvent::HolderAccrued {
                asset: *asset,
                holder: *holder,
                timestamp: now,
                elapsed: delta.elapsed,
                prev_balance: delta.prev_balance,
                balance: delta.balance,
                prev_rewards: delta.prev_rewards,
                rewards: delta.rewards,
            });
        }
        Ok(delta)
    }

    // ------------------------------------------------------------------
    // Recipient redirection
    // ------------------------------------------------------------------

    /// Redirect `caller`'s future `reward_token` payouts to `recipient`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidHolder`] if `caller` is null
    /// - [`EngineError::InvalidRecipient`] if `recipient` is null
    pub fn set_reward_recipient(
        &mut self,
        caller: &Address,
        reward_token: AssetId,
        recipient: Address,
    ) -> Result<()> {
        self.transaction(|engine| {
            engine
                .state
                .recipients
                .set(*caller, reward_token, recipient)?;
            tracing::info!(holder = %caller, %reward_token, %recipient, "reward recipient set");
            engine.emit(EngineEvent::RecipientSet {
                holder: *caller,
                reward_token,
                recipient,
            });
            Ok(())
        })
    }

    /// Clear `caller`'s redirect for `reward_token`; payouts go to the
    /// caller again.
    pub fn unset_reward_recipient(&mut self, caller: &Address, reward_token: AssetId) -> Result<()> {
        self.transaction(|engine| {
            if engine
                .state
                .recipients
                .unset(caller, &reward_token)
                .is_some()
            {
                tracing::info!(holder = %caller, %reward_token, "reward recipient cleared");
                engine.emit(EngineEvent::RecipientUnset {
                    holder: *caller,
                    reward_token,
                });
            }
            Ok(())
        })
    }

    /// Redirect rewards a contract holder earns from `asset` in
    /// `reward_token` to `recipient`. Takes precedence over the contract's
    /// own binding.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not set privileged
    ///   recipients
    /// - [`EngineError::NotContract`] if `contract` is a plain account
    /// - [`EngineError::InvalidRecipient`] if `recipient` is null
    pub fn set_reward_recipient_privileged(
        &mut self,
        caller: &Address,
        contract: Address,
        asset: AssetId,
        reward_token: AssetId,
        recipient: Address,
    ) -> Result<()> {
        self.authorize(caller, AdminAction::SetPrivilegedRecipient)?;
        if !self.host.is_contract(&contract) {
            return Err(EngineError::NotContract(contract));
        }
        self.transaction(|engine| {
            engine
                .state
                .recipients
                .set_privileged(contract, asset, reward_token, recipient)?;
            tracing::info!(%contract, %asset, %reward_token, %recipient, "privileged recipient set");
            engine.emit(EngineEvent::PrivilegedRecipientSet {
                contract,
                asset,
                reward_token,
                recipient,
            });
            Ok(())
        })
    }

    /// Clear a privileged redirect.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not set privileged
    ///   recipients
    pub fn unset_reward_recipient_privileged(
        &mut self,
        caller: &Address,
        contract: Address,
        asset: AssetId,
        reward_token: AssetId,
    ) -> Result<()> {
        self.authorize(caller, AdminAction::SetPrivilegedRecipient)?;
        self.transaction(|engine| {
            if engine
                .state
                .recipients
                .unset_privileged(&contract, &asset, &reward_token)
                .is_some()
            {
                tracing::info!(%contract, %asset, %reward_token, "privileged recipient cleared");
                engine.emit(EngineEvent::PrivilegedRecipientUnset {
                    contract,
                    asset,
                    reward_token,
                });
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Whether `asset` is registered.
    pub fn is_registered(&self, asset: &AssetId) -> bool {
        self.state.assets.contains_key(asset)
    }

    /// Reward tokens of `asset` in registration order.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    pub fn reward_tokens(&self, asset: &AssetId) -> Result<&[AssetId]> {
        Ok(&self.producer(asset)?.reward_tokens)
    }

    /// Global accrual state of `asset`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownAsset`] if `asset` is not registered
    pub fn global_state(&self, asset: &AssetId) -> Result<AccrualState> {
        self.state
            .global
            .get(asset)
            .copied()
            .ok_or(EngineError::UnknownAsset(*asset))
    }

    /// Accrual state of `holder` in `asset`.
    pub fn holder_state(&self, asset: &AssetId, holder: &Address) -> AccrualState {
        self.state.holders.get(asset, holder)
    }

    /// Sum of every tracked holder's points in `asset`.
    pub fn total_holder_points(&self, asset: &AssetId) -> Points {
        self.state.holders.total_rewards(asset)
    }

    /// Undistributed `reward_token` balance owed to `asset` holders.
    pub fn ledger_balance(&self, asset: &AssetId, reward_token: &AssetId) -> Amount {
        self.state.ledger.balance(asset, reward_token)
    }

    /// Where `holder`'s `reward_token` payout from `asset` would go.
    pub fn recipient_of(&self, holder: &Address, asset: &AssetId, reward_token: &AssetId) -> Address {
        self.state.recipients.resolve(holder, asset, reward_token)
    }

    /// Configured production venue.
    pub fn producer_venue(&self) -> Option<Address> {
        self.state.producer_venue
    }

    /// Account holding harvested rewards.
    pub fn custody(&self) -> Address {
        self.custody
    }

    /// The route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host, for balance changes made outside the
    /// engine.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The event sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the event sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
