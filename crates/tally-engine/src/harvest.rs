//! Pulling rewards from the production venue into the ledger.
//!
//! A harvest claims everything the venue has produced since the last
//! harvest, delivered to the engine's custody account. Each delivered entry
//! first brings the producer asset's global tracker up to date, so points
//! accrued before the harvest are the ones that share in it, then credits
//! the ledger. Zero-amount entries only accrue.

use tally_types::EngineEvent;

use crate::auth::AdminAction;
use crate::guard::non_reentrant;
use crate::host::{EventSink, Host};
use crate::{Address, Amount, AssetId, EngineError, RewardEngine, Result};

/// One ledger credit made by a harvest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarvestCredit {
    /// Producer asset whose holders earned the reward.
    pub asset: AssetId,
    /// Reward token credited.
    pub reward_token: AssetId,
    /// Amount credited.
    pub amount: Amount,
}

/// Outcome of a harvest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Non-zero credits in delivery order.
    pub credits: Vec<HarvestCredit>,
}

impl HarvestReport {
    /// Total credited for (`asset`, `reward_token`).
    pub fn credited(&self, asset: &AssetId, reward_token: &AssetId) -> Amount {
        self.credits
            .iter()
            .filter(|c| &c.asset == asset && &c.reward_token == reward_token)
            .fold(0, |acc, c| acc.saturating_add(c.amount))
    }

    /// Whether nothing was credited.
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }
}

impl<H: Host, S: EventSink> RewardEngine<H, S> {
    /// Claim pending production from the venue and credit the ledger.
    ///
    /// Safe to call repeatedly: a second harvest at the same timestamp
    /// accrues nothing and credits only what the venue delivers anew.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Reentrant`] if called from inside another guarded
    ///   entry point
    /// - [`EngineError::HarvestFailed`] if the venue fails
    /// - [`EngineError::MalformedHarvest`] if the venue returns sequences
    ///   of different lengths
    /// - [`EngineError::UnknownAsset`] if the venue reports an unregistered
    ///   producer asset
    pub fn harvest(&mut self) -> Result<HarvestReport> {
        non_reentrant(self, |engine| engine.transaction(|engine| engine.harvest_inner()))
    }

    /// Harvest body shared with claim settlement. Must run inside a
    /// transaction with the guard already held.
    pub(crate) fn harvest_inner(&mut self) -> Result<HarvestReport> {
        let Some(venue) = self.state.producer_venue else {
            tracing::debug!("no production venue configured, harvest skipped");
            return Ok(HarvestReport::default());
        };

        let custody = self.custody;
        let claim = self
            .host
            .claim_rewards(&venue, &custody)
            .map_err(EngineError::HarvestFailed)?;
        if !claim.is_well_formed() {
            return Err(EngineError::MalformedHarvest {
                assets: claim.producer_assets.len(),
                tokens: claim.reward_tokens.len(),
                amounts: claim.amounts.len(),
            });
        }

        let mut report = HarvestReport::default();
        for (asset, reward_token, amount) in claim.entries() {
            self.accrue_global(asset)?;
            if amount == 0 {
                continue;
            }

            let (ledger_before, ledger_after) =
                self.state.ledger.credit(asset, reward_token, amount)?;
            tracing::info!(%asset, %reward_token, amount, ledger_after, "harvest credited");
            self.emit(EngineEvent::Harvested {
                asset: *asset,
                reward_token: *reward_token,
                amount,
                ledger_before,
                ledger_after,
            });
            report.credits.push(HarvestCredit {
                asset: *asset,
                reward_token: *reward_token,
                amount,
            });
        }
        Ok(report)
    }

    /// Point the engine at a different production venue.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAuthorized`] if `caller` may not change the venue
    /// - [`EngineError::InvalidReceiver`] if `venue` is null
    pub fn set_producer_venue(&mut self, caller: &Address, venue: Address) -> Result<()> {
        self.authorize(caller, AdminAction::SetProducerVenue)?;
        if venue.is_zero() {
            return Err(EngineError::InvalidReceiver);
        }
        self.transaction(|engine| {
            let previous = engine.state.producer_venue.replace(venue);
            tracing::info!(%venue, ?previous, "production venue set");
            engine.emit(EngineEvent::ProducerVenueSet { previous, venue });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::host::{ProducerClaim, TokenSink, VecSink};
    use crate::memory::MemoryHost;

    const START: u64 = 1_700_000_000;

    fn owner() -> Address {
        Address::derive("owner")
    }

    fn custody() -> Address {
        Address::derive("custody")
    }

    fn venue() -> Address {
        Address::derive("venue")
    }

    fn glp() -> AssetId {
        Address::derive("glp")
    }

    fn weth() -> AssetId {
        Address::derive("weth")
    }

    fn engine() -> RewardEngine<MemoryHost, VecSink> {
        let config = EngineConfig {
            producer_venue: Some(venue()),
            ..EngineConfig::new(owner(), custody())
        };
        let mut engine =
            RewardEngine::new(config, MemoryHost::new(START), VecSink::default()).expect("engine");
        engine.host_mut().mint(&glp(), &Address::derive("alice"), 400);
        engine
            .register_asset(&owner(), glp(), vec![weth()])
            .expect("register");
        engine
    }

    #[test]
    fn test_harvest_credits_ledger_and_custody() {
        let mut engine = engine();
        engine.host_mut().advance(1000);
        engine.host_mut().queue_emission(glp(), weth(), 1_000);

        let report = engine.harvest().expect("harvest");
        assert_eq!(report.credited(&glp(), &weth()), 1_000);
        assert_eq!(engine.ledger_balance(&glp(), &weth()), 1_000);
        assert_eq!(engine.host().token_balance(&weth(), &custody()), 1_000);
        // The global tracker was brought up to date before crediting.
        assert_eq!(engine.global_state(&glp()).expect("state").rewards, 400_000);
    }

    #[test]
    fn test_harvest_is_retriggerable() {
        let mut engine = engine();
        engine.host_mut().queue_emission(glp(), weth(), 500);
        engine.harvest().expect("first");
        let report = engine.harvest().expect("second");
        assert!(report.is_empty());
        assert_eq!(engine.ledger_balance(&glp(), &weth()), 500);
    }

    #[test]
    fn test_zero_amount_entry_only_accrues() {
        let mut engine = engine();
        engine.host_mut().advance(10);
        engine.host_mut().queue_emission(glp(), weth(), 0);
        let report = engine.harvest().expect("harvest");
        assert!(report.is_empty());
        assert_eq!(engine.ledger_balance(&glp(), &weth()), 0);
        assert_eq!(engine.global_state(&glp()).expect("state").rewards, 4_000);
    }

    #[test]
    fn test_harvest_without_venue_is_noop() {
        let config = EngineConfig::new(owner(), custody());
        let mut engine =
            RewardEngine::new(config, MemoryHost::new(START), VecSink::default()).expect("engine");
        assert!(engine.harvest().expect("harvest").is_empty());
        assert!(engine.sink().events.is_empty());
    }

    #[test]
    fn test_venue_failure_rolls_back() {
        let mut engine = engine();
        engine.host_mut().queue_emission(glp(), weth(), 700);
        engine.host_mut().fail_next_claim("venue paused");
        engine.sink_mut().drain();

        assert!(matches!(
            engine.harvest(),
            Err(EngineError::HarvestFailed(_))
        ));
        assert_eq!(engine.ledger_balance(&glp(), &weth()), 0);
        assert!(engine.sink().events.is_empty());

        // The emission is still pending and lands on retry.
        engine.harvest().expect("retry");
        assert_eq!(engine.ledger_balance(&glp(), &weth()), 700);
    }

    #[test]
    fn test_unregistered_asset_aborts_harvest() {
        let mut engine = engine();
        engine.host_mut().queue_emission(glp(), weth(), 100);
        engine
            .host_mut()
            .queue_emission(Address::derive("unknown"), weth(), 100);

        assert!(matches!(
            engine.harvest(),
            Err(EngineError::UnknownAsset(_))
        ));
        assert_eq!(engine.ledger_balance(&glp(), &weth()), 0);
        assert_eq!(engine.host().token_balance(&weth(), &custody()), 0);
    }

    #[test]
    fn test_malformed_claim_rejected() {
        let mut engine = engine();
        engine.host_mut().queue_claim(ProducerClaim {
            producer_assets: vec![glp(), glp()],
            reward_tokens: vec![weth()],
            amounts: vec![1, 2],
        });
        assert!(matches!(
            engine.harvest(),
            Err(EngineError::MalformedHarvest {
                assets: 2,
                tokens: 1,
                amounts: 2
            })
        ));
    }

    #[test]
    fn test_set_producer_venue() {
        let mut engine = engine();
        let next = Address::derive("venue-v2");
        assert!(matches!(
            engine.set_producer_venue(&Address::derive("mallory"), next),
            Err(EngineError::NotAuthorized { .. })
        ));
        assert!(matches!(
            engine.set_producer_venue(&owner(), Address::ZERO),
            Err(EngineError::InvalidReceiver)
        ));
        engine.set_producer_venue(&owner(), next).expect("set");
        assert_eq!(engine.producer_venue(), Some(next));
        assert!(matches!(
            engine.sink().events.last(),
            Some(EngineEvent::ProducerVenueSet { previous: Some(_), .. })
        ));
    }
}
