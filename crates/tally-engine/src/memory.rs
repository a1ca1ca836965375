//! In-memory host.
//!
//! [`MemoryHost`] implements every collaborator trait over plain maps: a
//! manual clock, producer-asset and reward-token balances in one book,
//! emissions queued at the production venue, and failure injection for
//! claims and transfers. While a checkpoint is open the books record an
//! undo log, so a reverted engine transaction also reverts every mint,
//! transfer and venue claim made inside it.

use std::collections::{BTreeSet, VecDeque};

use crate::host::{
    AccountInspector, BalanceSource, Clock, HostTransaction, Producer, ProducerClaim,
    ProducerError, TokenSink, TransferError,
};
use crate::undo::{UndoMap, UndoMark};
use crate::{Address, Amount, AssetId, Timestamp};

/// Inverse of one venue-queue change.
#[derive(Clone, Debug)]
enum QueueUndo {
    EmissionQueued,
    EmissionsTaken(Vec<(AssetId, AssetId, Amount)>),
    ClaimQueued,
    ClaimTaken(ProducerClaim),
}

/// Balances and venue state rolled back by [`HostTransaction::revert`].
#[derive(Clone, Debug, Default)]
struct Books {
    balances: UndoMap<(AssetId, Address), Amount>,
    supplies: UndoMap<AssetId, Amount>,
    emissions: Vec<(AssetId, AssetId, Amount)>,
    claims: VecDeque<ProducerClaim>,
    queue_log: Vec<QueueUndo>,
}

/// Undo-log positions at a checkpoint.
#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    balances: UndoMark,
    supplies: UndoMark,
    queue: usize,
}

impl Books {
    fn balance(&self, asset: &AssetId, owner: &Address) -> Amount {
        self.balances.get(&(*asset, *owner)).copied().unwrap_or(0)
    }

    fn set_balance(&mut self, asset: &AssetId, owner: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&(*asset, *owner));
        } else {
            self.balances.insert((*asset, *owner), amount);
        }
    }

    fn supply(&self, asset: &AssetId) -> Amount {
        self.supplies.get(asset).copied().unwrap_or(0)
    }

    fn mark(&self) -> Checkpoint {
        Checkpoint {
            balances: self.balances.mark(),
            supplies: self.supplies.mark(),
            queue: self.queue_log.len(),
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.balances.rollback(checkpoint.balances);
        self.supplies.rollback(checkpoint.supplies);
        while self.queue_log.len() > checkpoint.queue {
            match self.queue_log.pop() {
                Some(QueueUndo::EmissionQueued) => {
                    self.emissions.pop();
                }
                Some(QueueUndo::EmissionsTaken(emissions)) => self.emissions = emissions,
                Some(QueueUndo::ClaimQueued) => {
                    self.claims.pop_back();
                }
                Some(QueueUndo::ClaimTaken(claim)) => self.claims.push_front(claim),
                None => break,
            }
        }
    }

    fn commit(&mut self) {
        self.balances.commit();
        self.supplies.commit();
        self.queue_log.clear();
    }
}

/// Single-process host for tests and simulation.
#[derive(Clone, Debug, Default)]
pub struct MemoryHost {
    now: Timestamp,
    books: Books,
    contracts: BTreeSet<Address>,
    rejecting: BTreeSet<Address>,
    fail_next_claim: Option<String>,
    checkpoints: Vec<Checkpoint>,
}

impl MemoryHost {
    /// Empty host with the clock at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&mut self, secs: u64) {
        self.now = self.now.saturating_add(secs);
    }

    /// Set the clock. Moving it backwards is allowed; accrual ignores it.
    pub fn set_time(&mut self, now: Timestamp) {
        self.now = now;
    }

    /// Create `amount` of `asset` for `to`. Works for producer assets and
    /// reward tokens alike.
    pub fn mint(&mut self, asset: &AssetId, to: &Address, amount: Amount) {
        let balance = self.books.balance(asset, to).saturating_add(amount);
        self.books.set_balance(asset, to, balance);
        let supply = self.books.supply(asset).saturating_add(amount);
        self.books.supplies.insert(*asset, supply);
        self.settle();
    }

    /// Destroy `amount` of `asset` held by `from`.
    ///
    /// # Errors
    ///
    /// - [`TransferError::InsufficientBalance`] if `from` holds less
    pub fn burn(&mut self, asset: &AssetId, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let available = self.books.balance(asset, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientBalance {
                available,
                required: amount,
            })?;
        self.books.set_balance(asset, from, remaining);
        let supply = self.books.supply(asset).saturating_sub(amount);
        self.books.supplies.insert(*asset, supply);
        self.settle();
        Ok(())
    }

    /// Move `amount` of `asset` between accounts, subject to the rejection
    /// list.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Rejected`] if `to` rejects transfers
    /// - [`TransferError::InsufficientBalance`] if `from` holds less
    pub fn send(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if self.rejecting.contains(to) {
            return Err(TransferError::Rejected(*to));
        }
        let available = self.books.balance(asset, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientBalance {
                available,
                required: amount,
            })?;
        self.books.set_balance(asset, from, remaining);
        let credited = self.books.balance(asset, to).saturating_add(amount);
        self.books.set_balance(asset, to, credited);
        self.settle();
        Ok(())
    }

    /// Queue `amount` of `reward_token` produced for `asset` holders. The
    /// next venue claim delivers every queued emission.
    pub fn queue_emission(&mut self, asset: AssetId, reward_token: AssetId, amount: Amount) {
        self.books.emissions.push((asset, reward_token, amount));
        self.books.queue_log.push(QueueUndo::EmissionQueued);
        self.settle();
    }

    /// Queue a raw claim result, returned verbatim by the next venue claim
    /// instead of the queued emissions. Tokens in a raw claim are minted to
    /// the receiver only if the claim is well formed.
    pub fn queue_claim(&mut self, claim: ProducerClaim) {
        self.books.claims.push_back(claim);
        self.books.queue_log.push(QueueUndo::ClaimQueued);
        self.settle();
    }

    /// Make the next venue claim fail with `reason`.
    pub fn fail_next_claim(&mut self, reason: &str) {
        self.fail_next_claim = Some(reason.to_string());
    }

    /// Reject every transfer to `account` until accepted again.
    pub fn reject_transfers_to(&mut self, account: Address) {
        self.rejecting.insert(account);
    }

    /// Stop rejecting transfers to `account`.
    pub fn accept_transfers_to(&mut self, account: Address) {
        self.rejecting.remove(&account);
    }

    /// Classify `account` as a contract.
    pub fn mark_contract(&mut self, account: Address) {
        self.contracts.insert(account);
    }

    /// Emissions still queued at the venue.
    pub fn pending_emissions(&self) -> &[(AssetId, AssetId, Amount)] {
        &self.books.emissions
    }

    /// Number of open checkpoints.
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len()
    }

    /// Drop the undo logs once no checkpoint is open.
    fn settle(&mut self) {
        if self.checkpoints.is_empty() {
            self.books.commit();
        }
    }
}

impl Clock for MemoryHost {
    fn now(&self) -> Timestamp {
        self.now
    }
}

impl BalanceSource for MemoryHost {
    fn total_supply(&self, asset: &AssetId) -> Amount {
        self.books.supply(asset)
    }

    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.books.balance(asset, holder)
    }
}

impl Producer for MemoryHost {
    fn claim_rewards(
        &mut self,
        _venue: &Address,
        receiver: &Address,
    ) -> Result<ProducerClaim, ProducerError> {
        if let Some(reason) = self.fail_next_claim.take() {
            return Err(ProducerError::Unavailable(reason));
        }

        let claim = match self.books.claims.pop_front() {
            Some(raw) => {
                self.books.queue_log.push(QueueUndo::ClaimTaken(raw.clone()));
                raw
            }
            None => {
                let emissions = std::mem::take(&mut self.books.emissions);
                let mut claim = ProducerClaim::default();
                for (asset, reward_token, amount) in &emissions {
                    claim.push(*asset, *reward_token, *amount);
                }
                self.books.queue_log.push(QueueUndo::EmissionsTaken(emissions));
                claim
            }
        };

        if claim.is_well_formed() {
            let delivered: Vec<(AssetId, Amount)> = claim
                .entries()
                .filter(|(_, _, amount)| *amount > 0)
                .map(|(_, token, amount)| (*token, amount))
                .collect();
            for (token, amount) in delivered {
                self.mint(&token, receiver, amount);
            }
        }
        self.settle();
        Ok(claim)
    }
}

impl TokenSink for MemoryHost {
    fn transfer(
        &mut self,
        token: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.send(token, from, to, amount)
    }

    fn token_balance(&self, token: &AssetId, owner: &Address) -> Amount {
        self.books.balance(token, owner)
    }
}

impl AccountInspector for MemoryHost {
    fn is_contract(&self, address: &Address) -> bool {
        self.contracts.contains(address)
    }
}

impl HostTransaction for MemoryHost {
    fn checkpoint(&mut self) {
        self.checkpoints.push(self.books.mark());
    }

    fn revert(&mut self) {
        if let Some(checkpoint) = self.checkpoints.pop() {
            self.books.rollback(checkpoint);
        }
        self.settle();
    }

    fn release(&mut self) {
        self.checkpoints.pop();
        self.settle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> AssetId {
        Address::derive("weth")
    }

    #[test]
    fn test_mint_send_burn() {
        let mut host = MemoryHost::new(0);
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        host.mint(&weth(), &alice, 100);
        host.send(&weth(), &alice, &bob, 40).expect("send");
        host.burn(&weth(), &bob, 10).expect("burn");

        assert_eq!(host.balance_of(&weth(), &alice), 60);
        assert_eq!(host.balance_of(&weth(), &bob), 30);
        assert_eq!(host.total_supply(&weth()), 90);
        assert!(matches!(
            host.send(&weth(), &bob, &alice, 31),
            Err(TransferError::InsufficientBalance {
                available: 30,
                required: 31
            })
        ));
    }

    #[test]
    fn test_rejecting_receiver() {
        let mut host = MemoryHost::new(0);
        let alice = Address::derive("alice");
        let vault = Address::derive("vault");
        host.mint(&weth(), &alice, 1);
        host.reject_transfers_to(vault);
        assert!(matches!(
            host.transfer(&weth(), &alice, &vault, 1),
            Err(TransferError::Rejected(_))
        ));
        host.accept_transfers_to(vault);
        host.transfer(&weth(), &alice, &vault, 1).expect("accepted");
    }

    #[test]
    fn test_claim_delivers_emissions_once() {
        let mut host = MemoryHost::new(0);
        let glp = Address::derive("glp");
        let custody = Address::derive("custody");
        let venue = Address::derive("venue");
        host.queue_emission(glp, weth(), 5);
        host.queue_emission(glp, weth(), 0);

        let claim = host.claim_rewards(&venue, &custody).expect("claim");
        assert_eq!(claim.amounts, vec![5, 0]);
        assert_eq!(host.token_balance(&weth(), &custody), 5);

        let again = host.claim_rewards(&venue, &custody).expect("claim");
        assert!(again.amounts.is_empty());
    }

    #[test]
    fn test_fail_next_claim_is_one_shot() {
        let mut host = MemoryHost::new(0);
        let venue = Address::derive("venue");
        host.fail_next_claim("down");
        assert!(host.claim_rewards(&venue, &venue).is_err());
        assert!(host.claim_rewards(&venue, &venue).is_ok());
    }

    #[test]
    fn test_nested_checkpoints() {
        let mut host = MemoryHost::new(0);
        let alice = Address::derive("alice");
        host.checkpoint();
        host.mint(&weth(), &alice, 1);
        host.checkpoint();
        host.mint(&weth(), &alice, 2);
        host.revert();
        assert_eq!(host.balance_of(&weth(), &alice), 1);
        host.release();
        assert_eq!(host.balance_of(&weth(), &alice), 1);
        assert_eq!(host.checkpoint_depth(), 0);

        host.checkpoint();
        host.queue_emission(Address::derive("glp"), weth(), 3);
        host.revert();
        assert!(host.pending_emissions().is_empty());
    }

    #[test]
    fn test_revert_restores_venue_queue_and_claimed_tokens() {
        let mut host = MemoryHost::new(0);
        let glp = Address::derive("glp");
        let custody = Address::derive("custody");
        let venue = Address::derive("venue");
        let mut raw = ProducerClaim::default();
        raw.push(glp, weth(), 7);
        host.queue_emission(glp, weth(), 5);
        host.queue_claim(raw.clone());

        host.checkpoint();
        assert_eq!(host.claim_rewards(&venue, &custody).expect("raw"), raw);
        host.claim_rewards(&venue, &custody).expect("emissions");
        host.queue_emission(glp, weth(), 9);
        assert_eq!(host.token_balance(&weth(), &custody), 12);
        host.revert();

        assert_eq!(host.token_balance(&weth(), &custody), 0);
        assert_eq!(host.total_supply(&weth()), 0);
        assert_eq!(host.pending_emissions(), &[(glp, weth(), 5)]);
        assert_eq!(host.claim_rewards(&venue, &custody).expect("raw again"), raw);
    }
}
