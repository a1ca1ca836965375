//! Integration test: settlement against the ledger.
//!
//! Exercises harvest and claim through the public engine API, checking:
//! 1. Pro-rata payouts for the reference two-holder case
//! 2. No double spend: a second claim at the same instant pays nothing
//! 3. The ledger never goes negative and custody always backs it, under
//!    randomized claim ordering
//! 4. Privileged bindings win over self-bindings
//! 5. A failed payout rolls back the whole claim, harvest included

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use tally_engine::host::{BalanceSource, TokenSink};
use tally_engine::EngineError;
use tally_integration_tests::{
    addr, custody, engine, esgmx, glp, mint, owner, transfer, weth, Engine,
};
use tally_types::{Address, Amount, EngineEvent};

fn paid_to(engine: &Engine, token: &Address, account: &Address) -> Amount {
    engine.host().token_balance(token, account)
}

#[test]
fn two_holders_split_by_time_weighted_points() {
    let mut engine = engine();
    let (alice, bob) = (addr("alice"), addr("bob"));
    mint(&mut engine, &glp(), &alice, 100);
    mint(&mut engine, &glp(), &bob, 300);
    engine.host_mut().advance(1_000);
    engine.host_mut().queue_emission(glp(), weth(), 1_000);

    let weth = weth();
    let receipt = engine.claim(&alice, &glp()).expect("alice claims");
    assert_eq!(receipt.points_consumed, 100_000);
    assert_eq!(receipt.amount_of(&weth), 250);

    let receipt = engine.claim(&bob, &glp()).expect("bob claims");
    assert_eq!(receipt.amount_of(&weth), 750);

    assert_eq!(paid_to(&engine, &weth, &alice), 250);
    assert_eq!(paid_to(&engine, &weth, &bob), 750);
    assert_eq!(engine.ledger_balance(&glp(), &weth), 0);
    assert_eq!(engine.global_state(&glp()).expect("global").rewards, 0);
}

#[test]
fn second_claim_at_same_instant_pays_nothing() {
    let mut engine = engine();
    let weth = weth();
    let (alice, bob) = (addr("alice"), addr("bob"));
    mint(&mut engine, &glp(), &alice, 100);
    mint(&mut engine, &glp(), &bob, 100);
    engine.host_mut().advance(10);
    engine.host_mut().queue_emission(glp(), weth, 500);

    let first = engine.claim(&alice, &glp()).expect("first");
    assert_eq!(first.amount_of(&weth), 250);

    let events_before = engine.sink().events.len();
    let second = engine.claim(&alice, &glp()).expect("second");
    assert_eq!(second.points_consumed, 0);
    assert!(second.payouts.is_empty());
    assert_eq!(paid_to(&engine, &weth, &alice), 250);
    assert!(engine.sink().events[events_before..]
        .iter()
        .all(|event| !matches!(event, EngineEvent::Claimed { .. })));
}

#[test]
fn claim_with_no_global_points_pays_nothing() {
    let mut engine = engine();
    let weth = weth();
    // Rewards arrive before anyone has held the asset.
    engine.host_mut().queue_emission(glp(), weth, 1_000);
    let receipt = engine.claim(&addr("alice"), &glp()).expect("claim");
    assert!(receipt.payouts.is_empty());
    assert_eq!(engine.ledger_balance(&glp(), &weth), 1_000);
}

#[test]
fn randomized_claim_ordering_keeps_ledger_backed() {
    let mut engine = engine();
    let weth = weth();
    let tokens = [weth, esgmx()];
    let holders: Vec<_> = (0..5).map(|i| addr(&format!("lp-{i}"))).collect();
    let mut rng = StdRng::seed_from_u64(0x5e771e);

    for holder in &holders {
        mint(&mut engine, &glp(), holder, rng.gen_range(1..10_000));
    }

    let mut emitted = [0u128; 2];
    for _round in 0..40 {
        engine.host_mut().advance(rng.gen_range(1..3_600));
        for (i, token) in tokens.iter().enumerate() {
            let amount = rng.gen_range(0..1_000_000);
            engine.host_mut().queue_emission(glp(), *token, amount);
            emitted[i] += amount;
        }

        if rng.gen_bool(0.3) {
            let from = holders[rng.gen_range(0..holders.len())];
            let to = holders[rng.gen_range(0..holders.len())];
            let balance = engine.host().balance_of(&glp(), &from);
            if from != to && balance > 0 {
                transfer(&mut engine, &glp(), &from, &to, rng.gen_range(1..=balance));
            }
        }

        let mut claimants = holders.clone();
        claimants.shuffle(&mut rng);
        claimants.truncate(rng.gen_range(0..=holders.len()));
        for holder in &claimants {
            engine.claim(holder, &glp()).expect("claim");
            for token in &tokens {
                assert_eq!(
                    paid_to(&engine, token, &custody()),
                    engine.ledger_balance(&glp(), token),
                    "custody must back the ledger exactly"
                );
            }
        }
    }

    // Everyone settles at the same instant: the last claimant holds all
    // remaining global points and takes the remainder.
    engine.harvest().expect("harvest");
    let mut order = holders.clone();
    order.shuffle(&mut rng);
    for holder in &order {
        engine.claim(holder, &glp()).expect("final claim");
    }
    for (i, token) in tokens.iter().enumerate() {
        let paid: Amount = holders.iter().map(|h| paid_to(&engine, token, h)).sum();
        assert_eq!(engine.ledger_balance(&glp(), token), 0);
        assert_eq!(paid, emitted[i]);
    }
}

#[test]
fn privileged_binding_wins_over_self_binding() {
    let mut engine = engine();
    let weth = weth();
    let pool = addr("pool");
    let treasury = addr("treasury");
    engine.host_mut().mark_contract(pool);

    engine
        .set_reward_recipient_privileged(&owner(), pool, glp(), weth, treasury)
        .expect("privileged binding");
    engine
        .set_reward_recipient(&pool, weth, addr("pool-weth"))
        .expect("self binding");
    engine
        .set_reward_recipient(&pool, esgmx(), addr("pool-esgmx"))
        .expect("self binding");

    mint(&mut engine, &glp(), &pool, 100);
    engine.host_mut().advance(100);
    engine.host_mut().queue_emission(glp(), weth, 300);
    engine.host_mut().queue_emission(glp(), esgmx(), 600);

    let receipt = engine
        .claim_for(&owner(), &glp(), &pool)
        .expect("claim for pool");
    assert_eq!(receipt.payouts.len(), 2);
    assert_eq!(paid_to(&engine, &weth, &treasury), 300);
    assert_eq!(paid_to(&engine, &weth, &addr("pool-weth")), 0);
    assert_eq!(paid_to(&engine, &esgmx(), &addr("pool-esgmx")), 600);
    assert_eq!(paid_to(&engine, &weth, &pool), 0);
}

#[test]
fn privileged_binding_requires_contract_and_authority() {
    let mut engine = engine();
    let weth = weth();
    let plain = addr("plain");

    let err = engine
        .set_reward_recipient_privileged(&owner(), plain, glp(), weth, addr("treasury"))
        .expect_err("plain account");
    assert!(matches!(err, EngineError::NotContract(_)));

    engine.host_mut().mark_contract(plain);
    let err = engine
        .set_reward_recipient_privileged(&addr("mallory"), plain, glp(), weth, addr("mallory"))
        .expect_err("not owner");
    assert!(matches!(err, EngineError::NotAuthorized { .. }));

    let err = engine
        .claim_for(&addr("mallory"), &glp(), &plain)
        .expect_err("not owner");
    assert!(matches!(err, EngineError::NotAuthorized { .. }));
}

#[test]
fn failed_payout_rolls_back_entire_claim() {
    let mut engine = engine();
    let weth = weth();
    let alice = addr("alice");
    let blocked = addr("blocked");
    mint(&mut engine, &glp(), &alice, 100);
    engine.host_mut().advance(50);
    engine.host_mut().queue_emission(glp(), weth, 400);
    engine.host_mut().queue_emission(glp(), esgmx(), 800);
    engine
        .set_reward_recipient(&alice, esgmx(), blocked)
        .expect("binding");
    engine.host_mut().reject_transfers_to(blocked);

    let holder_before = engine.holder_state(&glp(), &alice);
    let events_before = engine.sink().events.len();
    let err = engine.claim(&alice, &glp()).expect_err("esgmx payout rejected");
    assert!(matches!(err, EngineError::TransferFailed { to, .. } if to == blocked));

    // The weth payout that preceded the failure is undone along with the
    // harvest that funded it.
    assert_eq!(paid_to(&engine, &weth, &alice), 0);
    assert_eq!(engine.ledger_balance(&glp(), &weth), 0);
    assert_eq!(engine.host().pending_emissions().len(), 2);
    assert_eq!(engine.holder_state(&glp(), &alice), holder_before);
    assert_eq!(engine.sink().events.len(), events_before);
    assert_eq!(engine.host().checkpoint_depth(), 0);

    engine.host_mut().accept_transfers_to(blocked);
    let receipt = engine.claim(&alice, &glp()).expect("claim succeeds");
    assert_eq!(receipt.amount_of(&weth), 400);
    assert_eq!(paid_to(&engine, &esgmx(), &blocked), 800);
}

#[test]
fn claim_many_harvests_once() {
    let mut engine = engine();
    let weth = weth();
    let alice = addr("alice");
    mint(&mut engine, &glp(), &alice, 10);
    engine.host_mut().advance(10);
    engine.host_mut().queue_emission(glp(), weth, 70);

    let receipts = engine
        .claim_many(&alice, &[glp(), glp()])
        .expect("claim many");
    assert_eq!(receipts[0].amount_of(&weth), 70);
    assert!(receipts[1].payouts.is_empty());

    let harvests = engine
        .sink()
        .events
        .iter()
        .filter(|event| matches!(event, EngineEvent::Harvested { .. }))
        .count();
    assert_eq!(harvests, 1);
}

#[test]
fn preview_matches_claim() {
    let mut engine = engine();
    let weth = weth();
    let (alice, bob) = (addr("alice"), addr("bob"));
    mint(&mut engine, &glp(), &alice, 30);
    mint(&mut engine, &glp(), &bob, 70);
    engine.host_mut().advance(100);
    engine.host_mut().queue_emission(glp(), weth, 999);
    engine.harvest().expect("harvest");
    engine.host_mut().advance(25);

    let preview = engine.preview_claim(&glp(), &alice).expect("preview");
    let receipt = engine.claim(&alice, &glp()).expect("claim");
    assert_eq!(preview, receipt);
}
