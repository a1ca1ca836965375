//! Integration tests for the tally workspace.
//!
//! The tests under `tests/` exercise the accrual engine and the vault layer
//! together against the in-memory host. This library only holds the
//! fixtures they share.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```

use tally_engine::config::EngineConfig;
use tally_engine::host::VecSink;
use tally_engine::memory::MemoryHost;
use tally_engine::routes::{AssetKind, RewardKind, RouteEntry};
use tally_engine::RewardEngine;
use tally_types::{Address, Amount, AssetId};

/// Base timestamp for test scenarios.
pub const BASE_TIME: u64 = 1_700_000_000;

/// Engine under test.
pub type Engine = RewardEngine<MemoryHost, VecSink>;

/// Named address.
pub fn addr(label: &str) -> Address {
    Address::derive(label)
}

/// Engine owner.
pub fn owner() -> Address {
    addr("owner")
}

/// Custody account of harvested rewards.
pub fn custody() -> Address {
    addr("custody")
}

/// Liquidity producer asset.
pub fn glp() -> AssetId {
    addr("glp")
}

/// Primary reward token.
pub fn weth() -> AssetId {
    addr("weth")
}

/// Secondary reward token.
pub fn esgmx() -> AssetId {
    addr("esgmx")
}

/// Engine with a production venue, `glp` registered with `weth` and
/// `esgmx`, and routes for both reward kinds.
pub fn engine() -> Engine {
    let config = EngineConfig {
        producer_venue: Some(addr("venue")),
        routes: vec![
            RouteEntry {
                asset_kind: AssetKind::Liquidity,
                reward_kind: RewardKind::Primary,
                asset: glp(),
                reward_token: weth(),
            },
            RouteEntry {
                asset_kind: AssetKind::Liquidity,
                reward_kind: RewardKind::Secondary,
                asset: glp(),
                reward_token: esgmx(),
            },
        ],
        ..EngineConfig::new(owner(), custody())
    };
    let mut engine = RewardEngine::new(config, MemoryHost::new(BASE_TIME), VecSink::default())
        .expect("engine");
    engine
        .register_asset(&owner(), glp(), vec![weth(), esgmx()])
        .expect("register glp");
    engine
}

/// Mint `amount` of `asset` to `holder` and run the accrual hook.
pub fn mint(engine: &mut Engine, asset: &AssetId, holder: &Address, amount: Amount) {
    engine.host_mut().mint(asset, holder, amount);
    engine
        .on_balance_change(asset, &[Address::ZERO, *holder])
        .expect("mint hook");
}

/// Transfer `amount` of `asset` and run the accrual hook.
pub fn transfer(engine: &mut Engine, asset: &AssetId, from: &Address, to: &Address, amount: Amount) {
    engine
        .host_mut()
        .send(asset, from, to, amount)
        .expect("transfer");
    engine
        .on_balance_change(asset, &[*from, *to])
        .expect("transfer hook");
}

/// Burn `amount` of `asset` from `holder` and run the accrual hook.
pub fn burn(engine: &mut Engine, asset: &AssetId, holder: &Address, amount: Amount) {
    engine
        .host_mut()
        .burn(asset, holder, amount)
        .expect("burn");
    engine
        .on_balance_change(asset, &[*holder, Address::ZERO])
        .expect("burn hook");
}
