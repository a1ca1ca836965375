//! Time-weighted balance integrals.
//!
//! Both the global tracker (over total supply) and the holder tracker (over
//! one holder's balance) keep the same running sum:
//!
//! ```text
//! rewards += (now - last_update) * last_balance
//! ```
//!
//! i.e. a left Riemann sum of the balance curve sampled at every
//! balance-changing event. The balance stored in `last_balance` is the one
//! that was in force during the elapsed period; the caller supplies the new
//! balance, which becomes the baseline for the next period.

use serde::{Deserialize, Serialize};

use crate::{Amount, EngineError, Points, Result, Timestamp};

/// Points accrued by holding `balance` for `elapsed` seconds.
///
/// # Errors
///
/// - [`EngineError::Overflow`] if the product does not fit in [`Points`]
pub fn time_weighted(elapsed: u64, balance: Amount) -> Result<Points> {
    (elapsed as u128)
        .checked_mul(balance)
        .ok_or(EngineError::Overflow("time-weighted balance"))
}

/// Running accrual state of one balance curve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualState {
    /// Timestamp of the last accrual.
    pub last_update: Timestamp,
    /// Balance in force since `last_update`.
    pub last_balance: Amount,
    /// Accumulated points.
    pub rewards: Points,
}

/// Before/after values of one accrual step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccrualDelta {
    /// Seconds covered by this step.
    pub elapsed: u64,
    /// Balance applied over the elapsed period.
    pub prev_balance: Amount,
    /// New baseline balance.
    pub balance: Amount,
    /// Points before the step.
    pub prev_rewards: Points,
    /// Points after the step.
    pub rewards: Points,
}

impl AccrualDelta {
    /// Points added by this step.
    pub fn points(&self) -> Points {
        self.rewards - self.prev_rewards
    }
}

impl AccrualState {
    /// Baseline state starting at `now` with `balance` in force.
    pub fn starting_at(now: Timestamp, balance: Amount) -> Self {
        Self {
            last_update: now,
            last_balance: balance,
            rewards: 0,
        }
    }

    /// Accrue the elapsed period at the stored balance, then adopt
    /// `new_balance` as the baseline.
    ///
    /// A `now` earlier than `last_update` accrues nothing and leaves
    /// `last_update` in place.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Overflow`] if the running total overflows
    pub fn accrue(&mut self, now: Timestamp, new_balance: Amount) -> Result<AccrualDelta> {
        let elapsed = now.saturating_sub(self.last_update);
        let added = time_weighted(elapsed, self.last_balance)?;
        let rewards = self
            .rewards
            .checked_add(added)
            .ok_or(EngineError::Overflow("accrued rewards"))?;

        let delta = AccrualDelta {
            elapsed,
            prev_balance: self.last_balance,
            balance: new_balance,
            prev_rewards: self.rewards,
            rewards,
        };

        self.rewards = rewards;
        self.last_balance = new_balance;
        self.last_update = self.last_update.max(now);
        Ok(delta)
    }

    /// Points the state would hold at `now` without mutating it.
    pub fn projected(&self, now: Timestamp) -> Result<Points> {
        let elapsed = now.saturating_sub(self.last_update);
        self.rewards
            .checked_add(time_weighted(elapsed, self.last_balance)?)
            .ok_or(EngineError::Overflow("projected rewards"))
    }
}
