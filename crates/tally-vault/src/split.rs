//! Attributing one received total between two sources.
//!
//! A compound cycle claims the extra reward from up to two producer assets
//! and observes only the combined amount that arrived in custody. The
//! engine's receipts give an estimate per source, but the estimates need
//! not add up to what actually arrived. The split below scales them to the
//! actual total.
//!
//! ```text
//! first  = actual * estimate_a / (estimate_a + estimate_b)
//! second = actual - first
//! ```
//!
//! A zero combined estimate attributes everything to the first source.

use primitive_types::U256;

use tally_types::Amount;

/// Split `actual` in proportion to `estimate_a : estimate_b`.
///
/// The two parts always sum to `actual`; the second part absorbs the
/// rounding remainder.
pub fn split_by_estimate(actual: Amount, estimate_a: Amount, estimate_b: Amount) -> (Amount, Amount) {
    let combined = U256::from(estimate_a) + U256::from(estimate_b);
    if combined.is_zero() {
        return (actual, 0);
    }
    // estimate_a <= combined, so the quotient is at most `actual`.
    let first = (U256::from(actual) * U256::from(estimate_a) / combined).low_u128();
    (first, actual - first)
}
