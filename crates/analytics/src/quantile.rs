//! Exact summary statistics over monetary amounts.
//!
//! Quantiles use continuous linear interpolation between the closest ranks
//! (the `PERCENTILE_CONT` definition): for `n` sorted values the target rank is
//! `q * (n - 1)`, and a fractional rank interpolates between its neighbours.

use core_types::Aggregate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// The 50th percentile.
pub const MEDIAN: Decimal = Decimal::from_parts(5, 0, 0, false, 1);
/// The 90th percentile.
pub const P90: Decimal = Decimal::from_parts(9, 0, 0, false, 1);

/// Continuous quantile `q` (clamped to `[0, 1]`) of an ascending slice.
///
/// Returns zero for an empty slice.
pub fn continuous(sorted: &[Decimal], q: Decimal) -> Decimal {
    let Some(last) = sorted.len().checked_sub(1) else {
        return Decimal::ZERO;
    };
    let q = q.clamp(Decimal::ZERO, Decimal::ONE);

    let rank = q * Decimal::from(last);
    let lower_rank = rank.floor();
    let fraction = rank - lower_rank;
    let lower = lower_rank.to_usize().unwrap_or(last).min(last);

    let low = sorted[lower];
    match sorted.get(lower + 1) {
        Some(&high) if !fraction.is_zero() => low + (high - low) * fraction,
        _ => low,
    }
}

/// Sum, mean, count, median and 90th percentile of `amounts`, in any order.
pub fn aggregate(mut amounts: Vec<Decimal>) -> Aggregate {
    if amounts.is_empty() {
        return Aggregate::empty();
    }
    amounts.sort_unstable();

    let sum: Decimal = amounts.iter().sum();
    let count = amounts.len();

    Aggregate {
        sum,
        avg: sum / Decimal::from(count),
        count: count as i64,
        median: continuous(&amounts, MEDIAN),
        percent90: continuous(&amounts, P90),
    }
}
