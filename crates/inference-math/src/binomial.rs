// BINOMIAL TAIL TEST
// One-sided "greater" binomial test for miss rates
//
// SAFETY INVARIANTS:
// 1. No factorials: terms follow the multiplicative recurrence between neighbours
// 2. Terms carry a fixed number of significant digits, so tiny probabilities keep their digits
// 3. Only the short side of the distribution is summed; the result is clamped to [0, 1]
// 4. Invalid counts or probabilities are errors, never panics

use crate::fixed::{self, ensure_open_unit, MathError};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, One, Zero};

/// Digits kept for p-values.
pub const PVALUE_PRECISION: i64 = 16;

/// Default significance level for `missed_stat_test` (5%).
pub fn default_significance() -> BigDecimal {
    BigDecimal::new(BigInt::from(5), 2)
}

/// P(X >= k) where X ~ Binomial(n, p0), rounded to `precision` digits.
///
/// Above the mean the upper tail is summed from P(X = k) upwards with
/// P(X = i+1) = P(X = i) * (n - i) / (i + 1) * p0 / (1 - p0).
/// At or below the mean the lower tail P(X <= k - 1) is summed downwards with
/// the inverse step and the complement is returned. Either way every summed term
/// is no larger than the first one.
pub fn binomial_p_value(k: u64, n: u64, p0: &BigDecimal, precision: i64) -> Result<BigDecimal, MathError> {
    if k > n {
        return Err(MathError::InvalidCounts { k, n });
    }
    ensure_open_unit(p0, "p0")?;

    if k == 0 {
        return Ok(BigDecimal::one());
    }

    let working = precision + fixed::GUARD_DIGITS;
    let q0 = BigDecimal::one() - p0;

    let upper = BigDecimal::from(k) > BigDecimal::from(n) * p0;
    let tail = if upper {
        upper_tail(k, n, p0, &q0, working)
    } else {
        BigDecimal::one() - lower_tail(k - 1, n, p0, &q0, working)
    };

    Ok(fixed::round(&clamp_unit(tail), precision))
}

/// P(X >= k), summed upwards from k. Terms carry `working` significant digits,
/// the running sum `working` decimal places.
fn upper_tail(k: u64, n: u64, p: &BigDecimal, q: &BigDecimal, working: i64) -> BigDecimal {
    let ratio = fixed::div_significant(p, q, working);
    let mut term = binomial_pmf(k, n, p, q, working);
    let mut sum = fixed::round(&term, working);
    for i in k..n {
        let factor = fixed::div_significant(&BigDecimal::from(n - i), &BigDecimal::from(i + 1), working);
        term = fixed::round_significant(&(&(&term * &factor) * &ratio), working);
        sum = fixed::round(&(&sum + &term), working);
    }
    sum
}

/// P(X <= j), summed downwards from j.
fn lower_tail(j: u64, n: u64, p: &BigDecimal, q: &BigDecimal, working: i64) -> BigDecimal {
    let ratio = fixed::div_significant(q, p, working);
    let mut term = binomial_pmf(j, n, p, q, working);
    let mut sum = fixed::round(&term, working);
    for i in (1..=j).rev() {
        let factor = fixed::div_significant(&BigDecimal::from(i), &BigDecimal::from(n - i + 1), working);
        term = fixed::round_significant(&(&(&term * &factor) * &ratio), working);
        sum = fixed::round(&(&sum + &term), working);
    }
    sum
}

/// P(X = k) = C(n, k) * p^k * q^(n-k), to `digits` significant digits.
fn binomial_pmf(k: u64, n: u64, p: &BigDecimal, q: &BigDecimal, digits: i64) -> BigDecimal {
    // C(n, k) = C(n, n - k); each partial product is itself a binomial coefficient,
    // so the integer division is exact.
    let steps = k.min(n - k);
    let mut coefficient = BigInt::one();
    for i in 0..steps {
        coefficient = coefficient * BigInt::from(n - i) / BigInt::from(i + 1);
    }

    let powers = fixed::pow_significant(p, k, digits) * fixed::pow_significant(q, n - k, digits);
    fixed::round_significant(&(BigDecimal::from(coefficient) * powers), digits)
}

fn clamp_unit(value: BigDecimal) -> BigDecimal {
    if value < BigDecimal::zero() {
        BigDecimal::zero()
    } else if value > BigDecimal::one() {
        BigDecimal::one()
    } else {
        value
    }
}

/// One-sided test of H0: true miss rate <= p0 against Ha: true miss rate > p0.
///
/// Returns true when H0 survives (p-value >= 5%), trivially so with no requests.
pub fn missed_stat_test(n_missed: u64, n_total: u64, p0: &BigDecimal) -> Result<bool, MathError> {
    missed_stat_test_at(n_missed, n_total, p0, &default_significance())
}

/// `missed_stat_test` with an explicit significance level.
pub fn missed_stat_test_at(
    n_missed: u64,
    n_total: u64,
    p0: &BigDecimal,
    significance: &BigDecimal,
) -> Result<bool, MathError> {
    if n_total == 0 {
        return Ok(true);
    }
    if n_missed > n_total {
        return Err(MathError::InvalidCounts { k: n_missed, n: n_total });
    }

    let p_value = binomial_p_value(n_missed, n_total, p0, PVALUE_PRECISION)?;
    Ok(p_value >= *significance)
}
