// PROBABILITY PRIMITIVES
// Stateless scoring functions for participant validation outcomes
//
// SAFETY INVARIANTS:
// 1. Pure functions: identical inputs → identical digits on every node
// 2. Out-of-domain probabilities are errors, never panics
// 3. Division by zero is guarded and yields a neutral zero score

use crate::fixed::{self, ensure_closed_unit, ensure_open_unit, MathError};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, One, RoundingMode, ToPrimitive, Zero};

/// Digits kept for consecutive-failure probabilities.
pub const PROBABILITY_PRECISION: i64 = 30;

/// Digits kept for z-scores.
pub const ZSCORE_PRECISION: i64 = 16;

/// Default rarity cut-off for the consecutive-failure tripwire (one in a million).
pub fn default_quick_failure_threshold() -> BigDecimal {
    BigDecimal::new(BigInt::one(), 6)
}

/// P(F^N | honest) = p^N: the chance an honest participant with failure rate `p`
/// produces `N` invalidations in a row.
pub fn consecutive_failure_probability(
    expected_failure_rate: &BigDecimal,
    consecutive_failures: u64,
) -> Result<BigDecimal, MathError> {
    ensure_closed_unit(expected_failure_rate, "expected_failure_rate")?;
    fixed::pow(expected_failure_rate, consecutive_failures, PROBABILITY_PRECISION)
}

/// Tripwire check: strictly below the cut-off means the streak is overwhelming evidence.
///
/// p^N is evaluated with at least `GUARD_DIGITS` places beyond the cut-off's own
/// scale, so a cut-off finer than `PROBABILITY_PRECISION` is never compared
/// against an underflowed zero.
pub fn is_consecutive_failure_rare(
    expected_failure_rate: &BigDecimal,
    consecutive_failures: u64,
    cutoff: &BigDecimal,
) -> Result<bool, MathError> {
    ensure_closed_unit(expected_failure_rate, "expected_failure_rate")?;
    let (_, cutoff_scale) = cutoff.as_bigint_and_exponent();
    let precision = PROBABILITY_PRECISION.max(cutoff_scale + fixed::GUARD_DIGITS);
    let probability = fixed::pow(expected_failure_rate, consecutive_failures, precision)?;
    Ok(probability < *cutoff)
}

/// One-sided z-score of the observed invalidation rate against `expected_failure_rate`.
///
/// Positive values mean the failure rate is HIGHER than expected. Returns zero when
/// there are no observations or the variance vanishes.
pub fn z_score(expected_failure_rate: &BigDecimal, valid: u64, invalid: u64) -> BigDecimal {
    let total = valid.saturating_add(invalid);
    if total == 0 {
        return BigDecimal::zero();
    }

    let working = ZSCORE_PRECISION + fixed::GUARD_DIGITS;
    let n = BigDecimal::from(total);
    let p = expected_failure_rate;

    let observed = fixed::div(&BigDecimal::from(invalid), &n, working);
    let variance = fixed::div(&(p * &(BigDecimal::one() - p)), &n, working);
    if variance <= BigDecimal::zero() {
        return BigDecimal::zero();
    }

    let std_dev = match fixed::sqrt(&variance, working) {
        Ok(std_dev) if !std_dev.is_zero() => std_dev,
        _ => return BigDecimal::zero(),
    };

    fixed::div(&(&observed - p), &std_dev, ZSCORE_PRECISION)
}

/// Number of measurements needed before a single failure stays within one standard
/// deviation of the expected distribution, capped at `max`.
///
/// From |1 - np| <= sqrt(np(1 - p)) → y² - 3y + 1 >= 0 with y = np → np >= (3 + √5) / 2.
pub fn measurements_needed(expected_failure_rate: &BigDecimal, max: u64) -> Result<u64, MathError> {
    ensure_open_unit(expected_failure_rate, "expected_failure_rate")?;

    let working = PROBABILITY_PRECISION;
    let root_five = fixed::sqrt(&BigDecimal::from(5), working)?;
    let required = fixed::div(&(&BigDecimal::from(3) + &root_five), &BigDecimal::from(2), working);
    let n = fixed::div(&required, expected_failure_rate, working);

    let needed = n
        .with_scale_round(0, RoundingMode::Ceiling)
        .to_u64()
        .unwrap_or(u64::MAX);
    Ok(needed.min(max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_consecutive_failure_boundary() {
        let cutoff = default_quick_failure_threshold();
        let p = dec("0.01");

        assert_eq!(consecutive_failure_probability(&p, 3).unwrap(), dec("0.000001"));
        assert!(!is_consecutive_failure_rare(&p, 3, &cutoff).unwrap());
        assert!(is_consecutive_failure_rare(&p, 4, &cutoff).unwrap());
    }

    #[test]
    fn test_cutoff_finer_than_probability_precision() {
        let cutoff = dec("1e-40");
        let p = dec("0.05");

        // 0.05^24 ~ 5.96e-32 underflows at 30 digits but is still far above 1e-40
        assert!(consecutive_failure_probability(&p, 24).unwrap().is_zero());
        assert!(!is_consecutive_failure_rare(&p, 24, &cutoff).unwrap());
        // 0.05^30 ~ 9.3e-40 stays above, 0.05^31 ~ 4.7e-41 drops below
        assert!(!is_consecutive_failure_rare(&p, 30, &cutoff).unwrap());
        assert!(is_consecutive_failure_rare(&p, 31, &cutoff).unwrap());
        assert!(is_consecutive_failure_rare(&dec("1.5"), 3, &cutoff).is_err());
    }

    #[test]
    fn test_consecutive_failure_rejects_bad_rate() {
        assert!(consecutive_failure_probability(&dec("1.5"), 1).is_err());
        assert!(consecutive_failure_probability(&dec("-0.1"), 1).is_err());
    }

    #[test]
    fn test_consecutive_failure_edges_of_unit_interval() {
        assert_eq!(consecutive_failure_probability(&BigDecimal::one(), 50).unwrap(), BigDecimal::one());
        assert!(consecutive_failure_probability(&BigDecimal::zero(), 1).unwrap().is_zero());
        assert_eq!(consecutive_failure_probability(&BigDecimal::zero(), 0).unwrap(), BigDecimal::one());
    }

    #[test]
    fn test_z_score_at_expected_rate_is_zero() {
        assert!(z_score(&dec("0.05"), 95, 5).is_zero());
    }

    #[test]
    fn test_z_score_symmetry() {
        let low = z_score(&dec("0.05"), 96, 4);
        let high = z_score(&dec("0.05"), 94, 6);
        assert_eq!(low, -high.clone());
        assert!(high > BigDecimal::zero());
        // 0.01 / sqrt(0.0475 / 100) = 0.458831...
        assert!((high - dec("0.458831")).abs() < dec("0.00001"));
    }

    #[test]
    fn test_z_score_no_observations() {
        assert!(z_score(&dec("0.05"), 0, 0).is_zero());
    }

    #[test]
    fn test_z_score_zero_variance() {
        assert!(z_score(&BigDecimal::zero(), 10, 3).is_zero());
        assert!(z_score(&BigDecimal::one(), 10, 3).is_zero());
        assert!(z_score(&dec("1.5"), 10, 3).is_zero());
    }

    #[test]
    fn test_measurements_needed() {
        assert_eq!(measurements_needed(&dec("0.05"), 100).unwrap(), 53);
        assert_eq!(measurements_needed(&dec("0.10"), 100).unwrap(), 27);
        assert_eq!(measurements_needed(&dec("0.01"), 300).unwrap(), 262);
        assert_eq!(measurements_needed(&dec("0.01"), 100).unwrap(), 100);
    }

    #[test]
    fn test_measurements_needed_rejects_degenerate_rates() {
        assert!(measurements_needed(&BigDecimal::zero(), 100).is_err());
        assert!(measurements_needed(&BigDecimal::one(), 100).is_err());
    }
}
