// DETERMINISTIC FIXED-POINT KERNEL
// Exponentiation, natural logarithm and square root over arbitrary-precision decimals
//
// SAFETY INVARIANTS:
// 1. No floating point: every value is an integer-backed BigDecimal
// 2. Every intermediate is rounded to an explicit scale or significant-digit count (no hidden precision)
// 3. Series and iterations have fixed stopping rules (same input → same digits on every node)
// 4. Domain violations are returned as MathError, never panicked
//
// Algorithm version 1. Changing any stopping rule, guard width or rounding mode
// changes consensus output and requires a coordinated upgrade.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, One, RoundingMode, Zero};
use thiserror::Error;

/// Extra digits carried by every intermediate before the final rounding.
pub const GUARD_DIGITS: i64 = 10;

/// Hard cap on Newton iterations for `sqrt`.
const MAX_SQRT_ITERATIONS: usize = 512;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("{name} = {value} is outside {domain}")]
    ProbabilityOutOfRange {
        name: &'static str,
        value: String,
        domain: &'static str,
    },
    #[error("invalid counts: requires k <= n (k = {k}, n = {n})")]
    InvalidCounts { k: u64, n: u64 },
    #[error("logarithm undefined for non-positive argument {0}")]
    NonPositiveLogarithm(String),
    #[error("square root undefined for negative argument {0}")]
    NegativeSquareRoot(String),
}

/// Round to `scale` digits after the decimal point, ties away from zero.
pub fn round(value: &BigDecimal, scale: i64) -> BigDecimal {
    value.with_scale_round(scale, RoundingMode::HalfUp)
}

/// Divide and round. Callers must rule out a zero denominator.
pub(crate) fn div(numerator: &BigDecimal, denominator: &BigDecimal, scale: i64) -> BigDecimal {
    round(&(numerator / denominator), scale)
}

/// 0.5, exact.
pub(crate) fn half() -> BigDecimal {
    BigDecimal::new(BigInt::from(5), 1)
}

/// 10^-scale, the smallest positive value representable at `scale`.
pub(crate) fn unit_in_last_place(scale: i64) -> BigDecimal {
    BigDecimal::new(BigInt::one(), scale)
}

/// Require `value` in the closed interval [0, 1].
pub fn ensure_closed_unit(value: &BigDecimal, name: &'static str) -> Result<(), MathError> {
    if *value < BigDecimal::zero() || *value > BigDecimal::one() {
        return Err(MathError::ProbabilityOutOfRange {
            name,
            value: value.to_string(),
            domain: "[0, 1]",
        });
    }
    Ok(())
}

/// Require `value` in the open interval (0, 1).
pub fn ensure_open_unit(value: &BigDecimal, name: &'static str) -> Result<(), MathError> {
    if *value <= BigDecimal::zero() || *value >= BigDecimal::one() {
        return Err(MathError::ProbabilityOutOfRange {
            name,
            value: value.to_string(),
            domain: "(0, 1)",
        });
    }
    Ok(())
}

/// `base^exponent` by squaring, rounded to `precision` digits. `base` must lie in [0, 1].
///
/// Each product is rounded to `precision + GUARD_DIGITS` to bound digit growth;
/// the guard digits keep the rounded result monotone in `exponent` for bases in [0, 1].
pub fn pow(base: &BigDecimal, exponent: u64, precision: i64) -> Result<BigDecimal, MathError> {
    ensure_closed_unit(base, "base")?;
    Ok(round(&pow_at_scale(base, exponent, precision + GUARD_DIGITS), precision))
}

/// Exponentiation by squaring with every product rounded to `scale`.
pub(crate) fn pow_at_scale(base: &BigDecimal, exponent: u64, scale: i64) -> BigDecimal {
    let mut result = BigDecimal::one();
    let mut square = base.clone();
    let mut remaining = exponent;

    while remaining > 0 {
        if remaining & 1 == 1 {
            result = round(&(&result * &square), scale);
        }
        remaining >>= 1;
        if remaining > 0 {
            square = round(&(&square * &square), scale);
        }
    }

    result
}

/// Round to `digits` significant digits, ties away from zero.
///
/// Values that already fit are returned unchanged; zero stays zero.
pub(crate) fn round_significant(value: &BigDecimal, digits: i64) -> BigDecimal {
    if value.is_zero() {
        return BigDecimal::zero();
    }
    let (mantissa, scale) = value.as_bigint_and_exponent();
    let length = mantissa.magnitude().to_string().len() as i64;
    let target = scale - length + digits;
    if target >= scale {
        value.clone()
    } else {
        round(value, target)
    }
}

/// Divide and round to `digits` significant digits. Callers must rule out a zero denominator.
pub(crate) fn div_significant(numerator: &BigDecimal, denominator: &BigDecimal, digits: i64) -> BigDecimal {
    round_significant(&(numerator / denominator), digits)
}

/// Exponentiation by squaring with every product rounded to `digits` significant digits.
///
/// Tiny powers keep their leading digits instead of flushing to zero.
pub(crate) fn pow_significant(base: &BigDecimal, exponent: u64, digits: i64) -> BigDecimal {
    let mut result = BigDecimal::one();
    let mut square = base.clone();
    let mut remaining = exponent;

    while remaining > 0 {
        if remaining & 1 == 1 {
            result = round_significant(&(&result * &square), digits);
        }
        remaining >>= 1;
        if remaining > 0 {
            square = round_significant(&(&square * &square), digits);
        }
    }

    result
}

/// Natural logarithm rounded to `precision` digits.
///
/// Range reduction `x = m * 2^k` with `m` in [0.5, 2), then
/// `ln(m) = 2 * atanh(t)` with `t = (m - 1) / (m + 1)`, so `|t| <= 1/3`.
/// `ln 2` comes from the same series, so no constant table is involved.
pub fn ln(x: &BigDecimal, precision: i64) -> Result<BigDecimal, MathError> {
    if *x <= BigDecimal::zero() {
        return Err(MathError::NonPositiveLogarithm(x.to_string()));
    }
    if x.is_one() {
        return Ok(round(&BigDecimal::zero(), precision));
    }

    let working = precision + GUARD_DIGITS;
    let two = BigDecimal::from(2);
    let half = half();

    // Halving and doubling are exact, no rounding needed here.
    let mut mantissa = x.clone();
    let mut binary_exponent: i64 = 0;
    while mantissa >= two {
        mantissa = &mantissa * &half;
        binary_exponent += 1;
    }
    while mantissa < half {
        mantissa = &mantissa * &two;
        binary_exponent -= 1;
    }

    let mut result = ln_reduced(&mantissa, working);
    if binary_exponent != 0 {
        let ln_two = ln_reduced(&two, working);
        result = &result + &(&ln_two * &BigDecimal::from(binary_exponent));
    }

    Ok(round(&result, precision))
}

/// `2 * atanh((m - 1) / (m + 1))` for `m` in [0.5, 2], summed at `scale`.
fn ln_reduced(mantissa: &BigDecimal, scale: i64) -> BigDecimal {
    let one = BigDecimal::one();
    let t = div(&(mantissa - &one), &(mantissa + &one), scale);
    let t_squared = round(&(&t * &t), scale);
    let epsilon = unit_in_last_place(scale);

    let mut power = t.clone();
    let mut sum = t;
    let mut denominator: u64 = 1;
    loop {
        power = round(&(&power * &t_squared), scale);
        denominator += 2;
        let term = div(&power, &BigDecimal::from(denominator), scale);
        // Terms shrink by at least 1/9 each step, so this always terminates.
        if term.abs() < epsilon {
            break;
        }
        sum = &sum + &term;
    }

    round(&(&sum * &BigDecimal::from(2)), scale)
}

/// Square root rounded to `precision` digits.
///
/// Newton's iteration seeded from above with `max(x, 1)`; the iterates decrease
/// monotonically until rounding stalls them, which is the stopping rule.
pub fn sqrt(x: &BigDecimal, precision: i64) -> Result<BigDecimal, MathError> {
    if *x < BigDecimal::zero() {
        return Err(MathError::NegativeSquareRoot(x.to_string()));
    }
    if x.is_zero() {
        return Ok(round(&BigDecimal::zero(), precision));
    }

    let working = precision + GUARD_DIGITS;
    let half = half();
    let mut current = if *x > BigDecimal::one() {
        x.clone()
    } else {
        BigDecimal::one()
    };

    for _ in 0..MAX_SQRT_ITERATIONS {
        let next = round(&(&(&current + &div(x, &current, working)) * &half), working);
        if next >= current {
            break;
        }
        current = next;
    }

    Ok(round(&current, precision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_pow_exact_small_values() {
        assert_eq!(pow(&dec("0.01"), 3, 30).unwrap(), dec("0.000001"));
        assert_eq!(pow(&dec("0.01"), 4, 30).unwrap(), dec("0.00000001"));
        assert_eq!(pow(&dec("0.5"), 10, 30).unwrap(), dec("0.0009765625"));
    }

    #[test]
    fn test_pow_zero_exponent_is_one() {
        assert_eq!(pow(&dec("0.37"), 0, 12).unwrap(), BigDecimal::one());
        assert_eq!(pow(&BigDecimal::zero(), 0, 12).unwrap(), BigDecimal::one());
    }

    #[test]
    fn test_pow_underflows_to_zero_at_precision() {
        // 0.05^20 ~ 9.5e-27, below 12 digits
        assert!(pow(&dec("0.05"), 20, 12).unwrap().is_zero());
        assert!(!pow(&dec("0.05"), 20, 30).unwrap().is_zero());
    }

    #[test]
    fn test_pow_rejects_base_outside_unit_interval() {
        assert!(matches!(
            pow(&dec("1.01"), 3, 30),
            Err(MathError::ProbabilityOutOfRange { name: "base", .. })
        ));
        assert!(pow(&dec("-0.5"), 2, 30).is_err());
        assert_eq!(pow(&BigDecimal::one(), 1_000, 30).unwrap(), BigDecimal::one());
    }

    #[test]
    fn test_round_significant_keeps_leading_digits() {
        assert_eq!(round_significant(&dec("1.2345678e-35"), 4), dec("1.235e-35"));
        assert_eq!(round_significant(&dec("987.65"), 3), dec("988"));
        assert_eq!(round_significant(&dec("0.25"), 26), dec("0.25"));
        assert!(round_significant(&BigDecimal::zero(), 4).is_zero());
    }

    #[test]
    fn test_pow_significant_does_not_flush_to_zero() {
        // 0.05^40 = 9.094947017729282379150390625e-53
        let power = pow_significant(&dec("0.05"), 40, 12);
        assert_eq!(power, dec("9.09494701773e-53"));
        assert!(pow_at_scale(&dec("0.05"), 40, 26).is_zero());
    }

    #[test]
    fn test_ln_of_one_is_zero() {
        assert!(ln(&BigDecimal::one(), 12).unwrap().is_zero());
    }

    #[test]
    fn test_ln_two() {
        assert_eq!(ln(&dec("2"), 12).unwrap(), dec("0.693147180560"));
    }

    #[test]
    fn test_ln_half_is_negative_ln_two() {
        assert_eq!(ln(&dec("0.5"), 12).unwrap(), dec("-0.693147180560"));
    }

    #[test]
    fn test_ln_ten() {
        assert_eq!(ln(&dec("10"), 12).unwrap(), dec("2.302585092994"));
    }

    #[test]
    fn test_ln_ratio_near_one() {
        // ln(0.9 / 0.95) = -0.054067221270...
        let ratio = div(&dec("0.9"), &dec("0.95"), 40);
        assert_eq!(ln(&ratio, 12).unwrap(), dec("-0.054067221270"));
    }

    #[test]
    fn test_ln_rejects_non_positive() {
        assert!(matches!(
            ln(&BigDecimal::zero(), 12),
            Err(MathError::NonPositiveLogarithm(_))
        ));
        assert!(ln(&dec("-1"), 12).is_err());
    }

    #[test]
    fn test_sqrt_values() {
        assert_eq!(sqrt(&dec("4"), 12).unwrap(), dec("2"));
        assert_eq!(sqrt(&dec("5"), 12).unwrap(), dec("2.236067977500"));
        assert_eq!(sqrt(&dec("0.000475"), 12).unwrap(), dec("0.021794494718"));
    }

    #[test]
    fn test_sqrt_domain() {
        assert!(sqrt(&BigDecimal::zero(), 12).unwrap().is_zero());
        assert!(matches!(
            sqrt(&dec("-0.1"), 12),
            Err(MathError::NegativeSquareRoot(_))
        ));
    }

    #[test]
    fn test_unit_interval_guards() {
        assert!(ensure_closed_unit(&BigDecimal::zero(), "p").is_ok());
        assert!(ensure_closed_unit(&BigDecimal::one(), "p").is_ok());
        assert!(ensure_closed_unit(&dec("1.5"), "p").is_err());
        assert!(ensure_open_unit(&BigDecimal::zero(), "p").is_err());
        assert!(ensure_open_unit(&BigDecimal::one(), "p").is_err());
        assert!(ensure_open_unit(&dec("0.5"), "p").is_ok());
    }

    #[test]
    fn test_round_ties_away_from_zero() {
        assert_eq!(round(&dec("2.5"), 0), dec("3"));
        assert_eq!(round(&dec("-2.5"), 0), dec("-3"));
        assert_eq!(round(&dec("0.0000000000000976"), 15), dec("0.000000000000098"));
    }
}
