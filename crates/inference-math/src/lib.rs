//! PARTICIPANT VALIDATION MATH
//!
//! Deterministic statistics used to judge compute-network participants:
//! - Fixed-point exponentiation, logarithm and square root (no floating point)
//! - Consecutive-failure tripwire, z-score and ramp-up sample size
//! - One-sided binomial tail test
//! - Wald's sequential probability ratio test with O(1) state
//!
//! Every validating node must compute identical digits from identical inputs,
//! so nothing in this crate touches f64, clocks or randomness.

pub mod fixed;
pub mod probability;
pub mod binomial;
pub mod sprt;

pub use fixed::{ln, pow, round, sqrt, MathError, GUARD_DIGITS};

pub use probability::{
    consecutive_failure_probability, default_quick_failure_threshold,
    is_consecutive_failure_rare, measurements_needed, z_score, PROBABILITY_PRECISION,
    ZSCORE_PRECISION,
};

pub use binomial::{
    binomial_p_value, default_significance, missed_stat_test, missed_stat_test_at,
    PVALUE_PRECISION,
};

pub use sprt::{Decision, SequentialProbabilityRatioTest, SprtError, LOG_PRECISION};

// Decimal type shared by every public signature.
pub use bigdecimal::BigDecimal;
