// SEQUENTIAL PROBABILITY RATIO TEST
// Wald's SPRT with O(1) persisted state (a single cumulative log-likelihood ratio)
//
// SAFETY INVARIANTS:
// 1. Construction validates 0 < p0 < p1 < 1 and H > 0, returning a typed error otherwise
// 2. The log ratios come from the deterministic fixed-point logarithm
// 3. The LLR is rounded to the configured precision after every update
// 4. update_counts is NOT idempotent: each batch of observations must be applied once

use crate::fixed::{self, MathError};
use bigdecimal::{BigDecimal, One, Zero};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Digits kept for log ratios and the running LLR.
///
/// Low precision keeps compute low; the thresholds are O(1) so 12 digits is plenty.
pub const LOG_PRECISION: i64 = 12;

/// Verdict of the sequential test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Not enough evidence either way
    Continue,
    /// LLR <= -H: evidence favours H0 (the "good" rate)
    Pass,
    /// LLR >= H: H0 rejected, behaviour looks "bad"
    Fail,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SprtError {
    #[error("{name} must be in (0, 1), got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: String },
    #[error("bad rate p1 ({p1}) must exceed good rate p0 ({p0})")]
    InvertedHypotheses { p0: String, p1: String },
    #[error("threshold H must be positive, got {0}")]
    NonPositiveThreshold(String),
    #[error("log ratio failed: {0}")]
    Logarithm(#[from] MathError),
}

/// Evidence accumulator testing H0: rate = p0 against H1: rate = p1.
#[derive(Debug, Clone, PartialEq)]
pub struct SequentialProbabilityRatioTest {
    p0: BigDecimal,
    p1: BigDecimal,
    threshold: BigDecimal,
    llr: BigDecimal,
    /// ln(p1 / p0), added per failure
    log_fail: BigDecimal,
    /// ln((1 - p1) / (1 - p0)), added per pass
    log_pass: BigDecimal,
    precision: i64,
}

impl SequentialProbabilityRatioTest {
    /// Build a test from governance rates and the LLR persisted by the previous evaluation.
    pub fn new(
        p0: BigDecimal,
        p1: BigDecimal,
        threshold: BigDecimal,
        prior_llr: BigDecimal,
        precision: i64,
    ) -> Result<Self, SprtError> {
        ensure_probability(&p0, "p0")?;
        ensure_probability(&p1, "p1")?;
        if p1 <= p0 {
            return Err(SprtError::InvertedHypotheses {
                p0: p0.to_string(),
                p1: p1.to_string(),
            });
        }
        if threshold <= BigDecimal::zero() {
            return Err(SprtError::NonPositiveThreshold(threshold.to_string()));
        }

        let working = precision + fixed::GUARD_DIGITS;
        let one = BigDecimal::one();

        let fail_ratio = fixed::div(&p1, &p0, working);
        let log_fail = fixed::ln(&fail_ratio, precision)?;

        let pass_ratio = fixed::div(&(&one - &p1), &(&one - &p0), working);
        let log_pass = fixed::ln(&pass_ratio, precision)?;

        Ok(SequentialProbabilityRatioTest {
            p0,
            p1,
            threshold,
            llr: prior_llr,
            log_fail,
            log_pass,
            precision,
        })
    }

    /// Apply a batch: `failures` and `passes` observed since the last call.
    ///
    /// LLR += failures * ln(p1/p0) + passes * ln((1-p1)/(1-p0)).
    /// Negative deltas (counters reset under a stale snapshot) carry no evidence.
    pub fn update_counts(&mut self, failures: i64, passes: i64) {
        let failures = failures.max(0);
        let passes = passes.max(0);
        if failures == 0 && passes == 0 {
            return;
        }

        let mut llr = self.llr.clone();
        if failures != 0 {
            llr = &llr + &(&self.log_fail * &BigDecimal::from(failures));
        }
        if passes != 0 {
            llr = &llr + &(&self.log_pass * &BigDecimal::from(passes));
        }
        self.llr = fixed::round(&llr, self.precision);

        debug!(
            "SPRT update: failures={} passes={} llr={}",
            failures, passes, self.llr
        );
    }

    /// Apply a single observation.
    pub fn update_one(&mut self, measurement_failed: bool) {
        if measurement_failed {
            self.update_counts(1, 0);
        } else {
            self.update_counts(0, 1);
        }
    }

    /// Symmetric thresholds ±H.
    pub fn decision(&self) -> Decision {
        if self.llr >= self.threshold {
            return Decision::Fail;
        }
        if self.llr <= -self.threshold.clone() {
            return Decision::Pass;
        }
        Decision::Continue
    }

    pub fn llr(&self) -> &BigDecimal {
        &self.llr
    }

    /// Consume the test, returning the LLR to persist.
    pub fn into_llr(self) -> BigDecimal {
        self.llr
    }

    pub fn log_fail(&self) -> &BigDecimal {
        &self.log_fail
    }

    pub fn log_pass(&self) -> &BigDecimal {
        &self.log_pass
    }

    pub fn threshold(&self) -> &BigDecimal {
        &self.threshold
    }

    pub fn rates(&self) -> (&BigDecimal, &BigDecimal) {
        (&self.p0, &self.p1)
    }
}

fn ensure_probability(value: &BigDecimal, name: &'static str) -> Result<(), SprtError> {
    if *value <= BigDecimal::zero() || *value >= BigDecimal::one() {
        return Err(SprtError::ProbabilityOutOfRange {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}
