// GOVERNANCE PARAMETER SNAPSHOT
// Read-only validation parameters for the current block height
//
// SAFETY INVARIANTS:
// 1. Parameters are passed explicitly into every evaluation (no global state)
// 2. Unset values are modelled as None, never as a silent zero
// 3. Bounds validation is advisory: evaluation tolerates out-of-range values
// 4. Decimals are (de)serialized as strings so no float ever touches them

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, One, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Parameter {name} = {value} outside {bounds}")]
    ValueOutOfBounds {
        name: &'static str,
        value: String,
        bounds: DecimalBounds,
    },

    #[error("Failed to decode parameter snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Domain a decimal parameter must lie in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalBounds {
    /// Strictly inside (0, 1)
    OpenUnit,
    /// Inside [0, 1]
    ClosedUnit,
    /// Strictly greater than zero
    Positive,
}

impl DecimalBounds {
    pub fn contains(&self, value: &BigDecimal) -> bool {
        match self {
            DecimalBounds::OpenUnit => *value > BigDecimal::zero() && *value < BigDecimal::one(),
            DecimalBounds::ClosedUnit => *value >= BigDecimal::zero() && *value <= BigDecimal::one(),
            DecimalBounds::Positive => *value > BigDecimal::zero(),
        }
    }
}

impl std::fmt::Display for DecimalBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecimalBounds::OpenUnit => write!(f, "(0, 1)"),
            DecimalBounds::ClosedUnit => write!(f, "[0, 1]"),
            DecimalBounds::Positive => write!(f, "(0, inf)"),
        }
    }
}

/// Statistical validation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationParams {
    /// Expected invalidation rate of an honest participant (`p`, SPRT `p0`)
    pub false_positive_rate: Option<BigDecimal>,

    /// Rarity cut-off for the consecutive-failure tripwire
    pub quick_failure_threshold: Option<BigDecimal>,

    /// Invalidation rate that marks a participant as bad (SPRT `p1`)
    pub bad_participant_invalidation_rate: Option<BigDecimal>,

    /// Decision threshold `H` of the invalidation SPRT
    pub invalidation_h_threshold: Option<BigDecimal>,

    /// Acceptable miss rate (downtime SPRT `p0`)
    pub downtime_good_percentage: Option<BigDecimal>,

    /// Miss rate that marks a participant as down (downtime SPRT `p1`)
    pub downtime_bad_percentage: Option<BigDecimal>,

    /// Decision threshold `H` of the downtime SPRT
    pub downtime_h_threshold: Option<BigDecimal>,

    /// Upper bound on the ramp-up sample size
    #[serde(default)]
    pub min_ramp_up_measurements: u64,

    /// Fraction of completed epochs kept after an invalidation
    pub invalid_reputation_preserve: Option<BigDecimal>,
}

impl Default for ValidationParams {
    fn default() -> Self {
        ValidationParams {
            false_positive_rate: Some(hundredths(5)),
            quick_failure_threshold: Some(BigDecimal::new(BigInt::one(), 6)),
            bad_participant_invalidation_rate: Some(hundredths(10)),
            invalidation_h_threshold: Some(BigDecimal::from(4)),
            downtime_good_percentage: Some(hundredths(10)),
            downtime_bad_percentage: Some(hundredths(20)),
            downtime_h_threshold: Some(BigDecimal::from(4)),
            min_ramp_up_measurements: 10,
            invalid_reputation_preserve: Some(hundredths(50)),
        }
    }
}

impl ValidationParams {
    /// Snapshot with every decimal unset (bootstrap state before governance writes).
    pub fn unset() -> Self {
        ValidationParams {
            false_positive_rate: None,
            quick_failure_threshold: None,
            bad_participant_invalidation_rate: None,
            invalidation_h_threshold: None,
            downtime_good_percentage: None,
            downtime_bad_percentage: None,
            downtime_h_threshold: None,
            min_ramp_up_measurements: 0,
            invalid_reputation_preserve: None,
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        use DecimalBounds::*;

        check("false_positive_rate", &self.false_positive_rate, OpenUnit)?;
        check("quick_failure_threshold", &self.quick_failure_threshold, OpenUnit)?;
        check(
            "bad_participant_invalidation_rate",
            &self.bad_participant_invalidation_rate,
            OpenUnit,
        )?;
        check("invalidation_h_threshold", &self.invalidation_h_threshold, Positive)?;
        check("downtime_good_percentage", &self.downtime_good_percentage, OpenUnit)?;
        check("downtime_bad_percentage", &self.downtime_bad_percentage, OpenUnit)?;
        check("downtime_h_threshold", &self.downtime_h_threshold, Positive)?;
        check("invalid_reputation_preserve", &self.invalid_reputation_preserve, ClosedUnit)?;
        Ok(())
    }
}

/// Confirmation proof-of-compute parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationPoCParams {
    /// Minimum confirmed/claimed weight ratio; None or zero disables the check
    pub alpha_threshold: Option<BigDecimal>,
}

impl Default for ConfirmationPoCParams {
    fn default() -> Self {
        ConfirmationPoCParams {
            alpha_threshold: Some(hundredths(70)),
        }
    }
}

/// Collateral parameters consulted on invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralParams {
    /// Fraction of locked collateral slashed when a participant becomes INVALID
    pub slash_fraction_invalid: Option<BigDecimal>,
}

impl Default for CollateralParams {
    fn default() -> Self {
        CollateralParams {
            slash_fraction_invalid: Some(hundredths(20)),
        }
    }
}

/// Full parameter snapshot handed to the transition controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleParams {
    pub validation: ValidationParams,
    pub confirmation_poc: ConfirmationPoCParams,
    pub collateral: CollateralParams,
}

impl ModuleParams {
    /// Decode a JSON snapshot. Missing sections fall back to genesis defaults;
    /// missing values inside a present section stay unset.
    pub fn from_json_str(json: &str) -> Result<Self, ParamsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        self.validation.validate()?;
        check(
            "alpha_threshold",
            &self.confirmation_poc.alpha_threshold,
            DecimalBounds::ClosedUnit,
        )?;
        check(
            "slash_fraction_invalid",
            &self.collateral.slash_fraction_invalid,
            DecimalBounds::ClosedUnit,
        )?;
        Ok(())
    }
}

fn hundredths(value: i64) -> BigDecimal {
    BigDecimal::new(BigInt::from(value), 2)
}

fn check(
    name: &'static str,
    value: &Option<BigDecimal>,
    bounds: DecimalBounds,
) -> Result<(), ParamsError> {
    match value {
        Some(value) if !bounds.contains(value) => Err(ParamsError::ValueOutOfBounds {
            name,
            value: value.to_string(),
            bounds,
        }),
        _ => Ok(()),
    }
}
