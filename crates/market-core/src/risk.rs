//! Risk profiles
//!
//! A risk profile is a fixed weighting over the four investment-score
//! components plus a neighborhood-stability filter applied by the optimizer.

use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance when checking that component weights sum to one
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Balanced => "balanced",
            RiskProfile::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskProfile {
    type Err = MarketError;

    /// Accepts the profile names plus the low/medium/high tolerance aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" | "low" => Ok(RiskProfile::Conservative),
            "balanced" | "medium" => Ok(RiskProfile::Balanced),
            "aggressive" | "high" => Ok(RiskProfile::Aggressive),
            other => Err(MarketError::config(format!("unknown risk profile '{other}'"))),
        }
    }
}

/// Weights over the investment-score components. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub yield_weight: f64,
    pub relative_price_weight: f64,
    pub size_weight: f64,
    pub location_weight: f64,
}

impl ScoreWeights {
    pub fn new(
        yield_weight: f64,
        relative_price_weight: f64,
        size_weight: f64,
        location_weight: f64,
    ) -> Self {
        Self {
            yield_weight,
            relative_price_weight,
            size_weight,
            location_weight,
        }
    }

    /// Component order: yield, relative price, size, location
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.yield_weight,
            self.relative_price_weight,
            self.size_weight,
            self.location_weight,
        ]
    }

    pub fn validate(&self) -> MarketResult<()> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(MarketError::config(format!(
                "score weights must be finite and non-negative: {weights:?}"
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(MarketError::config(format!(
                "score weights must sum to 1 (got {sum:.6})"
            )));
        }
        Ok(())
    }
}

/// Neighborhood eligibility rule applied before ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityFilter {
    /// Minimum sale + rental listings a neighborhood needs in this run
    #[serde(default)]
    pub min_listing_count: usize,
    /// Drop neighborhoods whose metrics are flagged low-confidence
    #[serde(default)]
    pub exclude_low_confidence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfileSettings {
    pub weights: ScoreWeights,
    #[serde(default)]
    pub stability: StabilityFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskProfiles {
    pub conservative: RiskProfileSettings,
    pub balanced: RiskProfileSettings,
    pub aggressive: RiskProfileSettings,
}

impl Default for RiskProfiles {
    fn default() -> Self {
        Self {
            // Favor discounted, established neighborhoods
            conservative: RiskProfileSettings {
                weights: ScoreWeights::new(0.25, 0.35, 0.20, 0.20),
                stability: StabilityFilter {
                    min_listing_count: 5,
                    exclude_low_confidence: true,
                },
            },
            balanced: RiskProfileSettings {
                weights: ScoreWeights::new(0.35, 0.30, 0.15, 0.20),
                stability: StabilityFilter {
                    min_listing_count: 2,
                    exclude_low_confidence: false,
                },
            },
            // Chase yield
            aggressive: RiskProfileSettings {
                weights: ScoreWeights::new(0.50, 0.30, 0.10, 0.10),
                stability: StabilityFilter::default(),
            },
        }
    }
}

impl RiskProfiles {
    pub fn settings(&self, profile: RiskProfile) -> &RiskProfileSettings {
        match profile {
            RiskProfile::Conservative => &self.conservative,
            RiskProfile::Balanced => &self.balanced,
            RiskProfile::Aggressive => &self.aggressive,
        }
    }

    pub fn validate(&self) -> MarketResult<()> {
        for profile in [RiskProfile::Conservative, RiskProfile::Balanced, RiskProfile::Aggressive] {
            self.settings(profile)
                .weights
                .validate()
                .map_err(|e| MarketError::config(format!("risk profile '{profile}': {e}")))?;
        }
        Ok(())
    }
}
