//! Pipeline configuration
//!
//! Loaded once at startup from an optional JSON file plus environment
//! overrides, then validated. Nothing downstream mutates it.

use crate::error::{MarketError, MarketResult};
use crate::risk::RiskProfiles;
use crate::types::{normalize_neighborhood, ListingType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// How neighborhood yields are mapped onto [0, 1] for scoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldNormalization {
    MinMax,
    #[default]
    Percentile,
}

impl FromStr for YieldNormalization {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min_max" | "minmax" => Ok(YieldNormalization::MinMax),
            "percentile" => Ok(YieldNormalization::Percentile),
            other => Err(MarketError::config(format!("unknown yield normalization '{other}'"))),
        }
    }
}

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, name: &str) -> MarketResult<()> {
        let finite = self.min.is_finite() && self.max.is_finite();
        if !finite || self.min < 0.0 || self.min > self.max {
            return Err(MarketError::config(format!(
                "{name} range must satisfy 0 <= min <= max (got {}..{})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Optional plausibility bounds. All disabled by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub sale_price_range: Option<ValueRange>,
    pub rental_price_range: Option<ValueRange>,
    pub area_range: Option<ValueRange>,
}

impl NormalizerConfig {
    pub fn price_range(&self, listing_type: ListingType) -> Option<ValueRange> {
        match listing_type {
            ListingType::Sale => self.sale_price_range,
            ListingType::Rental => self.rental_price_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Usable records required before a model is fitted
    pub min_training_samples: usize,
    /// Fraction of usable records held out for validation
    pub validation_ratio: f64,
    /// L2 penalty on standardized coefficients
    pub ridge_lambda: f64,
    /// Further penalties tried alongside `ridge_lambda`; the fit with the
    /// lowest validation MAPE is kept
    pub candidate_lambdas: Vec<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_training_samples: 10,
            validation_ratio: 0.2,
            ridge_lambda: 1e-3,
            candidate_lambdas: vec![0.0, 1e-2, 1e-1, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub yield_normalization: YieldNormalization,
    /// Discount below predicted price that earns the full relative-price score
    pub max_discount: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            yield_normalization: YieldNormalization::Percentile,
            max_discount: 0.30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub min_samples_per_neighborhood: usize,
    pub risk_profiles: RiskProfiles,
    /// Neighborhood -> desirability in [0, 1]
    pub location_desirability: BTreeMap<String, f64>,
    pub budget_max: f64,
    pub budget_min: Option<f64>,
    pub max_results: usize,
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
    pub normalizer: NormalizerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_samples_per_neighborhood: 3,
            risk_profiles: RiskProfiles::default(),
            location_desirability: BTreeMap::new(),
            budget_max: 300_000.0,
            budget_min: None,
            max_results: 10,
            model: ModelConfig::default(),
            scoring: ScoringConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document. Missing keys fall back to defaults.
    pub fn from_json_str(json: &str) -> MarketResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MarketError::config(format!("invalid config JSON: {e}")))?;
        Ok(config.with_canonical_keys())
    }

    pub fn from_json_file(path: &Path) -> MarketResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MarketError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> MarketResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> MarketResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, "MIN_SAMPLES_PER_NEIGHBORHOOD")? {
            self.min_samples_per_neighborhood = v;
        }
        if let Some(v) = parse_override(&lookup, "BUDGET_MAX")? {
            self.budget_max = v;
        }
        if let Some(v) = parse_override(&lookup, "BUDGET_MIN")? {
            self.budget_min = Some(v);
        }
        if let Some(v) = parse_override(&lookup, "MAX_RESULTS")? {
            self.max_results = v;
        }
        if let Some(v) = parse_override(&lookup, "MODEL_MIN_TRAINING_SAMPLES")? {
            self.model.min_training_samples = v;
        }
        if let Some(v) = parse_override(&lookup, "MODEL_VALIDATION_RATIO")? {
            self.model.validation_ratio = v;
        }
        if let Some(v) = parse_override(&lookup, "YIELD_NORMALIZATION")? {
            self.scoring.yield_normalization = v;
        }
        // Format: "Pocitos=0.9,Carrasco=0.95"
        if let Some(table) = lookup("LOCATION_DESIRABILITY") {
            for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (name, value) = entry.split_once('=').ok_or_else(|| {
                    MarketError::config(format!(
                        "LOCATION_DESIRABILITY entry '{entry}' is not name=value"
                    ))
                })?;
                let value: f64 = value.trim().parse().map_err(|_| {
                    MarketError::config(format!(
                        "LOCATION_DESIRABILITY value for '{name}' is not a number"
                    ))
                })?;
                self.location_desirability.insert(name.to_string(), value);
            }
        }
        Ok(self.with_canonical_keys())
    }

    /// Reject anything that would make a run meaningless. Called before any computation.
    pub fn validate(&self) -> MarketResult<()> {
        self.risk_profiles.validate()?;

        if !self.budget_max.is_finite() || self.budget_max <= 0.0 {
            return Err(MarketError::config(format!(
                "budget_max must be positive (got {})",
                self.budget_max
            )));
        }
        if let Some(min) = self.budget_min {
            if !min.is_finite() || min < 0.0 || min >= self.budget_max {
                return Err(MarketError::config(format!(
                    "budget_min must be in [0, budget_max) (got {min})"
                )));
            }
        }
        if self.max_results == 0 {
            return Err(MarketError::config("max_results must be at least 1"));
        }
        if self.min_samples_per_neighborhood == 0 {
            return Err(MarketError::config("min_samples_per_neighborhood must be at least 1"));
        }
        if self.model.min_training_samples < 2 {
            return Err(MarketError::config("model.min_training_samples must be at least 2"));
        }
        if !(self.model.validation_ratio > 0.0 && self.model.validation_ratio < 1.0) {
            return Err(MarketError::config(format!(
                "model.validation_ratio must be in (0, 1) (got {})",
                self.model.validation_ratio
            )));
        }
        if !self.model.ridge_lambda.is_finite() || self.model.ridge_lambda < 0.0 {
            return Err(MarketError::config("model.ridge_lambda must be non-negative"));
        }
        if let Some(bad) = self
            .model
            .candidate_lambdas
            .iter()
            .find(|l| !l.is_finite() || **l < 0.0)
        {
            return Err(MarketError::config(format!(
                "model.candidate_lambdas must be non-negative (got {bad})"
            )));
        }
        if !(self.scoring.max_discount > 0.0 && self.scoring.max_discount <= 1.0) {
            return Err(MarketError::config(format!(
                "scoring.max_discount must be in (0, 1] (got {})",
                self.scoring.max_discount
            )));
        }
        for (name, value) in &self.location_desirability {
            if !(0.0..=1.0).contains(value) {
                return Err(MarketError::config(format!(
                    "location desirability for '{name}' must be in [0, 1] (got {value})"
                )));
            }
        }
        if let Some(r) = self.normalizer.sale_price_range {
            r.validate("sale price")?;
        }
        if let Some(r) = self.normalizer.rental_price_range {
            r.validate("rental price")?;
        }
        if let Some(r) = self.normalizer.area_range {
            r.validate("area")?;
        }
        Ok(())
    }

    /// Desirability for a canonical neighborhood name
    pub fn desirability(&self, neighborhood: &str) -> Option<f64> {
        self.location_desirability.get(neighborhood).copied()
    }

    fn with_canonical_keys(mut self) -> Self {
        self.location_desirability = self
            .location_desirability
            .into_iter()
            .map(|(name, value)| (normalize_neighborhood(&name), value))
            .collect();
        self
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> MarketResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MarketError::config(format!("{key}='{raw}' could not be parsed"))),
        None => Ok(None),
    }
}
