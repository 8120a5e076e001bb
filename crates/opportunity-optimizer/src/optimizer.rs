//! Opportunity selection
//!
//! Filters a scored pool by budget, listing type and neighborhood stability,
//! then ranks what survives. No I/O; the pool is never modified.

use crate::summary::{summarize, NeighborhoodOpportunity};
use investment_scorer::ScoredProperty;
use market_core::{
    ListingType, MarketError, MarketResult, PipelineConfig, RiskProfile, RiskProfiles,
    StabilityFilter,
};
use market_metrics::MarketMetrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What the caller is shopping for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerRequest {
    pub risk_profile: RiskProfile,
    pub budget_max: f64,
    pub budget_min: Option<f64>,
    pub max_results: usize,
    /// Case-insensitive neighborhood substring
    pub location: Option<String>,
}

impl OptimizerRequest {
    pub fn new(risk_profile: RiskProfile, budget_max: f64, max_results: usize) -> Self {
        Self {
            risk_profile,
            budget_max,
            budget_min: None,
            max_results,
            location: None,
        }
    }

    pub fn from_config(config: &PipelineConfig, risk_profile: RiskProfile) -> Self {
        Self {
            budget_min: config.budget_min,
            ..Self::new(risk_profile, config.budget_max, config.max_results)
        }
    }

    pub fn validate(&self) -> MarketResult<()> {
        if !self.budget_max.is_finite() || self.budget_max <= 0.0 {
            return Err(MarketError::config(format!(
                "budget must be positive (got {})",
                self.budget_max
            )));
        }
        if let Some(min) = self.budget_min {
            if !min.is_finite() || min < 0.0 || min >= self.budget_max {
                return Err(MarketError::config(format!(
                    "minimum budget {min} must be non-negative and below {}",
                    self.budget_max
                )));
            }
        }
        if self.max_results == 0 {
            return Err(MarketError::config("max_results must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    /// 1-based
    pub rank: usize,
    pub property: ScoredProperty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub risk_profile: RiskProfile,
    pub budget_max: f64,
    pub budget_min: Option<f64>,
    pub max_results: usize,
    /// Sale listings offered to the optimizer
    pub candidates_considered: usize,
    /// Candidates that passed every filter
    pub eligible_count: usize,
    pub items: Vec<RecommendationItem>,
}

/// Score descending, then price ascending, then id ascending
pub fn rank_order(a: &ScoredProperty, b: &ScoredProperty) -> Ordering {
    b.score
        .score
        .total_cmp(&a.score.score)
        .then_with(|| a.record.price.total_cmp(&b.record.price))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

pub struct OpportunityOptimizer<'a> {
    metrics: &'a MarketMetrics,
    profiles: &'a RiskProfiles,
}

impl<'a> OpportunityOptimizer<'a> {
    pub fn new(metrics: &'a MarketMetrics, profiles: &'a RiskProfiles) -> Self {
        Self { metrics, profiles }
    }

    fn is_stable(&self, neighborhood: &str, filter: &StabilityFilter) -> bool {
        let (count, low_confidence) = self
            .metrics
            .get(neighborhood)
            .map_or((0, false), |m| (m.listing_count(), m.low_confidence));
        count >= filter.min_listing_count && !(filter.exclude_low_confidence && low_confidence)
    }

    /// Sale listings that pass budget, location and stability filters, in pool order
    pub fn eligible<'p>(
        &self,
        pool: &'p [ScoredProperty],
        request: &OptimizerRequest,
    ) -> MarketResult<Vec<&'p ScoredProperty>> {
        request.validate()?;
        let filter = self.profiles.settings(request.risk_profile).stability;
        let location = request.location.as_ref().map(|l| l.trim().to_lowercase());

        Ok(pool
            .iter()
            .filter(|p| p.record.listing_type == ListingType::Sale)
            .filter(|p| p.record.price <= request.budget_max)
            .filter(|p| request.budget_min.map_or(true, |min| p.record.price >= min))
            .filter(|p| {
                location
                    .as_deref()
                    .map_or(true, |l| p.record.neighborhood.to_lowercase().contains(l))
            })
            .filter(|p| self.is_stable(&p.record.neighborhood, &filter))
            .collect())
    }

    /// Top `max_results` eligible listings. Fewer when fewer survive.
    pub fn recommend(
        &self,
        pool: &[ScoredProperty],
        request: &OptimizerRequest,
    ) -> MarketResult<Recommendation> {
        let mut eligible = self.eligible(pool, request)?;
        let eligible_count = eligible.len();
        eligible.sort_by(|a, b| rank_order(a, b));

        let items: Vec<RecommendationItem> = eligible
            .into_iter()
            .take(request.max_results)
            .enumerate()
            .map(|(i, p)| RecommendationItem {
                rank: i + 1,
                property: p.clone(),
            })
            .collect();

        let candidates_considered = pool
            .iter()
            .filter(|p| p.record.listing_type == ListingType::Sale)
            .count();

        tracing::info!(
            risk_profile = %request.risk_profile,
            budget_max = request.budget_max,
            candidates = candidates_considered,
            eligible = eligible_count,
            returned = items.len(),
            "ranked opportunities"
        );

        Ok(Recommendation {
            risk_profile: request.risk_profile,
            budget_max: request.budget_max,
            budget_min: request.budget_min,
            max_results: request.max_results,
            candidates_considered,
            eligible_count,
            items,
        })
    }

    /// Eligible listings grouped by neighborhood, best mean score first
    pub fn neighborhood_opportunities(
        &self,
        pool: &[ScoredProperty],
        request: &OptimizerRequest,
    ) -> MarketResult<Vec<NeighborhoodOpportunity>> {
        let eligible = self.eligible(pool, request)?;
        Ok(summarize(&eligible, self.metrics))
    }
}
