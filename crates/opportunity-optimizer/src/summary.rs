use investment_scorer::ScoredProperty;
use market_metrics::stats::{mean, sorted};
use market_metrics::MarketMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Eligible candidates in one neighborhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodOpportunity {
    pub neighborhood: String,
    pub candidate_count: usize,
    pub mean_score: f64,
    pub max_score: f64,
    pub mean_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub mean_price_per_m2: f64,
    pub annual_yield: Option<f64>,
}

pub fn summarize(
    eligible: &[&ScoredProperty],
    metrics: &MarketMetrics,
) -> Vec<NeighborhoodOpportunity> {
    let mut groups: BTreeMap<&str, Vec<&ScoredProperty>> = BTreeMap::new();
    for p in eligible {
        groups.entry(p.record.neighborhood.as_str()).or_default().push(*p);
    }

    let mut rows: Vec<NeighborhoodOpportunity> = groups
        .into_iter()
        .filter_map(|(name, members)| {
            let scores = sorted(members.iter().map(|p| p.score.score));
            let prices = sorted(members.iter().map(|p| p.record.price));
            let per_m2 = sorted(members.iter().map(|p| p.record.price_per_m2()));
            Some(NeighborhoodOpportunity {
                neighborhood: name.to_string(),
                candidate_count: members.len(),
                mean_score: mean(&scores)?,
                max_score: *scores.last()?,
                mean_price: mean(&prices)?,
                min_price: *prices.first()?,
                max_price: *prices.last()?,
                mean_price_per_m2: mean(&per_m2)?,
                annual_yield: metrics.get(name).and_then(|m| m.annual_yield),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.mean_score
            .total_cmp(&a.mean_score)
            .then_with(|| a.neighborhood.cmp(&b.neighborhood))
    });
    rows
}

#[cfg(test)]
mod tests {
    use crate::{OpportunityOptimizer, OptimizerRequest};
    use approx::assert_relative_eq;
    use chrono::Utc;
    use investment_scorer::{InvestmentScore, ScoreComponents, ScoredProperty};
    use market_core::{ListingType, PropertyRecord, RiskProfile, RiskProfiles};
    use market_metrics::MetricsAggregator;

    fn scored(
        id: &str,
        listing_type: ListingType,
        neighborhood: &str,
        price: f64,
        score: f64,
    ) -> ScoredProperty {
        ScoredProperty {
            record: PropertyRecord {
                id: id.to_string(),
                listing_type,
                neighborhood: neighborhood.to_string(),
                price,
                area_m2: 50.0,
                bedrooms: Some(1),
                bathrooms: Some(1),
                property_type: "apartment".to_string(),
                listed_at: Utc::now(),
            },
            score: InvestmentScore {
                property_id: id.to_string(),
                score,
                components: ScoreComponents {
                    yield_score: 0.5,
                    relative_price: 0.5,
                    size: 0.5,
                    location: 0.5,
                },
            },
            predicted_price: None,
            estimated_yield: None,
        }
    }

    #[test]
    fn test_groups_ordered_by_mean_score() {
        let pool = vec![
            scored("p1", ListingType::Sale, "Pocitos", 100_000.0, 0.6),
            scored("p2", ListingType::Sale, "Pocitos", 80_000.0, 0.8),
            scored("p3", ListingType::Rental, "Pocitos", 900.0, 0.1),
            scored("b1", ListingType::Sale, "Buceo", 90_000.0, 0.75),
        ];
        let records: Vec<PropertyRecord> = pool.iter().map(|p| p.record.clone()).collect();
        let metrics = MetricsAggregator::new(1).aggregate(&records).unwrap();
        let profiles = RiskProfiles::default();
        let optimizer = OpportunityOptimizer::new(&metrics, &profiles);

        let request = OptimizerRequest::new(RiskProfile::Aggressive, 200_000.0, 5);
        let rows = optimizer.neighborhood_opportunities(&pool, &request).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].neighborhood, "Buceo");
        let pocitos = &rows[1];
        assert_eq!(pocitos.candidate_count, 2);
        assert_relative_eq!(pocitos.mean_score, 0.7, epsilon = 1e-12);
        assert_relative_eq!(pocitos.max_score, 0.8);
        assert_relative_eq!(pocitos.mean_price, 90_000.0);
        assert_relative_eq!(pocitos.min_price, 80_000.0);
        assert_relative_eq!(pocitos.mean_price_per_m2, 1_800.0);
        assert_relative_eq!(pocitos.annual_yield.unwrap(), 0.12, epsilon = 1e-12);
        assert_eq!(rows[0].annual_yield, None);
    }
}
