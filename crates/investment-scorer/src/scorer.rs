use crate::components::{
    location_score, relative_price_score, size_score, yield_score, ScoreComponents,
};
use market_core::{ListingType, MarketResult, PropertyRecord, ScoreWeights, ScoringConfig};
use market_metrics::MarketMetrics;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use valuation_model::ValuationModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentScore {
    pub property_id: String,
    /// Weighted composite in [0, 1]
    pub score: f64,
    pub components: ScoreComponents,
}

/// A canonical record together with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProperty {
    pub record: PropertyRecord,
    pub score: InvestmentScore,
    /// Fair price from the valuation model, when one could be produced
    pub predicted_price: Option<f64>,
    /// Yield implied by the rent model, set only when it stood in for a
    /// missing neighborhood yield
    #[serde(default)]
    pub estimated_yield: Option<f64>,
}

/// Component scores together with the model outputs behind them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentBreakdown {
    pub components: ScoreComponents,
    pub predicted_price: Option<f64>,
    pub estimated_yield: Option<f64>,
}

/// Scores listings against one run's metrics, models and risk weights
pub struct InvestmentScorer<'a> {
    metrics: &'a MarketMetrics,
    model: Option<&'a ValuationModel>,
    rent_model: Option<&'a ValuationModel>,
    weights: ScoreWeights,
    scoring: ScoringConfig,
    desirability: &'a BTreeMap<String, f64>,
    yields: Vec<f64>,
}

impl<'a> InvestmentScorer<'a> {
    pub fn new(
        metrics: &'a MarketMetrics,
        weights: ScoreWeights,
        scoring: ScoringConfig,
        desirability: &'a BTreeMap<String, f64>,
    ) -> MarketResult<Self> {
        weights.validate()?;
        Ok(Self {
            metrics,
            model: None,
            rent_model: None,
            weights,
            scoring,
            desirability,
            yields: metrics.yields(),
        })
    }

    /// Enable the relative-price component. Without a model it stays neutral.
    pub fn with_model(mut self, model: &'a ValuationModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Fill missing neighborhood yields for sale listings from predicted rent.
    pub fn with_rent_model(mut self, model: &'a ValuationModel) -> Self {
        self.rent_model = Some(model);
        self
    }

    /// Model price for a record. Unknown categories and listing-type
    /// mismatches leave the relative-price component neutral.
    fn predicted_price(&self, record: &PropertyRecord) -> Option<f64> {
        let model = self.model?;
        match model.predict(record) {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::debug!(
                    id = %record.id,
                    error = %e,
                    "model cannot price listing, relative price neutral"
                );
                None
            }
        }
    }

    /// Annual rent over asking price, with rent from the rent model priced as
    /// if the listing were let. Unseen categories use the model's fallback.
    fn estimated_yield(&self, record: &PropertyRecord) -> Option<f64> {
        if record.listing_type != ListingType::Sale {
            return None;
        }
        let model = self.rent_model?;
        let as_rental = PropertyRecord {
            listing_type: ListingType::Rental,
            ..record.clone()
        };
        match model.predict_with_fallback(&as_rental) {
            Ok(rent) if rent.price > 0.0 => Some(rent.price * 12.0 / record.price),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(id = %record.id, error = %e, "rent model cannot price listing");
                None
            }
        }
    }

    pub fn components(&self, record: &PropertyRecord) -> ComponentBreakdown {
        let neighborhood = self.metrics.get(&record.neighborhood);
        let predicted_price = self.predicted_price(record);

        let measured_yield = neighborhood.and_then(|m| m.annual_yield);
        let estimated_yield = match measured_yield {
            Some(_) => None,
            None => self.estimated_yield(record),
        };

        let components = ScoreComponents {
            yield_score: yield_score(
                measured_yield.or(estimated_yield),
                &self.yields,
                self.scoring.yield_normalization,
            ),
            relative_price: relative_price_score(
                record.price,
                predicted_price,
                self.scoring.max_discount,
            ),
            size: size_score(
                record.area_m2,
                neighborhood.and_then(|m| m.stats(record.listing_type)),
            ),
            location: location_score(self.desirability.get(&record.neighborhood).copied()),
        };
        ComponentBreakdown {
            components,
            predicted_price,
            estimated_yield,
        }
    }

    pub fn score(&self, record: &PropertyRecord) -> ScoredProperty {
        let breakdown = self.components(record);
        ScoredProperty {
            record: record.clone(),
            score: InvestmentScore {
                property_id: record.id.clone(),
                score: breakdown.components.composite(&self.weights),
                components: breakdown.components,
            },
            predicted_price: breakdown.predicted_price,
            estimated_yield: breakdown.estimated_yield,
        }
    }

    /// Score every record. Output order matches input order.
    pub fn score_all(&self, records: &[PropertyRecord]) -> Vec<ScoredProperty> {
        let scored: Vec<ScoredProperty> = records.par_iter().map(|r| self.score(r)).collect();

        let priced = scored.iter().filter(|s| s.predicted_price.is_some()).count();
        let estimated = scored.iter().filter(|s| s.estimated_yield.is_some()).count();
        tracing::info!(
            scored = scored.len(),
            priced_by_model = priced,
            estimated_yields = estimated,
            "scored listings"
        );
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::NEUTRAL;
    use chrono::Utc;
    use market_core::{MarketError, ModelConfig};
    use market_metrics::MetricsAggregator;

    fn listing(
        id: &str,
        listing_type: ListingType,
        neighborhood: &str,
        price: f64,
        area: f64,
    ) -> PropertyRecord {
        PropertyRecord {
            id: id.to_string(),
            listing_type,
            neighborhood: neighborhood.to_string(),
            price,
            area_m2: area,
            bedrooms: Some(2),
            bathrooms: Some(1),
            property_type: "apartment".to_string(),
            listed_at: Utc::now(),
        }
    }

    fn market() -> Vec<PropertyRecord> {
        let mut records = Vec::new();
        let neighborhoods = [
            ("Pocitos", 2_000.0, 850.0),
            ("Buceo", 1_800.0, 900.0),
            ("Centro", 1_500.0, 500.0),
        ];
        for (i, (name, ppm, rent)) in neighborhoods.iter().enumerate() {
            for k in 0..6 {
                let area = 45.0 + (k * 7 + i) as f64;
                let id = format!("{name}-s{k}");
                records.push(listing(&id, ListingType::Sale, name, ppm * area, area));
            }
            records.push(listing(&format!("{name}-r"), ListingType::Rental, name, *rent, 40.0));
        }
        records
    }

    /// `market()` plus enough rentals for a rent model and a sale-only neighborhood
    fn market_with_rentals() -> Vec<PropertyRecord> {
        let mut records = market();
        for k in 0..12 {
            let name = ["Pocitos", "Buceo"][k % 2];
            let area = 35.0 + (k * 5) as f64;
            let id = format!("{name}-r{k}");
            records.push(listing(&id, ListingType::Rental, name, 20.0 * area, area));
        }
        for k in 0..3 {
            let area = 60.0 + (k * 10) as f64;
            let id = format!("Carrasco-s{k}");
            records.push(listing(&id, ListingType::Sale, "Carrasco", 2_500.0 * area, area));
        }
        records
    }

    fn weights(y: f64, p: f64, s: f64, l: f64) -> ScoreWeights {
        ScoreWeights::new(y, p, s, l)
    }

    #[test]
    fn test_scores_are_bounded() {
        let records = market();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let model =
            ValuationModel::train(ListingType::Sale, &records, &ModelConfig::default()).unwrap();
        let desirability = BTreeMap::from([("Pocitos".to_string(), 0.9)]);
        let scorer = InvestmentScorer::new(
            &metrics,
            weights(0.35, 0.30, 0.15, 0.20),
            ScoringConfig::default(),
            &desirability,
        )
        .unwrap()
        .with_model(&model);

        for scored in scorer.score_all(&records) {
            for c in scored.score.components.as_array() {
                assert!((0.0..=1.0).contains(&c));
            }
            assert!((0.0..=1.0).contains(&scored.score.score));
        }
    }

    #[test]
    fn test_yield_only_weights() {
        let records = market();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let desirability = BTreeMap::new();
        let scorer = InvestmentScorer::new(
            &metrics,
            weights(1.0, 0.0, 0.0, 0.0),
            ScoringConfig::default(),
            &desirability,
        )
        .unwrap();

        for scored in scorer.score_all(&records) {
            assert_eq!(scored.score.score, scored.score.components.yield_score);
        }
        // Buceo has the best yield of the three
        let buceo = scorer.score(&records[7]);
        assert_eq!(buceo.record.neighborhood, "Buceo");
        assert!(buceo.score.score > scorer.score(&records[0]).score.score);
    }

    #[test]
    fn test_missing_inputs_are_neutral() {
        let records = market();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let desirability = BTreeMap::new();
        let scorer = InvestmentScorer::new(
            &metrics,
            weights(0.25, 0.25, 0.25, 0.25),
            ScoringConfig::default(),
            &desirability,
        )
        .unwrap();

        let stranger = listing("x", ListingType::Sale, "Malvin", 90_000.0, 50.0);
        let breakdown = scorer.components(&stranger);
        assert_eq!(breakdown.predicted_price, None);
        assert_eq!(breakdown.estimated_yield, None);
        assert_eq!(breakdown.components.as_array(), [NEUTRAL; 4]);
    }

    #[test]
    fn test_unknown_neighborhood_keeps_relative_price_neutral() {
        let records = market();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let model =
            ValuationModel::train(ListingType::Sale, &records, &ModelConfig::default()).unwrap();
        let desirability = BTreeMap::new();
        let scorer = InvestmentScorer::new(
            &metrics,
            weights(0.0, 1.0, 0.0, 0.0),
            ScoringConfig::default(),
            &desirability,
        )
        .unwrap()
        .with_model(&model);

        let stranger = listing("x", ListingType::Sale, "Malvin", 90_000.0, 50.0);
        assert_eq!(scorer.score(&stranger).score.score, NEUTRAL);

        // Rental listings are never priced by the sale model
        let rental = listing("r", ListingType::Rental, "Pocitos", 800.0, 40.0);
        assert_eq!(scorer.score(&rental).predicted_price, None);
    }

    #[test]
    fn test_rent_model_fills_missing_neighborhood_yield() {
        let records = market_with_rentals();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let rent_model =
            ValuationModel::train(ListingType::Rental, &records, &ModelConfig::default()).unwrap();
        let desirability = BTreeMap::new();
        let scoring = ScoringConfig::default();
        let yield_weights = weights(1.0, 0.0, 0.0, 0.0);

        let carrasco = records.iter().find(|r| r.neighborhood == "Carrasco").unwrap();
        assert_eq!(metrics.get("Carrasco").unwrap().annual_yield, None);

        let without =
            InvestmentScorer::new(&metrics, yield_weights, scoring.clone(), &desirability).unwrap();
        let plain = without.components(carrasco);
        assert_eq!(plain.estimated_yield, None);
        assert_eq!(plain.components.yield_score, NEUTRAL);

        let scorer = InvestmentScorer::new(&metrics, yield_weights, scoring.clone(), &desirability)
            .unwrap()
            .with_rent_model(&rent_model);
        let breakdown = scorer.components(carrasco);

        let as_rental = PropertyRecord {
            listing_type: ListingType::Rental,
            ..carrasco.clone()
        };
        let rent = rent_model.predict_with_fallback(&as_rental).unwrap();
        assert!(rent.used_fallback);
        let expected = rent.price * 12.0 / carrasco.price;
        assert_eq!(breakdown.estimated_yield, Some(expected));
        assert_eq!(
            breakdown.components.yield_score,
            yield_score(Some(expected), &metrics.yields(), scoring.yield_normalization)
        );
        // The neighborhood table itself is left untouched
        assert_eq!(metrics.get("Carrasco").unwrap().annual_yield, None);
    }

    #[test]
    fn test_measured_yield_wins_over_estimate() {
        let records = market_with_rentals();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let rent_model =
            ValuationModel::train(ListingType::Rental, &records, &ModelConfig::default()).unwrap();
        let desirability = BTreeMap::new();
        let scorer = InvestmentScorer::new(
            &metrics,
            weights(1.0, 0.0, 0.0, 0.0),
            ScoringConfig::default(),
            &desirability,
        )
        .unwrap()
        .with_rent_model(&rent_model);

        let pocitos = &records[0];
        assert_eq!(pocitos.neighborhood, "Pocitos");
        assert!(scorer.components(pocitos).estimated_yield.is_none());

        let rental = records.iter().find(|r| r.listing_type == ListingType::Rental).unwrap();
        assert!(scorer.components(rental).estimated_yield.is_none());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let records = market();
        let metrics = MetricsAggregator::new(3).aggregate(&records).unwrap();
        let desirability = BTreeMap::new();
        let result = InvestmentScorer::new(
            &metrics,
            weights(0.5, 0.5, 0.5, 0.0),
            ScoringConfig::default(),
            &desirability,
        );
        assert!(matches!(result, Err(MarketError::Configuration(_))));
    }
}
