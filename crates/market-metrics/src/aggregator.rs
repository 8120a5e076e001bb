use crate::stats::{mean, median, sorted, std_dev};
use market_core::{ListingType, MarketError, MarketResult, PropertyRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one side (sale or rental) of a neighborhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingStats {
    pub count: usize,
    pub avg_price: f64,
    pub median_price: f64,
    /// None with fewer than two listings
    pub price_std_dev: Option<f64>,
    pub avg_price_per_m2: f64,
    pub median_price_per_m2: f64,
    pub avg_area_m2: f64,
    pub median_area_m2: f64,
    pub min_area_m2: f64,
    pub max_area_m2: f64,
    /// Fewer listings than the configured minimum
    pub low_confidence: bool,
}

impl ListingStats {
    fn from_records(records: &[&PropertyRecord], min_samples: usize) -> Option<Self> {
        let prices = sorted(records.iter().map(|r| r.price));
        let per_m2 = sorted(records.iter().map(|r| r.price_per_m2()));
        let areas = sorted(records.iter().map(|r| r.area_m2));

        Some(Self {
            count: records.len(),
            avg_price: mean(&prices)?,
            median_price: median(&prices)?,
            price_std_dev: std_dev(&prices),
            avg_price_per_m2: mean(&per_m2)?,
            median_price_per_m2: median(&per_m2)?,
            avg_area_m2: mean(&areas)?,
            median_area_m2: median(&areas)?,
            min_area_m2: *areas.first()?,
            max_area_m2: *areas.last()?,
            low_confidence: records.len() < min_samples,
        })
    }
}

/// Statistics for one neighborhood in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodMetrics {
    pub neighborhood: String,
    pub sale: Option<ListingStats>,
    pub rental: Option<ListingStats>,
    /// (average monthly rent * 12) / average sale price.
    /// Absent unless both sides have listings; never defaulted to zero.
    pub annual_yield: Option<f64>,
    pub low_confidence: bool,
}

impl NeighborhoodMetrics {
    pub fn stats(&self, listing_type: ListingType) -> Option<&ListingStats> {
        match listing_type {
            ListingType::Sale => self.sale.as_ref(),
            ListingType::Rental => self.rental.as_ref(),
        }
    }

    pub fn avg_sale_price(&self) -> Option<f64> {
        self.sale.as_ref().map(|s| s.avg_price)
    }

    pub fn avg_rental_price(&self) -> Option<f64> {
        self.rental.as_ref().map(|s| s.avg_price)
    }

    pub fn avg_sale_price_per_m2(&self) -> Option<f64> {
        self.sale.as_ref().map(|s| s.avg_price_per_m2)
    }

    pub fn avg_rental_price_per_m2(&self) -> Option<f64> {
        self.rental.as_ref().map(|s| s.avg_price_per_m2)
    }

    pub fn sale_count(&self) -> usize {
        self.sale.as_ref().map_or(0, |s| s.count)
    }

    pub fn rental_count(&self) -> usize {
        self.rental.as_ref().map_or(0, |s| s.count)
    }

    pub fn listing_count(&self) -> usize {
        self.sale_count() + self.rental_count()
    }
}

/// Neighborhood table for one run, keyed by canonical neighborhood name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub min_samples: usize,
    neighborhoods: BTreeMap<String, NeighborhoodMetrics>,
}

impl MarketMetrics {
    pub fn get(&self, neighborhood: &str) -> Option<&NeighborhoodMetrics> {
        self.neighborhoods.get(neighborhood)
    }

    /// Neighborhoods in name order
    pub fn iter(&self) -> impl Iterator<Item = &NeighborhoodMetrics> {
        self.neighborhoods.values()
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    /// Every defined neighborhood yield, ascending
    pub fn yields(&self) -> Vec<f64> {
        sorted(self.iter().filter_map(|m| m.annual_yield))
    }

    /// Neighborhoods with a yield, best first; ties by name
    pub fn yield_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .iter()
            .filter_map(|m| m.annual_yield.map(|y| (m.neighborhood.as_str(), y)))
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranking
    }

    pub fn low_confidence(&self) -> Vec<&str> {
        self.iter()
            .filter(|m| m.low_confidence)
            .map(|m| m.neighborhood.as_str())
            .collect()
    }

    pub fn into_rows(self) -> Vec<NeighborhoodMetrics> {
        self.neighborhoods.into_values().collect()
    }
}

/// Computes the neighborhood table. Pure and order-independent.
pub struct MetricsAggregator {
    min_samples: usize,
}

impl MetricsAggregator {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    pub fn aggregate(&self, records: &[PropertyRecord]) -> MarketResult<MarketMetrics> {
        if records.is_empty() {
            return Err(MarketError::insufficient("market metrics", 1, 0));
        }

        type Sides<'a> = (Vec<&'a PropertyRecord>, Vec<&'a PropertyRecord>);
        let mut groups: BTreeMap<&str, Sides<'_>> = BTreeMap::new();
        for record in records {
            let (sale, rental) = groups.entry(record.neighborhood.as_str()).or_default();
            match record.listing_type {
                ListingType::Sale => sale.push(record),
                ListingType::Rental => rental.push(record),
            }
        }

        let min_samples = self.min_samples;
        let neighborhoods: BTreeMap<String, NeighborhoodMetrics> = groups
            .into_par_iter()
            .map(|(name, (sale, rental))| {
                let sale = ListingStats::from_records(&sale, min_samples);
                let rental = ListingStats::from_records(&rental, min_samples);
                let annual_yield = match (&sale, &rental) {
                    (Some(s), Some(r)) => Some(r.avg_price * 12.0 / s.avg_price),
                    _ => None,
                };
                let low_confidence = sale.iter().chain(rental.iter()).any(|s| s.low_confidence);
                (
                    name.to_string(),
                    NeighborhoodMetrics {
                        neighborhood: name.to_string(),
                        sale,
                        rental,
                        annual_yield,
                        low_confidence,
                    },
                )
            })
            .collect();

        let metrics = MarketMetrics {
            min_samples,
            neighborhoods,
        };

        let low_confidence = metrics.low_confidence();
        if !low_confidence.is_empty() {
            tracing::warn!(
                count = low_confidence.len(),
                min_samples,
                neighborhoods = ?low_confidence,
                "low-confidence neighborhood metrics"
            );
        }
        tracing::info!(
            neighborhoods = metrics.len(),
            with_yield = metrics.yields().len(),
            records = records.len(),
            "aggregated market metrics"
        );

        Ok(metrics)
    }
}
