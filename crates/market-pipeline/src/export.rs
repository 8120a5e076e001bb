//! Flat rows for the persistence layer. Read-only views over stage outputs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use investment_scorer::ScoredProperty;
use market_core::{ListingType, PriceBand, PropertyRecord, SizeBand};
use market_metrics::MarketMetrics;
use opportunity_optimizer::Recommendation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct PropertyRow {
    pub id: String,
    pub listing_type: ListingType,
    pub neighborhood: String,
    pub price: f64,
    pub area_m2: f64,
    pub price_per_m2: f64,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub property_type: String,
    pub size_band: SizeBand,
    pub price_band: Option<PriceBand>,
    pub listed_at: DateTime<Utc>,
}

impl From<&PropertyRecord> for PropertyRow {
    fn from(r: &PropertyRecord) -> Self {
        Self {
            id: r.id.clone(),
            listing_type: r.listing_type,
            neighborhood: r.neighborhood.clone(),
            price: r.price,
            area_m2: r.area_m2,
            price_per_m2: r.price_per_m2(),
            bedrooms: r.bedrooms,
            bathrooms: r.bathrooms,
            property_type: r.property_type.clone(),
            size_band: r.size_band(),
            price_band: r.price_band(),
            listed_at: r.listed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodRow {
    pub neighborhood: String,
    pub sale_count: usize,
    pub rental_count: usize,
    pub avg_sale_price: Option<f64>,
    pub median_sale_price: Option<f64>,
    pub sale_price_std_dev: Option<f64>,
    pub avg_sale_price_per_m2: Option<f64>,
    pub median_sale_price_per_m2: Option<f64>,
    pub avg_rental_price: Option<f64>,
    pub median_rental_price: Option<f64>,
    pub avg_rental_price_per_m2: Option<f64>,
    pub avg_area_m2: Option<f64>,
    pub min_area_m2: Option<f64>,
    pub max_area_m2: Option<f64>,
    pub annual_yield: Option<f64>,
    /// 1 = highest yield
    pub yield_rank: Option<usize>,
    pub low_confidence: bool,
}

pub fn neighborhood_rows(metrics: &MarketMetrics) -> Vec<NeighborhoodRow> {
    let ranks: BTreeMap<&str, usize> = metrics
        .yield_ranking()
        .into_iter()
        .enumerate()
        .map(|(i, (name, _))| (name, i + 1))
        .collect();

    metrics
        .iter()
        .map(|m| {
            let sale = m.sale.as_ref();
            let rental = m.rental.as_ref();
            // Area figures describe the sale stock when there is one
            let area = sale.or(rental);
            NeighborhoodRow {
                neighborhood: m.neighborhood.clone(),
                sale_count: m.sale_count(),
                rental_count: m.rental_count(),
                avg_sale_price: sale.map(|s| s.avg_price),
                median_sale_price: sale.map(|s| s.median_price),
                sale_price_std_dev: sale.and_then(|s| s.price_std_dev),
                avg_sale_price_per_m2: sale.map(|s| s.avg_price_per_m2),
                median_sale_price_per_m2: sale.map(|s| s.median_price_per_m2),
                avg_rental_price: rental.map(|s| s.avg_price),
                median_rental_price: rental.map(|s| s.median_price),
                avg_rental_price_per_m2: rental.map(|s| s.avg_price_per_m2),
                avg_area_m2: area.map(|s| s.avg_area_m2),
                min_area_m2: area.map(|s| s.min_area_m2),
                max_area_m2: area.map(|s| s.max_area_m2),
                annual_yield: m.annual_yield,
                yield_rank: ranks.get(m.neighborhood.as_str()).copied(),
                low_confidence: m.low_confidence,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRow {
    pub rank: usize,
    pub id: String,
    pub neighborhood: String,
    pub price: f64,
    pub area_m2: f64,
    pub price_per_m2: f64,
    pub predicted_price: Option<f64>,
    /// Rent-model yield used in place of a missing neighborhood yield
    pub estimated_yield: Option<f64>,
    pub score: f64,
    pub yield_score: f64,
    pub relative_price_score: f64,
    pub size_score: f64,
    pub location_score: f64,
}

impl RecommendationRow {
    fn new(rank: usize, p: &ScoredProperty) -> Self {
        let c = &p.score.components;
        Self {
            rank,
            id: p.record.id.clone(),
            neighborhood: p.record.neighborhood.clone(),
            price: p.record.price,
            area_m2: p.record.area_m2,
            price_per_m2: p.record.price_per_m2(),
            predicted_price: p.predicted_price,
            estimated_yield: p.estimated_yield,
            score: p.score.score,
            yield_score: c.yield_score,
            relative_price_score: c.relative_price,
            size_score: c.size,
            location_score: c.location,
        }
    }
}

pub fn recommendation_rows(recommendation: &Recommendation) -> Vec<RecommendationRow> {
    recommendation
        .items
        .iter()
        .map(|item| RecommendationRow::new(item.rank, &item.property))
        .collect()
}

/// Pretty-printed JSON file under `dir`
pub fn write_json<T: Serialize + ?Sized>(dir: &Path, file_name: &str, value: &T) -> Result<()> {
    let path = dir.join(file_name);
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {file_name}"))?;
    std::fs::write(&path, body)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote output");
    Ok(())
}
