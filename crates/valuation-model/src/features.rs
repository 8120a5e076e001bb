//! Feature encoding shared by training and prediction.
//!
//! A row is `[1, area, bedrooms, bathrooms, neighborhood price/m², one-hot type...]`
//! with the four numeric columns standardized on the training split. The
//! neighborhood is target-encoded as the training-split mean price per m²;
//! the first property type (alphabetically) is the one-hot baseline.

use market_core::{CategoryField, MarketError, MarketResult, PropertyRecord};
use market_metrics::stats::{mean, median, sorted, std_dev};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const NUMERIC_FEATURES: [&str; 4] =
    ["area_m2", "bedrooms", "bathrooms", "neighborhood_price_per_m2"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: f64,
    pub scale: f64,
}

impl Standardizer {
    fn fit(values: impl IntoIterator<Item = f64>) -> Self {
        let values = sorted(values);
        Self {
            mean: mean(&values).unwrap_or(0.0),
            scale: std_dev(&values).filter(|s| *s > 1e-12).unwrap_or(1.0),
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

/// How to treat categories that were never seen in training
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnseenCategory {
    Reject,
    /// City-wide price/m² for neighborhoods, baseline for property types
    Fallback,
}

/// One encoded row plus whether any fallback was applied
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub values: Vec<f64>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Every neighborhood the model was trained with
    pub neighborhood_price_per_m2: BTreeMap<String, f64>,
    pub city_price_per_m2: f64,
    /// Sorted; index 0 is the baseline level
    pub property_types: Vec<String>,
    pub median_bedrooms: f64,
    pub median_bathrooms: f64,
    pub standardizers: [Standardizer; 4],
}

impl FeatureSchema {
    /// Category levels come from `levels`; encodings, medians and scaling from
    /// `train` only. Neighborhoods present in `levels` but absent from `train`
    /// encode as the city-wide training price/m².
    pub fn fit(levels: &[&PropertyRecord], train: &[&PropertyRecord]) -> MarketResult<Self> {
        if train.is_empty() {
            return Err(MarketError::insufficient("feature schema", 1, 0));
        }

        let per_m2 = sorted(train.iter().map(|r| r.price_per_m2()));
        let city_price_per_m2 = mean(&per_m2).unwrap_or(0.0);

        let mut by_neighborhood: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for r in train {
            by_neighborhood.entry(r.neighborhood.as_str()).or_default().push(r.price_per_m2());
        }

        let mut neighborhood_price_per_m2 = BTreeMap::new();
        for r in levels {
            let encoded = by_neighborhood
                .get(r.neighborhood.as_str())
                .and_then(|v| mean(&sorted(v.iter().copied())))
                .unwrap_or(city_price_per_m2);
            neighborhood_price_per_m2.insert(r.neighborhood.clone(), encoded);
        }

        let property_types: Vec<String> = levels
            .iter()
            .map(|r| r.property_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let bedrooms = sorted(train.iter().filter_map(|r| r.bedrooms).map(f64::from));
        let bathrooms = sorted(train.iter().filter_map(|r| r.bathrooms).map(f64::from));

        let mut schema = Self {
            neighborhood_price_per_m2,
            city_price_per_m2,
            property_types,
            median_bedrooms: median(&bedrooms).unwrap_or(0.0),
            median_bathrooms: median(&bathrooms).unwrap_or(0.0),
            standardizers: [Standardizer { mean: 0.0, scale: 1.0 }; 4],
        };

        let raw: Vec<[f64; 4]> = train
            .iter()
            .map(|r| schema.raw_numeric(r, UnseenCategory::Reject).map(|(v, _)| v))
            .collect::<MarketResult<_>>()?;
        for (k, standardizer) in schema.standardizers.iter_mut().enumerate() {
            *standardizer = Standardizer::fit(raw.iter().map(|v| v[k]));
        }

        Ok(schema)
    }

    /// Columns including the intercept
    pub fn width(&self) -> usize {
        1 + NUMERIC_FEATURES.len() + self.property_types.len().saturating_sub(1)
    }

    /// Names for every non-intercept column
    pub fn feature_names(&self) -> Vec<String> {
        NUMERIC_FEATURES
            .iter()
            .map(|s| s.to_string())
            .chain(self.property_types.iter().skip(1).map(|t| format!("property_type={t}")))
            .collect()
    }

    fn raw_numeric(
        &self,
        record: &PropertyRecord,
        unseen: UnseenCategory,
    ) -> MarketResult<([f64; 4], bool)> {
        let (encoded, fallback) = match self.neighborhood_price_per_m2.get(&record.neighborhood) {
            Some(v) => (*v, false),
            None if unseen == UnseenCategory::Fallback => (self.city_price_per_m2, true),
            None => {
                return Err(MarketError::UnknownCategory {
                    field: CategoryField::Neighborhood,
                    value: record.neighborhood.clone(),
                })
            }
        };
        let bedrooms = record.bedrooms.map_or(self.median_bedrooms, f64::from);
        let bathrooms = record.bathrooms.map_or(self.median_bathrooms, f64::from);
        Ok(([record.area_m2, bedrooms, bathrooms, encoded], fallback))
    }

    pub fn encode(
        &self,
        record: &PropertyRecord,
        unseen: UnseenCategory,
    ) -> MarketResult<EncodedRow> {
        let (numeric, mut used_fallback) = self.raw_numeric(record, unseen)?;

        let level = self.property_types.iter().position(|t| *t == record.property_type);
        let level = match level {
            Some(i) => Some(i),
            None if unseen == UnseenCategory::Fallback => {
                used_fallback = true;
                None
            }
            None => {
                return Err(MarketError::UnknownCategory {
                    field: CategoryField::PropertyType,
                    value: record.property_type.clone(),
                })
            }
        };

        let mut values = Vec::with_capacity(self.width());
        values.push(1.0);
        values.extend(numeric.iter().zip(&self.standardizers).map(|(v, s)| s.apply(*v)));
        for i in 1..self.property_types.len() {
            values.push(if level == Some(i) { 1.0 } else { 0.0 });
        }

        Ok(EncodedRow { values, used_fallback })
    }
}
