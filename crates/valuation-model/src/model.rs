use crate::features::{FeatureSchema, UnseenCategory};
use crate::fit::ridge_solve;
use crate::split::holdout;
use chrono::{DateTime, Utc};
use market_core::{ListingType, MarketError, MarketResult, ModelConfig, PropertyRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Held-out accuracy of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Mean absolute percentage error, as a fraction (0.08 = 8%)
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl ValidationReport {
    fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        let n = pairs.len() as f64;
        if pairs.is_empty() {
            return Self { mape: 0.0, mae: 0.0, rmse: 0.0, r2: 0.0 };
        }

        let mape = pairs.iter().map(|(p, a)| ((p - a) / a).abs()).sum::<f64>() / n;
        let mae = pairs.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / n;
        let ss_res: f64 = pairs.iter().map(|(p, a)| (p - a).powi(2)).sum();
        let rmse = (ss_res / n).sqrt();

        let mean_actual = pairs.iter().map(|(_, a)| a).sum::<f64>() / n;
        let ss_tot: f64 = pairs.iter().map(|(_, a)| (a - mean_actual).powi(2)).sum();
        let r2 = if ss_tot > 1e-15 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Self { mape, mae, rmse, r2 }
    }
}

/// Held-out accuracy of one candidate fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub ridge_lambda: f64,
    pub validation: ValidationReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    /// Records with every feature present
    pub sample_count: usize,
    /// Records of this listing type dropped for missing bedrooms or bathrooms
    pub excluded_count: usize,
    pub train_count: usize,
    pub validation_count: usize,
    /// Accuracy of the kept fit
    pub validation: ValidationReport,
    /// Penalty of the kept fit
    #[serde(default)]
    pub ridge_lambda: f64,
    /// Every candidate tried on the same holdout, by ascending penalty
    #[serde(default)]
    pub candidates: Vec<CandidateReport>,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Share of total absolute standardized coefficient weight
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub price: f64,
    pub used_fallback: bool,
}

/// A trained, immutable price model for one listing type.
///
/// The version is a content hash of the fitted parameters; two models with
/// the same version price every record identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationModel {
    pub version: String,
    pub listing_type: ListingType,
    pub metadata: TrainingMetadata,
    schema: FeatureSchema,
    /// Intercept first, then one per schema column
    coefficients: Vec<f64>,
}

impl ValuationModel {
    /// Fit a model on every record of `listing_type` in `records`.
    ///
    /// Records missing bedrooms or bathrooms are excluded from fitting but
    /// still register their neighborhood and property type as known levels.
    /// One ridge fit per candidate penalty is scored on the same holdout and
    /// the lowest validation MAPE is kept; ties keep the smaller penalty.
    pub fn train(
        listing_type: ListingType,
        records: &[PropertyRecord],
        config: &ModelConfig,
    ) -> MarketResult<Self> {
        let candidates: Vec<&PropertyRecord> = records
            .iter()
            .filter(|r| r.listing_type == listing_type)
            .collect();
        let usable: Vec<&PropertyRecord> = candidates
            .iter()
            .copied()
            .filter(|r| r.bedrooms.is_some() && r.bathrooms.is_some())
            .collect();

        let required = config.min_training_samples.max(2);
        if usable.len() < required {
            return Err(MarketError::insufficient(
                format!("{listing_type} valuation model"),
                required,
                usable.len(),
            ));
        }

        let (train, validation) = holdout(&usable, config.validation_ratio);
        let schema = FeatureSchema::fit(&candidates, &train)?;
        let (rows, targets) = encode_all(&schema, &train)?;
        let (validation_rows, validation_targets) = encode_all(&schema, &validation)?;

        let mut reports = Vec::new();
        let mut best: Option<(Vec<f64>, CandidateReport)> = None;
        for lambda in candidate_lambdas(config) {
            let coefficients = match ridge_solve(&rows, &targets, lambda) {
                Ok(coefficients) => coefficients,
                Err(e) => {
                    tracing::debug!(
                        listing_type = %listing_type,
                        lambda,
                        error = %e,
                        "candidate fit failed"
                    );
                    continue;
                }
            };
            let pairs: Vec<(f64, f64)> = validation_rows
                .iter()
                .zip(&validation_targets)
                .map(|(row, actual)| (linear_price(&coefficients, row), *actual))
                .collect();
            let report = CandidateReport {
                ridge_lambda: lambda,
                validation: ValidationReport::from_pairs(&pairs),
            };
            reports.push(report);

            let better = best
                .as_ref()
                .map_or(true, |(_, kept)| report.validation.mape < kept.validation.mape);
            if better {
                best = Some((coefficients, report));
            }
        }
        let (coefficients, chosen) = best.ok_or_else(|| {
            MarketError::config(format!("no {listing_type} candidate fit could be solved"))
        })?;

        let mut model = Self {
            version: String::new(),
            listing_type,
            metadata: TrainingMetadata {
                sample_count: usable.len(),
                excluded_count: candidates.len() - usable.len(),
                train_count: train.len(),
                validation_count: validation.len(),
                validation: chosen.validation,
                ridge_lambda: chosen.ridge_lambda,
                candidates: reports,
                trained_at: Utc::now(),
            },
            schema,
            coefficients,
        };
        model.version = model.content_hash();

        tracing::info!(
            listing_type = %listing_type,
            version = %model.version,
            train = model.metadata.train_count,
            validation = model.metadata.validation_count,
            excluded = model.metadata.excluded_count,
            candidates = model.metadata.candidates.len(),
            ridge_lambda = model.metadata.ridge_lambda,
            mape = model.metadata.validation.mape,
            r2 = model.metadata.validation.r2,
            "trained valuation model"
        );

        Ok(model)
    }

    /// Fair price for a record whose neighborhood and property type were seen in training.
    pub fn predict(&self, record: &PropertyRecord) -> MarketResult<f64> {
        self.ensure_listing_type(record)?;
        let row = self.schema.encode(record, UnseenCategory::Reject)?;
        Ok(self.evaluate(&row.values))
    }

    /// Like `predict`, but unseen neighborhoods use the city-wide price per m²
    /// and unseen property types use the baseline type.
    pub fn predict_with_fallback(&self, record: &PropertyRecord) -> MarketResult<Prediction> {
        self.ensure_listing_type(record)?;
        let row = self.schema.encode(record, UnseenCategory::Fallback)?;
        Ok(Prediction {
            price: self.evaluate(&row.values),
            used_fallback: row.used_fallback,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Features ranked by absolute standardized coefficient, shares summing to 1
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let weights: Vec<f64> = self.coefficients.iter().skip(1).map(|c| c.abs()).collect();
        let total: f64 = weights.iter().sum();

        let mut ranked: Vec<FeatureImportance> = self
            .schema
            .feature_names()
            .into_iter()
            .zip(weights)
            .map(|(feature, w)| FeatureImportance {
                feature,
                importance: if total > 0.0 { w / total } else { 0.0 },
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        ranked
    }

    fn ensure_listing_type(&self, record: &PropertyRecord) -> MarketResult<()> {
        if record.listing_type != self.listing_type {
            return Err(MarketError::config(format!(
                "{} model cannot price {} listing '{}'",
                self.listing_type, record.listing_type, record.id
            )));
        }
        Ok(())
    }

    fn evaluate(&self, row: &[f64]) -> f64 {
        linear_price(&self.coefficients, row)
    }

    fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.listing_type.as_str().as_bytes());
        for (name, value) in &self.schema.neighborhood_price_per_m2 {
            hasher.update(b"|");
            hasher.update(name.as_bytes());
            hasher.update(value.to_le_bytes());
        }
        for name in &self.schema.property_types {
            hasher.update(b"|");
            hasher.update(name.as_bytes());
        }
        hasher.update(b"|");
        for s in &self.schema.standardizers {
            hasher.update(s.mean.to_le_bytes());
            hasher.update(s.scale.to_le_bytes());
        }
        hasher.update(self.schema.city_price_per_m2.to_le_bytes());
        hasher.update(self.schema.median_bedrooms.to_le_bytes());
        hasher.update(self.schema.median_bathrooms.to_le_bytes());
        for c in &self.coefficients {
            hasher.update(c.to_le_bytes());
        }
        hex::encode(hasher.finalize())[..16].to_string()
    }
}

/// `ridge_lambda` plus the configured candidates, deduplicated, ascending
fn candidate_lambdas(config: &ModelConfig) -> Vec<f64> {
    let mut lambdas: Vec<f64> = std::iter::once(config.ridge_lambda)
        .chain(config.candidate_lambdas.iter().copied())
        .filter(|l| l.is_finite() && *l >= 0.0)
        .collect();
    lambdas.sort_by(f64::total_cmp);
    lambdas.dedup();
    lambdas
}

fn encode_all(
    schema: &FeatureSchema,
    records: &[&PropertyRecord],
) -> MarketResult<(Vec<Vec<f64>>, Vec<f64>)> {
    let rows = records
        .iter()
        .map(|r| schema.encode(r, UnseenCategory::Reject).map(|row| row.values))
        .collect::<MarketResult<_>>()?;
    Ok((rows, records.iter().map(|r| r.price).collect()))
}

fn linear_price(coefficients: &[f64], row: &[f64]) -> f64 {
    let price: f64 = row.iter().zip(coefficients).map(|(x, b)| x * b).sum();
    price.max(0.0)
}
