use chrono::{DateTime, Utc};
use listing_normalizer::NormalizationReport;
use market_core::{ListingType, RiskProfile};
use serde::Serialize;
use valuation_model::{CandidateReport, FeatureImportance, ValidationReport, ValuationModel};

/// Outcome of the training stage for one listing type
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub listing_type: ListingType,
    /// Version in use after this run, if any
    pub version: Option<String>,
    /// Trained in this run
    pub retrained: bool,
    /// A prior model is in use because retraining failed
    pub stale: bool,
    pub training_error: Option<String>,
    pub validation: Option<ValidationReport>,
    pub ridge_lambda: Option<f64>,
    /// Held-out accuracy of every penalty tried when the model was fitted
    pub candidates: Vec<CandidateReport>,
    pub train_count: Option<usize>,
    pub validation_count: Option<usize>,
    pub feature_importance: Vec<FeatureImportance>,
}

impl ModelStatus {
    pub fn new(
        listing_type: ListingType,
        model: Option<&ValuationModel>,
        training_error: Option<String>,
    ) -> Self {
        let retrained = model.is_some() && training_error.is_none();
        Self {
            listing_type,
            version: model.map(|m| m.version.clone()),
            retrained,
            stale: model.is_some() && training_error.is_some(),
            training_error,
            validation: model.map(|m| m.metadata.validation),
            ridge_lambda: model.map(|m| m.metadata.ridge_lambda),
            candidates: model.map(|m| m.metadata.candidates.clone()).unwrap_or_default(),
            train_count: model.map(|m| m.metadata.train_count),
            validation_count: model.map(|m| m.metadata.validation_count),
            feature_importance: model.map(ValuationModel::feature_importance).unwrap_or_default(),
        }
    }
}

/// Everything an operator needs to judge a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub normalization: NormalizationReport,
    pub canonical_records: usize,
    pub neighborhoods: usize,
    pub low_confidence_neighborhoods: Vec<String>,
    pub yield_ranking: Vec<(String, f64)>,
    pub models: Vec<ModelStatus>,
    /// Sale listings scored on a rent-model yield estimate
    pub estimated_yields: usize,
    pub risk_profile: RiskProfile,
    pub budget_max: f64,
    pub eligible_candidates: usize,
    pub recommendations: usize,
}

impl RunReport {
    pub fn stale_models(&self) -> impl Iterator<Item = &ModelStatus> {
        self.models.iter().filter(|m| m.stale)
    }
}
