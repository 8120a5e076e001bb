//! Stage composition: normalize -> aggregate -> train -> score -> optimize.
//!
//! Each stage reads the previous stage's output and nothing else; the only
//! shared state is the per-listing-type model registry.

use crate::export::{neighborhood_rows, recommendation_rows, write_json, PropertyRow};
use crate::report::{ModelStatus, RunReport};
use anyhow::{Context, Result};
use chrono::Utc;
use investment_scorer::{InvestmentScorer, ScoredProperty};
use listing_normalizer::ListingNormalizer;
use market_core::{ListingType, ModelConfig, PipelineConfig, PropertyRecord, RawRecord};
use market_metrics::{MarketMetrics, MetricsAggregator};
use opportunity_optimizer::{
    NeighborhoodOpportunity, OpportunityOptimizer, OptimizerRequest, Recommendation,
};
use std::path::Path;
use std::sync::Arc;
use valuation_model::{ModelRegistry, ValuationModel};

pub const PROPERTIES_FILE: &str = "properties.json";
pub const METRICS_FILE: &str = "neighborhood_metrics.json";
pub const RECOMMENDATIONS_FILE: &str = "recommendations.json";
pub const OPPORTUNITIES_FILE: &str = "neighborhood_opportunities.json";
pub const SALE_MODEL_FILE: &str = "sale_model.json";
pub const RENTAL_MODEL_FILE: &str = "rental_model.json";
pub const REPORT_FILE: &str = "run_report.json";

pub fn model_file(listing_type: ListingType) -> &'static str {
    match listing_type {
        ListingType::Sale => SALE_MODEL_FILE,
        ListingType::Rental => RENTAL_MODEL_FILE,
    }
}

pub struct PipelineInput {
    pub raw: Vec<RawRecord>,
    pub config: PipelineConfig,
    pub request: OptimizerRequest,
    pub prior_sale_model: Option<ValuationModel>,
    pub prior_rental_model: Option<ValuationModel>,
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub records: Vec<PropertyRecord>,
    pub metrics: MarketMetrics,
    pub sale_model: Option<Arc<ValuationModel>>,
    pub rental_model: Option<Arc<ValuationModel>>,
    pub scored: Vec<ScoredProperty>,
    pub recommendation: Recommendation,
    pub opportunities: Vec<NeighborhoodOpportunity>,
    pub report: RunReport,
}

/// Train a fresh model, falling back to the prior artifact when training fails
fn train_stage(
    listing_type: ListingType,
    prior: Option<ValuationModel>,
    records: &[PropertyRecord],
    config: &ModelConfig,
) -> (Option<Arc<ValuationModel>>, ModelStatus) {
    let registry = match prior {
        Some(model) if model.listing_type == listing_type => ModelRegistry::with_model(model),
        Some(model) => {
            tracing::warn!(
                expected = %listing_type,
                found = %model.listing_type,
                version = %model.version,
                "ignoring prior model for the wrong listing type"
            );
            ModelRegistry::new(listing_type)
        }
        None => ModelRegistry::new(listing_type),
    };

    let error = registry.retrain(records, config).err().map(|e| e.to_string());
    let current = registry.current();
    match (&error, &current) {
        (Some(_), Some(model)) => {
            tracing::warn!(
                listing_type = %listing_type,
                version = %model.version,
                "using stale model"
            )
        }
        (Some(_), None) => {
            tracing::warn!(
                listing_type = %listing_type,
                "no valuation model available, its score inputs stay neutral"
            )
        }
        _ => {}
    }

    let status = ModelStatus::new(listing_type, current.as_deref(), error);
    (current, status)
}

pub fn run(input: PipelineInput) -> Result<PipelineOutput> {
    let PipelineInput {
        raw,
        config,
        request,
        prior_sale_model,
        prior_rental_model,
    } = input;
    let started_at = Utc::now();

    config.validate().context("invalid pipeline configuration")?;
    request.validate().context("invalid optimizer request")?;

    let batch = ListingNormalizer::new(config.normalizer.clone()).normalize_batch(&raw, started_at);
    let records = batch.records;

    let metrics = MetricsAggregator::new(config.min_samples_per_neighborhood)
        .aggregate(&records)
        .context("no canonical records survived normalization")?;

    let (sale_model, sale_status) =
        train_stage(ListingType::Sale, prior_sale_model, &records, &config.model);
    let (rental_model, rental_status) =
        train_stage(ListingType::Rental, prior_rental_model, &records, &config.model);

    let weights = config.risk_profiles.settings(request.risk_profile).weights;
    let scored = {
        let scorer = InvestmentScorer::new(
            &metrics,
            weights,
            config.scoring.clone(),
            &config.location_desirability,
        )?;
        let scorer = match sale_model.as_deref() {
            Some(model) => scorer.with_model(model),
            None => scorer,
        };
        let scorer = match rental_model.as_deref() {
            Some(model) => scorer.with_rent_model(model),
            None => scorer,
        };
        scorer.score_all(&records)
    };

    let optimizer = OpportunityOptimizer::new(&metrics, &config.risk_profiles);
    let recommendation = optimizer.recommend(&scored, &request)?;
    let opportunities = optimizer.neighborhood_opportunities(&scored, &request)?;

    let report = RunReport {
        started_at,
        finished_at: Utc::now(),
        normalization: batch.report,
        canonical_records: records.len(),
        neighborhoods: metrics.len(),
        low_confidence_neighborhoods: metrics
            .low_confidence()
            .into_iter()
            .map(String::from)
            .collect(),
        yield_ranking: metrics
            .yield_ranking()
            .into_iter()
            .map(|(name, y)| (name.to_string(), y))
            .collect(),
        models: vec![sale_status, rental_status],
        estimated_yields: scored.iter().filter(|s| s.estimated_yield.is_some()).count(),
        risk_profile: request.risk_profile,
        budget_max: request.budget_max,
        eligible_candidates: recommendation.eligible_count,
        recommendations: recommendation.items.len(),
    };

    tracing::info!(
        received = report.normalization.received,
        rejected = report.normalization.rejected,
        canonical = report.canonical_records,
        neighborhoods = report.neighborhoods,
        low_confidence = report.low_confidence_neighborhoods.len(),
        stale_models = report.stale_models().count(),
        recommendations = report.recommendations,
        "pipeline run complete"
    );

    Ok(PipelineOutput {
        records,
        metrics,
        sale_model,
        rental_model,
        scored,
        recommendation,
        opportunities,
        report,
    })
}

impl PipelineOutput {
    /// Write every table and artifact into `dir`, creating it if needed
    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let properties: Vec<PropertyRow> = self.records.iter().map(PropertyRow::from).collect();
        write_json(dir, PROPERTIES_FILE, &properties)?;
        write_json(dir, METRICS_FILE, &neighborhood_rows(&self.metrics))?;
        write_json(dir, RECOMMENDATIONS_FILE, &recommendation_rows(&self.recommendation))?;
        write_json(dir, OPPORTUNITIES_FILE, &self.opportunities)?;
        for model in [&self.sale_model, &self.rental_model].into_iter().flatten() {
            write_json(dir, model_file(model.listing_type), model.as_ref())?;
        }
        write_json(dir, REPORT_FILE, &self.report)?;

        tracing::info!(dir = %dir.display(), "outputs written");
        Ok(())
    }
}
