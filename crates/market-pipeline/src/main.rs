//! market-pipeline: turn a scraped listing feed into neighborhood metrics,
//! valuation models and ranked purchase opportunities.
//!
//! Usage:
//!   cargo run -p market-pipeline -- --input listings.json
//!   cargo run -p market-pipeline -- --input listings.jsonl --config pipeline.json \
//!       --risk-profile conservative
//!   cargo run -p market-pipeline -- --input listings.json --budget 150000 \
//!       --location pocitos --dry-run
//!   # reuse last run's models
//!   cargo run -p market-pipeline -- --input listings.json --model-in output/

mod export;
mod input;
mod pipeline;
mod report;


use anyhow::{Context, Result};
use clap::Parser;
use market_core::{PipelineConfig, RiskProfile};
use opportunity_optimizer::OptimizerRequest;
use pipeline::{PipelineInput, RENTAL_MODEL_FILE, SALE_MODEL_FILE};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "market-pipeline", about = "Real-estate market metrics and opportunity ranking")]
struct Args {
    /// Raw listings: a JSON array or JSON lines
    #[arg(long)]
    input: PathBuf,

    /// JSON configuration file. Environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// conservative | balanced | aggressive (also low | medium | high)
    #[arg(long)]
    risk_profile: Option<RiskProfile>,

    /// Maximum purchase price
    #[arg(long)]
    budget: Option<f64>,

    #[arg(long)]
    budget_min: Option<f64>,

    #[arg(long)]
    max_results: Option<usize>,

    /// Only recommend neighborhoods containing this text
    #[arg(long)]
    location: Option<String>,

    /// Directory holding sale_model.json / rental_model.json from an earlier run
    #[arg(long)]
    model_in: Option<PathBuf>,

    /// Run every stage but write nothing
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            [
                "market_pipeline=info",
                "listing_normalizer=info",
                "market_metrics=info",
                "valuation_model=info",
                "investment_scorer=info",
                "opportunity_optimizer=info",
            ]
            .join(",")
            .into()
        })
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

/// File, then environment, then command line; validated once
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(budget) = args.budget {
        config.budget_max = budget;
    }
    if let Some(min) = args.budget_min {
        config.budget_min = Some(min);
    }
    if let Some(n) = args.max_results {
        config.max_results = n;
    }

    config.validate()?;
    Ok(config)
}

fn resolve_risk_profile(args: &Args) -> Result<RiskProfile> {
    if let Some(profile) = args.risk_profile {
        return Ok(profile);
    }
    let profile = std::env::var("RISK_PROFILE").unwrap_or_else(|_| "balanced".to_string());
    profile.parse().context("invalid RISK_PROFILE")
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = load_config(&args).context("configuration rejected")?;
    let risk_profile = resolve_risk_profile(&args)?;
    tracing::info!(
        risk_profile = %risk_profile,
        budget_max = config.budget_max,
        max_results = config.max_results,
        min_samples = config.min_samples_per_neighborhood,
        "configuration loaded and validated"
    );

    let mut request = OptimizerRequest::from_config(&config, risk_profile);
    request.location = args.location.clone();

    let raw = input::read_records(&args.input)?;
    let (prior_sale_model, prior_rental_model) = match &args.model_in {
        Some(dir) => (
            input::read_model(dir, SALE_MODEL_FILE)?,
            input::read_model(dir, RENTAL_MODEL_FILE)?,
        ),
        None => (None, None),
    };

    let output = pipeline::run(PipelineInput {
        raw,
        config,
        request,
        prior_sale_model,
        prior_rental_model,
    })?;

    tracing::info!(
        scored = output.scored.len(),
        opportunity_neighborhoods = output.opportunities.len(),
        "stage outputs ready"
    );
    for item in &output.recommendation.items {
        tracing::info!(
            rank = item.rank,
            id = %item.property.record.id,
            neighborhood = %item.property.record.neighborhood,
            price = item.property.record.price,
            score = item.property.score.score,
            "recommendation"
        );
    }

    if args.dry_run {
        tracing::info!(dry_run = true, "skipping output files");
        return Ok(());
    }
    output.write(&args.output_dir)
}
