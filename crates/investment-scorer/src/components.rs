use market_core::{ScoreWeights, YieldNormalization};
use market_metrics::stats::{min_max_position, percentile_rank};
use market_metrics::ListingStats;
use serde::{Deserialize, Serialize};

/// Score used whenever a component's input is missing
pub const NEUTRAL: f64 = 0.5;

/// The four sub-scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub yield_score: f64,
    pub relative_price: f64,
    pub size: f64,
    pub location: f64,
}

impl ScoreComponents {
    /// Same order as `ScoreWeights::as_array`
    pub fn as_array(&self) -> [f64; 4] {
        [self.yield_score, self.relative_price, self.size, self.location]
    }

    /// Weighted sum, clamped to [0, 1]. Zero weights contribute exactly nothing,
    /// so a single unit weight returns that component unchanged.
    pub fn composite(&self, weights: &ScoreWeights) -> f64 {
        self.as_array()
            .iter()
            .zip(weights.as_array())
            .fold(0.0, |acc, (c, w)| acc + c * w)
            .clamp(0.0, 1.0)
    }
}

/// Neighborhood yield against every neighborhood yield in the run
pub fn yield_score(
    neighborhood_yield: Option<f64>,
    all_yields: &[f64],
    method: YieldNormalization,
) -> f64 {
    let Some(y) = neighborhood_yield else {
        return NEUTRAL;
    };
    if all_yields.is_empty() {
        return NEUTRAL;
    }
    let score = match method {
        YieldNormalization::Percentile => percentile_rank(y, all_yields),
        YieldNormalization::MinMax => min_max_position(y, all_yields),
    };
    score.clamp(0.0, 1.0)
}

/// How far below the predicted price a listing is asking.
///
/// At or above the prediction scores 0; a discount of `max_discount` or more scores 1.
pub fn relative_price_score(price: f64, predicted: Option<f64>, max_discount: f64) -> f64 {
    let Some(predicted) = predicted.filter(|p| p.is_finite() && *p > 0.0) else {
        return NEUTRAL;
    };
    let discount = (predicted - price) / predicted;
    if discount <= 0.0 {
        return 0.0;
    }
    if max_discount <= 0.0 {
        return 1.0;
    }
    (discount / max_discount).clamp(0.0, 1.0)
}

/// Triangular preference peaking at the neighborhood's median area and
/// falling to 0 at its smallest and largest listings.
pub fn size_score(area_m2: f64, stats: Option<&ListingStats>) -> f64 {
    let Some(stats) = stats else {
        return NEUTRAL;
    };
    let (lo, mid, hi) = (stats.min_area_m2, stats.median_area_m2, stats.max_area_m2);
    if hi - lo < f64::EPSILON {
        return NEUTRAL;
    }

    let score = if area_m2 <= mid {
        if mid - lo < f64::EPSILON {
            1.0
        } else {
            (area_m2 - lo) / (mid - lo)
        }
    } else if hi - mid < f64::EPSILON {
        1.0
    } else {
        (hi - area_m2) / (hi - mid)
    };
    score.clamp(0.0, 1.0)
}

pub fn location_score(desirability: Option<f64>) -> f64 {
    desirability.map_or(NEUTRAL, |d| d.clamp(0.0, 1.0))
}
