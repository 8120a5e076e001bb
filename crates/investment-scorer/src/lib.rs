//! Investment scoring
//!
//! Scores each listing on four components in [0, 1] and combines them with
//! the weights of the active risk profile.

pub mod components;
pub mod scorer;

pub use components::{ScoreComponents, NEUTRAL};
pub use scorer::{ComponentBreakdown, InvestmentScore, InvestmentScorer, ScoredProperty};
