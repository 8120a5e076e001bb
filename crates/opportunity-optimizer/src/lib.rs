pub mod optimizer;
pub mod summary;

pub use optimizer::{OpportunityOptimizer, OptimizerRequest, Recommendation, RecommendationItem};
pub use summary::NeighborhoodOpportunity;
