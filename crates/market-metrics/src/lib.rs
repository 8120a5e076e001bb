//! Market Metrics
//!
//! Per-neighborhood statistics for sale and rental listings, and the
//! estimated gross annual yield where both sides are present.

pub mod aggregator;
pub mod stats;

pub use aggregator::{ListingStats, MarketMetrics, MetricsAggregator, NeighborhoodMetrics};
