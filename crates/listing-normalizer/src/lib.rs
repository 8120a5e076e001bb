//! Listing Normalizer
//!
//! Turns raw feed records into canonical `PropertyRecord`s. Malformed records
//! are rejected one at a time; a bad record never aborts the batch.

pub mod normalizer;
pub mod parse;

pub use normalizer::{ListingNormalizer, NormalizationReport, NormalizedBatch};
pub use parse::{parse_locale_number, parse_timestamp};
