use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a raw record was rejected by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MissingField,
    InvalidPrice,
    InvalidArea,
    InvalidType,
    OutOfRange,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::MissingField => "missing_field",
            RejectionReason::InvalidPrice => "invalid_price",
            RejectionReason::InvalidArea => "invalid_area",
            RejectionReason::InvalidType => "invalid_type",
            RejectionReason::OutOfRange => "out_of_range",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed raw record. Recovered locally: the record is dropped, the batch continues.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason} on field '{field}': {detail}")]
pub struct ValidationError {
    pub reason: RejectionReason,
    pub field: String,
    pub detail: String,
}

impl ValidationError {
    pub fn new(reason: RejectionReason, field: &str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(RejectionReason::MissingField, field, "field is absent or empty")
    }
}

/// Categorical model input that can be unseen at prediction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryField {
    Neighborhood,
    PropertyType,
}

impl fmt::Display for CategoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryField::Neighborhood => f.write_str("neighborhood"),
            CategoryField::PropertyType => f.write_str("property type"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Insufficient data for {context}: need at least {required}, got {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("Unknown {field} '{value}': never seen in training")]
    UnknownCategory { field: CategoryField, value: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MarketError {
    pub fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        MarketError::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        MarketError::Configuration(msg.into())
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
