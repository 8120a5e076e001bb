use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw listing as delivered by the retrieval feed: field name to loosely-typed value.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Property type assumed when the feed does not say (the source only lists apartments).
pub const DEFAULT_PROPERTY_TYPE: &str = "apartment";

/// Whether a listing is offered for sale or for rent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Sale,
    Rental,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Sale => "sale",
            ListingType::Rental => "rental",
        }
    }

    /// Map a source category onto a listing type.
    ///
    /// Only the fixed alias table below is accepted; anything else is `None`
    /// and the caller must reject the record.
    pub fn from_category(category: &str) -> Option<Self> {
        match category.trim().to_lowercase().as_str() {
            "sale" | "venta" => Some(ListingType::Sale),
            "rental" | "alquiler" => Some(ListingType::Rental),
            _ => None,
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size bucket by floor area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBand {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl SizeBand {
    pub fn from_area(area_m2: f64) -> Self {
        match area_m2 {
            a if a < 50.0 => SizeBand::Small,
            a if a < 80.0 => SizeBand::Medium,
            a if a < 120.0 => SizeBand::Large,
            _ => SizeBand::ExtraLarge,
        }
    }
}

/// Price bucket for sale listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBand {
    Economy,
    Mid,
    High,
    Premium,
}

impl PriceBand {
    pub fn from_price(price: f64) -> Self {
        match price {
            p if p < 100_000.0 => PriceBand::Economy,
            p if p < 200_000.0 => PriceBand::Mid,
            p if p < 300_000.0 => PriceBand::High,
            _ => PriceBand::Premium,
        }
    }
}

/// Canonical, validated listing.
///
/// Only the normalizer builds these; every downstream stage reads them.
/// Invariants: `price > 0`, `area_m2 > 0`, `neighborhood` non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: String,
    pub listing_type: ListingType,
    pub neighborhood: String,
    /// Sale price, or monthly rent for rentals
    pub price: f64,
    pub area_m2: f64,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<u32>,
    pub property_type: String,
    pub listed_at: DateTime<Utc>,
}

impl PropertyRecord {
    pub fn price_per_m2(&self) -> f64 {
        self.price / self.area_m2
    }

    pub fn size_band(&self) -> SizeBand {
        SizeBand::from_area(self.area_m2)
    }

    /// Price band, only meaningful for sale listings
    pub fn price_band(&self) -> Option<PriceBand> {
        match self.listing_type {
            ListingType::Sale => Some(PriceBand::from_price(self.price)),
            ListingType::Rental => None,
        }
    }
}

/// Canonical neighborhood spelling: trimmed, inner whitespace collapsed, title case.
///
/// Used both for incoming records and for configuration keys so lookups agree.
pub fn normalize_neighborhood(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical spelling for free-form category labels such as property type.
pub fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
