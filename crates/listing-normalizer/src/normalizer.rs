use crate::parse::{parse_timestamp, value_as_count, value_as_number};
use chrono::{DateTime, Utc};
use market_core::{
    normalize_label, normalize_neighborhood, ListingType, NormalizerConfig, PropertyRecord,
    RawRecord, RejectionReason, ValidationError, DEFAULT_PROPERTY_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

// Accepted spellings per canonical field, first match wins.
const ID_KEYS: &[&str] = &["id", "listing_id", "url"];
const LISTING_TYPE_KEYS: &[&str] = &["listing_type", "category", "operation", "tipo_operacion"];
const NEIGHBORHOOD_KEYS: &[&str] = &["neighborhood", "barrio"];
const PRICE_KEYS: &[&str] = &["price", "precio"];
const AREA_KEYS: &[&str] = &["area_m2", "area", "metros_cuadrados"];
const BEDROOM_KEYS: &[&str] = &["bedrooms", "dormitorios"];
const BATHROOM_KEYS: &[&str] = &["bathrooms", "baños", "banos"];
const PROPERTY_TYPE_KEYS: &[&str] = &["property_type", "tipo_propiedad"];
const LISTED_AT_KEYS: &[&str] = &["listed_at", "timestamp", "fecha_scraping"];

/// Accepted vs rejected counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub received: usize,
    /// Records that passed validation, before de-duplication
    pub accepted: usize,
    pub rejected: usize,
    /// Older copies of an identifier dropped in favor of the newest listing
    pub duplicates_dropped: usize,
    pub rejections: BTreeMap<RejectionReason, usize>,
}

impl NormalizationReport {
    /// Canonical records left after de-duplication
    pub fn unique(&self) -> usize {
        self.accepted - self.duplicates_dropped
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    /// De-duplicated, ordered by identifier
    pub records: Vec<PropertyRecord>,
    pub report: NormalizationReport,
}

/// Validates and coerces raw listings
pub struct ListingNormalizer {
    config: NormalizerConfig,
}

impl Default for ListingNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl ListingNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize a single raw record.
    ///
    /// `ingested_at` stands in for the listing timestamp when the feed omits it.
    pub fn normalize(
        &self,
        raw: &RawRecord,
        ingested_at: DateTime<Utc>,
    ) -> Result<PropertyRecord, ValidationError> {
        let id = match field(raw, ID_KEYS) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ValidationError::missing("id")),
        };

        let category = match field(raw, LISTING_TYPE_KEYS) {
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(ValidationError::new(
                    RejectionReason::InvalidType,
                    "listing_type",
                    format!("expected a category label, got {other}"),
                ))
            }
            None => return Err(ValidationError::missing("listing_type")),
        };
        let listing_type = ListingType::from_category(category).ok_or_else(|| {
            ValidationError::new(
                RejectionReason::InvalidType,
                "listing_type",
                format!("unrecognized category '{category}'"),
            )
        })?;

        let neighborhood = match field(raw, NEIGHBORHOOD_KEYS) {
            Some(Value::String(s)) => normalize_neighborhood(s),
            _ => String::new(),
        };
        if neighborhood.is_empty() {
            return Err(ValidationError::missing("neighborhood"));
        }

        let price = positive_number(raw, PRICE_KEYS, "price", RejectionReason::InvalidPrice)?;
        let area_m2 = positive_number(raw, AREA_KEYS, "area_m2", RejectionReason::InvalidArea)?;

        if let Some(range) = self.config.price_range(listing_type) {
            if !range.contains(price) {
                return Err(ValidationError::new(
                    RejectionReason::OutOfRange,
                    "price",
                    format!("{price} outside {}..{} for {listing_type}", range.min, range.max),
                ));
            }
        }
        if let Some(range) = self.config.area_range {
            if !range.contains(area_m2) {
                return Err(ValidationError::new(
                    RejectionReason::OutOfRange,
                    "area_m2",
                    format!("{area_m2} outside {}..{}", range.min, range.max),
                ));
            }
        }

        let property_type = match field(raw, PROPERTY_TYPE_KEYS) {
            Some(Value::String(s)) if !s.trim().is_empty() => normalize_label(s),
            _ => DEFAULT_PROPERTY_TYPE.to_string(),
        };

        Ok(PropertyRecord {
            id,
            listing_type,
            neighborhood,
            price,
            area_m2,
            bedrooms: field(raw, BEDROOM_KEYS).and_then(value_as_count),
            bathrooms: field(raw, BATHROOM_KEYS).and_then(value_as_count),
            property_type,
            listed_at: listed_at(raw).unwrap_or(ingested_at),
        })
    }

    /// Normalize a whole feed, dropping bad records and keeping only the most
    /// recently listed copy of each identifier. A copy with a parsed timestamp
    /// always beats one stamped with `ingested_at`. Equal timestamps keep the
    /// copy whose serialized form sorts last, so feed order never decides.
    pub fn normalize_batch(
        &self,
        raw: &[RawRecord],
        ingested_at: DateTime<Utc>,
    ) -> NormalizedBatch {
        let mut report = NormalizationReport {
            received: raw.len(),
            ..Default::default()
        };
        // Canonical record plus whether its timestamp came from the feed
        let mut by_id: BTreeMap<String, (PropertyRecord, bool)> = BTreeMap::new();

        for record in raw {
            match self.normalize(record, ingested_at) {
                Ok(property) => {
                    report.accepted += 1;
                    let entry = (property, listed_at(record).is_some());
                    match by_id.entry(entry.0.id.clone()) {
                        Entry::Vacant(slot) => {
                            slot.insert(entry);
                        }
                        Entry::Occupied(mut slot) => {
                            report.duplicates_dropped += 1;
                            if supersedes(&entry, slot.get()) {
                                slot.insert(entry);
                            }
                        }
                    }
                }
                Err(err) => {
                    report.rejected += 1;
                    *report.rejections.entry(err.reason).or_insert(0) += 1;
                    let id = field(record, ID_KEYS).map(|v| v.to_string()).unwrap_or_default();
                    tracing::debug!(
                        id = %id,
                        reason = %err.reason,
                        field = %err.field,
                        "rejected raw listing: {}",
                        err.detail
                    );
                }
            }
        }

        tracing::info!(
            received = report.received,
            accepted = report.accepted,
            rejected = report.rejected,
            duplicates_dropped = report.duplicates_dropped,
            "normalized listing batch"
        );

        NormalizedBatch {
            records: by_id.into_values().map(|(record, _)| record).collect(),
            report,
        }
    }
}

fn listed_at(raw: &RawRecord) -> Option<DateTime<Utc>> {
    field(raw, LISTED_AT_KEYS).and_then(parse_timestamp)
}

/// Dated copies outrank undated ones, then newer outranks older.
fn supersedes(
    (candidate, candidate_dated): &(PropertyRecord, bool),
    (current, current_dated): &(PropertyRecord, bool),
) -> bool {
    let order = candidate_dated
        .cmp(current_dated)
        .then_with(|| candidate.listed_at.cmp(&current.listed_at));
    match order {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            let key = |r: &PropertyRecord| serde_json::to_string(r).unwrap_or_default();
            key(candidate) > key(current)
        }
    }
}

/// First present, non-null, non-blank value among the aliases
fn field<'a>(raw: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| raw.get(*k)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn positive_number(
    raw: &RawRecord,
    keys: &[&str],
    name: &str,
    reason: RejectionReason,
) -> Result<f64, ValidationError> {
    let value = field(raw, keys).ok_or_else(|| ValidationError::missing(name))?;
    match value_as_number(value) {
        Some(n) if n > 0.0 => Ok(n),
        Some(n) => Err(ValidationError::new(reason, name, format!("must be positive, got {n}"))),
        None => Err(ValidationError::new(reason, name, format!("cannot parse {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use market_core::ValueRange;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test records must be JSON objects"),
        }
    }

    fn ingested() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_locale_price_is_stripped() {
        let record = raw(json!({
            "id": "p-1", "listing_type": "sale", "neighborhood": "pocitos",
            "price": "USD 1.200.000", "area_m2": 120, "bedrooms": 3, "bathrooms": 2
        }));
        let property = ListingNormalizer::default().normalize(&record, ingested()).unwrap();
        assert_eq!(property.price, 1_200_000.0);
        assert_eq!(property.neighborhood, "Pocitos");
        assert_eq!(property.property_type, DEFAULT_PROPERTY_TYPE);
        assert_eq!(property.listed_at, ingested());
    }

    #[test]
    fn test_missing_area_is_missing_field() {
        let record = raw(json!({
            "id": "p-2", "listing_type": "sale", "neighborhood": "Pocitos", "price": 100000
        }));
        let err = ListingNormalizer::default().normalize(&record, ingested()).unwrap_err();
        assert_eq!(err.reason, RejectionReason::MissingField);
        assert_eq!(err.field, "area_m2");
    }

    #[test]
    fn test_spanish_source_fields() {
        let record = raw(json!({
            "url": "https://example.test/p/9", "tipo_operacion": "alquiler", "barrio": " CORDÓN ",
            "precio": "U$S 850", "metros_cuadrados": "45 m²", "dormitorios": 1, "baños": "1",
            "fecha_scraping": "2024-05-20 10:00:00"
        }));
        let property = ListingNormalizer::default().normalize(&record, ingested()).unwrap();
        assert_eq!(property.listing_type, ListingType::Rental);
        assert_eq!(property.neighborhood, "Cordón");
        assert_eq!(property.price, 850.0);
        assert_eq!(property.area_m2, 45.0);
        assert_eq!(property.bathrooms, Some(1));
        assert_eq!(property.listed_at, Utc.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_unknown_category_rejected_not_guessed() {
        let record = raw(json!({
            "id": "p-3", "listing_type": "temporary", "neighborhood": "Centro",
            "price": 500, "area_m2": 40
        }));
        let err = ListingNormalizer::default().normalize(&record, ingested()).unwrap_err();
        assert_eq!(err.reason, RejectionReason::InvalidType);
    }

    #[test]
    fn test_non_positive_values() {
        let normalizer = ListingNormalizer::default();
        let zero_price = raw(json!({
            "id": "a", "listing_type": "sale", "neighborhood": "Centro", "price": 0, "area_m2": 40
        }));
        assert_eq!(
            normalizer.normalize(&zero_price, ingested()).unwrap_err().reason,
            RejectionReason::InvalidPrice
        );
        let bad_area = raw(json!({
            "id": "b", "listing_type": "sale", "neighborhood": "Centro",
            "price": 1000, "area_m2": "n/a"
        }));
        assert_eq!(
            normalizer.normalize(&bad_area, ingested()).unwrap_err().reason,
            RejectionReason::InvalidArea
        );
    }

    #[test]
    fn test_range_filters() {
        let normalizer = ListingNormalizer::new(NormalizerConfig {
            sale_price_range: Some(ValueRange::new(50_000.0, 500_000.0)),
            rental_price_range: None,
            area_range: Some(ValueRange::new(30.0, 200.0)),
        });
        let cheap_sale = raw(json!({
            "id": "a", "listing_type": "sale", "neighborhood": "Centro",
            "price": 20000, "area_m2": 40
        }));
        assert_eq!(
            normalizer.normalize(&cheap_sale, ingested()).unwrap_err().reason,
            RejectionReason::OutOfRange
        );
        let rental = raw(json!({
            "id": "b", "listing_type": "rental", "neighborhood": "Centro",
            "price": 700, "area_m2": 40
        }));
        assert!(normalizer.normalize(&rental, ingested()).is_ok());
    }

    #[test]
    fn test_batch_dedup_keeps_newest_and_counts() {
        let feed = vec![
            raw(json!({"id": "x", "listing_type": "sale", "neighborhood": "Buceo",
                "price": 150000, "area_m2": 70, "listed_at": "2024-05-02T00:00:00Z"})),
            raw(json!({"id": "x", "listing_type": "sale", "neighborhood": "Buceo",
                "price": 140000, "area_m2": 70, "listed_at": "2024-05-10T00:00:00Z"})),
            raw(json!({"id": "x", "listing_type": "sale", "neighborhood": "Buceo",
                "price": 160000, "area_m2": 70, "listed_at": "2024-04-01T00:00:00Z"})),
            raw(json!({"id": "y", "listing_type": "sale", "neighborhood": "Buceo",
                "price": 99000})),
            raw(json!({"id": "z", "listing_type": "leasehold", "neighborhood": "Buceo",
                "price": 99000, "area_m2": 50})),
        ];

        let batch = ListingNormalizer::default().normalize_batch(&feed, ingested());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].price, 140_000.0);
        assert_eq!(batch.report.received, 5);
        assert_eq!(batch.report.accepted, 3);
        assert_eq!(batch.report.rejected, 2);
        assert_eq!(batch.report.duplicates_dropped, 2);
        assert_eq!(batch.report.unique(), 1);
        assert_eq!(batch.report.rejections[&RejectionReason::MissingField], 1);
        assert_eq!(batch.report.rejections[&RejectionReason::InvalidType], 1);
    }

    #[test]
    fn test_dated_copy_beats_undated_copy() {
        let dated = raw(json!({"id": "x", "listing_type": "sale", "neighborhood": "Buceo",
            "price": 140000, "area_m2": 70, "listed_at": "2024-05-10T00:00:00Z"}));
        let undated = raw(json!({"id": "x", "listing_type": "sale", "neighborhood": "Buceo",
            "price": 999999, "area_m2": 70}));

        let normalizer = ListingNormalizer::default();
        for feed in [[dated.clone(), undated.clone()], [undated, dated]] {
            let batch = normalizer.normalize_batch(&feed, Utc::now());
            assert_eq!(batch.records.len(), 1);
            assert_eq!(batch.records[0].price, 140_000.0);
            assert_eq!(batch.report.duplicates_dropped, 1);
        }
    }

    #[test]
    fn test_duplicate_tie_ignores_feed_order() {
        let a = raw(json!({"id": "t", "listing_type": "sale", "neighborhood": "Centro",
            "price": 90000, "area_m2": 50, "listed_at": "2024-05-01T00:00:00Z"}));
        let b = raw(json!({"id": "t", "listing_type": "sale", "neighborhood": "Centro",
            "price": 95000, "area_m2": 50, "listed_at": "2024-05-01T00:00:00Z"}));

        let normalizer = ListingNormalizer::default();
        let forward = normalizer.normalize_batch(&[a.clone(), b.clone()], ingested());
        let backward = normalizer.normalize_batch(&[b, a], ingested());
        assert_eq!(forward.records, backward.records);
        assert_eq!(forward.report.duplicates_dropped, 1);
    }

    #[test]
    fn test_accepted_records_are_positive() {
        let feed: Vec<RawRecord> = [
            json!({"id": 1, "listing_type": "sale", "neighborhood": "Malvín",
                "price": "-10", "area_m2": 50}),
            json!({"id": 2, "listing_type": "sale", "neighborhood": "Malvín",
                "price": "95.000", "area_m2": "0"}),
            json!({"id": 3, "listing_type": "rental", "neighborhood": "Malvín",
                "price": "18,5", "area_m2": "33,5"}),
            json!({"id": 4, "listing_type": "sale", "neighborhood": "", "price": 1, "area_m2": 1}),
        ]
        .into_iter()
        .map(raw)
        .collect();

        let batch = ListingNormalizer::default().normalize_batch(&feed, ingested());
        assert_eq!(batch.records.len(), 1);
        for record in &batch.records {
            assert!(record.price > 0.0);
            assert!(record.area_m2 > 0.0);
            assert!(!record.neighborhood.is_empty());
        }
    }
}
