use crate::model::ValuationModel;
use market_core::{ListingType, MarketResult, ModelConfig, PropertyRecord};
use std::sync::{Arc, Mutex, RwLock};

/// Holds the active model for one listing type.
///
/// At most one training run is active per registry; readers clone an `Arc`
/// and keep pricing with that version even while a retrain swaps in the next.
#[derive(Debug)]
pub struct ModelRegistry {
    listing_type: ListingType,
    training: Mutex<()>,
    current: RwLock<Option<Arc<ValuationModel>>>,
}

impl ModelRegistry {
    pub fn new(listing_type: ListingType) -> Self {
        Self {
            listing_type,
            training: Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    /// Start from a previously persisted artifact
    pub fn with_model(model: ValuationModel) -> Self {
        let registry = Self::new(model.listing_type);
        registry.install(model);
        registry
    }

    pub fn listing_type(&self) -> ListingType {
        self.listing_type
    }

    pub fn current(&self) -> Option<Arc<ValuationModel>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Train on `records` and swap the result in. On failure the previous
    /// model stays active and the error is returned to the caller.
    pub fn retrain(
        &self,
        records: &[PropertyRecord],
        config: &ModelConfig,
    ) -> MarketResult<Arc<ValuationModel>> {
        let _training = self.training.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match ValuationModel::train(self.listing_type, records, config) {
            Ok(model) => Ok(self.install(model)),
            Err(e) => {
                let prior = self.current().map(|m| m.version.clone());
                tracing::warn!(
                    listing_type = %self.listing_type,
                    prior_version = ?prior,
                    error = %e,
                    "retraining failed, keeping prior model"
                );
                Err(e)
            }
        }
    }

    fn install(&self, model: ValuationModel) -> Arc<ValuationModel> {
        let model = Arc::new(model);
        let mut slot = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::clone(&model));
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_core::MarketError;

    fn sale(i: usize) -> PropertyRecord {
        let area = 40.0 + ((i * 13) % 50) as f64;
        PropertyRecord {
            id: format!("s{i}"),
            listing_type: ListingType::Sale,
            neighborhood: if i % 2 == 0 { "Pocitos" } else { "Buceo" }.to_string(),
            price: 2_100.0 * area + 5_000.0 * (i % 3) as f64,
            area_m2: area,
            bedrooms: Some(1 + (i % 3) as u32),
            bathrooms: Some(1),
            property_type: "apartment".to_string(),
            listed_at: Utc::now(),
        }
    }

    #[test]
    fn test_failed_retrain_keeps_prior_model() {
        let registry = ModelRegistry::new(ListingType::Sale);
        let records: Vec<PropertyRecord> = (0..20).map(sale).collect();
        let first = registry.retrain(&records, &ModelConfig::default()).unwrap();

        let err = registry.retrain(&records[..3], &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, MarketError::InsufficientData { .. }));
        assert_eq!(registry.current().unwrap().version, first.version);
    }

    #[test]
    fn test_readers_keep_their_version_across_swap() {
        let registry = ModelRegistry::new(ListingType::Sale);
        let first: Vec<PropertyRecord> = (0..20).map(sale).collect();
        let second: Vec<PropertyRecord> = (10..40).map(sale).collect();

        let held = registry.retrain(&first, &ModelConfig::default()).unwrap();
        let next = registry.retrain(&second, &ModelConfig::default()).unwrap();

        assert_ne!(held.version, next.version);
        assert_eq!(registry.current().unwrap().version, next.version);
        assert!(held.predict(&sale(5)).is_ok());
    }

    #[test]
    fn test_concurrent_retrains_are_serialized() {
        let registry = ModelRegistry::new(ListingType::Sale);
        let records: Vec<PropertyRecord> = (0..30).map(sale).collect();

        let versions: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        registry
                            .retrain(&records, &ModelConfig::default())
                            .map(|m| m.version.clone())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });

        let current = registry.current().unwrap();
        assert!(versions.iter().all(|v| *v == current.version));
    }
}
