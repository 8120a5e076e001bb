pub mod features;
pub mod fit;
pub mod model;
pub mod registry;
pub mod split;

pub use features::{FeatureSchema, Standardizer};
pub use model::{
    CandidateReport, FeatureImportance, Prediction, TrainingMetadata, ValidationReport,
    ValuationModel,
};
pub use registry::ModelRegistry;
