pub mod config;
pub mod error;
pub mod risk;
pub mod types;

pub use config::*;
pub use error::*;
pub use risk::*;
pub use types::*;
