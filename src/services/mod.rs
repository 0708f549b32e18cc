//! Background services

pub mod ingestion;
pub mod retirement;

pub use ingestion::{IngestionConfig, IngestionHandle, IngestionService};
pub use retirement::{RetirementConfig, RetirementHandle, RetirementService};
