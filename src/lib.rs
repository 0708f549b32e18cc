//! Flotilla - Proxy Fleet Management Plane
//!
//! Turns raw candidate proxies from upstream vendors into a ranked,
//! selectable pool and keeps the ranking honest with live usage feedback.
//!
//! ## Pipeline
//!
//! - Provider adapters normalize vendor responses into canonical records
//! - The validator probes each candidate through a reflection target and
//!   classifies its anonymity level
//! - The quality scorer aggregates probe and usage outcomes into a bounded
//!   score per address
//! - The scheduler indexes live proxies by score, serves best-match
//!   selections, and folds usage feedback back into the scorer

pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod scorer;
pub mod services;
pub mod store;
pub mod validator;

pub use config::Config;
pub use error::{PoolError, Result};
pub use scheduler::Scheduler;
pub use scorer::{QualityScorer, Scorer};
pub use validator::Validator;
