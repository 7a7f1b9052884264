//! `courier-recon`: message/status reconciliation engine.
//!
//! Pure engine crate: receives already materialized message and status
//! records, returns one unified row per message, suspected duplicate pairs
//! and a data-quality report. No CLI or IO dependencies.

pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod feed;
pub mod model;
pub mod quality;
pub mod resolve;
pub mod unify;
pub mod validate;

pub use config::ReconConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{ReconInput, ReconResult, RawRecord};
