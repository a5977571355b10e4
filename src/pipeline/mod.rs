//! Pipeline entry points for harvester operations.
//!
//! - `run_harvest`: Fetch, extract and process labs for every institution
//! - `run_validate`: Check config and seed data
//! - `run_analyze`: Score a single research description

pub mod analyze;
pub mod harvest;
pub mod validate;

pub use analyze::run_analyze;
pub use harvest::{
    FailedUrl, Harvester, InstitutionHarvest, InstitutionSummary, run_harvest,
};
pub use validate::run_validate;
