//! Persistence hand-off for validated lab entities.
//!
//! The pipeline hands `pending` entities to a [`LabSink`]; durable identity
//! and status review belong to whatever sits behind it. The bundled
//! [`JsonFileSink`] writes snapshots for inspection and downstream import.
//!
//! ## Directory Structure
//!
//! ```text
//! output/
//! ├── run.json              # Summaries of the last run
//! └── labs/
//!     ├── 1.json            # Entities + summary per institution
//!     └── 2.json
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Institution, ValidatedLabEntity};
use crate::pipeline::InstitutionSummary;

pub use local::JsonFileSink;

/// Metadata about a sink write.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    /// Number of entities written
    pub entity_count: usize,
    /// Where they went
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything harvested for one institution in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionSnapshot {
    pub written_at: DateTime<Utc>,
    pub institution_id: u64,
    pub institution_name: String,
    pub summary: InstitutionSummary,
    pub entities: Vec<ValidatedLabEntity>,
}

/// Totals across all institutions of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub written_at: DateTime<Utc>,
    pub institution_count: usize,
    pub entity_count: u64,
    pub error_count: u64,
    pub institutions: Vec<InstitutionSummary>,
}

impl RunReport {
    pub fn new(summaries: &[InstitutionSummary]) -> Self {
        Self {
            written_at: Utc::now(),
            institution_count: summaries.len(),
            entity_count: summaries.iter().map(|s| s.stats.processed).sum(),
            error_count: summaries.iter().map(InstitutionSummary::errors).sum(),
            institutions: summaries.to_vec(),
        }
    }
}

/// Receiver of pipeline output.
#[async_trait]
pub trait LabSink: Send + Sync {
    /// Hand over one institution's entities and summary.
    async fn write_institution(
        &self,
        institution: &Institution,
        entities: &[ValidatedLabEntity],
        summary: &InstitutionSummary,
    ) -> Result<WriteMetadata>;

    /// Record the summaries of a whole run.
    async fn write_run(&self, summaries: &[InstitutionSummary]) -> Result<()>;
}
