// src/pipeline/harvest.rs

//! Lab harvesting pipeline.
//!
//! For each institution: discover target pages, fetch them through the
//! acquisition client, extract raw records with the institution's faculty
//! extractor, run the lab data processor, and hand the entities to a sink.
//! Institutions run one after another; pages of one institution are fetched
//! concurrently up to `fetch.max_concurrent`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acquisition::{AcquisitionClient, ReqwestTransport, Transport};
use crate::error::Result;
use crate::models::{Config, FacultyType, Institution, Seed, ValidatedLabEntity};
use crate::services::{
    Extractor, ExtractorRegistry, KeywordAnalyzer, LabDataProcessor, ProcessingStats,
    discover_target_urls,
};
use crate::storage::LabSink;
use crate::utils::log as console;

/// A page that could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    pub error: String,
    /// `true` when retries ran out, `false` for a terminal failure
    pub exhausted: bool,
}

/// Per-institution outcome, produced even when every page failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionSummary {
    pub institution_id: u64,
    pub institution_name: String,
    pub faculty: FacultyType,
    pub urls_attempted: usize,
    /// Pages fetched successfully
    pub fetched: usize,
    pub failed: Vec<FailedUrl>,
    /// Records produced by extraction
    pub raw_records: usize,
    #[serde(flatten)]
    pub stats: ProcessingStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl InstitutionSummary {
    pub fn new(institution: &Institution, faculty: FacultyType, urls_attempted: usize) -> Self {
        let now = Utc::now();
        Self {
            institution_id: institution.id,
            institution_name: institution.name.clone(),
            faculty,
            urls_attempted,
            fetched: 0,
            failed: Vec::new(),
            raw_records: 0,
            stats: ProcessingStats::default(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Failed pages plus entities that could not be built.
    pub fn errors(&self) -> u64 {
        self.failed.len() as u64 + self.stats.construction_errors
    }
}

/// Entities and summary for one institution.
#[derive(Debug, Clone)]
pub struct InstitutionHarvest {
    pub entities: Vec<ValidatedLabEntity>,
    pub summary: InstitutionSummary,
}

/// Wires the acquisition client, extractors and analyzer together.
pub struct Harvester<T = ReqwestTransport> {
    config: Config,
    client: AcquisitionClient<T>,
    extractors: ExtractorRegistry,
    analyzer: Arc<KeywordAnalyzer>,
}

impl Harvester<ReqwestTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.clone(), AcquisitionClient::from_config(config)?)
    }
}

impl<T: Transport> Harvester<T> {
    pub fn new(config: Config, client: AcquisitionClient<T>) -> Result<Self> {
        let extractors = ExtractorRegistry::from_config(&config.extraction)?;
        Ok(Self {
            config,
            client,
            extractors,
            analyzer: Arc::new(KeywordAnalyzer::new()),
        })
    }

    pub fn client(&self) -> &AcquisitionClient<T> {
        &self.client
    }

    /// Harvest one institution.
    ///
    /// Page failures are recorded in the summary; only configuration
    /// problems (no extractor for the faculty) are returned as errors.
    pub async fn harvest_institution(&self, institution: &Institution) -> Result<InstitutionHarvest> {
        let extractor = self.extractors.for_institution(institution)?;
        let urls = discover_target_urls(institution);
        let mut summary = InstitutionSummary::new(institution, extractor.faculty(), urls.len());

        log::info!(
            "{}: {} target URLs ({} extractor)",
            institution.name,
            urls.len(),
            extractor.faculty().as_str()
        );

        let timeout = self.config.fetch.batch_timeout_secs.map(Duration::from_secs);
        let outcomes = self
            .client
            .fetch_many_with_timeout(&urls, self.config.fetch.max_concurrent, timeout)
            .await;

        let mut raw = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(body) => {
                    summary.fetched += 1;
                    raw.extend(extractor.extract(&body, &outcome.url));
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", outcome.url, e);
                    summary.failed.push(FailedUrl {
                        url: outcome.url,
                        error: e.last_error().to_string(),
                        exhausted: e.is_exhausted(),
                    });
                }
            }
        }
        summary.raw_records = raw.len();

        let mut processor = LabDataProcessor::new(self.analyzer.clone(), self.config.quality.clone());
        let entities = processor.process_batch(raw, institution);
        summary.stats = processor.stats().clone();
        summary.finished_at = Utc::now();

        Ok(InstitutionHarvest { entities, summary })
    }

    /// Harvest every institution in the seed and hand results to `sink`.
    pub async fn run(&self, seed: &Seed, sink: &dyn LabSink) -> Result<Vec<InstitutionSummary>> {
        let total = seed.institutions.len();
        let mut summaries = Vec::with_capacity(total);

        for (i, institution) in seed.institutions.iter().enumerate() {
            console::step(i + 1, total, &institution.name);
            let harvest = self.harvest_institution(institution).await?;
            let meta = sink
                .write_institution(institution, &harvest.entities, &harvest.summary)
                .await?;

            if self.config.logging.show_progress {
                let s = &harvest.summary;
                console::sub_item(&format!(
                    "pages {}/{} | raw {} | rejected {} | duplicate {} | entities {}",
                    s.fetched,
                    s.urls_attempted,
                    s.raw_records,
                    s.stats.rejected,
                    s.stats.duplicate,
                    s.stats.processed
                ));
                console::sub_item(&format!("Saved to {}", meta.location));
            }
            summaries.push(harvest.summary);
        }

        sink.write_run(&summaries).await?;
        Ok(summaries)
    }
}

/// Run a full harvest with the configured HTTP transport.
pub async fn run_harvest(
    config: &Config,
    seed: &Seed,
    sink: &dyn LabSink,
) -> Result<Vec<InstitutionSummary>> {
    console::header("Lab harvest starting");
    console::info(&format!(
        "{} institutions, {:.2} req/s per domain (burst {}), {} concurrent",
        seed.institutions.len(),
        config.rate_limit.requests_per_second,
        config.rate_limit.burst_limit,
        config.fetch.max_concurrent
    ));

    let harvester = Harvester::from_config(config)?;
    let summaries = harvester.run(seed, sink).await?;

    let sum = |f: fn(&InstitutionSummary) -> u64| summaries.iter().map(f).sum::<u64>();
    console::summary(
        "Harvest",
        &[
            ("Institutions", summaries.len().to_string()),
            ("Pages fetched", sum(|s| s.fetched as u64).to_string()),
            ("Pages failed", sum(|s| s.failed.len() as u64).to_string()),
            ("Raw records", sum(|s| s.raw_records as u64).to_string()),
            ("Rejected", sum(|s| s.stats.rejected).to_string()),
            ("Duplicates", sum(|s| s.stats.duplicate).to_string()),
            ("Entities", sum(|s| s.stats.processed).to_string()),
            ("Errors", sum(InstitutionSummary::errors).to_string()),
        ],
    );
    console::success("Lab harvest complete");
    Ok(summaries)
}
