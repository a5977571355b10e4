//! Lab data processing pipeline.
//!
//! One [`LabDataProcessor`] handles the raw records of one institution
//! through five ordered stages:
//!
//! 1. basic validation (lengths + meaningful content)
//! 2. deduplication by normalized signature
//! 3. enrichment with the keyword analyzer
//! 4. quality filtering
//! 5. entity construction
//!
//! No stage fails the batch. Dropped records are counted in
//! [`ProcessingStats`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{
    EnrichedRecord, Institution, Provenance, QualityConfig, RawRecord, UnitScore,
    ValidatedLabEntity,
};
use crate::services::analyzer::KeywordAnalyzer;
use crate::utils::text::{TermList, char_len, normalize_key};

const MIN_NAME_CHARS: usize = 3;
const MIN_PROFESSOR_CHARS: usize = 2;
const MIN_MEANINGFUL_TERMS: usize = 2;

const RESEARCH_ACTION_WORDS: &[&str] = &[
    "研究", "research", "開発", "development", "解析", "analysis", "実験", "experiment", "検討",
    "調査", "investigation", "技術", "technology", "手法", "method", "理論", "theory",
];

/// Deduplication key: case-folded name, professor and institution with
/// whitespace and punctuation removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn new(name: &str, professor_name: &str, institution_id: u64) -> Self {
        Self(format!(
            "{}#{}#{}",
            normalize_key(name),
            normalize_key(professor_name),
            institution_id
        ))
    }

    pub fn of(record: &RawRecord) -> Self {
        Self::new(&record.name, &record.professor_name, record.institution_id)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a record was dropped before entity construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ContentTooShort,
    ContentNotMeaningful,
    NameTooShort,
    ProfessorMissing,
    LowQuality,
}

/// Cumulative counters for one processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Entities produced
    pub processed: u64,
    /// Records dropped by validation or quality filtering
    pub rejected: u64,
    pub duplicate: u64,
    /// Records the analyzer enriched successfully
    pub enriched: u64,
    /// Records passed through unenriched after an analyzer error
    pub enrichment_warnings: u64,
    /// Records dropped because the entity could not be built
    pub construction_errors: u64,
    #[serde(default)]
    pub rejections: BTreeMap<RejectionReason, u64>,
}

impl ProcessingStats {
    fn reject(&mut self, reason: RejectionReason) {
        self.rejected += 1;
        *self.rejections.entry(reason).or_insert(0) += 1;
    }
}

/// A record that passed quality filtering, with its score.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: EnrichedRecord,
    pub quality: UnitScore,
}

/// Turns raw records of one institution into validated lab entities.
///
/// Counters accumulate across calls. Use one processor per institution
/// batch; do not share one between concurrent runs.
pub struct LabDataProcessor {
    analyzer: Arc<KeywordAnalyzer>,
    config: QualityConfig,
    research_words: TermList,
    stats: ProcessingStats,
}

impl LabDataProcessor {
    pub fn new(analyzer: Arc<KeywordAnalyzer>, config: QualityConfig) -> Self {
        Self {
            analyzer,
            config,
            research_words: TermList::new(RESEARCH_ACTION_WORDS),
            stats: ProcessingStats::default(),
        }
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Run all stages over one batch.
    pub fn process_batch(
        &mut self,
        records: Vec<RawRecord>,
        institution: &Institution,
    ) -> Vec<ValidatedLabEntity> {
        let input = records.len();
        log::info!("{}: processing {} raw records", institution.name, input);

        let validated = self.validate(records);
        log::info!("Basic validation: {}/{} passed", validated.len(), input);

        let before_dedup = validated.len();
        let unique = self.deduplicate(validated);
        log::info!(
            "Deduplication: {} kept ({} duplicates)",
            unique.len(),
            before_dedup - unique.len()
        );

        let enriched = self.enrich(unique, institution);
        log::info!("Enrichment: {} records", enriched.len());

        let before_filter = enriched.len();
        let accepted = self.filter_by_quality(enriched);
        log::info!(
            "Quality filtering: {} kept ({} below threshold)",
            accepted.len(),
            before_filter - accepted.len()
        );

        let entities = self.construct(accepted, institution);
        log::info!("{}: {} lab entities ready", institution.name, entities.len());
        entities
    }

    /// Stage 1: drop records failing the basic requirements.
    pub fn validate(&mut self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            match self.check_basic(&record) {
                Ok(()) => kept.push(record),
                Err(reason) => {
                    log::debug!("Rejected '{}': {:?}", record.name, reason);
                    self.stats.reject(reason);
                }
            }
        }
        kept
    }

    fn check_basic(&self, record: &RawRecord) -> Result<(), RejectionReason> {
        if char_len(record.content.trim()) < self.config.min_content_length {
            return Err(RejectionReason::ContentTooShort);
        }
        if !self.is_meaningful_content(&record.content) {
            return Err(RejectionReason::ContentNotMeaningful);
        }
        if char_len(record.name.trim()) < MIN_NAME_CHARS {
            return Err(RejectionReason::NameTooShort);
        }
        if char_len(record.professor_name.trim()) < MIN_PROFESSOR_CHARS {
            return Err(RejectionReason::ProfessorMissing);
        }
        Ok(())
    }

    /// Content names at least two distinct research-action words.
    pub fn is_meaningful_content(&self, content: &str) -> bool {
        self.research_words.distinct_in(&content.to_lowercase()) >= MIN_MEANINGFUL_TERMS
    }

    /// Stage 2: keep the first record per signature.
    pub fn deduplicate(&mut self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(Signature::of(&record)) {
                unique.push(record);
            } else {
                self.stats.duplicate += 1;
            }
        }
        unique
    }

    /// Stage 3: attach analyzer output. Records the analyzer cannot handle
    /// pass through unenriched.
    pub fn enrich(
        &mut self,
        records: Vec<RawRecord>,
        institution: &Institution,
    ) -> Vec<EnrichedRecord> {
        records
            .into_iter()
            .map(|record| {
                let provenance = Provenance::now(institution);
                match self.analyzer.analyze(&record.content) {
                    Ok(enrichment) => {
                        self.stats.enriched += 1;
                        EnrichedRecord::enriched(record, enrichment, provenance)
                    }
                    Err(e) => {
                        log::warn!("Enrichment failed for '{}': {}", record.name, e);
                        self.stats.enrichment_warnings += 1;
                        EnrichedRecord::unenriched(record, provenance)
                    }
                }
            })
            .collect()
    }

    /// Weighted completeness of a record, in `[0, 1]`.
    ///
    /// Each signal contributes its weight when met; the sum is divided by
    /// the total weight of all signals.
    pub fn quality_score(&self, record: &EnrichedRecord) -> UnitScore {
        let raw = record.raw();
        let w = &self.config.weights;
        let signals = [
            (char_len(raw.name.trim()) > self.config.long_name_chars, w.name),
            (!raw.professor_name.trim().is_empty(), w.professor),
            (
                char_len(raw.content.trim()) > self.config.long_content_chars,
                w.content,
            ),
            (
                record.keywords().len() >= self.config.min_keyword_count,
                w.keywords,
            ),
            (
                raw.url.as_deref().is_some_and(|u| !u.trim().is_empty()),
                w.url,
            ),
            (
                record
                    .relevance_score()
                    .is_some_and(|s| s.value() >= self.config.min_relevance_score),
                w.relevance,
            ),
        ];

        let total = w.total();
        if total <= 0.0 {
            return UnitScore::ZERO;
        }
        let earned: f64 = signals
            .iter()
            .filter(|(met, _)| *met)
            .map(|(_, weight)| weight)
            .sum();
        UnitScore::clamped(earned / total)
    }

    /// Stage 4: drop records below the acceptance threshold.
    pub fn filter_by_quality(&mut self, records: Vec<EnrichedRecord>) -> Vec<ScoredRecord> {
        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            let quality = self.quality_score(&record);
            if quality.value() >= self.config.acceptance_threshold {
                accepted.push(ScoredRecord { record, quality });
            } else {
                log::debug!("Rejected '{}': quality {}", record.raw().name, quality);
                self.stats.reject(RejectionReason::LowQuality);
            }
        }
        accepted
    }

    /// Stage 5: build pending entities. Failures are counted and skipped.
    pub fn construct(
        &mut self,
        records: Vec<ScoredRecord>,
        institution: &Institution,
    ) -> Vec<ValidatedLabEntity> {
        let mut entities = Vec::with_capacity(records.len());
        for ScoredRecord { record, quality } in records {
            let name = record.raw().name.clone();
            match ValidatedLabEntity::new(record, quality, institution) {
                Ok(entity) => {
                    self.stats.processed += 1;
                    entities.push(entity);
                }
                Err(e) => {
                    log::error!("Failed to build lab entity '{}': {}", name, e);
                    self.stats.construction_errors += 1;
                }
            }
        }
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::institution::sample_institution;
    use crate::models::{LabStatus, RelevanceLevel};

    const STRONG_CONTENT: &str = "This laboratory conducts research on cancer immunotherapy \
        and T cell biology. We focus on the development of vaccine strategies and analysis \
        of cytokine signalling in tumor immunity.";

    const PLAIN_CONTENT: &str =
        "Research and development of compiler analysis tools for embedded systems.";

    fn processor() -> LabDataProcessor {
        LabDataProcessor::new(Arc::new(KeywordAnalyzer::new()), QualityConfig::default())
    }

    fn record(name: &str, professor: &str, content: &str) -> RawRecord {
        RawRecord {
            institution_id: sample_institution().id,
            name: name.to_string(),
            professor_name: professor.to_string(),
            department: "Graduate School of Medicine".to_string(),
            content: content.to_string(),
            keywords: None,
            url: None,
        }
    }

    fn strong_record() -> RawRecord {
        RawRecord {
            keywords: Some("T cell, cancer".to_string()),
            url: Some("https://www.example.ac.jp/labs/tumor/".to_string()),
            ..record("Tumor Immunology Lab", "Tanaka", STRONG_CONTENT)
        }
    }

    #[test]
    fn short_content_is_rejected_at_validation() {
        let mut p = processor();
        let out = p.process_batch(vec![record("AI Lab", "X", "Short.")], &sample_institution());

        assert!(out.is_empty());
        assert_eq!(p.stats().rejected, 1);
        assert_eq!(
            p.stats().rejections.get(&RejectionReason::ContentTooShort),
            Some(&1)
        );
    }

    #[test]
    fn validation_checks_each_requirement() {
        let mut p = processor();
        let kept = p.validate(vec![
            record("AB", "Tanaka", PLAIN_CONTENT),
            record("Compiler Lab", "S", PLAIN_CONTENT),
            record(
                "Compiler Lab",
                "Sato",
                "A long description of the group with many words but no action terms at all.",
            ),
            record("Compiler Lab", "Sato", PLAIN_CONTENT),
        ]);

        assert_eq!(kept.len(), 1);
        let reasons = &p.stats().rejections;
        assert_eq!(reasons.get(&RejectionReason::NameTooShort), Some(&1));
        assert_eq!(reasons.get(&RejectionReason::ProfessorMissing), Some(&1));
        assert_eq!(reasons.get(&RejectionReason::ContentNotMeaningful), Some(&1));
    }

    #[test]
    fn meaningful_content_needs_two_distinct_words() {
        let p = processor();
        assert!(p.is_meaningful_content("免疫学の研究と新規手法の開発"));
        assert!(!p.is_meaningful_content("research research research"));
        assert!(p.is_meaningful_content("Research on a new method"));
    }

    #[test]
    fn case_and_spacing_variants_are_duplicates() {
        let mut p = processor();
        let content = format!("{STRONG_CONTENT} Extra text.");
        let out = p.deduplicate(vec![
            record("Immune Lab", "Tanaka", &content),
            record("immune  lab", "tanaka", &content),
        ]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Immune Lab");
        assert_eq!(p.stats().duplicate, 1);
    }

    #[test]
    fn signature_is_stable_under_normalization() {
        let a = Signature::new("Immune Lab", "Tanaka", 7);
        assert_eq!(a, Signature::new("immune  lab", "tanaka", 7));
        assert_eq!(a, Signature::new("Immune-Lab.", " TANAKA ", 7));
        assert_ne!(a, Signature::new("Immune Lab", "Tanaka", 8));
        assert_ne!(a, Signature::new("Immune Lab", "Suzuki", 7));
    }

    #[test]
    fn dedup_output_has_unique_signatures() {
        let mut p = processor();
        let names = ["A Lab", "a lab", "B Lab", "A  LAB", "b-lab", "C Lab"];
        let input: Vec<RawRecord> = names
            .iter()
            .map(|n| record(n, "Prof", PLAIN_CONTENT))
            .collect();
        let out = p.deduplicate(input.clone());

        assert!(out.len() <= input.len());
        let signatures: HashSet<Signature> = out.iter().map(Signature::of).collect();
        assert_eq!(signatures.len(), out.len());
        assert_eq!(out.len(), 3);
        assert_eq!(p.stats().duplicate, 3);
    }

    #[test]
    fn enrichment_failure_passes_record_through() {
        let mut p = processor();
        let out = p.enrich(
            vec![record("Empty Lab", "Sato", "   "), strong_record()],
            &sample_institution(),
        );

        assert_eq!(out.len(), 2);
        assert!(out[0].enrichment().is_none());
        assert!(out[1].enrichment().is_some());
        assert_eq!(p.stats().enrichment_warnings, 1);
        assert_eq!(p.stats().enriched, 1);
    }

    #[test]
    fn enrichment_merges_keywords_and_provenance() {
        let mut p = processor();
        let out = p.enrich(vec![strong_record()], &sample_institution());
        let enriched = &out[0];

        assert_eq!(enriched.keywords()[0], "T cell");
        assert_eq!(enriched.keywords()[1], "cancer");
        assert!(enriched.keywords().iter().any(|k| k == "vaccine"));
        assert_eq!(
            enriched.keywords().iter().filter(|k| k.eq_ignore_ascii_case("t cell")).count(),
            1
        );
        assert_eq!(enriched.provenance().institution_tier, 1);
        assert_eq!(enriched.provenance().institution_region, "Kanto");
    }

    #[test]
    fn quality_scores_stay_in_bounds() {
        let mut p = processor();
        let institution = sample_institution();
        let records = p.enrich(
            vec![
                strong_record(),
                record("Lab A", "Sato", PLAIN_CONTENT),
                record("Empty Lab", "", "   "),
            ],
            &institution,
        );
        for r in &records {
            let q = p.quality_score(r).value();
            assert!((0.0..=1.0).contains(&q));
        }
        assert!((p.quality_score(&records[0]).value() - 1.0).abs() < 1e-9);
        assert!((p.quality_score(&records[1]).value() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn low_quality_records_are_filtered() {
        let mut p = processor();
        let institution = sample_institution();
        let out = p.process_batch(
            vec![strong_record(), record("Lab A", "Sato", PLAIN_CONTENT)],
            &institution,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(p.stats().rejections.get(&RejectionReason::LowQuality), Some(&1));
        assert_eq!(p.stats().processed, 1);
    }

    #[test]
    fn full_batch_produces_pending_entities() {
        let mut p = processor();
        let institution = sample_institution();
        let out = p.process_batch(
            vec![
                strong_record(),
                RawRecord {
                    name: "tumor immunology lab".to_string(),
                    professor_name: "TANAKA".to_string(),
                    ..strong_record()
                },
                record("AI Lab", "X", "Short."),
            ],
            &institution,
        );

        assert_eq!(out.len(), 1);
        let entity = &out[0];
        assert_eq!(entity.status(), LabStatus::Pending);
        assert_eq!(entity.institution_id(), institution.id);
        assert!(entity.quality_score().value() >= 0.6);
        assert!(entity.relevance_level() >= Some(RelevanceLevel::Medium));

        let stats = p.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.duplicate, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.enriched, 1);
    }

    #[test]
    fn construction_error_does_not_abort_batch() {
        let mut p = processor();
        let institution = sample_institution();
        let foreign = RawRecord {
            institution_id: institution.id + 1,
            name: "Other Lab".to_string(),
            ..strong_record()
        };
        let out = p.process_batch(vec![foreign, strong_record()], &institution);

        assert_eq!(out.len(), 1);
        assert_eq!(p.stats().construction_errors, 1);
        assert_eq!(p.stats().processed, 1);
    }

    #[test]
    fn counters_accumulate_across_batches() {
        let mut p = processor();
        let institution = sample_institution();
        p.process_batch(vec![strong_record()], &institution);
        p.process_batch(vec![strong_record()], &institution);
        assert_eq!(p.stats().processed, 2);
    }
}
