//! Lab record types, from raw extraction output to validated entities.
//!
//! Records are immutable values: every stage consumes one type and builds
//! the next. Nothing here is mutated in place after construction.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Institution, InstitutionType};

/// Loosely-typed candidate record produced by an extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Owning institution
    pub institution_id: u64,

    /// Lab name
    pub name: String,

    pub professor_name: String,

    #[serde(default)]
    pub department: String,

    /// Free-text research description
    pub content: String,

    /// Comma-separated keywords as published on the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    /// Lab homepage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A float guaranteed to lie in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct UnitScore(f64);

impl UnitScore {
    pub const ZERO: UnitScore = UnitScore(0.0);

    /// Returns `None` for values outside `[0.0, 1.0]` (including NaN).
    pub fn new(value: f64) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    /// Clamp into range; NaN maps to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self::ZERO
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for UnitScore {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("score {value} outside [0, 1]"))
    }
}

impl From<UnitScore> for f64 {
    fn from(score: UnitScore) -> f64 {
        score.0
    }
}

impl fmt::Display for UnitScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Research field label assigned by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldClassification {
    OncologyImmunology,
    AllergyImmunology,
    InfectionImmunology,
    AutoimmuneImmunology,
    AnimalImmunology,
    PlantImmunology,
    FoodImmunology,
    General,
}

impl FieldClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldClassification::OncologyImmunology => "oncology-immunology",
            FieldClassification::AllergyImmunology => "allergy-immunology",
            FieldClassification::InfectionImmunology => "infection-immunology",
            FieldClassification::AutoimmuneImmunology => "autoimmune-immunology",
            FieldClassification::AnimalImmunology => "animal-immunology",
            FieldClassification::PlantImmunology => "plant-immunology",
            FieldClassification::FoodImmunology => "food-immunology",
            FieldClassification::General => "general",
        }
    }
}

impl fmt::Display for FieldClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse bucket of a relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceLevel {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RelevanceLevel {
    pub fn from_score(score: UnitScore) -> Self {
        match score.value() {
            s if s < 0.2 => RelevanceLevel::None,
            s if s < 0.4 => RelevanceLevel::Low,
            s if s < 0.6 => RelevanceLevel::Medium,
            s if s < 0.8 => RelevanceLevel::High,
            _ => RelevanceLevel::VeryHigh,
        }
    }
}

/// Provenance attached during enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub processed_at: DateTime<Utc>,
    pub institution_tier: u8,
    pub institution_type: InstitutionType,
    pub institution_region: String,
}

impl Provenance {
    pub fn now(institution: &Institution) -> Self {
        Self {
            processed_at: Utc::now(),
            institution_tier: institution.tier(),
            institution_type: institution.kind,
            institution_region: institution.region.clone(),
        }
    }
}

/// Analyzer output attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub relevance_score: UnitScore,
    pub field: FieldClassification,
    pub matched_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animal_species: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plant_species: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub techniques: Vec<String>,
}

/// A raw record after the enrichment stage.
///
/// `enrichment` is `None` when the analyzer failed for this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    raw: RawRecord,
    keywords: Vec<String>,
    enrichment: Option<Enrichment>,
    provenance: Provenance,
}

impl EnrichedRecord {
    /// Attach analyzer output, merging matched keywords into the record's own.
    pub fn enriched(raw: RawRecord, enrichment: Enrichment, provenance: Provenance) -> Self {
        let keywords = merge_keywords(raw.keywords.as_deref(), &enrichment.matched_keywords);
        Self {
            raw,
            keywords,
            enrichment: Some(enrichment),
            provenance,
        }
    }

    /// Pass a record through without analyzer output.
    pub fn unenriched(raw: RawRecord, provenance: Provenance) -> Self {
        let keywords = merge_keywords(raw.keywords.as_deref(), &[]);
        Self {
            raw,
            keywords,
            enrichment: None,
            provenance,
        }
    }

    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn enrichment(&self) -> Option<&Enrichment> {
        self.enrichment.as_ref()
    }

    pub fn relevance_score(&self) -> Option<UnitScore> {
        self.enrichment.as_ref().map(|e| e.relevance_score)
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Split a published keyword string and append new keywords, skipping
/// case-insensitive duplicates. Order is preserved.
pub fn merge_keywords(existing: Option<&str>, extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let published = existing
        .unwrap_or("")
        .split([',', '、', ';'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    for keyword in published.chain(extra.iter().cloned()) {
        let lower = keyword.to_lowercase();
        if !merged.iter().any(|k| k.to_lowercase() == lower) {
            merged.push(keyword);
        }
    }
    merged
}

/// Lifecycle status of a lab entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Pending,
    Active,
    Inactive,
    Rejected,
    Archived,
}

impl LabStatus {
    pub fn can_transition_to(self, next: LabStatus) -> bool {
        use LabStatus::*;
        matches!(
            (self, next),
            (Pending, Active | Rejected | Inactive)
                | (Active, Inactive | Archived)
                | (Inactive, Active | Archived)
        )
    }
}

/// Why a lab entity could not be built or updated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntityError {
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("research content has {0} characters, need at least {min}", min = MIN_ENTITY_CONTENT_CHARS)]
    ContentTooShort(usize),

    #[error("record belongs to institution {found}, expected {expected}")]
    InstitutionMismatch { expected: u64, found: u64 },

    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: LabStatus, to: LabStatus },
}

/// Minimum trimmed content length an entity may carry.
pub const MIN_ENTITY_CONTENT_CHARS: usize = 10;

/// Pipeline output, ready to hand to the persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLabEntity {
    institution_id: u64,
    name: String,
    professor_name: String,
    department: String,
    content: String,
    keywords: Vec<String>,
    url: Option<String>,
    enrichment: Option<Enrichment>,
    provenance: Provenance,
    quality_score: UnitScore,
    status: LabStatus,
}

impl ValidatedLabEntity {
    /// Build a `pending` entity owned by `institution`.
    pub fn new(
        record: EnrichedRecord,
        quality_score: UnitScore,
        institution: &Institution,
    ) -> Result<Self, EntityError> {
        let EnrichedRecord {
            raw,
            keywords,
            enrichment,
            provenance,
        } = record;

        if raw.institution_id != institution.id {
            return Err(EntityError::InstitutionMismatch {
                expected: institution.id,
                found: raw.institution_id,
            });
        }

        let name = required(raw.name, "name")?;
        let professor_name = required(raw.professor_name, "professor_name")?;
        let content = required(raw.content, "content")?;
        let content_chars = content.chars().count();
        if content_chars < MIN_ENTITY_CONTENT_CHARS {
            return Err(EntityError::ContentTooShort(content_chars));
        }

        Ok(Self {
            institution_id: institution.id,
            name,
            professor_name,
            department: raw.department.trim().to_string(),
            content,
            keywords,
            url: raw.url.filter(|u| !u.trim().is_empty()),
            enrichment,
            provenance,
            quality_score,
            status: LabStatus::Pending,
        })
    }

    /// Return a copy in `next` status if the transition is allowed.
    pub fn with_status(&self, next: LabStatus) -> Result<Self, EntityError> {
        if self.status == next {
            return Ok(self.clone());
        }
        if !self.status.can_transition_to(next) {
            return Err(EntityError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(Self {
            status: next,
            ..self.clone()
        })
    }

    pub fn institution_id(&self) -> u64 {
        self.institution_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn professor_name(&self) -> &str {
        &self.professor_name
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn enrichment(&self) -> Option<&Enrichment> {
        self.enrichment.as_ref()
    }

    pub fn relevance_level(&self) -> Option<RelevanceLevel> {
        self.enrichment
            .as_ref()
            .map(|e| RelevanceLevel::from_score(e.relevance_score))
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn quality_score(&self) -> UnitScore {
        self.quality_score
    }

    pub fn status(&self) -> LabStatus {
        self.status
    }
}

fn required(value: String, field: &'static str) -> Result<String, EntityError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EntityError::EmptyField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::institution::sample_institution;

    fn raw(institution_id: u64) -> RawRecord {
        RawRecord {
            institution_id,
            name: "Tumor Immunology Lab".to_string(),
            professor_name: "Tanaka".to_string(),
            department: " Immunology ".to_string(),
            content: "Research on T cell responses to tumors.".to_string(),
            keywords: Some("T cell, tumor".to_string()),
            url: Some("https://example.ac.jp/lab".to_string()),
        }
    }

    #[test]
    fn unit_score_rejects_out_of_range() {
        assert!(UnitScore::new(1.01).is_none());
        assert!(UnitScore::new(-0.1).is_none());
        assert!(UnitScore::new(f64::NAN).is_none());
        assert_eq!(UnitScore::clamped(3.0).value(), 1.0);
        assert_eq!(UnitScore::clamped(f64::NAN), UnitScore::ZERO);
        assert!(serde_json::from_str::<UnitScore>("1.5").is_err());
    }

    #[test]
    fn relevance_levels() {
        let level = |v| RelevanceLevel::from_score(UnitScore::new(v).unwrap());
        assert_eq!(level(0.0), RelevanceLevel::None);
        assert_eq!(level(0.2), RelevanceLevel::Low);
        assert_eq!(level(0.59), RelevanceLevel::Medium);
        assert_eq!(level(0.6), RelevanceLevel::High);
        assert_eq!(level(1.0), RelevanceLevel::VeryHigh);
    }

    #[test]
    fn merge_keywords_skips_duplicates() {
        let merged = merge_keywords(
            Some("T cell, Tumor, , cytokine"),
            &["tumor".to_string(), "ELISA".to_string()],
        );
        assert_eq!(merged, vec!["T cell", "Tumor", "cytokine", "ELISA"]);
    }

    #[test]
    fn entity_starts_pending() {
        let inst = sample_institution();
        let record = EnrichedRecord::unenriched(raw(inst.id), Provenance::now(&inst));
        let entity = ValidatedLabEntity::new(record, UnitScore::clamped(0.8), &inst).unwrap();
        assert_eq!(entity.status(), LabStatus::Pending);
        assert_eq!(entity.department(), "Immunology");
        assert_eq!(entity.keywords(), ["T cell", "tumor"]);
        assert!(entity.relevance_level().is_none());
    }

    #[test]
    fn entity_rejects_foreign_institution() {
        let inst = sample_institution();
        let record = EnrichedRecord::unenriched(raw(inst.id + 1), Provenance::now(&inst));
        let err = ValidatedLabEntity::new(record, UnitScore::ZERO, &inst).unwrap_err();
        assert!(matches!(err, EntityError::InstitutionMismatch { .. }));
    }

    #[test]
    fn entity_rejects_blank_professor() {
        let inst = sample_institution();
        let mut r = raw(inst.id);
        r.professor_name = "   ".to_string();
        let record = EnrichedRecord::unenriched(r, Provenance::now(&inst));
        assert_eq!(
            ValidatedLabEntity::new(record, UnitScore::ZERO, &inst).unwrap_err(),
            EntityError::EmptyField("professor_name")
        );
    }

    #[test]
    fn status_transitions_produce_new_values() {
        let inst = sample_institution();
        let record = EnrichedRecord::unenriched(raw(inst.id), Provenance::now(&inst));
        let pending = ValidatedLabEntity::new(record, UnitScore::ZERO, &inst).unwrap();

        let active = pending.with_status(LabStatus::Active).unwrap();
        assert_eq!(active.status(), LabStatus::Active);
        assert_eq!(pending.status(), LabStatus::Pending);

        let archived = active.with_status(LabStatus::Archived).unwrap();
        assert!(archived.with_status(LabStatus::Active).is_err());
        assert!(pending.with_status(LabStatus::Archived).is_err());
    }
}
