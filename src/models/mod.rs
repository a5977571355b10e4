// src/models/mod.rs

//! Domain models for the lab crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
pub(crate) mod institution;
mod lab;
mod seed;

// Re-export all public types
pub use config::{
    Config, ExtractionConfig, FetchConfig, HttpConfig, LabLayout, LoggingConfig, PathsConfig,
    QualityConfig, QualityWeights, RateLimitConfig, RetryConfig,
};
pub use institution::{FacultyType, Institution, InstitutionType};
pub use lab::{
    EnrichedRecord, Enrichment, EntityError, FieldClassification, LabStatus,
    MIN_ENTITY_CONTENT_CHARS, Provenance, RawRecord, RelevanceLevel, UnitScore,
    ValidatedLabEntity, merge_keywords,
};
pub use seed::Seed;
