//! Service layer for the lab crawler.
//!
//! This module contains the business logic for:
//! - Keyword/field analysis (`KeywordAnalyzer`)
//! - Page extraction by faculty family (`ExtractorRegistry`)
//! - The lab record pipeline (`LabDataProcessor`)

pub mod analyzer;
pub mod extractors;
pub mod processor;

pub use analyzer::{AnalyzerError, KeywordAnalyzer, KeywordCategory};
pub use extractors::{
    AgricultureExtractor, Extractor, ExtractorRegistry, GeneralExtractor, InstitutionExtractor,
    LayoutParser, MedicalExtractor, discover_target_urls,
};
pub use processor::{LabDataProcessor, ProcessingStats, RejectionReason, ScoredRecord, Signature};
