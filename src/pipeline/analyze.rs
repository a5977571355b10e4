// src/pipeline/analyze.rs

//! One-off analysis of a research description.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Enrichment, RelevanceLevel};
use crate::services::KeywordAnalyzer;

/// Analyze the text in `path`.
pub fn run_analyze(path: &Path) -> Result<Enrichment> {
    let content = std::fs::read_to_string(path)?;
    let enrichment = KeywordAnalyzer::new()
        .analyze(&content)
        .map_err(|e| AppError::validation(format!("{}: {e}", path.display())))?;

    log::info!(
        "{}: {} ({:?}, score {})",
        path.display(),
        enrichment.field,
        RelevanceLevel::from_score(enrichment.relevance_score),
        enrichment.relevance_score
    );
    Ok(enrichment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldClassification;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn analyzes_file_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lab.txt");
        fs::write(&path, "アレルギー疾患におけるIgE産生と肥満細胞の研究").unwrap();

        let result = run_analyze(&path).unwrap();
        assert_eq!(result.field, FieldClassification::AllergyImmunology);
    }

    #[test]
    fn empty_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        fs::write(&path, "\n").unwrap();
        assert!(matches!(run_analyze(&path), Err(AppError::Validation(_))));
    }
}
