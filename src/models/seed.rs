//! Seed data: the institution directory harvested by a run.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Institution;

/// Root seed data structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    /// Institutions to harvest
    #[serde(default, rename = "institution")]
    pub institutions: Vec<Institution>,
}

impl Seed {
    /// Load seed data from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate that seed data is usable for a harvest.
    pub fn validate(&self) -> Result<()> {
        if self.institutions.is_empty() {
            return Err(AppError::validation("No institutions defined in seed data"));
        }

        let mut ids = HashSet::new();
        for inst in &self.institutions {
            if !ids.insert(inst.id) {
                return Err(AppError::validation(format!(
                    "Duplicate institution id {}",
                    inst.id
                )));
            }
            if inst.name.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "Institution {} has an empty name",
                    inst.id
                )));
            }
            if inst.website_url.is_none() && inst.target_urls.is_empty() {
                return Err(AppError::validation(format!(
                    "Institution '{}' has neither website_url nor target_urls",
                    inst.name
                )));
            }
            for url in inst.website_url.iter().chain(&inst.target_urls) {
                url::Url::parse(url)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
        [[institution]]
        id = 1
        name = "Osaka University"
        region = "Kinki"
        type = "national"
        website_url = "https://www.osaka-u.ac.jp"
        has_medical_faculty = true

        [[institution]]
        id = 2
        name = "Rakuno Gakuen University"
        type = "private"
        faculty = "veterinary"
        target_urls = ["https://www.rakuno.ac.jp/research/"]
    "#;

    #[test]
    fn parses_institution_tables() {
        let seed: Seed = toml::from_str(SEED).unwrap();
        assert_eq!(seed.institutions.len(), 2);
        assert!(seed.validate().is_ok());
    }

    #[test]
    fn rejects_empty_seed() {
        assert!(Seed::default().validate().is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut seed: Seed = toml::from_str(SEED).unwrap();
        seed.institutions[1].id = 1;
        assert!(seed.validate().is_err());
    }

    #[test]
    fn rejects_institution_without_urls() {
        let mut seed: Seed = toml::from_str(SEED).unwrap();
        seed.institutions[0].website_url = None;
        assert!(seed.validate().is_err());
    }
}
