//! Institution directory types.
//!
//! Institutions come from an external directory (the seed file). The
//! pipeline only reads them.

use serde::{Deserialize, Serialize};

/// Funding/governance category of an institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
    National,
    Public,
    Private,
}

impl InstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionType::National => "national",
            InstitutionType::Public => "public",
            InstitutionType::Private => "private",
        }
    }
}

/// Faculty family used to pick an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacultyType {
    Medical,
    Agriculture,
    Veterinary,
    General,
}

impl FacultyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacultyType::Medical => "medical",
            FacultyType::Agriculture => "agriculture",
            FacultyType::Veterinary => "veterinary",
            FacultyType::General => "general",
        }
    }
}

/// Reference to an institution supplied by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    /// Opaque directory identifier
    pub id: u64,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub region: String,

    #[serde(rename = "type")]
    pub kind: InstitutionType,

    /// Root of the institution website
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,

    #[serde(default)]
    pub has_medical_faculty: bool,

    #[serde(default)]
    pub has_agriculture_faculty: bool,

    /// Directory ranking tier (1 = strongest); absent means 3
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,

    /// Explicit pages to harvest in addition to discovered ones
    #[serde(default)]
    pub target_urls: Vec<String>,

    /// Override for the extractor family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<FacultyType>,
}

const AGRICULTURE_INDICATORS: &[&str] = &[
    "農工大",
    "農業大",
    "畜産大",
    "獣医大",
    "agricultur",
    "veterinary",
    "livestock",
];

const MEDICAL_INDICATORS: &[&str] = &["医科大", "医大", "医療大", "medical", "medicine"];

impl Institution {
    pub fn tier(&self) -> u8 {
        self.tier.unwrap_or(3)
    }

    /// Faculty family to harvest with.
    ///
    /// An explicit override wins; otherwise name indicators, then faculty
    /// flags. Medical is preferred when both faculties exist and is the
    /// fallback.
    pub fn faculty_type(&self) -> FacultyType {
        if let Some(faculty) = self.faculty {
            return faculty;
        }

        let name = self.name.to_lowercase();
        if AGRICULTURE_INDICATORS.iter().any(|i| name.contains(i)) {
            return FacultyType::Agriculture;
        }
        if MEDICAL_INDICATORS.iter().any(|i| name.contains(i)) {
            return FacultyType::Medical;
        }

        match (self.has_medical_faculty, self.has_agriculture_faculty) {
            (false, true) => FacultyType::Agriculture,
            _ => FacultyType::Medical,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_institution() -> Institution {
    Institution {
        id: 7,
        name: "Example University".to_string(),
        region: "Kanto".to_string(),
        kind: InstitutionType::National,
        website_url: Some("https://www.example.ac.jp".to_string()),
        has_medical_faculty: true,
        has_agriculture_faculty: false,
        tier: Some(1),
        target_urls: Vec::new(),
        faculty: None,
    }
}
