//! Lab record extractors.
//!
//! Extraction turns one fetched page into zero or more [`RawRecord`]s. A
//! [`LayoutParser`] applies the configured CSS layouts; each faculty family
//! then keeps only the records relevant to it. Extractors are looked up by
//! [`FacultyType`] in an [`ExtractorRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{ExtractionConfig, FacultyType, Institution, LabLayout, RawRecord};
use crate::utils::resolve;
use crate::utils::text::{TermList, clean_text};

/// Capability to turn page content into candidate records.
pub trait Extractor: Send + Sync {
    /// Faculty family this extractor targets.
    fn faculty(&self) -> FacultyType;

    /// Parse `content` fetched from `source_url`. May return nothing.
    fn extract(&self, content: &str, source_url: &str) -> Vec<RawRecord>;
}

struct CompiledLayout {
    name: String,
    item: Selector,
    name_sel: Selector,
    professor: Selector,
    content: Selector,
    department: Option<Selector>,
    keywords: Option<Selector>,
    link: Option<Selector>,
}

impl CompiledLayout {
    fn compile(layout: &LabLayout) -> Result<Self> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(Self {
            name: layout.name.clone(),
            item: parse_selector(&layout.item_selector)?,
            name_sel: parse_selector(&layout.name_selector)?,
            professor: parse_selector(&layout.professor_selector)?,
            content: parse_selector(&layout.content_selector)?,
            department: optional(&layout.department_selector)?,
            keywords: optional(&layout.keywords_selector)?,
            link: optional(&layout.link_selector)?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn first_text(item: &ElementRef, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Selector-driven page parser shared by all extractors.
///
/// Layouts are tried in order; the first one that yields records wins.
pub struct LayoutParser {
    layouts: Vec<CompiledLayout>,
}

impl LayoutParser {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let layouts = config
            .layouts
            .iter()
            .map(CompiledLayout::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layouts })
    }

    pub fn parse(&self, content: &str, source_url: &str) -> Vec<RawRecord> {
        let document = Html::parse_document(content);
        for layout in &self.layouts {
            let records: Vec<RawRecord> = document
                .select(&layout.item)
                .filter_map(|item| Self::parse_item(layout, &item, source_url))
                .collect();
            if !records.is_empty() {
                log::debug!(
                    "Layout '{}' matched {} records on {}",
                    layout.name,
                    records.len(),
                    source_url
                );
                return records;
            }
        }
        Vec::new()
    }

    fn parse_item(layout: &CompiledLayout, item: &ElementRef, source_url: &str) -> Option<RawRecord> {
        let name = first_text(item, &layout.name_sel)?;
        let professor_name = first_text(item, &layout.professor).unwrap_or_default();
        let content = first_text(item, &layout.content).unwrap_or_default();
        let department = layout
            .department
            .as_ref()
            .and_then(|sel| first_text(item, sel))
            .unwrap_or_default();
        let keywords = layout.keywords.as_ref().and_then(|sel| first_text(item, sel));
        let url = layout
            .link
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve(source_url, href).unwrap_or_else(|| href.to_string()));

        Some(RawRecord {
            institution_id: 0,
            name,
            professor_name,
            department,
            content,
            keywords,
            url,
        })
    }
}

fn record_text(record: &RawRecord) -> String {
    format!("{} {} {}", record.content, record.name, record.department).to_lowercase()
}

/// Keeps labs with medical or immunology indicators.
pub struct MedicalExtractor {
    parser: Arc<LayoutParser>,
    indicators: TermList,
}

impl MedicalExtractor {
    pub fn new(parser: Arc<LayoutParser>) -> Self {
        Self {
            parser,
            indicators: TermList::new(&[
                "医学部", "医学研究科", "医学", "medical", "medicine", "医療", "臨床", "clinical",
                "病院", "hospital", "免疫", "immunology", "immunity", "アレルギー", "allergy",
                "がん免疫", "cancer immunology", "感染症", "infection", "ワクチン", "vaccine",
                "自己免疫", "autoimmune",
            ]),
        }
    }
}

impl Extractor for MedicalExtractor {
    fn faculty(&self) -> FacultyType {
        FacultyType::Medical
    }

    fn extract(&self, content: &str, source_url: &str) -> Vec<RawRecord> {
        let all = self.parser.parse(content, source_url);
        let total = all.len();
        let kept: Vec<RawRecord> = all
            .into_iter()
            .filter(|r| self.indicators.any_in(&record_text(r)))
            .collect();
        log::info!("Medical filter: {} -> {} records ({})", total, kept.len(), source_url);
        kept
    }
}

/// Keeps labs with agriculture, animal, plant or food indicators.
///
/// Also serves veterinary faculties.
pub struct AgricultureExtractor {
    parser: Arc<LayoutParser>,
    indicators: TermList,
}

impl AgricultureExtractor {
    pub fn new(parser: Arc<LayoutParser>) -> Self {
        Self {
            parser,
            indicators: TermList::new(&[
                "農学", "農業", "agriculture", "agricultural", "食品", "food", "栄養", "nutrition",
                "生物資源", "bioresource", "動物免疫", "animal immunity", "家畜", "livestock",
                "獣医", "veterinary", "動物", "animal", "牛", "cattle", "豚", "pig", "鶏",
                "chicken", "魚", "fish", "植物免疫", "plant immunity", "植物病理",
                "plant pathology", "作物", "crop", "植物", "plant", "育種", "breeding",
                "機能性食品", "functional food", "プロバイオティクス", "probiotics", "発酵",
                "fermentation", "腸内細菌", "gut microbiota", "免疫", "immunology",
            ]),
        }
    }
}

impl Extractor for AgricultureExtractor {
    fn faculty(&self) -> FacultyType {
        FacultyType::Agriculture
    }

    fn extract(&self, content: &str, source_url: &str) -> Vec<RawRecord> {
        let all = self.parser.parse(content, source_url);
        let total = all.len();
        let kept: Vec<RawRecord> = all
            .into_iter()
            .filter(|r| self.indicators.any_in(&record_text(r)))
            .collect();
        log::info!(
            "Agriculture filter: {} -> {} records ({})",
            total,
            kept.len(),
            source_url
        );
        kept
    }
}

/// Keeps every parsed record.
pub struct GeneralExtractor {
    parser: Arc<LayoutParser>,
}

impl GeneralExtractor {
    pub fn new(parser: Arc<LayoutParser>) -> Self {
        Self { parser }
    }
}

impl Extractor for GeneralExtractor {
    fn faculty(&self) -> FacultyType {
        FacultyType::General
    }

    fn extract(&self, content: &str, source_url: &str) -> Vec<RawRecord> {
        self.parser.parse(content, source_url)
    }
}

/// Extractor bound to one institution; stamps its id on every record.
pub struct InstitutionExtractor {
    inner: Arc<dyn Extractor>,
    institution_id: u64,
}

impl Extractor for InstitutionExtractor {
    fn faculty(&self) -> FacultyType {
        self.inner.faculty()
    }

    fn extract(&self, content: &str, source_url: &str) -> Vec<RawRecord> {
        self.inner
            .extract(content, source_url)
            .into_iter()
            .map(|record| RawRecord {
                institution_id: self.institution_id,
                ..record
            })
            .collect()
    }
}

/// Lookup table from faculty family to extractor.
pub struct ExtractorRegistry {
    extractors: HashMap<FacultyType, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Register the built-in extractors over one shared parser.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let parser = Arc::new(LayoutParser::new(config)?);
        let medical: Arc<dyn Extractor> = Arc::new(MedicalExtractor::new(parser.clone()));
        let agriculture: Arc<dyn Extractor> = Arc::new(AgricultureExtractor::new(parser.clone()));
        let general: Arc<dyn Extractor> = Arc::new(GeneralExtractor::new(parser));

        let extractors = HashMap::from([
            (FacultyType::Medical, medical),
            (FacultyType::Agriculture, agriculture.clone()),
            (FacultyType::Veterinary, agriculture),
            (FacultyType::General, general),
        ]);
        Ok(Self { extractors })
    }

    /// Replace the extractor registered for `faculty`.
    pub fn register(&mut self, faculty: FacultyType, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(faculty, extractor);
    }

    pub fn get(&self, faculty: FacultyType) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(&faculty).cloned()
    }

    /// Extractor for an institution's faculty family.
    pub fn for_institution(&self, institution: &Institution) -> Result<InstitutionExtractor> {
        let faculty = institution.faculty_type();
        let inner = self.get(faculty).ok_or_else(|| {
            AppError::config(format!("no extractor registered for {}", faculty.as_str()))
        })?;
        Ok(InstitutionExtractor {
            inner,
            institution_id: institution.id,
        })
    }
}

const MEDICAL_PATHS: &[&str] = &[
    "medicine/",
    "medical/",
    "med/",
    "graduate/medicine/",
    "research/medicine/",
    "faculty/medicine/",
    "immunology/",
    "research/immunology/",
];

const AGRICULTURE_PATHS: &[&str] = &[
    "agriculture/",
    "agricultural/",
    "agr/",
    "bioresource/",
    "food/",
    "veterinary/",
    "animal/",
    "livestock/",
    "plant/",
    "crop/",
    "nutrition/",
];

const GENERAL_PATHS: &[&str] = &["research/", "graduate/", "faculty/"];

fn discovery_paths(faculty: FacultyType) -> &'static [&'static str] {
    match faculty {
        FacultyType::Medical => MEDICAL_PATHS,
        FacultyType::Agriculture | FacultyType::Veterinary => AGRICULTURE_PATHS,
        FacultyType::General => GENERAL_PATHS,
    }
}

/// Pages to fetch for an institution.
///
/// Explicit seed URLs come first, then the faculty family's candidate paths
/// under the website root. Duplicates are dropped.
pub fn discover_target_urls(institution: &Institution) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !urls.contains(&url) {
            urls.push(url);
        }
    };

    for url in &institution.target_urls {
        push(url.clone());
    }

    if let Some(site) = institution.website_url.as_deref() {
        let root = format!("{}/", site.trim_end_matches('/'));
        for path in discovery_paths(institution.faculty_type()) {
            if let Some(url) = resolve(&root, path) {
                push(url);
            }
        }
    }
    urls
}
