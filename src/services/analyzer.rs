//! Immune-research keyword analyzer.
//!
//! A pure scorer over fixed bilingual vocabularies. Relevance is the sum of
//! keyword occurrence counts weighted by category, divided by
//! [`RELEVANCE_SCALE`] and clamped to `[0, 1]`. Field classification walks a
//! fixed priority list and takes the first rule whose triggers appear.

use thiserror::Error;

use crate::models::{Enrichment, FieldClassification, UnitScore};
use crate::utils::text::TermList;

/// Divisor turning weighted match counts into a relevance score.
pub const RELEVANCE_SCALE: f64 = 3.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("no research content to analyze")]
    EmptyContent,
}

/// Keyword vocabulary groups, each with its own weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordCategory {
    BasicImmunology,
    AdvancedResearch,
    DiseasesAndTherapy,
    ClinicalImmunology,
    AnimalImmunity,
}

impl KeywordCategory {
    pub const ALL: [KeywordCategory; 5] = [
        KeywordCategory::BasicImmunology,
        KeywordCategory::AdvancedResearch,
        KeywordCategory::DiseasesAndTherapy,
        KeywordCategory::ClinicalImmunology,
        KeywordCategory::AnimalImmunity,
    ];

    pub fn weight(self) -> f64 {
        match self {
            KeywordCategory::BasicImmunology => 0.3,
            KeywordCategory::AdvancedResearch => 0.25,
            KeywordCategory::DiseasesAndTherapy => 0.2,
            KeywordCategory::ClinicalImmunology => 0.15,
            KeywordCategory::AnimalImmunity => 0.2,
        }
    }

    fn terms(self) -> &'static [&'static str] {
        match self {
            KeywordCategory::BasicImmunology => &[
                "免疫", "immunology", "immunity", "immune", "抗体", "antibody", "抗原",
                "antigen", "サイトカイン", "cytokine", "T細胞", "T cell", "B細胞", "B cell",
                "マクロファージ", "macrophage", "樹状細胞", "dendritic cell", "リンパ球",
                "lymphocyte", "自然免疫", "innate immunity", "獲得免疫", "adaptive immunity",
            ],
            KeywordCategory::AdvancedResearch => &[
                "免疫療法", "immunotherapy", "ワクチン", "vaccine", "免疫チェックポイント",
                "immune checkpoint", "CAR-T", "免疫応答", "immune response", "免疫制御",
                "immunoregulation", "粘膜免疫", "mucosal immunity", "シングルセル",
                "single-cell",
            ],
            KeywordCategory::DiseasesAndTherapy => &[
                "がん免疫", "cancer immunology", "cancer immunotherapy", "腫瘍免疫",
                "tumor immunity", "アレルギー", "allergy", "アトピー", "atopic",
                "自己免疫疾患", "autoimmune disease", "感染症", "infectious disease", "炎症",
                "inflammation", "リウマチ", "rheumatoid",
            ],
            KeywordCategory::ClinicalImmunology => &[
                "免疫不全", "immunodeficiency", "移植免疫", "transplant immunology",
                "臨床免疫", "clinical immunology", "免疫測定", "immunoassay",
            ],
            KeywordCategory::AnimalImmunity => &[
                "動物免疫", "animal immunity", "家畜免疫", "livestock immunity", "獣医免疫",
                "veterinary immunology", "魚類免疫", "fish immunity",
            ],
        }
    }
}

const ANIMAL_SPECIES: &[&str] = &[
    "牛", "cattle", "bovine", "乳牛", "dairy cow", "豚", "pig", "swine", "porcine", "鶏",
    "chicken", "poultry", "家禽", "魚", "fish", "aquaculture", "羊", "sheep", "山羊", "goat",
    "馬", "horse", "equine", "犬", "dog", "canine", "猫", "cat", "feline", "マウス", "mouse",
    "ラット", "rat", "ウサギ", "rabbit",
];

const PLANT_SPECIES: &[&str] = &[
    "稲", "rice", "イネ", "トマト", "tomato", "大豆", "soybean", "小麦", "wheat",
    "トウモロコシ", "corn", "maize", "ジャガイモ", "potato", "アラビドプシス", "arabidopsis",
];

const TECHNIQUES: &[&str] = &[
    "PCR", "qPCR", "RT-PCR", "Western blot", "ELISA", "FACS", "フローサイトメトリー",
    "flow cytometry", "RNA-seq", "ChIP-seq", "CRISPR", "クローニング", "cloning",
    "細胞培養", "cell culture", "in vitro", "in vivo", "臨床試験", "clinical trial",
];

/// Extra condition a field rule needs besides its trigger words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    None,
    AnimalSpecies,
    PlantSpecies,
}

/// Classification rules, highest priority first.
const FIELD_RULES: &[(FieldClassification, Gate, &[&str])] = &[
    (
        FieldClassification::OncologyImmunology,
        Gate::None,
        &["cancer", "がん", "tumor", "tumour", "腫瘍", "oncology"],
    ),
    (
        FieldClassification::AllergyImmunology,
        Gate::None,
        &["allergy", "allergic", "アレルギー", "atopic", "アトピー", "IgE"],
    ),
    (
        FieldClassification::InfectionImmunology,
        Gate::None,
        &["infection", "感染", "pathogen", "病原", "virus", "bacteria"],
    ),
    (
        FieldClassification::AutoimmuneImmunology,
        Gate::None,
        &["autoimmune", "自己免疫", "lupus", "rheumatoid", "リウマチ"],
    ),
    (
        FieldClassification::AnimalImmunology,
        Gate::AnimalSpecies,
        &["veterinary", "獣医", "livestock", "家畜"],
    ),
    (
        FieldClassification::PlantImmunology,
        Gate::PlantSpecies,
        &["plant", "植物", "crop", "作物"],
    ),
    (
        FieldClassification::FoodImmunology,
        Gate::None,
        &["food", "食品", "nutrition", "栄養", "probiotics", "プロバイオティクス"],
    ),
];

/// Stateless keyword/field analyzer.
///
/// Vocabularies are prepared once at construction and only read afterwards,
/// so one analyzer can be shared freely between tasks.
#[derive(Debug, Clone)]
pub struct KeywordAnalyzer {
    categories: Vec<(KeywordCategory, TermList)>,
    animal_species: TermList,
    plant_species: TermList,
    techniques: TermList,
    fields: Vec<(FieldClassification, Gate, TermList)>,
}

impl Default for KeywordAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self {
            categories: KeywordCategory::ALL
                .iter()
                .map(|c| (*c, TermList::new(c.terms())))
                .collect(),
            animal_species: TermList::new(ANIMAL_SPECIES),
            plant_species: TermList::new(PLANT_SPECIES),
            techniques: TermList::new(TECHNIQUES),
            fields: FIELD_RULES
                .iter()
                .map(|(field, gate, triggers)| (*field, *gate, TermList::new(triggers)))
                .collect(),
        }
    }

    /// Score and classify research content.
    pub fn analyze(&self, content: &str) -> Result<Enrichment, AnalyzerError> {
        if content.trim().is_empty() {
            return Err(AnalyzerError::EmptyContent);
        }
        let text = content.to_lowercase();

        let (relevance_score, matched_keywords) = self.relevance(&text);
        let animal_species = self.animal_species.matches_in(&text);
        let plant_species = self.plant_species.matches_in(&text);
        let field = self.classify(&text, !animal_species.is_empty(), !plant_species.is_empty());

        Ok(Enrichment {
            relevance_score,
            field,
            matched_keywords,
            animal_species,
            plant_species,
            techniques: self.techniques.matches_in(&text),
        })
    }

    fn relevance(&self, text: &str) -> (UnitScore, Vec<String>) {
        let mut total = 0.0;
        let mut matched: Vec<String> = Vec::new();

        for (category, terms) in &self.categories {
            for term in terms.iter() {
                let count = term.count_in(text);
                if count == 0 {
                    continue;
                }
                total += count as f64 * category.weight();
                if !matched.iter().any(|m| m == term.text()) {
                    matched.push(term.text().to_string());
                }
            }
        }

        (UnitScore::clamped(total / RELEVANCE_SCALE), matched)
    }

    fn classify(&self, text: &str, has_animal: bool, has_plant: bool) -> FieldClassification {
        self.fields
            .iter()
            .find(|(_, gate, triggers)| {
                let gate_open = match gate {
                    Gate::None => true,
                    Gate::AnimalSpecies => has_animal,
                    Gate::PlantSpecies => has_plant,
                };
                gate_open && triggers.any_in(text)
            })
            .map_or(FieldClassification::General, |(field, _, _)| *field)
    }

    /// Vocabulary keywords containing `partial`, case-insensitively.
    pub fn suggest_keywords(&self, partial: &str, max: usize) -> Vec<&'static str> {
        let needle = partial.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut suggestions: Vec<&'static str> = Vec::new();
        for (_, terms) in &self.categories {
            for term in terms.iter() {
                if suggestions.len() >= max {
                    return suggestions;
                }
                if term.text().to_lowercase().contains(&needle)
                    && !suggestions.contains(&term.text())
                {
                    suggestions.push(term.text());
                }
            }
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> KeywordAnalyzer {
        KeywordAnalyzer::new()
    }

    #[test]
    fn cancer_immunotherapy_is_oncology_and_relevant() {
        let content = "Cancer immunotherapy is our focus. We compare cancer immunotherapy \
                       protocols and cancer immunotherapy outcomes by measuring cytokine \
                       release and cytokine profiles.";
        let result = analyzer().analyze(content).unwrap();

        assert_eq!(result.field, FieldClassification::OncologyImmunology);
        assert!(result.relevance_score.value() > 0.3);
        assert!(result.matched_keywords.iter().any(|k| k == "cytokine"));
        assert!(result.matched_keywords.iter().any(|k| k == "cancer immunotherapy"));
    }

    #[test]
    fn unrelated_content_scores_zero_and_is_general() {
        let result = analyzer()
            .analyze("We investigate compiler optimisation for embedded systems.")
            .unwrap();
        assert_eq!(result.relevance_score, UnitScore::ZERO);
        assert_eq!(result.field, FieldClassification::General);
        assert!(result.matched_keywords.is_empty());
    }

    #[test]
    fn score_is_clamped() {
        let content = "immune cytokine antibody antigen ".repeat(50);
        let result = analyzer().analyze(&content).unwrap();
        assert_eq!(result.relevance_score.value(), 1.0);
    }

    #[test]
    fn empty_content_is_an_error() {
        assert_eq!(analyzer().analyze("   "), Err(AnalyzerError::EmptyContent));
    }

    #[test]
    fn priority_order_decides_between_fields() {
        let a = analyzer();
        let both = a.analyze("allergy and tumor microenvironment").unwrap();
        assert_eq!(both.field, FieldClassification::OncologyImmunology);

        let allergy = a.analyze("IgE mediated allergy and bacteria").unwrap();
        assert_eq!(allergy.field, FieldClassification::AllergyImmunology);

        let infection = a.analyze("virus infection and lupus").unwrap();
        assert_eq!(infection.field, FieldClassification::InfectionImmunology);
    }

    #[test]
    fn animal_field_needs_species() {
        let a = analyzer();
        let without = a.analyze("veterinary immunology methods").unwrap();
        assert_ne!(without.field, FieldClassification::AnimalImmunology);

        let with = a.analyze("veterinary immunology of cattle and pigs").unwrap();
        assert_eq!(with.field, FieldClassification::AnimalImmunology);
        assert_eq!(with.animal_species, vec!["cattle", "pig"]);
    }

    #[test]
    fn plant_and_food_fields() {
        let a = analyzer();
        let plant = a.analyze("植物免疫とイネの病害抵抗性").unwrap();
        assert_eq!(plant.field, FieldClassification::PlantImmunology);
        assert!(plant.plant_species.contains(&"イネ".to_string()));

        let food = a.analyze("probiotics and mucosal immunity").unwrap();
        assert_eq!(food.field, FieldClassification::FoodImmunology);
    }

    #[test]
    fn techniques_are_extracted() {
        let result = analyzer()
            .analyze("Using ELISA, flow cytometry and CRISPR screens in vivo.")
            .unwrap();
        assert_eq!(
            result.techniques,
            vec!["ELISA", "flow cytometry", "CRISPR", "in vivo"]
        );
    }

    #[test]
    fn analysis_is_deterministic() {
        let a = analyzer();
        let content = "腫瘍免疫 and T cell responses to vaccine antigens in mice";
        let first = a.analyze(content).unwrap();
        for _ in 0..5 {
            assert_eq!(a.analyze(content).unwrap(), first);
        }
    }

    #[test]
    fn japanese_content_scores() {
        let result = analyzer()
            .analyze("がん免疫療法における樹状細胞とサイトカインの解析")
            .unwrap();
        assert_eq!(result.field, FieldClassification::OncologyImmunology);
        assert!(result.relevance_score.value() > 0.0);
    }

    #[test]
    fn suggestions_match_substrings() {
        let a = analyzer();
        let suggestions = a.suggest_keywords("immuno", 3);
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions.iter().all(|s| s.to_lowercase().contains("immuno")));
        assert!(a.suggest_keywords("", 5).is_empty());
    }
}
