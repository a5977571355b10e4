//! Text helpers shared by the analyzer, extractors and processor.

use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

fn starts_at_boundary(before: &str) -> bool {
    !before.chars().next_back().is_some_and(is_word_char)
}

/// A match may be followed by a plural suffix before the word ends.
fn ends_at_boundary(after: &str) -> bool {
    let clear = |s: &str| !s.chars().next().is_some_and(is_word_char);
    clear(after)
        || ["s", "es"]
            .iter()
            .any(|suffix| after.strip_prefix(suffix).is_some_and(clear))
}

/// A vocabulary term prepared for matching against lowercased text.
///
/// Latin terms only match whole words (plurals allowed), so `ige` does not
/// fire inside `investigate`. Terms in scripts without word spacing match
/// anywhere.
#[derive(Debug, Clone)]
pub struct Term {
    text: &'static str,
    needle: String,
    bounded: bool,
}

impl Term {
    pub fn new(text: &'static str) -> Self {
        let needle = text.to_lowercase();
        let bounded = needle.starts_with(is_word_char) || needle.ends_with(is_word_char);
        Self {
            text,
            needle,
            bounded,
        }
    }

    /// The term as written in the vocabulary.
    pub fn text(&self) -> &'static str {
        self.text
    }

    /// Occurrences in `haystack`, which must already be lowercased.
    pub fn count_in(&self, haystack: &str) -> usize {
        if self.needle.is_empty() {
            return 0;
        }
        haystack
            .match_indices(self.needle.as_str())
            .filter(|(start, m)| {
                !self.bounded
                    || (starts_at_boundary(&haystack[..*start])
                        && ends_at_boundary(&haystack[start + m.len()..]))
            })
            .count()
    }

    pub fn found_in(&self, haystack: &str) -> bool {
        self.count_in(haystack) > 0
    }
}

/// An ordered list of terms. Order is the vocabulary order, so results are
/// deterministic.
#[derive(Debug, Clone)]
pub struct TermList(Vec<Term>);

impl TermList {
    pub fn new(terms: &[&'static str]) -> Self {
        Self(terms.iter().copied().map(Term::new).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.0.iter()
    }

    pub fn any_in(&self, haystack: &str) -> bool {
        self.0.iter().any(|t| t.found_in(haystack))
    }

    /// Number of distinct terms present.
    pub fn distinct_in(&self, haystack: &str) -> usize {
        self.0.iter().filter(|t| t.found_in(haystack)).count()
    }

    /// Present terms, each once, in vocabulary order.
    pub fn matches_in(&self, haystack: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|t| t.found_in(haystack))
            .map(|t| t.text().to_string())
            .collect()
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Case-fold and drop whitespace and punctuation, keeping word characters.
pub fn normalize_key(text: &str) -> String {
    text.unicode_words()
        .flat_map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Length in characters rather than bytes.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_terms_need_word_boundaries() {
        let ige = Term::new("IgE");
        assert_eq!(ige.count_in("we investigate ige levels"), 1);
        assert!(!ige.found_in("investigate"));

        let rat = Term::new("rat");
        assert!(!rat.found_in("ratio of cells"));
        assert!(rat.found_in("rats and mice"));
    }

    #[test]
    fn plurals_still_match() {
        let cytokine = Term::new("cytokine");
        assert_eq!(cytokine.count_in("cytokines and a cytokine"), 2);
        assert!(Term::new("virus").found_in("respiratory viruses"));
    }

    #[test]
    fn cjk_terms_match_anywhere() {
        let term = Term::new("免疫");
        assert_eq!(term.count_in("自己免疫疾患と腸管免疫"), 2);
    }

    #[test]
    fn mixed_script_terms() {
        assert!(Term::new("T細胞").found_in("制御性t細胞の研究"));
    }

    #[test]
    fn term_list_preserves_vocabulary_order() {
        let list = TermList::new(&["tumor", "cancer", "virus"]);
        assert_eq!(
            list.matches_in("virus and cancer and tumor and cancer"),
            vec!["tumor", "cancer", "virus"]
        );
        assert_eq!(list.distinct_in("cancer cancer"), 1);
    }

    #[test]
    fn normalize_key_ignores_case_spacing_and_punctuation() {
        assert_eq!(normalize_key("Immune Lab"), normalize_key("immune  lab"));
        assert_eq!(normalize_key("Immune-Lab!"), normalize_key("immune lab"));
        assert_eq!(normalize_key("  Tanaka, T. "), "tanakat");
        assert_eq!(normalize_key("免疫 学 研究室"), "免疫学研究室");
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \n\t b  c "), "a b c");
    }
}
