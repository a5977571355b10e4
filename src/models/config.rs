//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
///
/// Built once at startup and handed to each component constructor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-domain admission control
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batched fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Lab record quality gates
    #[serde(default)]
    pub quality: QualityConfig,

    /// Selector layouts tried by the extractors
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Output locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if !(self.rate_limit.requests_per_second > 0.0) {
            return Err(AppError::validation(
                "rate_limit.requests_per_second must be > 0",
            ));
        }
        if self.rate_limit.burst_limit == 0 {
            return Err(AppError::validation("rate_limit.burst_limit must be > 0"));
        }
        if self.rate_limit.min_rate_multiplier <= 0.0
            || self.rate_limit.min_rate_multiplier > self.rate_limit.max_rate_multiplier
        {
            return Err(AppError::validation(
                "rate_limit.min_rate_multiplier must be in (0, max_rate_multiplier]",
            ));
        }
        let rl = &self.rate_limit;
        if !(rl.tighten_factor > 0.0 && rl.tighten_factor <= 1.0) {
            return Err(AppError::validation(
                "rate_limit.tighten_factor must be in (0, 1]",
            ));
        }
        if !(rl.loosen_factor >= 1.0 && rl.loosen_factor.is_finite()) {
            return Err(AppError::validation("rate_limit.loosen_factor must be >= 1.0"));
        }
        if !(0.0 <= rl.loosen_error_rate
            && rl.loosen_error_rate <= rl.tighten_error_rate
            && rl.tighten_error_rate <= 1.0)
        {
            return Err(AppError::validation(
                "rate_limit error rates must satisfy 0 <= loosen_error_rate <= tighten_error_rate <= 1",
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(AppError::validation("retry.backoff_factor must be >= 1.0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(AppError::validation(
                "retry.max_delay_ms must be >= retry.base_delay_ms",
            ));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::validation("fetch.max_concurrent must be > 0"));
        }
        for (name, value) in [
            ("quality.min_relevance_score", self.quality.min_relevance_score),
            ("quality.acceptance_threshold", self.quality.acceptance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::validation(format!("{name} must be in [0, 1]")));
            }
        }
        if self.quality.weights.total() <= 0.0 {
            return Err(AppError::validation("quality.weights must sum to > 0"));
        }
        if self.extraction.layouts.is_empty() {
            return Err(AppError::validation("No extraction layouts defined"));
        }
        Ok(())
    }

    /// Seed file location under `base`.
    pub fn seed_path(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.seed_file)
    }

    /// Snapshot directory under `base`.
    pub fn output_path(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.output_dir)
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Token bucket and adaptation settings, applied per target domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Steady-state admissions per second
    #[serde(default = "defaults::requests_per_second")]
    pub requests_per_second: f64,

    /// Bucket capacity
    #[serde(default = "defaults::burst_limit")]
    pub burst_limit: u32,

    /// Minimum seconds between two rate adjustments
    #[serde(default = "defaults::adjustment_window")]
    pub adjustment_window_secs: u64,

    /// Observations required before the rate is adjusted
    #[serde(default = "defaults::min_observations")]
    pub min_observations: u64,

    /// Error rate above which the rate is tightened
    #[serde(default = "defaults::tighten_error_rate")]
    pub tighten_error_rate: f64,

    /// Error rate below which the rate is loosened
    #[serde(default = "defaults::loosen_error_rate")]
    pub loosen_error_rate: f64,

    #[serde(default = "defaults::tighten_factor")]
    pub tighten_factor: f64,

    #[serde(default = "defaults::loosen_factor")]
    pub loosen_factor: f64,

    /// Upper bound on the adapted rate, as a multiple of the base rate
    #[serde(default = "defaults::max_rate_multiplier")]
    pub max_rate_multiplier: f64,

    /// Lower bound on the adapted rate, as a multiple of the base rate
    #[serde(default = "defaults::min_rate_multiplier")]
    pub min_rate_multiplier: f64,
}

impl RateLimitConfig {
    pub fn adjustment_window(&self) -> Duration {
        Duration::from_secs(self.adjustment_window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: defaults::requests_per_second(),
            burst_limit: defaults::burst_limit(),
            adjustment_window_secs: defaults::adjustment_window(),
            min_observations: defaults::min_observations(),
            tighten_error_rate: defaults::tighten_error_rate(),
            loosen_error_rate: defaults::loosen_error_rate(),
            tighten_factor: defaults::tighten_factor(),
            loosen_factor: defaults::loosen_factor(),
            max_rate_multiplier: defaults::max_rate_multiplier(),
            min_rate_multiplier: defaults::min_rate_multiplier(),
        }
    }
}

/// Retry policy for a single logical fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Exponential growth factor between retries
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Ceiling on a single backoff delay in milliseconds
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Scale each delay by a random factor in [0.5, 1.0]
    #[serde(default = "defaults::enabled")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay(),
            backoff_factor: defaults::backoff_factor(),
            max_delay_ms: defaults::max_delay(),
            jitter: defaults::enabled(),
        }
    }
}

/// Batched fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum in-flight requests in one batch
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Cancel the remainder of a batch after this many seconds
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            batch_timeout_secs: None,
        }
    }
}

/// Quality gates applied by the lab data processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum research content length (characters)
    #[serde(default = "defaults::min_content_length")]
    pub min_content_length: usize,

    /// Relevance score that earns the relevance weight
    #[serde(default = "defaults::min_relevance_score")]
    pub min_relevance_score: f64,

    /// Records scoring below this are rejected
    #[serde(default = "defaults::acceptance_threshold")]
    pub acceptance_threshold: f64,

    /// Name length (characters) that earns the name weight
    #[serde(default = "defaults::long_name_chars")]
    pub long_name_chars: usize,

    /// Content length (characters) that earns the content weight
    #[serde(default = "defaults::long_content_chars")]
    pub long_content_chars: usize,

    /// Keyword count that earns the keyword weight
    #[serde(default = "defaults::min_keyword_count")]
    pub min_keyword_count: usize,

    #[serde(default)]
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_content_length: defaults::min_content_length(),
            min_relevance_score: defaults::min_relevance_score(),
            acceptance_threshold: defaults::acceptance_threshold(),
            long_name_chars: defaults::long_name_chars(),
            long_content_chars: defaults::long_content_chars(),
            min_keyword_count: defaults::min_keyword_count(),
            weights: QualityWeights::default(),
        }
    }
}

/// Weights of the quality score signals.
///
/// Defaults split 50/30/20 across basic completeness, detail richness and
/// topic relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityWeights {
    pub name: f64,
    pub professor: f64,
    pub content: f64,
    pub keywords: f64,
    pub url: f64,
    pub relevance: f64,
}

impl QualityWeights {
    pub fn total(&self) -> f64 {
        self.name + self.professor + self.content + self.keywords + self.url + self.relevance
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            name: 0.2,
            professor: 0.15,
            content: 0.15,
            keywords: 0.15,
            url: 0.15,
            relevance: 0.2,
        }
    }
}

/// Selector layouts used to pull lab records out of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "defaults::layouts")]
    pub layouts: Vec<LabLayout>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            layouts: defaults::layouts(),
        }
    }
}

/// CSS selectors describing one lab listing layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabLayout {
    /// Layout name for identification
    pub name: String,

    /// Selector for each lab block
    pub item_selector: String,

    /// Selector for the lab name within a block
    pub name_selector: String,

    /// Selector for the professor name within a block
    pub professor_selector: String,

    /// Selector for the research description within a block
    pub content_selector: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords_selector: Option<String>,

    /// Selector for the lab homepage link (defaults to the name element)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_selector: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Print per-stage details during a harvest
    #[serde(default = "defaults::enabled")]
    pub show_progress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            show_progress: defaults::enabled(),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Seed file listing institutions, relative to the storage directory
    #[serde(default = "defaults::seed_file")]
    pub seed_file: String,

    /// Directory for per-institution snapshots
    #[serde(default = "defaults::output_dir")]
    pub output_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            seed_file: defaults::seed_file(),
            output_dir: defaults::output_dir(),
        }
    }
}

mod defaults {
    use super::LabLayout;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; lab-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Rate limit defaults
    pub fn requests_per_second() -> f64 {
        0.5
    }
    pub fn burst_limit() -> u32 {
        3
    }
    pub fn adjustment_window() -> u64 {
        60
    }
    pub fn min_observations() -> u64 {
        10
    }
    pub fn tighten_error_rate() -> f64 {
        0.10
    }
    pub fn loosen_error_rate() -> f64 {
        0.02
    }
    pub fn tighten_factor() -> f64 {
        0.8
    }
    pub fn loosen_factor() -> f64 {
        1.1
    }
    pub fn max_rate_multiplier() -> f64 {
        2.0
    }
    pub fn min_rate_multiplier() -> f64 {
        0.1
    }

    // Retry defaults
    pub fn max_retries() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        1_000
    }
    pub fn backoff_factor() -> f64 {
        2.0
    }
    pub fn max_delay() -> u64 {
        60_000
    }

    // Fetch defaults
    pub fn max_concurrent() -> usize {
        3
    }

    // Quality defaults
    pub fn min_content_length() -> usize {
        50
    }
    pub fn min_relevance_score() -> f64 {
        0.3
    }
    pub fn acceptance_threshold() -> f64 {
        0.6
    }
    pub fn long_name_chars() -> usize {
        5
    }
    pub fn long_content_chars() -> usize {
        100
    }
    pub fn min_keyword_count() -> usize {
        3
    }

    pub fn enabled() -> bool {
        true
    }
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn seed_file() -> String {
        "institutions.toml".into()
    }
    pub fn output_dir() -> String {
        "output".into()
    }

    // Layout defaults
    pub fn layouts() -> Vec<LabLayout> {
        vec![
            LabLayout {
                name: "lab_card".to_string(),
                item_selector: "div.lab, div.laboratory, article.lab".to_string(),
                name_selector: "h2, h3, .lab-name".to_string(),
                professor_selector: ".professor, .pi, .staff".to_string(),
                content_selector: ".research, .description, p".to_string(),
                department_selector: Some(".department, .dept".to_string()),
                keywords_selector: Some(".keywords, .tags".to_string()),
                link_selector: Some("a[href]".to_string()),
            },
            LabLayout {
                name: "table_rows".to_string(),
                item_selector: "table.labs tr".to_string(),
                name_selector: "td:nth-child(1)".to_string(),
                professor_selector: "td:nth-child(2)".to_string(),
                content_selector: "td:nth-child(3)".to_string(),
                department_selector: None,
                keywords_selector: Some("td:nth-child(4)".to_string()),
                link_selector: Some("td:nth-child(1) a[href]".to_string()),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetch.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_rate() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(config.validate().is_err());
        config.rate_limit.requests_per_second = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_adaptation_factors() {
        let mut config = Config::default();
        config.rate_limit.loosen_factor = -1.0;
        assert!(config.validate().is_err());
        config.rate_limit.loosen_factor = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.tighten_factor = 0.0;
        assert!(config.validate().is_err());
        config.rate_limit.tighten_factor = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_error_rates() {
        let mut config = Config::default();
        config.rate_limit.loosen_error_rate = 0.2;
        config.rate_limit.tighten_error_rate = 0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.tighten_error_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.loosen_error_rate = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.quality.acceptance_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_weights_split_fifty_thirty_twenty() {
        let w = QualityWeights::default();
        assert!((w.name + w.professor + w.content - 0.5).abs() < 1e-9);
        assert!((w.keywords + w.url - 0.3).abs() < 1e-9);
        assert!((w.relevance - 0.2).abs() < 1e-9);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [rate_limit]
            requests_per_second = 1.5

            [quality]
            acceptance_threshold = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.requests_per_second, 1.5);
        assert_eq!(config.rate_limit.burst_limit, 3);
        assert_eq!(config.quality.acceptance_threshold, 0.7);
        assert_eq!(config.quality.min_content_length, 50);
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.extraction.layouts.is_empty());
    }
}
