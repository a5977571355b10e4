// src/pipeline/validate.rs

use std::path::Path;

use crate::config::load_all;
use crate::error::Result;
use crate::services::{ExtractorRegistry, discover_target_urls};
use crate::utils::log as console;

/// Validate configuration and seed data using load_all.
pub fn run_validate(base_path: &Path) -> Result<()> {
    console::header("Validating configuration");

    match load_all(base_path) {
        Ok((config, seed)) => {
            // Compiles every configured selector.
            ExtractorRegistry::from_config(&config.extraction)?;

            console::success("Config loaded");
            console::sub_item(&format!("User agent: {}", config.http.user_agent));
            console::sub_item(&format!(
                "Rate: {} req/s, burst {}",
                config.rate_limit.requests_per_second, config.rate_limit.burst_limit
            ));
            console::sub_item(&format!(
                "Retries: {} (base {} ms, max {} ms)",
                config.retry.max_retries, config.retry.base_delay_ms, config.retry.max_delay_ms
            ));
            console::sub_item(&format!("Max concurrent: {}", config.fetch.max_concurrent));
            console::sub_item(&format!(
                "Extraction layouts: {}",
                config.extraction.layouts.len()
            ));

            console::success("Seed loaded");
            for institution in &seed.institutions {
                console::sub_item(&format!(
                    "[{}] {} ({}, {} target URLs)",
                    institution.id,
                    institution.name,
                    institution.faculty_type().as_str(),
                    discover_target_urls(institution).len()
                ));
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Validation failed: {e}");
            Err(e)
        }
    }
}
