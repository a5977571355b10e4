// src/utils/log.rs

//! Console output for human-facing run progress.
//!
//! Diagnostics go through the `log` facade. This module only prints the
//! headers, steps and summaries an operator watches during a harvest, and
//! stays quiet when the configured level is above `info`.

use std::sync::OnceLock;

use chrono::Local;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Set the console level once at startup. Progress lines are printed for
/// `trace`, `debug` and `info`; anything stricter silences them.
pub fn init(level: &str) {
    let _ = QUIET.set(is_quiet(level));
}

fn is_quiet(level: &str) -> bool {
    matches!(
        level.trim().to_ascii_lowercase().as_str(),
        "warn" | "error" | "off"
    )
}

fn line(message: &str) -> String {
    format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
}

fn emit(message: &str) {
    if !QUIET.get().copied().unwrap_or(false) {
        println!("{}", line(message));
    }
}

pub fn info(message: &str) {
    emit(message);
}

/// Printed regardless of level.
pub fn success(message: &str) {
    println!("{}", line(&format!("✓ {message}")));
}

pub fn step(current: usize, total: usize, message: &str) {
    emit(&format!("[{current}/{total}] {message}"));
}

pub fn header(title: &str) {
    let rule = "═".repeat(60);
    emit(&rule);
    emit(&format!("  {title}"));
    emit(&rule);
}

pub fn sub_item(message: &str) {
    emit(&format!("    {message}"));
}

/// Titled block of `key: value` lines.
pub fn summary(title: &str, items: &[(&str, String)]) {
    emit(&format!("── {title} ──"));
    let width = items.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in items {
        emit(&format!("    {key:<width$}  {value}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_levels_silence_progress() {
        assert!(is_quiet("warn"));
        assert!(is_quiet(" ERROR "));
        assert!(!is_quiet("info"));
        assert!(!is_quiet("debug"));
        assert!(!is_quiet("unknown"));
    }

    #[test]
    fn lines_carry_a_timestamp() {
        let out = line("3 institutions");
        assert!(out.starts_with('['));
        assert!(out.ends_with("] 3 institutions"));
    }
}
