// src/lib.rs

//! Lab Crawler Library
//!
//! Harvests research lab listings from university websites under per-domain
//! rate limits, then validates, deduplicates, enriches and quality-scores
//! them into lab entities.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
