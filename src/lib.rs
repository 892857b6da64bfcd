//! Navidrome popularity sync - shared modules for the binary and tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod grouping;
pub mod lastfm;
pub mod models;
pub mod navidrome;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod rate_limiter;
pub mod scoring;
