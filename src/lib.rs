//! Materials-consumption monitoring backend.
//!
//! Serves cached warehouse consumption reports over HTTP, coalesces batch
//! and preload requests, and dispatches growth alert emails to a managed
//! recipient list on a cron schedule.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
