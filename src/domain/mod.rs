//! Domain model: the catalog of warehouse consumption reports.

pub mod reports;

pub use reports::{ReportFilter, ReportKind, SortOrder};
