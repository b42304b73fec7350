//! Application services: the cached report pipeline, batch coalescing,
//! alert recipient management and the scheduled dispatch job.

pub mod alerts;
pub mod batch;
pub mod error;
pub mod jobs;
pub mod reports;
pub mod repos;

pub use alerts::{AlertError, AlertService};
pub use batch::{BatchService, MAX_BATCH_ITEMS, PRELOAD_KINDS};
pub use reports::{CacheOutcome, ReportService};
pub use repos::{RecipientsRepo, RepoError, WarehouseGateway};
