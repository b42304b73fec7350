mod batch;
mod cache;
mod health;
mod index;
mod recipients;
mod reports;

pub use batch::{batch, preload};
pub use cache::{cache_clear, cache_info, cache_stats};
pub use health::{health, health_check};
pub use index::index;
pub use recipients::{
    create_recipient, delete_recipient, dispatch_alerts, list_recipients, update_recipient,
};
pub use reports::report;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub(crate) fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
