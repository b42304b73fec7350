//! Cron job dispatching the growth alert email.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use cron::Schedule;

use crate::application::alerts::AlertService;

/// Marker struct for the cron-triggered dispatch.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct GrowthAlertJob;

impl From<chrono::DateTime<chrono::Utc>> for GrowthAlertJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct GrowthAlertContext {
    pub alerts: Arc<AlertService>,
}

/// Process one scheduled dispatch. Failures are logged, never retried; the
/// next scheduled run covers them.
pub async fn process_growth_alert_job(
    _job: GrowthAlertJob,
    ctx: Data<GrowthAlertContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.alerts.dispatch().await {
        Ok(summary) => {
            tracing::info!(
                sent = summary.sent,
                failed = summary.failed,
                "Scheduled growth alert dispatched"
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "Scheduled growth alert failed");
        }
    }
    Ok(())
}

/// Parse the configured cron expression into a schedule.
pub fn growth_alert_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_parses_and_yields_runs() {
        // Three mornings a month: the 6th, 16th and 25th at 08:00.
        let schedule = growth_alert_schedule("0 0 8 6,16,25 * *").unwrap();
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
        for run in upcoming {
            use chrono::{Datelike, Timelike};
            assert_eq!(run.hour(), 8);
            assert!(matches!(run.day(), 6 | 16 | 25));
        }
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(growth_alert_schedule("not a cron line").is_err());
    }
}
