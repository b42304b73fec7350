mod growth_alert;

pub use growth_alert::{
    GrowthAlertContext, GrowthAlertJob, growth_alert_schedule, process_growth_alert_job,
};
