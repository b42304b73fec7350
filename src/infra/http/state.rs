use std::sync::Arc;

use crate::application::alerts::AlertService;
use crate::application::batch::BatchService;
use crate::application::reports::ReportService;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub reports: Arc<ReportService>,
    pub batch: Arc<BatchService>,
    pub alerts: Arc<AlertService>,
    pub db: Arc<PostgresRepositories>,
}
