//! Alert recipient management and growth alert dispatch.

use std::sync::Arc;

use askama::Template;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{info, warn};

use insumo_api_types::{
    CreateRecipientRequest, DispatchError, DispatchSummary, RecipientRecord,
    UpdateRecipientRequest,
};

use crate::application::repos::{RecipientsRepo, RepoError};
use crate::application::reports::ReportService;
use crate::domain::{ReportFilter, ReportKind};
use crate::infra::error::InfraError;
use crate::infra::mailer::AlertMailer;

const MAX_FIELD_LEN: usize = 255;
const HIGHLIGHT_THRESHOLD_PCT: f64 = 100.0;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("alert template rendering failed: {0}")]
    Template(#[from] askama::Error),
}

impl AlertError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// One row of the alert email table.
struct GrowthRow {
    material: String,
    previous: String,
    current: String,
    growth: String,
    highlight: bool,
}

#[derive(Template)]
#[template(path = "alert_email.html")]
struct GrowthAlertEmail {
    generated_on: String,
    rows: Vec<GrowthRow>,
}

pub struct AlertService {
    recipients: Arc<dyn RecipientsRepo>,
    reports: Arc<ReportService>,
    mailer: Arc<dyn AlertMailer>,
}

impl AlertService {
    pub fn new(
        recipients: Arc<dyn RecipientsRepo>,
        reports: Arc<ReportService>,
        mailer: Arc<dyn AlertMailer>,
    ) -> Self {
        Self {
            recipients,
            reports,
            mailer,
        }
    }

    pub async fn list(&self) -> Result<Vec<RecipientRecord>, AlertError> {
        Ok(self.recipients.list().await?)
    }

    pub async fn create(
        &self,
        mut params: CreateRecipientRequest,
    ) -> Result<RecipientRecord, AlertError> {
        params.name = validate_name(&params.name)?;
        params.email = validate_email(&params.email)?;
        Ok(self.recipients.create(params).await?)
    }

    /// Partial update. A request with no fields set returns the current
    /// record unchanged.
    pub async fn update(
        &self,
        id: i32,
        mut params: UpdateRecipientRequest,
    ) -> Result<RecipientRecord, AlertError> {
        if let Some(name) = params.name.as_deref() {
            params.name = Some(validate_name(name)?);
        }
        if let Some(email) = params.email.as_deref() {
            params.email = Some(validate_email(email)?);
        }
        if params.name.is_none() && params.email.is_none() && params.active.is_none() {
            return self
                .recipients
                .find(id)
                .await?
                .ok_or(AlertError::Repo(RepoError::NotFound));
        }
        Ok(self.recipients.update(id, params).await?)
    }

    pub async fn remove(&self, id: i32) -> Result<(), AlertError> {
        Ok(self.recipients.deactivate(id).await?)
    }

    /// Send the growth alert to every active recipient. A failing send never
    /// aborts the run; each recipient is attempted and failures are listed in
    /// the summary.
    pub async fn dispatch(&self) -> Result<DispatchSummary, AlertError> {
        let (emails, growth) = tokio::try_join!(
            async { self.recipients.active_emails().await.map_err(AlertError::from) },
            async {
                self.reports
                    .fetch(ReportKind::AbruptGrowth, ReportFilter::default())
                    .await
                    .map_err(AlertError::from)
            },
        )?;

        if emails.is_empty() {
            info!("growth alert skipped, no active recipients");
            return Ok(DispatchSummary {
                ok: true,
                sent: 0,
                failed: 0,
                errors: Vec::new(),
                message: Some("no active recipients".to_string()),
            });
        }

        let generated_on = today();
        let email = GrowthAlertEmail {
            rows: growth_rows(&growth.0),
            generated_on: generated_on.clone(),
        };
        let html = email.render()?;
        let subject = format!("Abrupt consumption growth alert ({generated_on})");

        let mut summary = DispatchSummary {
            ok: true,
            sent: 0,
            failed: 0,
            errors: Vec::new(),
            message: None,
        };
        for to in &emails {
            match self.mailer.send(to, &subject, &html).await {
                Ok(()) => summary.sent += 1,
                Err(err) => {
                    warn!(%to, error = %err, "growth alert delivery failed");
                    summary.failed += 1;
                    summary.errors.push(DispatchError {
                        email: to.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        summary.ok = summary.failed == 0;
        info!(sent = summary.sent, failed = summary.failed, "growth alert dispatched");
        Ok(summary)
    }
}

fn validate_name(raw: &str) -> Result<String, AlertError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AlertError::validation("name must not be empty"));
    }
    if name.len() > MAX_FIELD_LEN {
        return Err(AlertError::validation("name exceeds 255 characters"));
    }
    Ok(name.to_string())
}

fn validate_email(raw: &str) -> Result<String, AlertError> {
    let email = raw.trim().to_ascii_lowercase();
    if email.len() > MAX_FIELD_LEN {
        return Err(AlertError::validation("email exceeds 255 characters"));
    }
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed || email.contains(char::is_whitespace) {
        return Err(AlertError::validation("email address is not valid"));
    }
    Ok(email)
}

fn today() -> String {
    let format = format_description!("[year]-[month]-[day]");
    OffsetDateTime::now_utc()
        .date()
        .format(&format)
        .unwrap_or_else(|_| "unknown date".to_string())
}

fn growth_rows(payload: &serde_json::Value) -> Vec<GrowthRow> {
    let Some(rows) = payload["data"].as_array() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let growth_pct = row["growth_pct"].as_f64();
            GrowthRow {
                material: row["material"].as_str().unwrap_or("unknown").to_string(),
                previous: format_quantity(row["previous_month_consumption"].as_f64()),
                current: format_quantity(row["current_month_consumption"].as_f64()),
                growth: growth_pct
                    .map(|pct| format!("{pct:.1}%"))
                    .unwrap_or_else(|| "n/a".to_string()),
                highlight: growth_pct.is_some_and(|pct| pct > HIGHLIGHT_THRESHOLD_PCT),
            }
        })
        .collect()
}

fn format_quantity(value: Option<f64>) -> String {
    match value {
        Some(quantity) => format!("{quantity:.2}"),
        None => "n/a".to_string(),
    }
}
