//! Traits describing the persistence adapters the services depend on.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use insumo_api_types::{CreateRecipientRequest, RecipientRecord, UpdateRecipientRequest};

use crate::domain::{ReportFilter, ReportKind};
use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("recipient email already registered")]
    DuplicateEmail,
    #[error("recipient not found")]
    NotFound,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<RepoError> for InfraError {
    fn from(err: RepoError) -> Self {
        InfraError::database(err.to_string())
    }
}

/// Read-only access to the consumption view in the warehouse. One method per
/// pipeline; the report kind selects the query, the filter binds its
/// parameter.
#[async_trait]
pub trait WarehouseGateway: Send + Sync {
    async fn execute(
        &self,
        kind: ReportKind,
        filter: ReportFilter,
    ) -> Result<Vec<Value>, InfraError>;
}

/// Alert recipient registry. Deletion is a soft flip of `active`; only
/// active recipients receive mail.
#[async_trait]
pub trait RecipientsRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<RecipientRecord>, RepoError>;

    async fn find(&self, id: i32) -> Result<Option<RecipientRecord>, RepoError>;

    async fn create(&self, params: CreateRecipientRequest) -> Result<RecipientRecord, RepoError>;

    async fn update(
        &self,
        id: i32,
        params: UpdateRecipientRequest,
    ) -> Result<RecipientRecord, RepoError>;

    async fn deactivate(&self, id: i32) -> Result<(), RepoError>;

    async fn active_emails(&self) -> Result<Vec<String>, RepoError>;
}
