use async_trait::async_trait;
use sqlx::QueryBuilder;

use insumo_api_types::{CreateRecipientRequest, RecipientRecord, UpdateRecipientRequest};

use crate::application::repos::{RecipientsRepo, RepoError};

use super::PostgresRepositories;

fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            RepoError::DuplicateEmail
        }
        other => RepoError::from_persistence(other),
    }
}

#[async_trait]
impl RecipientsRepo for PostgresRepositories {
    async fn list(&self) -> Result<Vec<RecipientRecord>, RepoError> {
        sqlx::query_as::<_, RecipientRecord>(
            "SELECT id, name, email, active, created_at \
             FROM ctrl.alert_recipients WHERE active ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn find(&self, id: i32) -> Result<Option<RecipientRecord>, RepoError> {
        sqlx::query_as::<_, RecipientRecord>(
            "SELECT id, name, email, active, created_at \
             FROM ctrl.alert_recipients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn create(&self, params: CreateRecipientRequest) -> Result<RecipientRecord, RepoError> {
        sqlx::query_as::<_, RecipientRecord>(
            "INSERT INTO ctrl.alert_recipients (name, email, active) \
             VALUES ($1, $2, $3) \
             RETURNING id, name, email, active, created_at",
        )
        .bind(&params.name)
        .bind(&params.email)
        .bind(params.active.unwrap_or(true))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn update(
        &self,
        id: i32,
        params: UpdateRecipientRequest,
    ) -> Result<RecipientRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE ctrl.alert_recipients SET ");
        let mut fields = qb.separated(", ");
        if let Some(name) = params.name.as_ref() {
            fields.push("name = ");
            fields.push_bind_unseparated(name);
        }
        if let Some(email) = params.email.as_ref() {
            fields.push("email = ");
            fields.push_bind_unseparated(email);
        }
        if let Some(active) = params.active {
            fields.push("active = ");
            fields.push_bind_unseparated(active);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING id, name, email, active, created_at");

        qb.build_query_as::<RecipientRecord>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)
    }

    async fn deactivate(&self, id: i32) -> Result<(), RepoError> {
        let row = sqlx::query_scalar::<_, i32>(
            "UPDATE ctrl.alert_recipients SET active = FALSE WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|_| ()).ok_or(RepoError::NotFound)
    }

    async fn active_emails(&self) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            "SELECT email FROM ctrl.alert_recipients WHERE active ORDER BY email",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
