use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use insumo_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::alerts::AlertError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::infra::error::InfraError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION: &str = "validation_failed";
    pub const DUPLICATE: &str = "duplicate";
    pub const UNAVAILABLE: &str = "service_unavailable";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn conflict(message: &'static str) -> Self {
        Self::new(StatusCode::CONFLICT, codes::DUPLICATE, message, None)
    }

    pub fn unavailable(message: &'static str, hint: Option<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::UNAVAILABLE,
            message,
            hint,
        )
    }

    pub fn internal(hint: Option<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Unexpected error occurred",
            hint,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

impl From<InfraError> for ApiError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Database { message } => {
                Self::unavailable("Warehouse temporarily unavailable", Some(message))
            }
            other => Self::internal(Some(other.to_string())),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::DuplicateEmail => Self::conflict("Recipient email already registered"),
            RepoError::NotFound => Self::not_found("Recipient not found"),
            RepoError::Persistence(message) => {
                Self::unavailable("Recipient store unavailable", Some(message))
            }
        }
    }
}

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::Validation(message) => {
                Self::new(
                    StatusCode::BAD_REQUEST,
                    codes::VALIDATION,
                    "Validation failed",
                    Some(message),
                )
            }
            AlertError::Repo(repo) => repo.into(),
            AlertError::Infra(infra) => infra.into(),
            AlertError::Template(err) => Self::internal(Some(err.to_string())),
        }
    }
}
