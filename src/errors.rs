use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::authz::UnmetRequirement;
use crate::workflow::StepState;

pub type AppResult<T> = Result<T, AppError>;

/// Raised when no requirement group authorized the principal for a workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnauthorizedWorkflow {
    pub subtype: String,
    pub step: String,
    pub unmet: Vec<UnmetRequirement>,
}

impl std::fmt::Display for UnauthorizedWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "not allowed to act on step '{}' of a '{}' request",
            self.step, self.subtype
        )?;
        if !self.unmet.is_empty() {
            let codes: Vec<&str> = self.unmet.iter().map(|r| r.code.as_str()).collect();
            write!(f, " (missing one of: {})", codes.join(", "))?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized workflow: {0}")]
    UnauthorizedWorkflow(UnauthorizedWorkflow),
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid transition for step '{step}': {from:?} -> {to:?}")]
    InvalidTransition {
        step: String,
        from: StepState,
        to: StepState,
    },
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_workflow(message: impl Into<String>) -> Self {
        Self::InvalidWorkflow(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Unmet requirements when this is an authorization failure, empty otherwise.
    pub fn unmet_requirements(&self) -> &[UnmetRequirement] {
        match self {
            AppError::UnauthorizedWorkflow(denied) => &denied.unmet,
            _ => &[],
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unmet_requirements: Vec<UnmetRequirement>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::UnauthorizedWorkflow(_) => StatusCode::FORBIDDEN,
            AppError::ContractViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::InvalidWorkflow(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let error = match &self {
            AppError::UnauthorizedWorkflow(_) => "unauthorized_workflow",
            AppError::ContractViolation(_) => "contract_violation",
            AppError::Configuration(_) => "configuration",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::InvalidWorkflow(_) => "invalid_workflow",
            AppError::BadRequest(_) => "bad_request",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        };

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
            unmet_requirements: self.unmet_requirements().to_vec(),
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> AppError {
        AppError::UnauthorizedWorkflow(UnauthorizedWorkflow {
            subtype: "normal".to_string(),
            step: "proposal".to_string(),
            unmet: vec![UnmetRequirement {
                code: "resource_owner".to_string(),
                description: "Must be resource owner for department 'TPD PRD MY'".to_string(),
            }],
        })
    }

    #[test]
    fn unauthorized_workflow_maps_to_forbidden_with_requirements() {
        let response = denied().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn forbidden_body_lists_unmet_requirements() {
        let response = denied().into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["error"], "unauthorized_workflow");
        assert_eq!(value["unmet_requirements"][0]["code"], "resource_owner");
    }

    #[test]
    fn contract_violation_is_a_server_error() {
        let response = AppError::contract_violation("roles not loaded").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn display_names_missing_codes() {
        let message = denied().to_string();
        assert!(message.contains("proposal"));
        assert!(message.contains("resource_owner"));
    }
}
