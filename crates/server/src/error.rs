use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use teambeat_api::{ActionResponse, ServiceError};

use crate::views;

/// Response extension marking an error the application rendered itself.
/// The session gate leaves these alone instead of masking them.
#[derive(Clone, Copy, Debug)]
pub struct HandledError;

/// Unified handler error.
///
/// Renders the application's error page, or the `{status, errorMessage}`
/// envelope for JSON endpoints.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    json: bool,
}

impl ApiErr {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            json: false,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Render as JSON instead of an HTML page.
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Build a closure that logs a DB/IO error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e}");
            Self::internal("An unknown error occurred.")
        }
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        if let ServiceError::Internal(detail) = &e {
            tracing::error!("{detail}");
            return Self::internal("An unknown error occurred.");
        }
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.message())
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let mut response = if self.json {
            (self.status, Json(ActionResponse::error(self.message))).into_response()
        } else {
            (self.status, views::error_page(self.status, &self.message)).into_response()
        };
        response.extensions_mut().insert(HandledError);
        response
    }
}
