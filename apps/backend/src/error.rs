use std::error::Error as StdError;

use actix_web::error::ResponseError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use thiserror::Error;

use crate::errors::{DomainError, ErrorCode};
use crate::store::StoreError;
use crate::trace_ctx;

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub trace_id: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {detail}")]
    Validation { code: ErrorCode, detail: String },
    #[error("Bad request: {detail}")]
    BadRequest { code: ErrorCode, detail: String },
    #[error("Not found: {detail}")]
    NotFound { code: ErrorCode, detail: String },
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Store unavailable: {detail}")]
    StoreUnavailable {
        detail: String,
        #[source]
        source: BoxedSource,
    },
    #[error("Internal error: {detail}")]
    Internal {
        code: ErrorCode,
        detail: String,
        #[source]
        source: BoxedSource,
    },
    #[error("Configuration error: {detail}")]
    Config {
        detail: String,
        #[source]
        source: BoxedSource,
    },
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { code, .. }
            | AppError::BadRequest { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => *code,
            AppError::TooManyRequests => ErrorCode::TooManyRequests,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::Config { .. } => ErrorCode::ConfigError,
        }
    }

    /// Client-facing detail. Server-side failures stay generic.
    fn detail(&self) -> String {
        match self {
            AppError::Validation { detail, .. }
            | AppError::BadRequest { detail, .. }
            | AppError::NotFound { detail, .. } => detail.clone(),
            AppError::TooManyRequests => "Too many requests, slow down".to_string(),
            AppError::StoreUnavailable { .. } => "Game store is unavailable".to_string(),
            AppError::Internal { .. } | AppError::Config { .. } => {
                "An internal error occurred".to_string()
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } | AppError::Config { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ValidationError,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest {
            code: ErrorCode::BadRequest,
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Config {
            detail: detail.into(),
            source: source.into(),
        }
    }

    fn humanize_code(code: &str) -> String {
        code.split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { code } => AppError::NotFound {
                code: ErrorCode::GameNotFound,
                detail: format!("game {code} not found"),
            },
            other => AppError::StoreUnavailable {
                detail: other.to_string(),
                source: Box::new(other),
            },
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::GameNotFound { .. } => AppError::NotFound {
                code: ErrorCode::GameNotFound,
                detail: err.to_string(),
            },
            DomainError::TooManyRequests => AppError::TooManyRequests,
            DomainError::Internal { .. } => AppError::Internal {
                code: ErrorCode::Internal,
                detail: err.to_string(),
                source: Box::new(err),
            },
            other => AppError::BadRequest {
                code: other.code(),
                detail: other.client_message(),
            },
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status();
        let code = self.code().as_str();
        let trace_id = trace_ctx::trace_id();

        let problem_details = ProblemDetails {
            type_: format!("https://skyjo.local/errors/{code}"),
            title: Self::humanize_code(code),
            status: status.as_u16(),
            detail: self.detail(),
            code: code.to_string(),
            trace_id: trace_id.clone(),
        };

        HttpResponse::build(status)
            .content_type("application/problem+json")
            .insert_header(("x-trace-id", trace_id))
            .json(problem_details)
    }
}
