//! Error type shared by the classifier, the database layer and the HTTP handlers.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required header is absent from the uploaded file.
    #[error("Kolom '{0}' tidak ditemukan pada file CSV")]
    MissingColumn(String),

    /// A field could not be parsed as a number after decimal normalization.
    #[error("Nilai '{value}' pada kolom '{column}' baris {row} bukan angka")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Status '{value}' pada baris {row} tidak dikenal (harus 'DO' atau 'Tidak DO')")]
    UnknownStatus { row: usize, value: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Error occurred: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code carried in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Csv(_)
            | Error::MissingColumn(_)
            | Error::InvalidValue { .. }
            | Error::UnknownStatus { .. }
            | Error::InvalidInput(_) => "invalid_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Database(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Model(_)
            | Error::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.code() {
            "invalid_request" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "conflict" => StatusCode::CONFLICT,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(ErrorBody {
            error: self.code(),
            message,
        })
    }
}
