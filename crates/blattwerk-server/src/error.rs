// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP error responses: `{ "error": <message>, "kind": <kind> }` with a status
// derived from the error kind.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blattwerk_core::client_errors::ClientError;
use blattwerk_core::error::ErrorKind;
use blattwerk_pipeline::DispatchError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: &'a str,
}

/// An error on its way to the caller.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub client: ClientError,
}

impl ApiError {
    pub fn new(client: ClientError) -> Self {
        Self {
            status: status_for(client.kind),
            client,
        }
    }

    /// A form that could not be read. Keeps axum's status so oversized bodies
    /// still answer 413.
    pub fn malformed_form(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            client: ClientError {
                kind: ErrorKind::ValidationError,
                message: format!("Failed to read upload: {}", err.body_text()),
                retriable: false,
            },
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self::new(err.client)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: &self.client.message,
            kind: self.client.kind.as_str(),
        });
        (self.status, body).into_response()
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError
        | ErrorKind::MalformedDocument
        | ErrorKind::UnsupportedImageFormat
        | ErrorKind::IndexOutOfRange => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::SerializationError
        | ErrorKind::StorageError
        | ErrorKind::SubprocessError
        | ErrorKind::ConfigError
        | ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(status_for(ErrorKind::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::IndexOutOfRange), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::NotImplemented), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            status_for(ErrorKind::SubprocessError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
