// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Blattwerk.

use serde::Serialize;
use thiserror::Error;

/// Top-level error type for all Blattwerk operations.
#[derive(Debug, Error)]
pub enum BlattwerkError {
    // -- Intake --
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("caller is not authenticated")]
    Unauthorized,

    // -- Document errors --
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("page index {index} out of range (document has {page_count} pages)")]
    IndexOutOfRange { index: u32, page_count: u32 },

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(String),

    // -- Storage / processes --
    #[error("scratch storage failed: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rasterizer failed: {0}")]
    Subprocess(String),

    // -- Everything else --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Machine-readable classification of a [`BlattwerkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    Unauthorized,
    MalformedDocument,
    UnsupportedImageFormat,
    IndexOutOfRange,
    SerializationError,
    NotImplemented,
    StorageError,
    SubprocessError,
    ConfigError,
    InternalError,
}

impl ErrorKind {
    /// Stable identifier sent to callers alongside the message.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::Unauthorized => "unauthorized",
            Self::MalformedDocument => "malformed_document",
            Self::UnsupportedImageFormat => "unsupported_image_format",
            Self::IndexOutOfRange => "index_out_of_range",
            Self::SerializationError => "serialization_error",
            Self::NotImplemented => "not_implemented",
            Self::StorageError => "storage_error",
            Self::SubprocessError => "subprocess_error",
            Self::ConfigError => "config_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Whether the caller can fix the problem by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError
                | Self::Unauthorized
                | Self::MalformedDocument
                | Self::UnsupportedImageFormat
                | Self::IndexOutOfRange
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BlattwerkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::MalformedDocument(_) => ErrorKind::MalformedDocument,
            Self::UnsupportedImageFormat(_) => ErrorKind::UnsupportedImageFormat,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::Serialization(_) => ErrorKind::SerializationError,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::Storage(_) | Self::Io(_) => ErrorKind::StorageError,
            Self::Subprocess(_) => ErrorKind::SubprocessError,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlattwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_classify_as_storage() {
        let err: BlattwerkError =
            std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full").into();
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(!err.kind().is_client_error());
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedImageFormat).expect("serialize");
        assert_eq!(json, "\"unsupported_image_format\"");
        assert_eq!(
            ErrorKind::UnsupportedImageFormat.as_str(),
            "unsupported_image_format"
        );
    }

    #[test]
    fn index_out_of_range_message_names_both_numbers() {
        let err = BlattwerkError::IndexOutOfRange {
            index: 7,
            page_count: 3,
        };
        assert_eq!(
            err.to_string(),
            "page index 7 out of range (document has 3 pages)"
        );
        assert!(err.kind().is_client_error());
    }
}
