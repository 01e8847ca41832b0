// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Caller-facing error descriptions.
//
// Every error that crosses the service boundary is reduced to a kind and a
// message that is safe to show. Client-caused errors keep their specific
// reason; server-side failures collapse to a generic, operation-scoped message
// so scratch paths and process details never leave the process.

use crate::error::{BlattwerkError, ErrorKind};

/// An error as presented to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    /// Machine-readable classification.
    pub kind: ErrorKind,
    /// Human-readable message, free of internal paths.
    pub message: String,
    /// Whether the same request might succeed if sent again.
    pub retriable: bool,
}

/// Convert a `BlattwerkError` raised while running `operation` into a
/// `ClientError`.
pub fn describe(err: &BlattwerkError, operation: &str) -> ClientError {
    let kind = err.kind();
    match err {
        // -- Intake --
        BlattwerkError::Validation(reason) => ClientError {
            kind,
            message: reason.clone(),
            retriable: false,
        },

        BlattwerkError::Unauthorized => ClientError {
            kind,
            message: format!("Sign in to use {operation}"),
            retriable: false,
        },

        // -- Document errors --
        BlattwerkError::MalformedDocument(_) => ClientError {
            kind,
            message: "The uploaded file is not a readable PDF document".into(),
            retriable: false,
        },

        BlattwerkError::UnsupportedImageFormat(format) => ClientError {
            kind,
            message: format!("Unsupported image format: {format}. Use JPEG or PNG"),
            retriable: false,
        },

        BlattwerkError::IndexOutOfRange { index, page_count } => ClientError {
            kind,
            message: format!("Page {index} does not exist; the document has {page_count} pages"),
            retriable: false,
        },

        BlattwerkError::NotImplemented(_) => ClientError {
            kind,
            message: format!("{operation} is not available yet"),
            retriable: false,
        },

        // -- Server-side --
        BlattwerkError::Storage(_) | BlattwerkError::Io(_) => ClientError {
            kind,
            message: format!("Failed to {operation}: temporary storage is unavailable"),
            retriable: true,
        },

        BlattwerkError::Subprocess(_)
        | BlattwerkError::Serialization(_)
        | BlattwerkError::Config(_)
        | BlattwerkError::Internal(_) => ClientError {
            kind,
            message: format!("Failed to {operation}"),
            retriable: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_reason_is_passed_through() {
        let err = BlattwerkError::Validation("Please upload at least 1 PDF file".into());
        let client = describe(&err, "merge");
        assert_eq!(client.kind, ErrorKind::ValidationError);
        assert_eq!(client.message, "Please upload at least 1 PDF file");
        assert!(!client.retriable);
    }

    #[test]
    fn storage_errors_hide_paths() {
        let err = BlattwerkError::Storage("cannot write /srv/uploads/abc-123.pdf".into());
        let client = describe(&err, "rotate");
        assert_eq!(client.kind, ErrorKind::StorageError);
        assert!(!client.message.contains("/srv"));
        assert!(client.retriable);
    }

    #[test]
    fn internal_errors_are_generic() {
        let err = BlattwerkError::Internal("worker panicked at src/ops.rs:12".into());
        let client = describe(&err, "watermark");
        assert_eq!(client.message, "Failed to watermark");
        assert_eq!(client.kind, ErrorKind::InternalError);
    }

    #[test]
    fn malformed_document_detail_is_not_echoed() {
        let err = BlattwerkError::MalformedDocument("xref at /tmp/x.pdf offset 99".into());
        let client = describe(&err, "split");
        assert!(!client.message.contains("/tmp"));
        assert_eq!(client.kind, ErrorKind::MalformedDocument);
    }
}
