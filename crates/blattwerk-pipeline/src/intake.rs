// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Intake validation: one set of checks for every operation, driven by the
// operation's declared arity and accepted media.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::MediaKind;
use tracing::{debug, warn};

use crate::registry::{Accepts, OperationSpec};

/// A file part as received, before anything touches the disk.
#[derive(Clone, PartialEq, Eq)]
pub struct IncomingFile {
    /// Caller-supplied name. Never used as a path.
    pub name: String,
    /// Caller-declared content type. Recorded, never trusted.
    pub declared_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingFile")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Check the request shape before anything is stored.
pub fn check_files(spec: &OperationSpec, files: &[IncomingFile]) -> Result<()> {
    if files.is_empty() {
        return Err(BlattwerkError::Validation(
            spec.missing_input_message().to_string(),
        ));
    }
    if let Some(empty) = files.iter().find(|file| file.bytes.is_empty()) {
        return Err(BlattwerkError::Validation(format!(
            "{} is empty",
            display_name(&empty.name)
        )));
    }
    if spec.arity.takes_single_input() && files.len() > 1 {
        warn!(
            operation = spec.id,
            received = files.len(),
            "operation takes one file, ignoring the rest"
        );
    }
    Ok(())
}

/// How many of `received` files the operation will actually use.
pub fn files_to_use(spec: &OperationSpec, received: usize) -> usize {
    if spec.arity.takes_single_input() {
        received.min(1)
    } else {
        received
    }
}

/// Check a file's sniffed kind against what the operation accepts.
pub fn check_kind(spec: &OperationSpec, file: &IncomingFile, kind: &MediaKind) -> Result<()> {
    let sniffed = kind.mime_type();
    if file
        .declared_type
        .as_deref()
        .is_some_and(|declared| declared != sniffed)
    {
        debug!(
            declared = ?file.declared_type,
            %sniffed,
            "declared content type differs from content"
        );
    }

    let accepted = match spec.accepts {
        Accepts::Documents => matches!(kind, MediaKind::Pdf),
        Accepts::DocumentsOrImages => !matches!(kind, MediaKind::Unknown),
        Accepts::Any => true,
    };
    if accepted {
        return Ok(());
    }

    let name = display_name(&file.name);
    Err(BlattwerkError::Validation(match spec.accepts {
        Accepts::DocumentsOrImages => format!("{name} is neither a PDF nor an image"),
        _ => format!("{name} is not a PDF file"),
    }))
}

/// Caller-supplied names are echoed in messages, so keep them short and
/// free of directory parts.
fn display_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let trimmed: String = base.chars().filter(|ch| !ch.is_control()).take(64).collect();
    if trimmed.is_empty() {
        "The uploaded file".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blattwerk_core::types::RasterFormat;

    use crate::registry::Registry;

    fn incoming(name: &str, bytes: &[u8]) -> IncomingFile {
        IncomingFile {
            name: name.to_string(),
            declared_type: None,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn no_files_uses_operation_message() {
        let registry = Registry::builtin().expect("registry");
        let merge = registry.resolve("merge").spec;
        match check_files(merge, &[]) {
            Err(BlattwerkError::Validation(message)) => {
                assert_eq!(message, "Please upload at least 1 PDF file");
            }
            other => panic!("unexpected {other:?}"),
        }

        let rotate = registry.resolve("rotate").spec;
        match check_files(rotate, &[]) {
            Err(BlattwerkError::Validation(message)) => {
                assert_eq!(message, "Please upload a PDF file");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_part_is_rejected() {
        let registry = Registry::builtin().expect("registry");
        let spec = registry.resolve("merge").spec;
        let files = [incoming("a.pdf", b"%PDF-"), incoming("dir/b.pdf", b"")];
        match check_files(spec, &files) {
            Err(BlattwerkError::Validation(message)) => assert_eq!(message, "b.pdf is empty"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_input_operations_use_first_file() {
        let registry = Registry::builtin().expect("registry");
        assert_eq!(files_to_use(registry.resolve("split").spec, 3), 1);
        assert_eq!(files_to_use(registry.resolve("merge").spec, 3), 3);
        assert_eq!(files_to_use(registry.resolve("unknown").spec, 2), 2);
    }

    #[test]
    fn kinds_are_checked_against_accepts() {
        let registry = Registry::builtin().expect("registry");
        let file = incoming("x", b"x");
        let png = MediaKind::Raster(RasterFormat::Png);
        let gif = MediaKind::OtherImage("gif".into());

        let rotate = registry.resolve("rotate").spec;
        assert!(check_kind(rotate, &file, &MediaKind::Pdf).is_ok());
        assert!(check_kind(rotate, &file, &png).is_err());

        let images = registry.resolve("jpg-to-pdf").spec;
        assert!(check_kind(images, &file, &png).is_ok());
        assert!(check_kind(images, &file, &gif).is_ok());
        assert!(check_kind(images, &file, &MediaKind::Unknown).is_err());

        let fallback = registry.resolve("who-knows").spec;
        assert!(check_kind(fallback, &file, &MediaKind::Unknown).is_ok());
    }

    #[test]
    fn display_names_drop_directories() {
        assert_eq!(display_name("../../etc/passwd"), "passwd");
        assert_eq!(display_name("C:\\Users\\x\\doc.pdf"), "doc.pdf");
        assert_eq!(display_name(""), "The uploaded file");
    }
}
