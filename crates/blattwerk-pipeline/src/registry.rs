// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation registry: the immutable table from operation id to handler.
//
// Built once at startup and shared read-only between requests; lookups take
// no locks.

use std::collections::HashMap;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::{Arity, OutputArtifact};

use crate::operations::{self, LoadedInput, OperationContext};

/// Signature of an in-process document transformation.
pub type TransformFn = fn(Vec<LoadedInput>, &OperationContext) -> Result<Vec<OutputArtifact>>;

/// Which uploads an operation can work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepts {
    /// PDF only.
    Documents,
    /// PDF or raster images.
    DocumentsOrImages,
    /// Anything; the bytes are never parsed.
    Any,
}

/// How an operation is carried out.
#[derive(Clone, Copy)]
pub enum Handler {
    /// Runs on parsed inputs on a blocking worker.
    Transform(TransformFn),
    /// Renders pages with the external rasterizer.
    Rasterize,
    /// Registered so callers get a defined answer, but not built. Echoes the
    /// first input or answers `NotImplemented`, depending on configuration.
    Unimplemented,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transform(_) => f.write_str("Transform"),
            Self::Rasterize => f.write_str("Rasterize"),
            Self::Unimplemented => f.write_str("Unimplemented"),
        }
    }
}

/// Everything the dispatcher needs to know about one operation.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    pub accepts: Accepts,
    pub handler: Handler,
    /// Phrase completing "Failed to …" in client error messages.
    pub action: &'static str,
    /// Response name when the operation yields one artifact. A `*` is
    /// replaced by the artifact's extension.
    pub output_name: &'static str,
    /// Response name when the artifacts are archived.
    pub archive_name: &'static str,
    pub requires_auth: bool,
}

impl OperationSpec {
    /// Response file name for a single artifact with `extension`.
    pub fn single_output_name(&self, extension: &str) -> String {
        self.output_name.replace('*', extension)
    }

    /// Message used when no usable file was uploaded.
    pub fn missing_input_message(&self) -> &'static str {
        match (self.accepts, self.arity) {
            (Accepts::Documents, Arity::ManyToOne) => "Please upload at least 1 PDF file",
            (Accepts::Documents, _) => "Please upload a PDF file",
            (Accepts::DocumentsOrImages, _) => "Please upload at least one image",
            (Accepts::Any, _) => "Please upload at least one file",
        }
    }
}

/// A looked-up operation, remembering whether the id was actually registered.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub spec: &'a OperationSpec,
    /// The id was unknown and the generic pass-through was substituted.
    pub fallback: bool,
}

impl Resolved<'_> {
    /// Whether the request will not really be processed.
    pub fn is_placeholder(&self) -> bool {
        self.fallback || matches!(self.spec.handler, Handler::Unimplemented)
    }
}

#[derive(Debug)]
pub struct Registry {
    specs: Vec<OperationSpec>,
    by_name: HashMap<&'static str, usize>,
    fallback: OperationSpec,
}

impl Registry {
    /// Build a registry, rejecting duplicate ids or aliases.
    pub fn new(specs: Vec<OperationSpec>, fallback: OperationSpec) -> Result<Self> {
        let mut by_name = HashMap::new();
        for (position, spec) in specs.iter().enumerate() {
            for name in std::iter::once(&spec.id).chain(spec.aliases) {
                if by_name.insert(*name, position).is_some() {
                    return Err(BlattwerkError::Internal(format!(
                        "operation name '{name}' registered twice"
                    )));
                }
            }
        }
        Ok(Self {
            specs,
            by_name,
            fallback,
        })
    }

    /// Every operation the service offers.
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_specs(), placeholder("pass-through", "process PDF"))
    }

    /// Look up `id` (canonical or alias), falling back to the generic
    /// pass-through for unknown ids.
    pub fn resolve(&self, id: &str) -> Resolved<'_> {
        match self.get(id) {
            Some(spec) => Resolved {
                spec,
                fallback: false,
            },
            None => Resolved {
                spec: &self.fallback,
                fallback: true,
            },
        }
    }

    pub fn get(&self, id: &str) -> Option<&OperationSpec> {
        self.by_name.get(id).map(|&position| &self.specs[position])
    }

    /// Canonical ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|spec| spec.id)
    }
}

/// Ids the front end offers that have no implementation yet.
const PLACEHOLDER_IDS: [&str; 18] = [
    "pdf-to-word",
    "pdf-to-powerpoint",
    "pdf-to-excel",
    "word-to-pdf",
    "powerpoint-to-pdf",
    "excel-to-pdf",
    "edit-pdf",
    "sign-pdf",
    "html-to-pdf",
    "unlock-pdf",
    "organize-pdf",
    "pdf-to-pdfa",
    "repair-pdf",
    "scan-to-pdf",
    "ocr-pdf",
    "compare-pdf",
    "redact-pdf",
    "translate-pdf",
];

fn transform(
    id: &'static str,
    aliases: &'static [&'static str],
    arity: Arity,
    handler: TransformFn,
    action: &'static str,
    output_name: &'static str,
) -> OperationSpec {
    OperationSpec {
        id,
        aliases,
        arity,
        accepts: Accepts::Documents,
        handler: Handler::Transform(handler),
        action,
        output_name,
        archive_name: "files.zip",
        requires_auth: false,
    }
}

fn placeholder(id: &'static str, action: &'static str) -> OperationSpec {
    OperationSpec {
        id,
        aliases: &[],
        arity: Arity::ManyToOne,
        accepts: Accepts::Any,
        handler: Handler::Unimplemented,
        action,
        output_name: "processed.*",
        archive_name: "processed.zip",
        requires_auth: false,
    }
}

fn builtin_specs() -> Vec<OperationSpec> {
    let mut specs = vec![
        transform(
            "merge",
            &["merge-pdf"],
            Arity::ManyToOne,
            operations::merge,
            "merge PDFs",
            "merged.pdf",
        ),
        OperationSpec {
            archive_name: "split.zip",
            ..transform(
                "split",
                &["split-pdf"],
                Arity::OneToMany,
                operations::split,
                "split PDF",
                "split.pdf",
            )
        },
        OperationSpec {
            aliases: &["compress-pdf"],
            arity: Arity::OneToOne,
            accepts: Accepts::Documents,
            output_name: "compressed.pdf",
            ..placeholder("compress", "compress PDF")
        },
        transform(
            "rotate",
            &["rotate-pdf"],
            Arity::OneToOne,
            operations::rotate,
            "rotate PDF",
            "rotated.pdf",
        ),
        transform(
            "watermark",
            &[],
            Arity::OneToOne,
            operations::watermark,
            "add watermark",
            "watermarked.pdf",
        ),
        transform(
            "protect",
            &["protect-pdf"],
            Arity::OneToOne,
            operations::protect,
            "protect PDF",
            "protected.pdf",
        ),
        transform(
            "page-numbers",
            &[],
            Arity::OneToOne,
            operations::page_numbers,
            "add page numbers",
            "numbered.pdf",
        ),
        transform(
            "crop",
            &["crop-pdf"],
            Arity::OneToOne,
            operations::crop,
            "crop PDF",
            "cropped.pdf",
        ),
        OperationSpec {
            accepts: Accepts::DocumentsOrImages,
            ..transform(
                "image-to-document",
                &["jpg-to-pdf"],
                Arity::ManyToOne,
                operations::images_to_document,
                "convert images to PDF",
                "images.pdf",
            )
        },
        OperationSpec {
            id: "document-to-image",
            aliases: &["pdf-to-jpg"],
            arity: Arity::OneToMany,
            accepts: Accepts::Documents,
            handler: Handler::Rasterize,
            action: "convert PDF to images",
            output_name: "images.zip",
            archive_name: "images.zip",
            requires_auth: false,
        },
    ];

    specs.extend(
        PLACEHOLDER_IDS
            .iter()
            .map(|&id| placeholder(id, "process file")),
    );
    specs
}
