// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-document: Document object model for the Blattwerk pipeline.
//
// Parses PDF bytes into a mutable page model (lopdf), copies pages between
// documents, rotates and crops pages, stamps text overlays, applies password
// protection, and embeds JPEG/PNG images as full pages (printpdf + image).

pub mod image;
pub mod pdf;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export the primary types so callers can use `blattwerk_document::DocumentHandle` etc.
pub use image::sniff::sniff;
pub use pdf::handle::{DocumentHandle, PageRef};
pub use pdf::overlay::{PageNumberStyle, WatermarkStyle};
pub use pdf::security::ProtectionSettings;
