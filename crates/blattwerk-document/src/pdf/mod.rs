// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: parsing, page copying, geometry edits, overlays, protection,
// and image pages.

pub mod handle;
pub mod overlay;
pub mod pages;
pub mod security;
pub mod writer;

pub use handle::{DocumentHandle, PageRef};
