// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk: Core types, error taxonomy, and configuration shared across all
// crates.

pub mod client_errors;
pub mod config;
pub mod error;
pub mod integrity;
pub mod types;

pub use config::ServiceConfig;
pub use error::{BlattwerkError, ErrorKind, Result};
pub use types::*;
