// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session lookup seam. Accounts live outside this service; all the pipeline
// needs to know is whether the caller is signed in.

use axum::http::HeaderMap;

pub trait SessionVerifier: Send + Sync {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Treats every caller as signed out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSessions;

impl SessionVerifier for AnonymousSessions {
    fn is_authenticated(&self, _headers: &HeaderMap) -> bool {
        false
    }
}
