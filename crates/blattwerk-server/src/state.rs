// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::sync::Arc;

use blattwerk_core::config::ServiceConfig;
use blattwerk_core::error::Result;
use blattwerk_pipeline::{Dispatcher, ScratchStore};
use tracing::info;

use crate::auth::{AnonymousSessions, SessionVerifier};

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub sessions: Arc<dyn SessionVerifier>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        dispatcher: Dispatcher,
        sessions: Arc<dyn SessionVerifier>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            dispatcher,
            sessions,
            max_upload_bytes,
        }
    }

    /// Open the scratch directory, clear what a previous process left behind,
    /// and build the dispatcher.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let store = ScratchStore::open(config.scratch_dir.clone()).await?;
        let swept = store.sweep().await?;
        info!(
            scratch_dir = %config.scratch_dir.display(),
            swept,
            "scratch directory ready"
        );

        let dispatcher = Dispatcher::from_config(config, store)?;
        info!(
            operations = dispatcher.registry().ids().count(),
            rasterizer = %config.rasterizer_program,
            "operation registry loaded"
        );

        Ok(Self::new(
            dispatcher,
            Arc::new(AnonymousSessions),
            config.max_upload_bytes,
        ))
    }
}
