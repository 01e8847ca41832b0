// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk Pipeline: request-scoped scratch storage, the operation
// registry, the external rasterizer, streaming zip packaging, and the
// dispatcher that drives a request through all of them.

pub mod archive;
pub mod dispatcher;
pub mod intake;
pub mod operations;
pub mod rasterize;
pub mod registry;
pub mod scratch;

pub use archive::{ArchiveStream, StreamLimits, StreamOutcome};
pub use dispatcher::{
    DispatchError, DispatchRequest, DispatchResponse, Dispatcher, DispatcherSettings, Outcome,
    ResponseBody, Stage,
};
pub use intake::IncomingFile;
pub use rasterize::{Rasterizer, RasterizerConfig};
pub use registry::{Accepts, Handler, OperationSpec, Registry};
pub use scratch::{JobScratch, ScratchStore};
