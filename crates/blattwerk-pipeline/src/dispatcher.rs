// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transformation dispatcher: runs one request through
//
//   Received → Validated → Loaded → Transformed → Packaged → Cleaned → Responded
//
// and guarantees the request's scratch files are removed on every path:
// directly for single-artifact responses and failures, and by the archive
// producer once a streamed archive is finished or aborted.

use std::collections::HashMap;
use std::sync::Arc;

use blattwerk_core::client_errors::{ClientError, describe};
use blattwerk_core::config::{ImagePolicy, PlaceholderPolicy, ServiceConfig};
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::{
    ArtifactBody, JobId, MediaKind, OutputArtifact, UploadedFile, ZIP_MEDIA_TYPE,
};
use blattwerk_document::{DocumentHandle, sniff};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::archive::{ArchiveStream, StreamLimits, stream_archive};
use crate::intake::{self, IncomingFile};
use crate::operations::{LoadedContent, LoadedInput, OperationContext};
use crate::rasterize::{Rasterizer, RasterizerConfig};
use crate::registry::{Handler, OperationSpec, Registry, Resolved};
use crate::scratch::{JobScratch, ScratchStore};

/// Archive entry used when rasterization falls back to the original.
pub const FALLBACK_ENTRY_NAME: &str = "original.pdf";

/// Request lifecycle stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Validated,
    Loaded,
    Transformed,
    Packaged,
    Cleaned,
    Responded,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Loaded => "loaded",
            Self::Transformed => "transformed",
            Self::Packaged => "packaged",
            Self::Cleaned => "cleaned",
            Self::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Whether the response reflects real processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    /// Placeholder or unknown operation; the first input is echoed.
    PassedThrough,
    /// Rasterization failed and the original document was archived instead.
    Degraded,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::PassedThrough => "passed-through",
            Self::Degraded => "degraded",
        }
    }
}

/// One incoming request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Operation id or alias from the request path.
    pub operation: String,
    /// File parts in order of appearance.
    pub files: Vec<IncomingFile>,
    /// Text parts.
    pub params: HashMap<String, String>,
    pub authenticated: bool,
}

pub enum ResponseBody {
    Bytes(Vec<u8>),
    /// Produced in the background; scratch cleanup happens when it ends.
    Archive(ArchiveStream),
}

pub struct DispatchResponse {
    pub job_id: JobId,
    pub file_name: String,
    pub media_type: String,
    pub outcome: Outcome,
    pub body: ResponseBody,
}

/// A failed request: where it failed, why, and what the caller may see.
#[derive(Debug)]
pub struct DispatchError {
    pub job_id: JobId,
    pub stage: Stage,
    pub error: BlattwerkError,
    pub client: ClientError,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job {} failed at {}: {}", self.job_id, self.stage, self.error)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Dispatcher settings derived from [`ServiceConfig`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub image_policy: ImagePolicy,
    pub placeholder_policy: PlaceholderPolicy,
    pub stream_limits: StreamLimits,
}

impl From<&ServiceConfig> for DispatcherSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            image_policy: config.image_policy,
            placeholder_policy: config.placeholder_policy,
            stream_limits: StreamLimits {
                channel_capacity: config.archive_channel_capacity,
                chunk_bytes: config.archive_chunk_bytes,
            },
        }
    }
}

/// Artifacts ready for packaging.
struct Prepared {
    artifacts: Vec<OutputArtifact>,
    outcome: Outcome,
    /// Package as an archive even for a single artifact.
    force_archive: bool,
}

/// Shared by all requests; holds only read-only state.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    store: ScratchStore,
    rasterizer: Rasterizer,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        store: ScratchStore,
        rasterizer: Rasterizer,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            registry,
            store,
            rasterizer,
            settings,
        }
    }

    /// Build a dispatcher with the builtin registry from `config`.
    pub fn from_config(config: &ServiceConfig, store: ScratchStore) -> Result<Self> {
        Ok(Self::new(
            Arc::new(Registry::builtin()?),
            store,
            Rasterizer::new(RasterizerConfig::from(config)),
            DispatcherSettings::from(config),
        ))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &ScratchStore {
        &self.store
    }

    /// Run one request to completion (or, for archives, to the start of
    /// streaming).
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
    ) -> std::result::Result<DispatchResponse, DispatchError> {
        let job_id = JobId::new();
        let span = info_span!("dispatch", job = %job_id, operation = %request.operation);
        self.run(job_id, request).instrument(span).await
    }

    async fn run(
        &self,
        job_id: JobId,
        request: DispatchRequest,
    ) -> std::result::Result<DispatchResponse, DispatchError> {
        let resolved = self.registry.resolve(&request.operation);
        let spec = resolved.spec;
        if resolved.fallback {
            info!("unknown operation, using pass-through");
        }

        let mut scratch = self.store.job(job_id);
        let mut stage = Stage::Received;

        let prepared = match self
            .prepare(&resolved, request, &mut scratch, &mut stage)
            .await
        {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.fail(job_id, spec, stage, err, scratch).await),
        };

        stage = Stage::Packaged;
        debug!(%stage, artifacts = prepared.artifacts.len());

        if prepared.artifacts.len() == 1 && !prepared.force_archive {
            let artifact = prepared.artifacts.into_iter().next();
            let single = match artifact {
                Some(artifact) => into_bytes(artifact).await,
                None => Err(BlattwerkError::Internal("artifact vanished".into())),
            };
            let (bytes, media_type, extension) = match single {
                Ok(single) => single,
                Err(err) => return Err(self.fail(job_id, spec, stage, err, scratch).await),
            };

            stage = Stage::Cleaned;
            let warnings = scratch.cleanup().await;
            debug!(%stage, warnings = warnings.len());

            info!(outcome = prepared.outcome.as_str(), bytes = bytes.len(), "responding");
            return Ok(DispatchResponse {
                job_id,
                file_name: spec.single_output_name(&extension),
                media_type,
                outcome: prepared.outcome,
                body: ResponseBody::Bytes(bytes),
            });
        }

        // Cleanup moves to the producer, which runs it after finalize/abort.
        let entries = prepared.artifacts.len();
        let stream = stream_archive(prepared.artifacts, scratch, self.settings.stream_limits);
        info!(outcome = prepared.outcome.as_str(), entries, "streaming archive");

        Ok(DispatchResponse {
            job_id,
            file_name: spec.archive_name.to_string(),
            media_type: ZIP_MEDIA_TYPE.to_string(),
            outcome: prepared.outcome,
            body: ResponseBody::Archive(stream),
        })
    }

    /// Received → Validated → Loaded → Transformed.
    async fn prepare(
        &self,
        resolved: &Resolved<'_>,
        request: DispatchRequest,
        scratch: &mut JobScratch,
        stage: &mut Stage,
    ) -> Result<Prepared> {
        let spec = resolved.spec;

        // -- Received ---------------------------------------------------------
        let DispatchRequest {
            files,
            params,
            authenticated,
            ..
        } = request;

        if spec.requires_auth && !authenticated {
            return Err(BlattwerkError::Unauthorized);
        }
        if resolved.is_placeholder()
            && self.settings.placeholder_policy == PlaceholderPolicy::Unsupported
        {
            return Err(BlattwerkError::NotImplemented(spec.id.to_string()));
        }
        intake::check_files(spec, &files)?;

        let used = intake::files_to_use(spec, files.len());
        let mut uploads = Vec::with_capacity(used);
        for file in files.iter().take(used) {
            let kind = sniff(&file.bytes);
            intake::check_kind(spec, file, &kind)?;
            let upload = scratch
                .put(&file.bytes, &file.name, &kind.mime_type(), &kind.extension())
                .await?;
            uploads.push((upload, kind));
        }
        drop(files);

        *stage = Stage::Validated;
        debug!(stage = %*stage, files = uploads.len());

        // -- Loaded / Transformed ---------------------------------------------
        match spec.handler {
            Handler::Unimplemented => {
                let (upload, kind) = first(uploads)?;
                let bytes = tokio::fs::read(&upload.storage_path).await?;
                *stage = Stage::Loaded;
                if !params.is_empty() {
                    debug!(params = params.len(), "parameters ignored by pass-through");
                }

                *stage = Stage::Transformed;
                Ok(Prepared {
                    artifacts: vec![OutputArtifact {
                        body: ArtifactBody::Bytes(bytes),
                        file_name: spec.single_output_name(&kind.extension()),
                        media_type: kind.mime_type(),
                    }],
                    outcome: Outcome::PassedThrough,
                    force_archive: false,
                })
            }

            Handler::Transform(transform) => {
                let inputs = load_inputs(uploads).await?;
                *stage = Stage::Loaded;
                debug!(stage = %*stage, inputs = inputs.len());

                let ctx = OperationContext {
                    job_id: scratch.job_id(),
                    params,
                    image_policy: self.settings.image_policy,
                };
                let artifacts = run_blocking(move || transform(inputs, &ctx)).await?;

                *stage = Stage::Transformed;
                Ok(Prepared {
                    artifacts,
                    outcome: Outcome::Processed,
                    force_archive: false,
                })
            }

            Handler::Rasterize => {
                let (upload, _) = first(uploads)?;
                let pages = {
                    let bytes = tokio::fs::read(&upload.storage_path).await?;
                    run_blocking(move || DocumentHandle::parse(&bytes).map(|doc| doc.page_count()))
                        .await?
                };
                *stage = Stage::Loaded;
                debug!(stage = %*stage, pages);

                let (artifacts, outcome) = self.rasterize(&upload, scratch).await?;
                *stage = Stage::Transformed;
                Ok(Prepared {
                    artifacts,
                    outcome,
                    force_archive: true,
                })
            }
        }
    }

    /// Render pages, or fall back to archiving the original.
    async fn rasterize(
        &self,
        upload: &UploadedFile,
        scratch: &mut JobScratch,
    ) -> Result<(Vec<OutputArtifact>, Outcome)> {
        let output_dir = scratch.create_dir("raster").await?;

        match self
            .rasterizer
            .rasterize(&upload.storage_path, &output_dir)
            .await
        {
            Ok(pages) => {
                let artifacts = pages
                    .into_iter()
                    .map(|page| OutputArtifact {
                        file_name: page.entry_name(),
                        body: ArtifactBody::File(page.path),
                        media_type: "image/jpeg".to_string(),
                    })
                    .collect();
                Ok((artifacts, Outcome::Processed))
            }
            Err(err) => {
                warn!(%err, "rasterization failed, archiving original");
                let fallback = OutputArtifact {
                    body: ArtifactBody::File(upload.storage_path.clone()),
                    file_name: FALLBACK_ENTRY_NAME.to_string(),
                    media_type: upload.media_type.clone(),
                };
                Ok((vec![fallback], Outcome::Degraded))
            }
        }
    }

    /// Clean up and describe a failure.
    async fn fail(
        &self,
        job_id: JobId,
        spec: &OperationSpec,
        stage: Stage,
        error: BlattwerkError,
        scratch: JobScratch,
    ) -> DispatchError {
        let warnings = scratch.cleanup().await;
        let client = describe(&error, spec.action);

        if client.kind.is_client_error() {
            warn!(%stage, %error, "request rejected");
        } else {
            error!(%stage, %error, cleanup_warnings = warnings.len(), "request failed");
        }

        DispatchError {
            job_id,
            stage,
            error,
            client,
        }
    }
}

fn first(uploads: Vec<(UploadedFile, MediaKind)>) -> Result<(UploadedFile, MediaKind)> {
    uploads
        .into_iter()
        .next()
        .ok_or_else(|| BlattwerkError::Internal("no upload after validation".into()))
}

/// Read and parse every upload. Any failure aborts the whole request.
async fn load_inputs(uploads: Vec<(UploadedFile, MediaKind)>) -> Result<Vec<LoadedInput>> {
    let mut inputs = Vec::with_capacity(uploads.len());
    for (file, kind) in uploads {
        let bytes = tokio::fs::read(&file.storage_path).await?;
        let content = match kind {
            MediaKind::Pdf => {
                let handle = run_blocking(move || DocumentHandle::parse(&bytes)).await?;
                LoadedContent::Document(handle)
            }
            MediaKind::Raster(format) => LoadedContent::Raster { format, bytes },
            MediaKind::OtherImage(_) | MediaKind::Unknown => LoadedContent::Unsupported {
                media_type: kind.mime_type(),
            },
        };
        inputs.push(LoadedInput { file, content });
    }
    Ok(inputs)
}

/// Run CPU-bound document work off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| BlattwerkError::Internal(format!("worker failed: {err}")))?
}

/// Materialise a single artifact as bytes plus its media type and extension.
async fn into_bytes(artifact: OutputArtifact) -> Result<(Vec<u8>, String, String)> {
    let bytes = match artifact.body {
        ArtifactBody::Bytes(bytes) => bytes,
        ArtifactBody::File(path) => tokio::fs::read(&path).await?,
    };
    let extension = artifact
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_else(|| "bin".to_string());
    Ok((bytes, artifact.media_type, extension))
}
