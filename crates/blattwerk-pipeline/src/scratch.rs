// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ephemeral file store: request-scoped scratch files with guaranteed removal.
//
// The scratch root is shared by every request. Each request gets a
// `JobScratch` guard that names its files `<job-id>-<uuid>.<ext>` (so
// concurrent requests never collide and leftovers are attributable) and
// deletes everything it created when cleaned up or dropped.

use std::io;
use std::path::{Path, PathBuf};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::integrity::hash_bytes;
use blattwerk_core::types::{JobId, UploadedFile};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Longest extension carried over from a caller-supplied file name.
const MAX_EXTENSION_LEN: usize = 8;

/// The process-wide scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    root: PathBuf,
}

impl ScratchStore {
    /// Open (creating if needed) the scratch directory at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|err| {
            BlattwerkError::Storage(format!("cannot create {}: {err}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a request-scoped guard.
    pub fn job(&self, job_id: JobId) -> JobScratch {
        JobScratch {
            job_id,
            root: self.root.clone(),
            files: Vec::new(),
            dirs: Vec::new(),
        }
    }

    /// Delete everything in the scratch directory. Only safe before the first
    /// request is accepted; used at startup to clear what a crashed process
    /// left behind. Returns the number of entries removed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn sweep(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let outcome = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match outcome {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), %err, "could not sweep scratch entry"),
            }
        }

        if removed > 0 {
            info!(removed, "swept stale scratch entries");
        }
        Ok(removed)
    }
}

/// Everything one request has written to the scratch directory.
///
/// Cleanup is explicit via [`JobScratch::cleanup`]; anything still tracked
/// when the guard is dropped (e.g. the request future was cancelled) is
/// removed synchronously in `Drop`.
#[derive(Debug)]
pub struct JobScratch {
    job_id: JobId,
    root: PathBuf,
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl JobScratch {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Number of files and directories currently tracked.
    pub fn tracked(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    // -- Writing --------------------------------------------------------------

    /// Persist `bytes` under a fresh, collision-free name.
    ///
    /// `suggested_name` only contributes a sanitised extension; `media_type`
    /// is whatever the caller determined by sniffing the bytes.
    #[instrument(skip(self, bytes), fields(job = %self.job_id, size = bytes.len()))]
    pub async fn put(
        &mut self,
        bytes: &[u8],
        suggested_name: &str,
        media_type: &str,
        fallback_extension: &str,
    ) -> Result<UploadedFile> {
        let extension = sanitize_extension(suggested_name)
            .unwrap_or_else(|| fallback_extension.to_string());
        let path = self.fresh_path(&extension);

        // Track before writing so a partial write is still cleaned up.
        self.files.push(path.clone());
        tokio::fs::write(&path, bytes).await.map_err(|err| {
            BlattwerkError::Storage(format!("cannot write {}: {err}", path.display()))
        })?;

        let upload = UploadedFile {
            storage_path: path,
            original_name: suggested_name.to_string(),
            media_type: media_type.to_string(),
            size_bytes: bytes.len() as u64,
            sha256: hash_bytes(bytes),
        };
        debug!(
            path = %upload.storage_path.display(),
            sha256 = %upload.sha256,
            "upload stored"
        );
        Ok(upload)
    }

    /// Create a private directory for intermediates (e.g. rasterizer output).
    pub async fn create_dir(&mut self, label: &str) -> Result<PathBuf> {
        let path = self
            .root
            .join(format!("{}-{}-{}", self.job_id, label, Uuid::new_v4().simple()));
        self.dirs.push(path.clone());
        tokio::fs::create_dir(&path).await.map_err(|err| {
            BlattwerkError::Storage(format!("cannot create {}: {err}", path.display()))
        })?;
        Ok(path)
    }

    fn fresh_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!(
            "{}-{}.{}",
            self.job_id,
            Uuid::new_v4().simple(),
            extension
        ))
    }

    // -- Removal --------------------------------------------------------------

    /// Delete one stored upload. A file that is already gone is not an error.
    pub async fn remove(&mut self, upload: &UploadedFile) -> Result<()> {
        remove_path(&upload.storage_path).await.map_err(|err| {
            BlattwerkError::Storage(format!(
                "cannot remove {}: {err}",
                upload.storage_path.display()
            ))
        })?;
        self.files.retain(|path| path != &upload.storage_path);
        Ok(())
    }

    /// Delete the given uploads, continuing past failures. Returns one
    /// warning per file that could not be removed.
    pub async fn remove_all(&mut self, uploads: &[UploadedFile]) -> Vec<String> {
        let mut warnings = Vec::new();
        for upload in uploads {
            if let Err(err) = self.remove(upload).await {
                warnings.push(err.to_string());
            }
        }
        warnings
    }

    /// Delete everything this request created. Never fails; problems are
    /// returned as warnings and logged.
    pub async fn cleanup(mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        for path in std::mem::take(&mut self.files) {
            if let Err(err) = remove_path(&path).await {
                warnings.push(format!("cannot remove {}: {err}", path.display()));
            }
        }
        for dir in std::mem::take(&mut self.dirs) {
            if let Err(err) = remove_dir(&dir).await {
                warnings.push(format!("cannot remove {}: {err}", dir.display()));
            }
        }

        self.log_outcome(&warnings);
        warnings
    }

    /// Blocking variant of [`JobScratch::cleanup`] for worker threads.
    pub fn cleanup_blocking(mut self) -> Vec<String> {
        let warnings = self.remove_tracked_blocking();
        self.log_outcome(&warnings);
        warnings
    }

    fn remove_tracked_blocking(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        for path in std::mem::take(&mut self.files) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warnings.push(format!("cannot remove {}: {err}", path.display())),
            }
        }
        for dir in std::mem::take(&mut self.dirs) {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warnings.push(format!("cannot remove {}: {err}", dir.display())),
            }
        }
        warnings
    }

    fn log_outcome(&self, warnings: &[String]) {
        if warnings.is_empty() {
            debug!(job = %self.job_id, "scratch cleaned");
        } else {
            for warning in warnings {
                warn!(job = %self.job_id, %warning, "scratch cleanup incomplete");
            }
        }
    }
}

impl Drop for JobScratch {
    fn drop(&mut self) {
        if self.tracked() == 0 {
            return;
        }
        warn!(job = %self.job_id, tracked = self.tracked(), "scratch dropped without cleanup");
        for warning in self.remove_tracked_blocking() {
            warn!(job = %self.job_id, %warning, "scratch cleanup incomplete");
        }
    }
}

async fn remove_path(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn remove_dir(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// The extension of `name`, lowercased, if it is 1–8 ASCII alphanumerics.
pub fn sanitize_extension(name: &str) -> Option<String> {
    let (_, extension) = name.rsplit_once('.')?;
    let valid = !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.chars().all(|ch| ch.is_ascii_alphanumeric());
    valid.then(|| extension.to_ascii_lowercase())
}
