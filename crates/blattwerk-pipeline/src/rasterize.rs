// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterization adapter: render document pages to JPEG with an external tool.
//
// The tool follows poppler's `pdftoppm` interface:
//
//   <program> -jpeg -r <dpi> <input.pdf> <output-prefix>
//
// and writes `<output-prefix>-<n>.jpg` per page, zero-padding `n` for longer
// documents. Only store-generated paths are ever passed as arguments.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use blattwerk_core::config::ServiceConfig;
use blattwerk_core::error::{BlattwerkError, Result};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// File name prefix handed to the tool inside the output directory.
const OUTPUT_PREFIX: &str = "page";

/// Longest stderr excerpt kept in an error message.
const STDERR_EXCERPT: usize = 512;

/// How to run the external renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizerConfig {
    pub program: String,
    pub dpi: u32,
    pub timeout: Duration,
}

impl From<&ServiceConfig> for RasterizerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            program: config.rasterizer_program.clone(),
            dpi: config.raster_dpi,
            timeout: config.rasterizer_timeout(),
        }
    }
}

/// One rendered page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    /// 1-based page number.
    pub number: u32,
    pub path: PathBuf,
}

impl RasterPage {
    /// Archive entry name for this page.
    pub fn entry_name(&self) -> String {
        format!("page-{}.jpg", self.number)
    }
}

#[derive(Debug, Clone)]
pub struct Rasterizer {
    config: RasterizerConfig,
}

impl Rasterizer {
    pub fn new(config: RasterizerConfig) -> Self {
        Self { config }
    }

    /// Render every page of `document` into `output_dir`, returning the
    /// images in page order.
    ///
    /// Fails with `Subprocess` when the tool is missing, exits non-zero,
    /// exceeds the timeout (the child is killed), or produces no images.
    #[instrument(skip(self), fields(program = %self.config.program, dpi = self.config.dpi))]
    pub async fn rasterize(&self, document: &Path, output_dir: &Path) -> Result<Vec<RasterPage>> {
        let mut command = Command::new(&self.config.program);
        command
            .arg("-jpeg")
            .arg("-r")
            .arg(self.config.dpi.to_string())
            .arg(document)
            .arg(output_dir.join(OUTPUT_PREFIX))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| {
                BlattwerkError::Subprocess(format!(
                    "{} timed out after {:?}",
                    self.config.program, self.config.timeout
                ))
            })?
            .map_err(|err| {
                BlattwerkError::Subprocess(format!("cannot run {}: {err}", self.config.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return Err(BlattwerkError::Subprocess(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                excerpt.trim()
            )));
        }

        let pages = collect_pages(output_dir).await?;
        if pages.is_empty() {
            return Err(BlattwerkError::Subprocess(format!(
                "{} produced no images",
                self.config.program
            )));
        }

        debug!(pages = pages.len(), "pages rasterized");
        Ok(pages)
    }
}

/// Find `page-<n>.jpg` files in `dir`, sorted by page number.
async fn collect_pages(dir: &Path) -> Result<Vec<RasterPage>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut pages = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        match name.to_str().and_then(page_number) {
            Some(number) => pages.push(RasterPage {
                number,
                path: entry.path(),
            }),
            None => warn!(name = ?name, "ignoring unexpected rasterizer output"),
        }
    }

    pages.sort_by_key(|page| page.number);
    Ok(pages)
}

/// Page number from a `page-<digits>.jpg` name.
fn page_number(file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(OUTPUT_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".jpg")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
