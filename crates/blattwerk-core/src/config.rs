// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BlattwerkError, Result};

/// What image-to-document does with images outside the JPEG/PNG allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImagePolicy {
    /// Leave them out of the output.
    Skip,
    /// Fail the request with `UnsupportedImageFormat`.
    Reject,
}

/// How placeholder operations and unknown ids respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceholderPolicy {
    /// Echo the first input unchanged.
    PassThrough,
    /// Fail with `NotImplemented`.
    Unsupported,
}

impl FromStr for ImagePolicy {
    type Err = BlattwerkError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            other => Err(BlattwerkError::Config(format!(
                "image policy must be 'skip' or 'reject', got '{other}'"
            ))),
        }
    }
}

impl FromStr for PlaceholderPolicy {
    type Err = BlattwerkError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pass-through" | "passthrough" => Ok(Self::PassThrough),
            "unsupported" => Ok(Self::Unsupported),
            other => Err(BlattwerkError::Config(format!(
                "placeholder policy must be 'pass-through' or 'unsupported', got '{other}'"
            ))),
        }
    }
}

/// Settings for the HTTP service and the transformation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Interface the HTTP listener binds to.
    pub host: String,
    pub port: u16,
    /// Process-wide scratch area for uploads and intermediates.
    pub scratch_dir: PathBuf,
    /// Upper bound on a request body.
    pub max_upload_bytes: usize,
    /// External page renderer (poppler's `pdftoppm` interface).
    pub rasterizer_program: String,
    pub raster_dpi: u32,
    pub rasterizer_timeout_secs: u64,
    pub image_policy: ImagePolicy,
    pub placeholder_policy: PlaceholderPolicy,
    /// Archive chunks buffered between the encoder and the response.
    pub archive_channel_capacity: usize,
    pub archive_chunk_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            scratch_dir: PathBuf::from("uploads"),
            max_upload_bytes: 100 * 1024 * 1024,
            rasterizer_program: "pdftoppm".to_string(),
            raster_dpi: 150,
            rasterizer_timeout_secs: 60,
            image_policy: ImagePolicy::Skip,
            placeholder_policy: PlaceholderPolicy::PassThrough,
            archive_channel_capacity: 8,
            archive_chunk_bytes: 64 * 1024,
        }
    }
}

impl ServiceConfig {
    /// Defaults overlaid with any `BLATTWERK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ServiceConfig::from_env`] but reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("BLATTWERK_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("BLATTWERK_PORT") {
            config.port = parse_var("BLATTWERK_PORT", &port)?;
        }
        if let Some(dir) = lookup("BLATTWERK_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(limit) = lookup("BLATTWERK_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_var("BLATTWERK_MAX_UPLOAD_BYTES", &limit)?;
        }
        if let Some(program) = lookup("BLATTWERK_RASTERIZER") {
            config.rasterizer_program = program;
        }
        if let Some(dpi) = lookup("BLATTWERK_RASTER_DPI") {
            config.raster_dpi = parse_var("BLATTWERK_RASTER_DPI", &dpi)?;
        }
        if let Some(secs) = lookup("BLATTWERK_RASTERIZER_TIMEOUT_SECS") {
            config.rasterizer_timeout_secs = parse_var("BLATTWERK_RASTERIZER_TIMEOUT_SECS", &secs)?;
        }
        if let Some(policy) = lookup("BLATTWERK_IMAGE_POLICY") {
            config.image_policy = policy.parse()?;
        }
        if let Some(policy) = lookup("BLATTWERK_PLACEHOLDER_POLICY") {
            config.placeholder_policy = policy.parse()?;
        }
        if let Some(capacity) = lookup("BLATTWERK_ARCHIVE_CHANNEL_CAPACITY") {
            config.archive_channel_capacity =
                parse_var("BLATTWERK_ARCHIVE_CHANNEL_CAPACITY", &capacity)?;
        }
        if let Some(chunk) = lookup("BLATTWERK_ARCHIVE_CHUNK_BYTES") {
            config.archive_chunk_bytes = parse_var("BLATTWERK_ARCHIVE_CHUNK_BYTES", &chunk)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(BlattwerkError::Config("port must be non-zero".into()));
        }
        if self.raster_dpi == 0 {
            return Err(BlattwerkError::Config("raster DPI must be non-zero".into()));
        }
        if self.rasterizer_timeout_secs == 0 {
            return Err(BlattwerkError::Config(
                "rasterizer timeout must be non-zero".into(),
            ));
        }
        if self.archive_channel_capacity == 0 || self.archive_chunk_bytes == 0 {
            return Err(BlattwerkError::Config(
                "archive channel capacity and chunk size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn rasterizer_timeout(&self) -> Duration {
        Duration::from_secs(self.rasterizer_timeout_secs)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| BlattwerkError::Config(format!("{key} has an invalid value: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_source_behaviour() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.raster_dpi, 150);
        assert_eq!(config.image_policy, ImagePolicy::Skip);
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::PassThrough);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("BLATTWERK_PORT", "8080"),
            ("BLATTWERK_SCRATCH_DIR", "/var/tmp/blattwerk"),
            ("BLATTWERK_IMAGE_POLICY", "reject"),
            ("BLATTWERK_PLACEHOLDER_POLICY", "unsupported"),
            ("BLATTWERK_RASTERIZER_TIMEOUT_SECS", "5"),
        ]))
        .expect("config");

        assert_eq!(config.port, 8080);
        assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp/blattwerk"));
        assert_eq!(config.image_policy, ImagePolicy::Reject);
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::Unsupported);
        assert_eq!(config.rasterizer_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn malformed_value_is_an_error() {
        let result = ServiceConfig::from_lookup(lookup_from(&[("BLATTWERK_PORT", "eighty")]));
        assert!(matches!(result, Err(BlattwerkError::Config(_))));
    }

    #[test]
    fn zero_dpi_is_rejected() {
        let result = ServiceConfig::from_lookup(lookup_from(&[("BLATTWERK_RASTER_DPI", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!("maybe".parse::<ImagePolicy>().is_err());
        assert_eq!(
            "passthrough".parse::<PlaceholderPolicy>().expect("parse"),
            PlaceholderPolicy::PassThrough
        );
    }
}
