// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Blattwerk transformation pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Media type of the canonical document format.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Media type of multi-artifact responses.
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

/// Media type used when the content could not be identified.
pub const OCTET_STREAM_MEDIA_TYPE: &str = "application/octet-stream";

/// Identifier for one request's lifetime. Prefixes every scratch file the
/// request creates so leftovers are attributable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raster formats that can be embedded as document pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterFormat {
    /// Lossy.
    Jpeg,
    /// Lossless.
    Png,
}

impl RasterFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// What an uploaded payload turned out to be after sniffing its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    /// The canonical document format.
    Pdf,
    /// An allow-listed raster image.
    Raster(RasterFormat),
    /// A recognised image outside the allow-list (GIF, TIFF, ...).
    OtherImage(String),
    /// Anything else.
    Unknown,
}

impl MediaKind {
    pub fn mime_type(&self) -> String {
        match self {
            Self::Pdf => PDF_MEDIA_TYPE.to_string(),
            Self::Raster(format) => format.mime_type().to_string(),
            Self::OtherImage(name) => format!("image/{}", name.to_ascii_lowercase()),
            Self::Unknown => OCTET_STREAM_MEDIA_TYPE.to_string(),
        }
    }

    /// File extension used when naming artifacts of this kind.
    pub fn extension(&self) -> String {
        match self {
            Self::Pdf => "pdf".to_string(),
            Self::Raster(format) => format.extension().to_string(),
            Self::OtherImage(name) => name.to_ascii_lowercase(),
            Self::Unknown => "bin".to_string(),
        }
    }
}

/// An axis-aligned rectangle in PDF user space (points).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl Rect {
    /// Build a rectangle from two arbitrary corners, normalising the order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            llx: x0.min(x1),
            lly: y0.min(y1),
            urx: x0.max(x1),
            ury: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.llx + self.urx) / 2.0, (self.lly + self.ury) / 2.0)
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.llx >= self.llx
            && other.lly >= self.lly
            && other.urx <= self.urx
            && other.ury <= self.ury
    }

    /// Overlap of the two rectangles, or `None` when they are disjoint.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let llx = self.llx.max(other.llx);
        let lly = self.lly.max(other.lly);
        let urx = self.urx.min(other.urx);
        let ury = self.ury.min(other.ury);
        (urx > llx && ury > lly).then_some(Rect { llx, lly, urx, ury })
    }

    /// Shrink by `fraction` of the width on the left and right and by
    /// `fraction` of the height on the top and bottom.
    pub fn inset_by_fraction(&self, fraction: f64) -> Rect {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        Rect {
            llx: self.llx + dx,
            lly: self.lly + dy,
            urx: self.urx - dx,
            ury: self.ury - dy,
        }
    }
}

/// Snapshot of one page's geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based position in the document.
    pub index: u32,
    pub width_pt: f64,
    pub height_pt: f64,
    /// Always one of 0, 90, 180, 270.
    pub rotation_deg: i32,
    pub media_box: Rect,
    /// Lies within `media_box` when set.
    pub crop_box: Option<Rect>,
}

impl Page {
    /// The region a viewer shows: the crop box if present, else the media box.
    pub fn visible_box(&self) -> Rect {
        self.crop_box.unwrap_or(self.media_box)
    }
}

/// Normalise an arbitrary rotation to one of 0, 90, 180, 270.
///
/// Values that are not multiples of 90 round down to the previous multiple.
pub fn normalize_rotation(degrees: i64) -> i32 {
    let wrapped = degrees.rem_euclid(360) as i32;
    wrapped - wrapped % 90
}

/// Input/output cardinality of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    OneToOne,
    ManyToOne,
    OneToMany,
}

impl Arity {
    /// Operations that work on exactly one input document.
    pub fn takes_single_input(&self) -> bool {
        matches!(self, Self::OneToOne | Self::OneToMany)
    }
}

/// A request-scoped upload persisted in the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Store-generated location; never derived from the caller's name.
    pub storage_path: PathBuf,
    /// Name the caller supplied. Used for logging and artifact naming only.
    pub original_name: String,
    /// Media type sniffed from the bytes.
    pub media_type: String,
    pub size_bytes: u64,
    /// SHA-256 of the stored bytes, lowercase hex.
    pub sha256: String,
}

/// Payload of an [`OutputArtifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactBody {
    Bytes(Vec<u8>),
    /// Streamed from a scratch file when packaged.
    File(PathBuf),
}

/// A named output produced by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub body: ArtifactBody,
    pub file_name: String,
    pub media_type: String,
}

impl OutputArtifact {
    pub fn pdf(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            body: ArtifactBody::Bytes(bytes),
            file_name: file_name.into(),
            media_type: PDF_MEDIA_TYPE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalisation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(100), 90);
    }

    #[test]
    fn inset_removes_fraction_from_each_side() {
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        let inset = rect.inset_by_fraction(0.1);
        assert_eq!(inset, Rect::new(20.0, 10.0, 180.0, 90.0));
        assert!(rect.contains(&inset));
    }

    #[test]
    fn rect_new_normalises_corners() {
        let rect = Rect::new(10.0, 50.0, 0.0, 5.0);
        assert_eq!(rect.llx, 0.0);
        assert_eq!(rect.ury, 50.0);
        assert_eq!(rect.width(), 10.0);
    }

    #[test]
    fn disjoint_rects_have_no_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersect(&b).is_none());
        assert_eq!(
            a.intersect(&Rect::new(5.0, 5.0, 15.0, 15.0)),
            Some(Rect::new(5.0, 5.0, 10.0, 10.0))
        );
    }

    #[test]
    fn media_kind_names() {
        assert_eq!(MediaKind::Pdf.extension(), "pdf");
        assert_eq!(MediaKind::Raster(RasterFormat::Jpeg).mime_type(), "image/jpeg");
        assert_eq!(MediaKind::OtherImage("Gif".into()).mime_type(), "image/gif");
        assert_eq!(MediaKind::Unknown.mime_type(), OCTET_STREAM_MEDIA_TYPE);
    }
}
