// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content sniffing: identify uploads from their bytes, never from the name
// or declared content type.

use blattwerk_core::types::{MediaKind, RasterFormat};
use image::ImageFormat;

/// Readers accept a PDF header anywhere in the first kilobyte.
const PDF_SIGNATURE_WINDOW: usize = 1024;
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Classify `data` by its leading bytes.
pub fn sniff(data: &[u8]) -> MediaKind {
    let window = &data[..data.len().min(PDF_SIGNATURE_WINDOW)];
    if window
        .windows(PDF_SIGNATURE.len())
        .any(|candidate| candidate == PDF_SIGNATURE)
    {
        return MediaKind::Pdf;
    }

    match image::guess_format(data) {
        Ok(ImageFormat::Jpeg) => MediaKind::Raster(RasterFormat::Jpeg),
        Ok(ImageFormat::Png) => MediaKind::Raster(RasterFormat::Png),
        Ok(other) => MediaKind::OtherImage(format!("{other:?}").to_ascii_lowercase()),
        Err(_) => MediaKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_jpeg, sample_pdf, sample_png};

    #[test]
    fn recognises_pdf_signature() {
        assert_eq!(sniff(&sample_pdf(&[(10.0, 10.0)])), MediaKind::Pdf);
    }

    #[test]
    fn pdf_signature_after_leading_junk() {
        let mut data = vec![b' '; 100];
        data.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(sniff(&data), MediaKind::Pdf);

        let mut late = vec![b' '; 2000];
        late.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(sniff(&late), MediaKind::Unknown);
    }

    #[test]
    fn recognises_allow_listed_rasters() {
        assert_eq!(
            sniff(&sample_png(2, 2)),
            MediaKind::Raster(RasterFormat::Png)
        );
        assert_eq!(
            sniff(&sample_jpeg(2, 2)),
            MediaKind::Raster(RasterFormat::Jpeg)
        );
    }

    #[test]
    fn other_images_are_named() {
        assert_eq!(
            sniff(b"GIF89a\x01\x00\x01\x00"),
            MediaKind::OtherImage("gif".into())
        );
    }

    #[test]
    fn text_is_unknown() {
        assert_eq!(sniff(b"hello, world"), MediaKind::Unknown);
    }
}
