// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image pages: render a raster image onto a page of exactly its pixel size
// using `printpdf` 0.8, then graft that page onto a document handle.
//
// printpdf builds documents from `PdfPage` values holding `Vec<Op>` lists; the
// generated single-page document is reparsed with lopdf and copied across so
// the image page lives in the same object graph as every other page.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::RasterFormat;
use lopdf::Object;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, instrument};

use super::handle::{DocumentHandle, PageRef};

/// At 72 DPI one image pixel maps to one PDF point.
const POINTS_PER_INCH: f32 = 72.0;

impl DocumentHandle {
    /// Decode `bytes` as `format` and append a page of exactly the image's
    /// pixel dimensions (in points) with the image filling it.
    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len(), ?format))]
    pub fn embed_raster_image(&mut self, bytes: &[u8], format: RasterFormat) -> Result<PageRef> {
        let image_format = match format {
            RasterFormat::Jpeg => ::image::ImageFormat::Jpeg,
            RasterFormat::Png => ::image::ImageFormat::Png,
        };
        let decoded = ::image::load_from_memory_with_format(bytes, image_format).map_err(|err| {
            BlattwerkError::UnsupportedImageFormat(format!(
                "{} data could not be decoded: {err}",
                format.extension()
            ))
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(BlattwerkError::UnsupportedImageFormat(
                "image has no pixels".into(),
            ));
        }

        let single_page = render_image_page(decoded)?;
        let source = DocumentHandle::parse(&single_page)?;
        let mut refs = self.copy_pages(&source, &[0])?;
        let page = refs
            .pop()
            .ok_or_else(|| BlattwerkError::Internal("image page was not copied".into()))?;

        // Exact integer box, free of mm round-trip error.
        self.set_page_attribute(
            page.index,
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(i64::from(width)),
                Object::Integer(i64::from(height)),
            ]),
        )?;

        debug!(width, height, index = page.index, "image page appended");
        Ok(page)
    }
}

/// Build a standalone one-page PDF showing `image` at one point per pixel.
fn render_image_page(image: ::image::DynamicImage) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    let rgb = image.to_rgb8();
    let raw = RawImage {
        pixels: RawImageData::U8(rgb.into_raw()),
        width: width as usize,
        height: height as usize,
        data_format: RawImageFormat::RGB8,
        tag: Vec::new(),
    };

    let mut doc = PdfDocument::new("Blattwerk image");
    let xobject_id = doc.add_image(&raw);

    let ops = vec![Op::UseXobject {
        id: xobject_id,
        transform: XObjectTransform {
            translate_x: Some(Pt(0.0)),
            translate_y: Some(Pt(0.0)),
            scale_x: Some(1.0),
            scale_y: Some(1.0),
            dpi: Some(POINTS_PER_INCH),
            rotate: None,
        },
    }];

    let page = PdfPage::new(pt_to_mm(width), pt_to_mm(height), ops);
    doc.with_pages(vec![page]);

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !warnings.is_empty() {
        debug!(count = warnings.len(), "printpdf reported warnings");
    }
    Ok(output)
}

fn pt_to_mm(points: u32) -> Mm {
    Mm(points as f32 * 25.4 / POINTS_PER_INCH)
}
