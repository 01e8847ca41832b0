// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation handlers: pure functions from loaded inputs to output artifacts.
//
// Handlers run on a blocking worker thread. They never touch the scratch
// directory; everything they need has already been loaded into memory.

use std::collections::HashMap;

use blattwerk_core::config::ImagePolicy;
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::{JobId, OutputArtifact, RasterFormat, UploadedFile};
use blattwerk_document::{DocumentHandle, PageNumberStyle, ProtectionSettings, WatermarkStyle};
use tracing::{debug, instrument, warn};

/// Fraction of the visible box removed from each side by `crop`.
pub const CROP_FRACTION: f64 = 0.1;

/// Clockwise rotation applied by `rotate`.
pub const ROTATION_STEP_DEG: i32 = 90;

/// An upload after the load stage.
pub struct LoadedInput {
    pub file: UploadedFile,
    pub content: LoadedContent,
}

pub enum LoadedContent {
    Document(DocumentHandle),
    Raster { format: RasterFormat, bytes: Vec<u8> },
    /// An image outside the allow-list; kept so the image policy can decide.
    Unsupported { media_type: String },
}

/// Per-request inputs besides the files.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub job_id: JobId,
    /// Text fields of the request, e.g. `password` or `level`.
    pub params: HashMap<String, String>,
    pub image_policy: ImagePolicy,
}

impl OperationContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

// -- Helpers ------------------------------------------------------------------

/// The first input as a parsed document.
fn single_document(inputs: Vec<LoadedInput>) -> Result<DocumentHandle> {
    match inputs.into_iter().next().map(|input| input.content) {
        Some(LoadedContent::Document(handle)) => Ok(handle),
        _ => Err(BlattwerkError::Validation("Please upload a PDF file".into())),
    }
}

fn documents(inputs: Vec<LoadedInput>) -> Result<Vec<DocumentHandle>> {
    inputs
        .into_iter()
        .map(|input| match input.content {
            LoadedContent::Document(handle) => Ok(handle),
            _ => Err(BlattwerkError::Validation(format!(
                "{} is not a PDF file",
                input.file.original_name
            ))),
        })
        .collect()
}

fn all_pages(handle: &DocumentHandle) -> Vec<u32> {
    (0..handle.page_count()).collect()
}

fn one_document(name: &str, handle: DocumentHandle) -> Result<Vec<OutputArtifact>> {
    Ok(vec![OutputArtifact::pdf(name, handle.serialize()?)])
}

// -- Handlers -----------------------------------------------------------------

/// Concatenate every page of every input, in input order.
#[instrument(skip_all, fields(job = %ctx.job_id, inputs = inputs.len()))]
pub fn merge(inputs: Vec<LoadedInput>, ctx: &OperationContext) -> Result<Vec<OutputArtifact>> {
    let sources = documents(inputs)?;
    let mut merged = DocumentHandle::empty();
    for source in &sources {
        merged.copy_pages(source, &all_pages(source))?;
    }
    debug!(pages = merged.page_count(), "merged");
    one_document("merged.pdf", merged)
}

/// One single-page document per page, named `page-<n>.pdf`.
#[instrument(skip_all, fields(job = %ctx.job_id))]
pub fn split(inputs: Vec<LoadedInput>, ctx: &OperationContext) -> Result<Vec<OutputArtifact>> {
    let source = single_document(inputs)?;
    let mut artifacts = Vec::with_capacity(source.page_count() as usize);

    for index in 0..source.page_count() {
        let mut page = DocumentHandle::empty();
        page.copy_pages(&source, &[index])?;
        artifacts.push(OutputArtifact::pdf(
            format!("page-{}.pdf", index + 1),
            page.serialize()?,
        ));
    }

    debug!(pages = artifacts.len(), "split");
    Ok(artifacts)
}

/// Turn every page a quarter clockwise.
#[instrument(skip_all, fields(job = %ctx.job_id))]
pub fn rotate(inputs: Vec<LoadedInput>, ctx: &OperationContext) -> Result<Vec<OutputArtifact>> {
    let mut handle = single_document(inputs)?;
    handle.rotate_all(ROTATION_STEP_DEG)?;
    one_document("rotated.pdf", handle)
}

#[instrument(skip_all, fields(job = %ctx.job_id))]
pub fn watermark(inputs: Vec<LoadedInput>, ctx: &OperationContext) -> Result<Vec<OutputArtifact>> {
    let mut handle = single_document(inputs)?;
    handle.stamp_watermark(&WatermarkStyle::default())?;
    one_document("watermarked.pdf", handle)
}

#[instrument(skip_all, fields(job = %ctx.job_id))]
pub fn page_numbers(
    inputs: Vec<LoadedInput>,
    ctx: &OperationContext,
) -> Result<Vec<OutputArtifact>> {
    let mut handle = single_document(inputs)?;
    handle.stamp_page_numbers(&PageNumberStyle::default())?;
    one_document("numbered.pdf", handle)
}

/// Fixed-fraction crop. The `mode` parameter is accepted but does not change
/// the result.
#[instrument(skip_all, fields(job = %ctx.job_id))]
pub fn crop(inputs: Vec<LoadedInput>, ctx: &OperationContext) -> Result<Vec<OutputArtifact>> {
    if let Some(mode) = ctx.param("mode") {
        debug!(mode, "crop mode is advisory");
    }
    let mut handle = single_document(inputs)?;
    handle.crop_all(CROP_FRACTION)?;
    one_document("cropped.pdf", handle)
}

/// Encrypt with the `password` / `owner_password` parameters.
#[instrument(skip_all, fields(job = %ctx.job_id))]
pub fn protect(inputs: Vec<LoadedInput>, ctx: &OperationContext) -> Result<Vec<OutputArtifact>> {
    let settings = ProtectionSettings::new(ctx.param("password"), ctx.param("owner_password"));
    let mut handle = single_document(inputs)?;
    handle.protect(&settings)?;
    one_document("protected.pdf", handle)
}

/// One page per image, sized to the image; PDF inputs contribute their pages
/// in place.
#[instrument(skip_all, fields(job = %ctx.job_id, inputs = inputs.len()))]
pub fn images_to_document(
    inputs: Vec<LoadedInput>,
    ctx: &OperationContext,
) -> Result<Vec<OutputArtifact>> {
    let mut output = DocumentHandle::empty();

    for input in inputs {
        match input.content {
            LoadedContent::Raster { format, bytes } => {
                output.embed_raster_image(&bytes, format)?;
            }
            LoadedContent::Document(source) => {
                output.copy_pages(&source, &all_pages(&source))?;
            }
            LoadedContent::Unsupported { media_type } => match ctx.image_policy {
                ImagePolicy::Skip => {
                    warn!(
                        name = %input.file.original_name,
                        %media_type,
                        "skipping unsupported image"
                    );
                }
                ImagePolicy::Reject => {
                    return Err(BlattwerkError::UnsupportedImageFormat(media_type));
                }
            },
        }
    }

    if output.page_count() == 0 {
        return Err(BlattwerkError::Validation(
            "None of the uploaded files is a JPEG or PNG image".into(),
        ));
    }
    one_document("images.pdf", output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use blattwerk_core::types::PDF_MEDIA_TYPE;
    use blattwerk_document::testing::{sample_jpeg, sample_pdf, sample_png};

    fn ctx() -> OperationContext {
        OperationContext {
            job_id: JobId::new(),
            params: HashMap::new(),
            image_policy: ImagePolicy::Skip,
        }
    }

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            storage_path: PathBuf::from(name),
            original_name: name.to_string(),
            media_type: PDF_MEDIA_TYPE.to_string(),
            size_bytes: 0,
            sha256: String::new(),
        }
    }

    fn pdf_input(sizes: &[(f64, f64)]) -> LoadedInput {
        LoadedInput {
            file: file("in.pdf"),
            content: LoadedContent::Document(
                DocumentHandle::parse(&sample_pdf(sizes)).expect("parse"),
            ),
        }
    }

    fn raster_input(format: RasterFormat, bytes: Vec<u8>) -> LoadedInput {
        LoadedInput {
            file: file("image"),
            content: LoadedContent::Raster { format, bytes },
        }
    }

    fn gif_input() -> LoadedInput {
        LoadedInput {
            file: file("anim.gif"),
            content: LoadedContent::Unsupported {
                media_type: "image/gif".into(),
            },
        }
    }

    fn reparse(artifact: &OutputArtifact) -> DocumentHandle {
        match &artifact.body {
            blattwerk_core::types::ArtifactBody::Bytes(bytes) => {
                DocumentHandle::parse(bytes).expect("reparse")
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn merge_concatenates_in_input_order() {
        let inputs = vec![
            pdf_input(&[(100.0, 100.0), (110.0, 110.0)]),
            pdf_input(&[(200.0, 200.0)]),
        ];
        let artifacts = merge(inputs, &ctx()).expect("merge");
        assert_eq!(artifacts.len(), 1);

        let merged = reparse(&artifacts[0]);
        let widths: Vec<f64> = merged
            .pages()
            .expect("pages")
            .iter()
            .map(|page| page.width_pt)
            .collect();
        assert_eq!(widths, vec![100.0, 110.0, 200.0]);
    }

    #[test]
    fn split_names_pages_one_based() {
        let sizes = [(100.0, 150.0), (200.0, 250.0), (300.0, 350.0)];
        let artifacts = split(vec![pdf_input(&sizes)], &ctx()).expect("split");
        let names: Vec<&str> = artifacts.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["page-1.pdf", "page-2.pdf", "page-3.pdf"]);

        for (number, (artifact, (width, height))) in artifacts.iter().zip(sizes).enumerate() {
            let doc = reparse(artifact);
            assert_eq!(doc.page_count(), 1);
            let page = doc.page(0).expect("page");
            assert_eq!((page.width_pt, page.height_pt), (width, height));
            let content = doc.page_content(0).expect("content");
            let text = String::from_utf8_lossy(&content);
            assert!(text.contains(&format!("(Page {})", number + 1)));
        }
    }

    #[test]
    fn rotate_turns_every_page() {
        let artifacts = rotate(vec![pdf_input(&[(100.0, 200.0); 2])], &ctx()).expect("rotate");
        let rotated = reparse(&artifacts[0]);
        for page in rotated.pages().expect("pages") {
            assert_eq!(page.rotation_deg, 90);
        }
    }

    #[test]
    fn crop_applies_fixed_fraction() {
        let mut context = ctx();
        context.params.insert("mode".into(), "smart".into());
        let artifacts = crop(vec![pdf_input(&[(500.0, 300.0)])], &context).expect("crop");
        let page = reparse(&artifacts[0]).page(0).expect("page");
        let visible = page.visible_box();
        assert!((visible.width() - 400.0).abs() < 0.01);
        assert!((visible.height() - 240.0).abs() < 0.01);
    }

    #[test]
    fn protect_reads_password_params() {
        let mut context = ctx();
        context.params.insert("password".into(), "open-sesame".into());
        let artifacts = protect(vec![pdf_input(&[(100.0, 100.0)])], &context).expect("protect");
        assert_eq!(artifacts[0].file_name, "protected.pdf");
    }

    #[test]
    fn images_become_pages_in_order() {
        let inputs = vec![
            raster_input(RasterFormat::Png, sample_png(30, 20)),
            pdf_input(&[(100.0, 100.0)]),
            gif_input(),
            raster_input(RasterFormat::Jpeg, sample_jpeg(8, 16)),
        ];
        let artifacts = images_to_document(inputs, &ctx()).expect("convert");
        let doc = reparse(&artifacts[0]);
        let sizes: Vec<(f64, f64)> = doc
            .pages()
            .expect("pages")
            .iter()
            .map(|page| (page.width_pt, page.height_pt))
            .collect();
        assert_eq!(sizes, vec![(30.0, 20.0), (100.0, 100.0), (8.0, 16.0)]);
    }

    #[test]
    fn reject_policy_fails_on_unsupported_images() {
        let mut context = ctx();
        context.image_policy = ImagePolicy::Reject;
        let inputs = vec![raster_input(RasterFormat::Png, sample_png(2, 2)), gif_input()];
        assert!(matches!(
            images_to_document(inputs, &context),
            Err(BlattwerkError::UnsupportedImageFormat(_))
        ));
    }

    #[test]
    fn only_unsupported_images_is_a_validation_error() {
        assert!(matches!(
            images_to_document(vec![gif_input()], &ctx()),
            Err(BlattwerkError::Validation(_))
        ));
    }
}
