// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text overlays: watermarks and page numbers drawn on top of existing pages.
//
// Overlays are additive: the page's existing content streams are kept as-is
// and bracketed by a `q`/`Q` pair, then a new stream with the overlay is
// appended. Fonts and graphics states are registered in the page's own
// resource dictionary.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::Rect;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};
use tracing::{debug, instrument};

use super::handle::DocumentHandle;

/// Resource name of the overlay font.
const FONT_NAME: &str = "BwFont";

/// Resource name of the overlay transparency state.
const GSTATE_NAME: &str = "BwGs";

/// Helvetica cap height as a fraction of the font size.
const HELVETICA_CAP_HEIGHT: f64 = 0.718;

/// Diagonal text stamped across every page.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkStyle {
    pub text: String,
    pub font_size: f64,
    /// Counter-clockwise, in degrees.
    pub angle_deg: f64,
    /// Fill gray level, 0 (black) to 1 (white).
    pub gray: f64,
    /// Fill and stroke alpha.
    pub opacity: f64,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            text: "CONFIDENTIAL".to_string(),
            font_size: 60.0,
            angle_deg: 45.0,
            gray: 0.5,
            opacity: 0.3,
        }
    }
}

/// 1-based page numbers centred near the bottom edge.
#[derive(Debug, Clone, PartialEq)]
pub struct PageNumberStyle {
    pub font_size: f64,
    /// Distance from the bottom of the visible box to the text baseline.
    pub bottom_margin: f64,
    pub gray: f64,
}

impl Default for PageNumberStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            bottom_margin: 20.0,
            gray: 0.0,
        }
    }
}

impl DocumentHandle {
    // -- Watermark ------------------------------------------------------------

    /// Draw `style.text` diagonally across the centre of every page.
    #[instrument(skip(self), fields(pages = self.page_count()))]
    pub fn stamp_watermark(&mut self, style: &WatermarkStyle) -> Result<()> {
        if style.text.is_empty() {
            return Err(BlattwerkError::Validation("watermark text is empty".into()));
        }

        let font_id = self.add_overlay_font();
        let gstate_id = self.document.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(style.opacity as f32),
            "CA" => Object::Real(style.opacity as f32),
        });

        let text_width = helvetica_text_width(&style.text, style.font_size);
        let cap_height = HELVETICA_CAP_HEIGHT * style.font_size;
        let (sin, cos) = style.angle_deg.to_radians().sin_cos();

        for index in 0..self.page_count() {
            let (cx, cy) = self.page(index)?.visible_box().center();

            // Shift the text origin so the rotated text block is centred on
            // the page centre.
            let tx = cx - (text_width / 2.0 * cos - cap_height / 2.0 * sin);
            let ty = cy - (text_width / 2.0 * sin + cap_height / 2.0 * cos);

            let operations = vec![
                Operation::new("gs", vec![Object::Name(GSTATE_NAME.into())]),
                Operation::new("g", vec![real(style.gray)]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(FONT_NAME.into()), real(style.font_size)],
                ),
                Operation::new(
                    "Tm",
                    vec![real(cos), real(sin), real(-sin), real(cos), real(tx), real(ty)],
                ),
                Operation::new("Tj", vec![Object::string_literal(style.text.as_str())]),
                Operation::new("ET", vec![]),
            ];

            self.append_overlay(index, operations, font_id, Some(gstate_id))?;
        }

        debug!(text = %style.text, "watermark stamped");
        Ok(())
    }

    // -- Page numbers ---------------------------------------------------------

    /// Draw each page's 1-based number, horizontally centred, above the
    /// bottom edge of its visible box.
    #[instrument(skip(self), fields(pages = self.page_count()))]
    pub fn stamp_page_numbers(&mut self, style: &PageNumberStyle) -> Result<()> {
        let font_id = self.add_overlay_font();

        for index in 0..self.page_count() {
            let page = self.page(index)?;
            let label = (index + 1).to_string();
            let matrix = page_number_matrix(&page.visible_box(), page.rotation_deg, &label, style);

            let operations = vec![
                Operation::new("g", vec![real(style.gray)]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(FONT_NAME.into()), real(style.font_size)],
                ),
                Operation::new("Tm", matrix.into_iter().map(real).collect()),
                Operation::new("Tj", vec![Object::string_literal(label)]),
                Operation::new("ET", vec![]),
            ];

            self.append_overlay(index, operations, font_id, None)?;
        }

        Ok(())
    }

    // -- Plumbing -------------------------------------------------------------

    fn add_overlay_font(&mut self) -> ObjectId {
        self.document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        })
    }

    /// Wrap the page's content in `q … Q` and append `operations` as a new
    /// content stream, registering the overlay resources on the page.
    fn append_overlay(
        &mut self,
        index: u32,
        operations: Vec<Operation>,
        font_id: ObjectId,
        gstate_id: Option<ObjectId>,
    ) -> Result<()> {
        let page_id = self.page_id(index)?;

        let mut resources = self.page_resources(page_id);
        add_resource(self, &mut resources, b"Font", FONT_NAME, font_id);
        if let Some(gstate_id) = gstate_id {
            add_resource(self, &mut resources, b"ExtGState", GSTATE_NAME, gstate_id);
        }

        let mut overlay = b"Q\n".to_vec();
        overlay.extend(
            Content { operations }
                .encode()
                .map_err(|err| BlattwerkError::Serialization(format!("overlay content: {err}")))?,
        );

        let save_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let overlay_id = self.document.add_object(Stream::new(Dictionary::new(), overlay));

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(self.existing_contents(page_id));
        contents.push(Object::Reference(overlay_id));

        let page = self
            .document
            .get_dictionary_mut(page_id)
            .map_err(|err| BlattwerkError::MalformedDocument(format!("page object: {err}")))?;

        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    }

    /// The page's content streams as a flat list of references.
    ///
    /// `/Contents` may be a stream reference, an inline array, or a reference
    /// to an array; the last is spliced so the result never nests.
    fn existing_contents(&self, page_id: ObjectId) -> Vec<Object> {
        let Ok(page) = self.document.get_dictionary(page_id) else {
            return Vec::new();
        };
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.document.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// The page's effective resource dictionary as an owned copy.
    fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        self.inherited_attribute(page_id, b"Resources")
            .map(|object| self.resolve(object))
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new)
    }
}

/// Insert `name -> id` into the `category` sub-dictionary of `resources`,
/// resolving an indirect sub-dictionary into an inline copy first.
fn add_resource(
    handle: &DocumentHandle,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
) {
    let mut entries = resources
        .get(category)
        .ok()
        .map(|object| handle.resolve(object))
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    entries.set(name, Object::Reference(id));
    resources.set(category.to_vec(), Object::Dictionary(entries));
}

/// Text matrix placing `label` at the bottom centre of the page as it is
/// displayed, reading left to right after `/Rotate` is applied.
fn page_number_matrix(
    visible: &Rect,
    rotation_deg: i32,
    label: &str,
    style: &PageNumberStyle,
) -> [f64; 6] {
    let width = helvetica_text_width(label, style.font_size);
    let margin = style.bottom_margin;

    // Viewers turn the page clockwise, so the text runs counter-clockwise by
    // the same angle in page space.
    match rotation_deg {
        90 => {
            let along = visible.height() / 2.0 - width / 2.0;
            [0.0, 1.0, -1.0, 0.0, visible.urx - margin, visible.lly + along]
        }
        180 => {
            let along = visible.width() / 2.0 - width / 2.0;
            [-1.0, 0.0, 0.0, -1.0, visible.urx - along, visible.ury - margin]
        }
        270 => {
            let along = visible.height() / 2.0 - width / 2.0;
            [0.0, -1.0, 1.0, 0.0, visible.llx + margin, visible.ury - along]
        }
        _ => {
            let along = visible.width() / 2.0 - width / 2.0;
            [1.0, 0.0, 0.0, 1.0, visible.llx + along, visible.lly + margin]
        }
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Approximate rendered width of `text` in Helvetica at `font_size`.
///
/// Uses the standard Helvetica advance widths for digits, capitals and space;
/// everything else counts as an average lowercase glyph.
pub(crate) fn helvetica_text_width(text: &str, font_size: f64) -> f64 {
    let units: u32 = text.chars().map(helvetica_advance).sum();
    f64::from(units) / 1000.0 * font_size
}

fn helvetica_advance(ch: char) -> u32 {
    match ch {
        ' ' => 278,
        '0'..='9' => 556,
        'I' => 278,
        'J' => 500,
        'L' => 556,
        'F' | 'T' | 'Z' => 611,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' => 722,
        'G' | 'O' | 'Q' => 778,
        'M' => 833,
        'W' => 944,
        _ => 556,
    }
}
