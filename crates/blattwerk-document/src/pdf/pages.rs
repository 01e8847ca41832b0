// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page geometry: read page boxes and rotation, rotate pages, set crop boxes.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::{Page, Rect, normalize_rotation};
use lopdf::Object;
use tracing::{debug, instrument};

use super::handle::DocumentHandle;

/// US Letter, used when a page tree declares no media box at all.
const DEFAULT_MEDIA_BOX: Rect = Rect {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

impl DocumentHandle {
    // -- Inspection -----------------------------------------------------------

    /// Geometry snapshot of the page at `index`.
    pub fn page(&self, index: u32) -> Result<Page> {
        let page_id = self.page_id(index)?;

        let media_box = self
            .inherited_attribute(page_id, b"MediaBox")
            .and_then(|object| self.rect_from(object))
            .unwrap_or(DEFAULT_MEDIA_BOX);

        // A crop box is clipped to the media box; one that misses it entirely
        // is ignored, as viewers do.
        let crop_box = self
            .inherited_attribute(page_id, b"CropBox")
            .and_then(|object| self.rect_from(object))
            .and_then(|rect| rect.intersect(&media_box));

        let rotation_deg = self
            .inherited_attribute(page_id, b"Rotate")
            .and_then(|object| number(self.resolve(object)))
            .map(|degrees| normalize_rotation(degrees.round() as i64))
            .unwrap_or(0);

        Ok(Page {
            index,
            width_pt: media_box.width(),
            height_pt: media_box.height(),
            rotation_deg,
            media_box,
            crop_box,
        })
    }

    /// Geometry snapshots of every page, in document order.
    pub fn pages(&self) -> Result<Vec<Page>> {
        (0..self.page_count()).map(|index| self.page(index)).collect()
    }

    // -- Rotation -------------------------------------------------------------

    /// Add `degrees` (clockwise, multiple of 90) to the rotation of the page at
    /// `index`. Returns the new, normalised rotation.
    pub fn rotate_page(&mut self, index: u32, degrees: i32) -> Result<i32> {
        if degrees % 90 != 0 {
            return Err(BlattwerkError::Validation(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            )));
        }

        let current = self.page(index)?.rotation_deg;
        let rotation = normalize_rotation(i64::from(current) + i64::from(degrees));
        self.set_page_attribute(index, "Rotate", Object::Integer(i64::from(rotation)))?;

        debug!(index, from = current, to = rotation, "page rotated");
        Ok(rotation)
    }

    /// Rotate every page by `degrees`.
    #[instrument(skip(self))]
    pub fn rotate_all(&mut self, degrees: i32) -> Result<()> {
        for index in 0..self.page_count() {
            self.rotate_page(index, degrees)?;
        }
        Ok(())
    }

    // -- Cropping -------------------------------------------------------------

    /// Set the crop box of the page at `index`, clipped to its media box.
    /// Returns the box actually written.
    pub fn set_crop_box(&mut self, index: u32, rect: Rect) -> Result<Rect> {
        let page = self.page(index)?;
        let clipped = rect.intersect(&page.media_box).ok_or_else(|| {
            BlattwerkError::Validation(format!(
                "crop box for page {} lies outside the page",
                index + 1
            ))
        })?;

        self.set_page_attribute(index, "CropBox", rect_to_object(&clipped))?;
        debug!(index, ?clipped, "crop box set");
        Ok(clipped)
    }

    /// Shrink the visible box of every page by `fraction` of its width and
    /// height on each side.
    #[instrument(skip(self))]
    pub fn crop_all(&mut self, fraction: f64) -> Result<()> {
        if !(0.0..0.5).contains(&fraction) {
            return Err(BlattwerkError::Validation(format!(
                "crop fraction must be in [0, 0.5), got {fraction}"
            )));
        }
        for index in 0..self.page_count() {
            let visible = self.page(index)?.visible_box();
            self.set_crop_box(index, visible.inset_by_fraction(fraction))?;
        }
        Ok(())
    }

    // -- Helpers --------------------------------------------------------------

    /// Write `key` directly on the page dictionary, overriding any inherited
    /// value.
    pub(crate) fn set_page_attribute(
        &mut self,
        index: u32,
        key: &str,
        value: Object,
    ) -> Result<()> {
        let page_id = self.page_id(index)?;
        self.document
            .get_dictionary_mut(page_id)
            .map_err(|err| BlattwerkError::MalformedDocument(format!("page object: {err}")))?
            .set(key, value);
        Ok(())
    }

    fn rect_from(&self, object: &Object) -> Option<Rect> {
        let Object::Array(items) = self.resolve(object) else {
            return None;
        };
        if items.len() != 4 {
            return None;
        }
        let mut coords = [0.0_f64; 4];
        for (slot, item) in coords.iter_mut().zip(items) {
            *slot = number(self.resolve(item))?;
        }
        Some(Rect::new(coords[0], coords[1], coords[2], coords[3]))
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

pub(crate) fn rect_to_object(rect: &Rect) -> Object {
    Object::Array(
        [rect.llx, rect.lly, rect.urx, rect.ury]
            .into_iter()
            .map(|value| Object::Real(value as f32))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_pdf;

    fn handle(sizes: &[(f64, f64)]) -> DocumentHandle {
        DocumentHandle::parse(&sample_pdf(sizes)).expect("parse")
    }

    #[test]
    fn page_geometry_comes_from_media_box() {
        let doc = handle(&[(612.0, 792.0), (200.0, 100.0)]);
        let pages = doc.pages().expect("pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].width_pt, 200.0);
        assert_eq!(pages[1].height_pt, 100.0);
        assert_eq!(pages[0].rotation_deg, 0);
        assert!(pages[0].crop_box.is_none());
    }

    #[test]
    fn four_rotations_are_identity() {
        let mut doc = handle(&[(100.0, 200.0)]);
        for expected in [90, 180, 270, 0] {
            doc.rotate_all(90).expect("rotate");
            assert_eq!(doc.page(0).expect("page").rotation_deg, expected);
        }
    }

    #[test]
    fn odd_existing_rotation_is_normalised_first() {
        let mut doc = handle(&[(100.0, 200.0)]);
        doc.set_page_attribute(0, "Rotate", Object::Integer(100))
            .expect("set");
        assert_eq!(doc.rotate_page(0, 90).expect("rotate"), 180);
    }

    #[test]
    fn real_rotation_is_read() {
        let mut doc = handle(&[(100.0, 200.0)]);
        doc.set_page_attribute(0, "Rotate", Object::Real(270.0))
            .expect("set");
        assert_eq!(doc.page(0).expect("page").rotation_deg, 270);
    }

    #[test]
    fn rotation_must_be_quarter_turns() {
        let mut doc = handle(&[(100.0, 200.0)]);
        assert!(matches!(
            doc.rotate_page(0, 45),
            Err(BlattwerkError::Validation(_))
        ));
    }

    #[test]
    fn crop_box_is_clipped_to_media_box() {
        let mut doc = handle(&[(100.0, 100.0)]);
        let written = doc
            .set_crop_box(0, Rect::new(-50.0, 10.0, 80.0, 500.0))
            .expect("crop");
        assert_eq!(written, Rect::new(0.0, 10.0, 80.0, 100.0));
        assert_eq!(doc.page(0).expect("page").crop_box, Some(written));
    }

    #[test]
    fn crop_all_removes_fraction_per_side() {
        let mut doc = handle(&[(200.0, 100.0), (612.0, 792.0)]);
        doc.crop_all(0.1).expect("crop");
        for page in doc.pages().expect("pages") {
            let visible = page.visible_box();
            assert!((visible.width() - page.width_pt * 0.8).abs() < 0.01);
            assert!((visible.height() - page.height_pt * 0.8).abs() < 0.01);
        }
    }

    #[test]
    fn out_of_range_page_is_reported() {
        let doc = handle(&[(100.0, 100.0)]);
        assert!(matches!(
            doc.page(3),
            Err(BlattwerkError::IndexOutOfRange {
                index: 3,
                page_count: 1
            })
        ));
    }
}
