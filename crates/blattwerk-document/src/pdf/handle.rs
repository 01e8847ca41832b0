// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document handle: parse PDF bytes into an editable lopdf object graph,
// copy pages between documents, and serialise the result.

use std::collections::{BTreeMap, HashMap};

use blattwerk_core::error::{BlattwerkError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use tracing::{debug, instrument, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Producer string stamped into every document this crate writes.
const PRODUCER: &str = "Blattwerk";

/// A page inside a specific [`DocumentHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef {
    /// Zero-based position in the document.
    pub index: u32,
    /// The page object in the owning document.
    pub object_id: ObjectId,
}

/// An in-memory, editable PDF document.
///
/// Owned by a single operation invocation; nothing is shared between
/// requests. All page addressing is zero-based.
pub struct DocumentHandle {
    pub(crate) document: Document,
    /// Set once the document has been encrypted; no further edits may touch
    /// strings after that point.
    pub(crate) encrypted: bool,
}

impl DocumentHandle {
    // -- Construction ---------------------------------------------------------

    /// Parse raw PDF bytes.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn parse(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| BlattwerkError::MalformedDocument(err.to_string()))?;

        let pages = document.get_pages().len();
        if pages == 0 {
            return Err(BlattwerkError::MalformedDocument(
                "document has no pages".into(),
            ));
        }

        debug!(pages, version = %document.version, "PDF parsed");
        Ok(Self {
            document,
            encrypted: false,
        })
    }

    /// An empty document with a catalog and an empty page tree, ready to
    /// receive pages via [`DocumentHandle::copy_pages`].
    pub fn empty() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            encrypted: false,
        }
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Object id of the page at zero-based `index`.
    pub fn page_id(&self, index: u32) -> Result<ObjectId> {
        let pages = self.document.get_pages();
        lookup_page(&pages, index)
    }

    /// Decoded content stream bytes of the page at `index`.
    pub fn page_content(&self, index: u32) -> Result<Vec<u8>> {
        let page_id = self.page_id(index)?;
        self.document
            .get_page_content(page_id)
            .map_err(|err| BlattwerkError::MalformedDocument(err.to_string()))
    }

    /// Whether the document carries an /Encrypt dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted || self.document.is_encrypted()
    }

    /// Look up `key` on the page or, failing that, on its ancestors.
    pub(crate) fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        inherited_attribute(&self.document, page_id, key)
    }

    /// Follow references until a direct object is reached.
    pub(crate) fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        resolve(&self.document, object)
    }

    // -- Page copying ---------------------------------------------------------

    /// Deep-copy the pages at `indices` from `source` into `self`, appending
    /// them in the order given.
    ///
    /// Objects shared between the copied pages (fonts, images) are copied
    /// once. Attributes the source pages inherited from their page tree are
    /// written onto the copies so they render identically.
    #[instrument(skip_all, fields(count = indices.len()))]
    pub fn copy_pages(&mut self, source: &DocumentHandle, indices: &[u32]) -> Result<Vec<PageRef>> {
        let source_pages = source.document.get_pages();

        // Validate everything before mutating the destination.
        let page_ids = indices
            .iter()
            .map(|&index| lookup_page(&source_pages, index))
            .collect::<Result<Vec<_>>>()?;

        let pages_root = self.pages_root()?;
        let mut copier = PageCopier {
            source: &source.document,
            target: &mut self.document,
            mapping: HashMap::new(),
        };

        let mut copied = Vec::with_capacity(page_ids.len());
        for page_id in page_ids {
            copied.push(copier.copy_page(page_id, pages_root)?);
        }

        let first_new = self.page_count() - copied.len() as u32;
        let refs = copied
            .into_iter()
            .enumerate()
            .map(|(offset, object_id)| PageRef {
                index: first_new + offset as u32,
                object_id,
            })
            .collect();

        debug!(total_pages = self.page_count(), "pages copied");
        Ok(refs)
    }

    /// The root /Pages node that new pages are appended to.
    fn pages_root(&self) -> Result<ObjectId> {
        self.document
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|err| BlattwerkError::MalformedDocument(format!("no page tree: {err}")))
    }

    // -- Serialisation --------------------------------------------------------

    /// Write the document out as PDF bytes.
    ///
    /// Fails with `Serialization` when edits left the document without pages.
    #[instrument(skip(self))]
    pub fn serialize(mut self) -> Result<Vec<u8>> {
        if self.page_count() == 0 {
            return Err(BlattwerkError::Serialization(
                "document has no pages".into(),
            ));
        }

        if !self.encrypted {
            self.stamp_info()?;
        }

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| BlattwerkError::Serialization(err.to_string()))?;

        debug!(output_bytes = output.len(), "PDF serialised");
        Ok(output)
    }

    /// Record producer and modification date in the /Info dictionary.
    pub(crate) fn stamp_info(&mut self) -> Result<()> {
        let mod_date = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();

        // A dangling or non-dictionary /Info is replaced rather than trusted.
        let existing = self
            .document
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .ok()
            .filter(|&id| self.document.get_dictionary(id).is_ok());
        let info_id = match existing {
            Some(id) => id,
            None => {
                let id = self.document.add_object(Dictionary::new());
                self.document.trailer.set("Info", id);
                id
            }
        };

        let info = self
            .document
            .get_dictionary_mut(info_id)
            .map_err(|err| BlattwerkError::Serialization(format!("info dictionary: {err}")))?;
        info.set("Producer", Object::string_literal(PRODUCER));
        info.set("ModDate", Object::string_literal(mod_date));
        Ok(())
    }
}

/// Copies pages and everything they reference from one document into
/// another, remembering which source objects were already copied so shared
/// resources and back-references (e.g. an annotation's /P) are not duplicated
/// or followed forever.
struct PageCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    mapping: HashMap<ObjectId, ObjectId>,
}

impl PageCopier<'_> {
    fn copy_page(&mut self, page_id: ObjectId, pages_root: ObjectId) -> Result<ObjectId> {
        let page_dict = self
            .source
            .get_dictionary(page_id)
            .map_err(|err| BlattwerkError::MalformedDocument(format!("page object: {err}")))?;

        // Register first so references back to this page resolve to the copy.
        let new_page_id = self.target.new_object_id();
        self.mapping.insert(page_id, new_page_id);

        let mut new_dict = self.clone_dictionary(page_dict);
        for key in INHERITABLE_KEYS {
            if new_dict.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(self.source, page_id, key) {
                let cloned = self.clone_object(value);
                new_dict.set(key.to_vec(), cloned);
            }
        }
        new_dict.set("Parent", Object::Reference(pages_root));
        self.target
            .objects
            .insert(new_page_id, Object::Dictionary(new_dict));

        let root = self
            .target
            .get_dictionary_mut(pages_root)
            .map_err(|err| BlattwerkError::MalformedDocument(format!("page tree: {err}")))?;
        if let Ok(Object::Array(kids)) = root.get_mut(b"Kids") {
            kids.push(Object::Reference(new_page_id));
        } else {
            root.set("Kids", vec![Object::Reference(new_page_id)]);
        }
        let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        root.set("Count", count + 1);

        Ok(new_page_id)
    }

    fn copy_reference(&mut self, id: ObjectId) -> Object {
        if let Some(&mapped) = self.mapping.get(&id) {
            return Object::Reference(mapped);
        }
        match self.source.get_object(id) {
            Ok(referenced) => {
                let new_id = self.target.new_object_id();
                self.mapping.insert(id, new_id);
                let cloned = self.clone_object(referenced);
                self.target.objects.insert(new_id, cloned);
                Object::Reference(new_id)
            }
            Err(err) => {
                warn!(?id, %err, "cannot resolve reference, using Null");
                Object::Null
            }
        }
    }

    /// /Parent is skipped: page parents are patched by `copy_page`, and other
    /// parent links (outlines, form fields) belong to structures that are not
    /// copied.
    fn clone_dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        let mut new_dict = Dictionary::new();
        for (key, value) in dict.iter() {
            if key == b"Parent" {
                continue;
            }
            let cloned = self.clone_object(value);
            new_dict.set(key.clone(), cloned);
        }
        new_dict
    }

    fn clone_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Dictionary(dict) => Object::Dictionary(self.clone_dictionary(dict)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.clone_object(item)).collect())
            }
            Object::Reference(id) => self.copy_reference(*id),
            Object::Stream(stream) => {
                let mut cloned = stream.clone();
                cloned.dict = self.clone_dictionary(&stream.dict);
                Object::Stream(cloned)
            }
            other => other.clone(),
        }
    }
}

/// Map a zero-based index onto lopdf's 1-based page table.
fn lookup_page(pages: &BTreeMap<u32, ObjectId>, index: u32) -> Result<ObjectId> {
    index
        .checked_add(1)
        .and_then(|number| pages.get(&number))
        .copied()
        .ok_or(BlattwerkError::IndexOutOfRange {
            index,
            page_count: pages.len() as u32,
        })
}

/// Look up `key` on a page dictionary, walking /Parent links for inheritable
/// attributes.
pub(crate) fn inherited_attribute<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = document.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => match document.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return &Object::Null,
            },
            direct => return direct,
        }
    }
    &Object::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_pdf;

    #[test]
    fn parse_reports_page_count() {
        let handle = DocumentHandle::parse(&sample_pdf(&[(612.0, 792.0), (300.0, 400.0)]))
            .expect("parse");
        assert_eq!(handle.page_count(), 2);
    }

    #[test]
    fn garbage_is_malformed() {
        let result = DocumentHandle::parse(b"definitely not a pdf");
        assert!(matches!(result, Err(BlattwerkError::MalformedDocument(_))));
    }

    #[test]
    fn empty_document_cannot_be_serialised() {
        let result = DocumentHandle::empty().serialize();
        assert!(matches!(result, Err(BlattwerkError::Serialization(_))));
    }

    #[test]
    fn copy_pages_preserves_requested_order() {
        let source = DocumentHandle::parse(&sample_pdf(&[
            (100.0, 100.0),
            (200.0, 200.0),
            (300.0, 300.0),
        ]))
        .expect("parse");
        let mut target = DocumentHandle::empty();

        let refs = target.copy_pages(&source, &[2, 0]).expect("copy");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].index, 0);
        assert_eq!(refs[1].index, 1);

        let bytes = target.serialize().expect("serialize");
        let reparsed = DocumentHandle::parse(&bytes).expect("reparse");
        assert_eq!(reparsed.page_count(), 2);
        assert_eq!(
            reparsed.page_content(0).expect("content"),
            source.page_content(2).expect("content")
        );
        assert_eq!(
            reparsed.page_content(1).expect("content"),
            source.page_content(0).expect("content")
        );
    }

    #[test]
    fn copy_pages_out_of_range_leaves_target_untouched() {
        let source = DocumentHandle::parse(&sample_pdf(&[(100.0, 100.0)])).expect("parse");
        let mut target = DocumentHandle::empty();

        let result = target.copy_pages(&source, &[0, 5]);
        assert!(matches!(
            result,
            Err(BlattwerkError::IndexOutOfRange {
                index: 5,
                page_count: 1
            })
        ));
        assert_eq!(target.page_count(), 0);
    }

    #[test]
    fn largest_index_is_out_of_range() {
        let source = DocumentHandle::parse(&sample_pdf(&[(100.0, 100.0)])).expect("parse");
        assert!(matches!(
            source.page_id(u32::MAX),
            Err(BlattwerkError::IndexOutOfRange {
                index: u32::MAX,
                page_count: 1
            })
        ));

        let mut target = DocumentHandle::empty();
        assert!(matches!(
            target.copy_pages(&source, &[u32::MAX]),
            Err(BlattwerkError::IndexOutOfRange { .. })
        ));
        assert_eq!(target.page_count(), 0);
    }

    #[test]
    fn dangling_info_reference_is_replaced() {
        let mut handle = DocumentHandle::parse(&sample_pdf(&[(100.0, 100.0)])).expect("parse");
        handle
            .document
            .trailer
            .set("Info", Object::Reference((9999, 0)));

        let bytes = handle.serialize().expect("serialize");
        let reparsed = DocumentHandle::parse(&bytes).expect("reparse");
        let info_id = reparsed
            .document
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .expect("info reference");
        let info = reparsed.document.get_dictionary(info_id).expect("info dict");
        assert!(info.has(b"Producer"));
    }

    #[test]
    fn copied_pages_keep_inherited_resources() {
        // The fixture puts /Resources on the page tree root only.
        let source = DocumentHandle::parse(&sample_pdf(&[(100.0, 100.0)])).expect("parse");
        let mut target = DocumentHandle::empty();
        let refs = target.copy_pages(&source, &[0]).expect("copy");

        let page = target
            .document
            .get_dictionary(refs[0].object_id)
            .expect("page dict");
        assert!(page.has(b"Resources"));
        assert!(page.has(b"MediaBox"));
    }

    #[test]
    fn serialised_output_carries_producer() {
        let handle = DocumentHandle::parse(&sample_pdf(&[(100.0, 100.0)])).expect("parse");
        let bytes = handle.serialize().expect("serialize");
        let haystack = String::from_utf8_lossy(&bytes);
        assert!(haystack.contains("Blattwerk"));
    }
}
