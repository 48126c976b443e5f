//! Page-level PDF composition on top of `lopdf`.
//!
//! [`PageAccumulator`] is an in-memory document that pages are appended to one
//! at a time, the way both the assembler (one-page image PDFs → intermediate)
//! and the splitter (intermediate → shards) need it.
//!
//! Appending a page deep-copies the page dictionary and everything reachable
//! from it (content streams, images, fonts, annotations) under fresh object
//! ids. Attributes a page inherits from its page-tree ancestors (`Resources`,
//! `MediaBox`, `CropBox`, `Rotate`) are materialised on the copy, and the
//! link back to the source page tree is cut so copying one page never drags
//! the rest of the document along.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Page attributes that may be inherited from `/Pages` ancestors.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used only when neither the page nor any ancestor has a MediaBox.
const FALLBACK_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Guard against malformed, cyclic page trees.
const MAX_TREE_DEPTH: usize = 64;

/// Errors from building or writing an accumulated document.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("source document has no pages")]
    NoPages,

    #[error("source page index {0} does not exist")]
    MissingPage(usize),
}

/// An output document grown one page at a time.
pub struct PageAccumulator {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    /// Source id → accumulator id for objects already copied.
    ///
    /// Only meaningful while all pages come from the same source document;
    /// see [`PageAccumulator::forget_source`].
    id_map: HashMap<ObjectId, ObjectId>,
}

impl Default for PageAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAccumulator {
    /// An empty document with a catalog and an empty page tree.
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0_i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            id_map: HashMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kids.is_empty()
    }

    /// Drop the record of copied objects before importing from a new source.
    ///
    /// Object ids are only unique within one document, so the copy cache must
    /// not leak between sources.
    pub fn forget_source(&mut self) {
        self.id_map.clear();
    }

    /// Append `page_id` of `source` as the last page.
    ///
    /// Objects shared with pages imported earlier from the same `source` are
    /// copied only once. On error the accumulator is left exactly as it was.
    pub fn import_page(
        &mut self,
        source: &Document,
        page_id: ObjectId,
    ) -> Result<ObjectId, ComposeError> {
        let checkpoint = self.doc.max_id;
        let result = self.copy_page(source, page_id);
        if result.is_err() {
            self.doc.objects.retain(|id, _| id.0 <= checkpoint);
            self.id_map.retain(|_, new_id| new_id.0 <= checkpoint);
            self.doc.max_id = checkpoint;
        }
        result
    }

    /// Append the first page of a stand-alone document (e.g. a one-page image PDF).
    pub fn import_first_page(&mut self, source: &Document) -> Result<ObjectId, ComposeError> {
        let page_id = source
            .get_pages()
            .values()
            .next()
            .copied()
            .ok_or(ComposeError::NoPages)?;
        self.forget_source();
        let result = self.import_page(source, page_id);
        self.forget_source();
        result
    }

    /// Serialise the document into `out`.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> Result<(), ComposeError> {
        self.doc.save_to(out)?;
        Ok(())
    }

    /// Serialise the document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, ComposeError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Write the document to `path` and return its size as reported by the filesystem.
    ///
    /// An existing file at `path` is only replaced once the new one is complete.
    pub fn save_to_file(&mut self, path: &Path) -> Result<u64, ComposeError> {
        replace_file(path, |file| self.write_to(file))
    }

    fn copy_page(&mut self, source: &Document, page_id: ObjectId) -> Result<ObjectId, ComposeError> {
        let mut page = source.get_dictionary(page_id)?.clone();

        // Fill in inherited attributes before cutting the parent link.
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source, &page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        if !page.has(b"MediaBox") {
            let media_box: Vec<Object> = FALLBACK_MEDIA_BOX.iter().map(|&v| Object::Integer(v)).collect();
            page.set("MediaBox", media_box);
        }
        page.remove(b"Parent");

        // Reserve the id up front so back-references (e.g. an annotation's /P)
        // resolve to the copy instead of re-copying the page.
        let new_page_id = self.doc.new_object_id();
        self.id_map.insert(page_id, new_page_id);

        for (_, value) in page.iter_mut() {
            self.remap(source, value);
        }
        page.set("Parent", self.pages_id);
        self.doc.objects.insert(new_page_id, Object::Dictionary(page));

        self.kids.push(new_page_id);
        self.sync_page_tree();
        Ok(new_page_id)
    }

    /// Copy `id` (and everything it references) into the accumulator.
    ///
    /// Returns `None` for references that must not be followed: dangling ids
    /// and page-tree nodes other than pages already imported.
    fn copy_object(&mut self, source: &Document, id: ObjectId) -> Option<ObjectId> {
        if let Some(&mapped) = self.id_map.get(&id) {
            return Some(mapped);
        }
        let original = source.objects.get(&id)?;
        if is_page_tree_node(original) {
            return None;
        }

        // Map before recursing so reference cycles terminate.
        let new_id = self.doc.new_object_id();
        self.id_map.insert(id, new_id);

        let mut copy = original.clone();
        self.remap(source, &mut copy);
        self.doc.objects.insert(new_id, copy);
        Some(new_id)
    }

    fn remap(&mut self, source: &Document, obj: &mut Object) {
        match obj {
            Object::Reference(id) => {
                let target = *id;
                *obj = match self.copy_object(source, target) {
                    Some(new_id) => Object::Reference(new_id),
                    None => Object::Null,
                };
            }
            Object::Array(items) => {
                for item in items.iter_mut() {
                    self.remap(source, item);
                }
            }
            Object::Dictionary(dict) => {
                for (_, value) in dict.iter_mut() {
                    self.remap(source, value);
                }
            }
            Object::Stream(stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    self.remap(source, value);
                }
            }
            _ => {}
        }
    }

    fn sync_page_tree(&mut self) {
        if let Some(Object::Dictionary(pages)) = self.doc.objects.get_mut(&self.pages_id) {
            let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
            pages.set("Kids", kids);
            pages.set("Count", self.kids.len() as i64);
        }
    }
}

/// Write a file through `write` and move it over `path` once `write` succeeds.
///
/// The bytes go to a temporary file in the same directory, so a failure at
/// any point leaves whatever was at `path` untouched. Returns the size of the
/// new file on disk.
pub fn replace_file<E: From<io::Error>>(
    path: &Path,
    write: impl FnOnce(&mut File) -> Result<(), E>,
) -> Result<u64, E> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    // Temporary files are created owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(fs::metadata(path)?.len())
}

/// Look `key` up on the ancestors of `page`.
fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        let node = source.get_dictionary(id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return None;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn is_page_tree_node(obj: &Object) -> bool {
    obj.as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        .is_some_and(|name| name == b"Page" || name == b"Pages")
}

/// Source page ids in page order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;

    /// A document whose page tree has `count` pages under one intermediate
    /// `/Pages` node that carries the MediaBox and shared Resources.
    fn nested_source(count: usize) -> Document {
        let mut doc = Document::with_version("1.7");
        let root_pages = doc.new_object_id();
        let inner_pages = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for i in 0..count {
            let text = format!("BT /F1 12 Tf 72 700 Td (page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => inner_pages,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            inner_pages,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Parent" => root_pages,
                "Kids" => kids,
                "Count" => count as i64,
                "Resources" => resources_id,
            }),
        );
        doc.objects.insert(
            root_pages,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(inner_pages)],
                "Count" => count as i64,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(300),
                    Object::Integer(400),
                ],
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => root_pages });
        doc.trailer.set("Root", catalog);
        doc
    }

    fn reload(acc: &mut PageAccumulator) -> Document {
        Document::load_mem(&acc.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn empty_accumulator_has_no_pages() {
        let mut acc = PageAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(reload(&mut acc).get_pages().len(), 0);
    }

    #[test]
    fn imported_pages_keep_order_and_inherited_attributes() {
        let source = nested_source(3);
        let ids = page_ids(&source);
        let mut acc = PageAccumulator::new();
        for &id in ids.iter().rev() {
            acc.import_page(&source, id).unwrap();
        }
        assert_eq!(acc.page_count(), 3);

        let out = reload(&mut acc);
        let pages: Vec<ObjectId> = out.get_pages().values().copied().collect();
        assert_eq!(pages.len(), 3);

        for (pos, page_id) in pages.iter().enumerate() {
            let page = out.get_dictionary(*page_id).unwrap();
            assert!(page.has(b"MediaBox"), "MediaBox must be materialised");
            assert!(page.has(b"Resources"), "Resources must be materialised");

            // Pages were imported in reverse, so the first output page is source page 3.
            let content_id = page.get(b"Contents").unwrap().as_reference().unwrap();
            let content = out.get_object(content_id).unwrap().as_stream().unwrap();
            let expected = format!("(page {})", 3 - pos);
            assert!(
                String::from_utf8_lossy(&content.content).contains(&expected),
                "page {pos} should carry {expected}"
            );
        }
    }

    #[test]
    fn shared_resources_are_copied_once() {
        let source = nested_source(4);
        let mut acc = PageAccumulator::new();
        for id in page_ids(&source) {
            acc.import_page(&source, id).unwrap();
        }
        let out = reload(&mut acc);
        let fonts = out
            .objects
            .values()
            .filter(|o| is_type(o, b"Font"))
            .count();
        assert_eq!(fonts, 1);
    }

    #[test]
    fn copying_a_page_does_not_pull_in_its_siblings() {
        let source = nested_source(5);
        let ids = page_ids(&source);
        let mut acc = PageAccumulator::new();
        acc.import_page(&source, ids[2]).unwrap();
        let out = reload(&mut acc);
        let page_objects = out
            .objects
            .values()
            .filter(|o| is_type(o, b"Page"))
            .count();
        assert_eq!(page_objects, 1);
    }

    #[test]
    fn failed_import_leaves_accumulator_untouched() {
        let source = nested_source(1);
        let mut acc = PageAccumulator::new();
        acc.import_page(&source, page_ids(&source)[0]).unwrap();
        let objects_before = acc.doc.objects.len();
        let max_before = acc.doc.max_id;

        // An id that is not a page dictionary.
        let err = acc.import_page(&source, (9999, 0));
        assert!(err.is_err());
        assert_eq!(acc.page_count(), 1);
        assert_eq!(acc.doc.objects.len(), objects_before);
        assert_eq!(acc.doc.max_id, max_before);
    }

    #[test]
    fn import_first_page_of_empty_document_fails() {
        let mut acc = PageAccumulator::new();
        let mut empty = PageAccumulator::new();
        let doc = reload(&mut empty);
        assert!(matches!(
            acc.import_first_page(&doc),
            Err(ComposeError::NoPages)
        ));
    }

    #[test]
    fn save_to_file_reports_on_disk_size() {
        let source = nested_source(2);
        let mut acc = PageAccumulator::new();
        acc.import_page(&source, page_ids(&source)[0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        let size = acc.save_to_file(&path).unwrap();
        assert_eq!(size, fs::metadata(&path).unwrap().len());
        assert!(size > 0);
    }

    #[test]
    fn failed_replace_keeps_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.pdf");
        fs::write(&path, b"complete shard").unwrap();

        let err = replace_file(&path, |file| {
            file.write_all(b"half")?;
            Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"))
        })
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
        assert_eq!(fs::read(&path).unwrap(), b"complete shard");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "temporary file left behind");
    }

    #[test]
    fn replace_file_overwrites_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.pdf");
        fs::write(&path, b"old").unwrap();
        let size = replace_file(&path, |file| file.write_all(b"new contents")).unwrap();
        assert_eq!(size, 12);
        assert_eq!(fs::read(&path).unwrap(), b"new contents");
    }

    fn is_type(obj: &Object, ty: &[u8]) -> bool {
        obj.as_dict()
            .ok()
            .and_then(|d| d.get(b"Type").ok())
            .and_then(|t| t.as_name().ok())
            .is_some_and(|name| name == ty)
    }
}
