use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::ExtractionError;

/// A document loaded once per extraction call and shared by every tier.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    bytes: Vec<u8>,
    page_count: Option<usize>,
}

impl Document {
    /// Read a document from disk.
    ///
    /// A missing path maps to `ExtractionError::NotFound` so callers can tell
    /// it apart from an unreadable one.
    pub fn open(path: &Path) -> Result<Self, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExtractionError::NotFound(path.to_path_buf()),
            _ => ExtractionError::Io(e),
        })?;
        Ok(Self::from_bytes(path, bytes))
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        // Structure that lopdf cannot parse stays `None`: the document is not
        // known to be empty, it is malformed, and later tiers may still cope.
        let page_count = lopdf::Document::load_mem(&bytes)
            .ok()
            .map(|doc| doc.get_pages().len());
        Self {
            path: path.into(),
            bytes,
            page_count,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    /// True for a zero-byte file or a well-formed PDF with no pages.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() || self.page_count == Some(0)
    }
}

/// PDF fixtures built with lopdf (the library pdf-extract uses internally).
#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    /// Build a PDF with one Helvetica text line per page.
    pub fn make_test_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for text in pages {
            let content = format!("BT /F1 10 Tf 40 700 Td ({text}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
