//! Document loading by file extension.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DocumentError;

/// Free-form document metadata (`source`, `format`, `chunk_index`, ...).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A unit of text with its metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Text content.
    pub text: String,
    /// Metadata carried through chunking and retrieval.
    pub metadata: Metadata,
}

impl Document {
    /// Creates a document with empty metadata.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The `source` metadata entry, if it is a string.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(serde_json::Value::as_str)
    }
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Plain text or Markdown.
    Text,
    /// PDF (requires the `pdf` feature).
    Pdf,
    /// Word document (requires the `docx` feature).
    Word,
}

impl FileFormat {
    /// Detects the format from an extension, case-insensitively.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Word),
            _ => None,
        }
    }

    /// Detects the format of `path`.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| DocumentError::UnsupportedFormat {
            extension: ext.to_string(),
        })
    }

    /// Short lowercase name stored in metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Word => "word",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loads one file into documents.
///
/// Text and Word files yield one document; PDFs yield one document per page
/// when page breaks are present.
///
/// # Errors
///
/// - [`DocumentError::NotFound`] if `path` does not exist
/// - [`DocumentError::UnsupportedFormat`] for unknown extensions, or for PDF
///   and Word files when the matching feature is disabled
/// - [`DocumentError::Load`] if the file cannot be read or decoded
pub fn load_document(path: &Path) -> Result<Vec<Document>, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let format = FileFormat::from_path(path)?;
    debug!(path = %path.display(), %format, "Loading document");

    let texts = match format {
        FileFormat::Text => vec![read_text(path)?],
        FileFormat::Pdf => read_pdf(path)?,
        FileFormat::Word => vec![read_word(path)?],
    };

    let source = path.display().to_string();
    let paged = texts.len() > 1;
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(page, text)| {
            let doc = Document::new(text)
                .with_metadata("source", source.clone())
                .with_metadata("format", format.as_str());
            if paged {
                doc.with_metadata("page", page)
            } else {
                doc
            }
        })
        .collect())
}

/// Loads every path in order, failing on the first error.
pub fn load_documents<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Document>, DocumentError> {
    let mut documents = Vec::new();
    for path in paths {
        documents.extend(load_document(path.as_ref())?);
    }
    info!(files = paths.len(), documents = documents.len(), "Documents loaded");
    Ok(documents)
}

fn load_error(path: &Path, message: impl fmt::Display) -> DocumentError {
    DocumentError::Load {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn read_text(path: &Path) -> Result<String, DocumentError> {
    std::fs::read_to_string(path).map_err(|e| load_error(path, e))
}

#[cfg(feature = "pdf")]
fn read_pdf(path: &Path) -> Result<Vec<String>, DocumentError> {
    let text = pdf_extract::extract_text(path).map_err(|e| load_error(path, e))?;
    // pdf-extract separates pages with form feeds
    let pages: Vec<String> = text
        .split('\u{c}')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if pages.is_empty() {
        Ok(vec![text.trim().to_string()])
    } else {
        Ok(pages)
    }
}

#[cfg(not(feature = "pdf"))]
fn read_pdf(path: &Path) -> Result<Vec<String>, DocumentError> {
    Err(DocumentError::UnsupportedFormat {
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

#[cfg(feature = "docx")]
fn read_word(path: &Path) -> Result<String, DocumentError> {
    use std::io::Read;

    let file = std::fs::File::open(path).map_err(|e| load_error(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| load_error(path, format!("not a .docx archive: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| load_error(path, e))?
        .read_to_string(&mut xml)
        .map_err(|e| load_error(path, e))?;
    word_xml_to_text(&xml).map_err(|e| load_error(path, e))
}

#[cfg(not(feature = "docx"))]
fn read_word(path: &Path) -> Result<String, DocumentError> {
    Err(DocumentError::UnsupportedFormat {
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

/// Extracts paragraph text from a WordprocessingML body.
#[cfg(feature = "docx")]
fn word_xml_to_text(xml: &str) -> Result<String, quick_xml::Error> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape()?),
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("notes.txt", Some(FileFormat::Text))]
    #[test_case("README.MD", Some(FileFormat::Text))]
    #[test_case("paper.pdf", Some(FileFormat::Pdf))]
    #[test_case("report.docx", Some(FileFormat::Word))]
    #[test_case("legacy.doc", Some(FileFormat::Word))]
    #[test_case("data.csv", None)]
    #[test_case("Makefile", None)]
    fn test_format_detection(name: &str, expected: Option<FileFormat>) {
        assert_eq!(FileFormat::from_path(Path::new(name)).ok(), expected);
    }

    #[test]
    fn test_load_text_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello world").unwrap_or_else(|_| unreachable!());

        let docs = load_document(&path).unwrap_or_else(|_| unreachable!());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "hello world");
        assert_eq!(docs[0].source(), Some(path.display().to_string().as_str()));
        assert_eq!(docs[0].metadata["format"], "text");
    }

    #[test]
    fn test_missing_file() {
        let err = load_document(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, DocumentError::NotFound { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "a,b").unwrap_or_else(|_| unreachable!());
        let err = load_document(&path).unwrap_err();
        assert!(
            matches!(err, DocumentError::UnsupportedFormat { ref extension } if extension == "csv")
        );
    }

    #[test]
    fn test_invalid_utf8_is_load_error() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("bin.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap_or_else(|_| unreachable!());
        assert!(matches!(load_document(&path), Err(DocumentError::Load { .. })));
    }

    #[test]
    fn test_load_documents_stops_on_first_error() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let good = dir.path().join("good.md");
        std::fs::write(&good, "# Title").unwrap_or_else(|_| unreachable!());
        let bad = dir.path().join("missing.txt");
        assert!(load_documents(&[good.clone()]).is_ok());
        assert!(load_documents(&[good, bad]).is_err());
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_word_xml_extraction() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:tab/><w:t xml:space="preserve">Tom &amp; Jerry</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = word_xml_to_text(xml).unwrap_or_else(|_| unreachable!());
        assert_eq!(text, "Hello\tTom & Jerry\nSecond");
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_load_docx_archive() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("memo.docx");
        let file = std::fs::File::create(&path).unwrap_or_else(|_| unreachable!());
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap_or_else(|_| unreachable!());
        zip.write_all(br"<w:document><w:body><w:p><w:r><w:t>Quarterly memo</w:t></w:r></w:p></w:body></w:document>")
            .unwrap_or_else(|_| unreachable!());
        zip.finish().unwrap_or_else(|_| unreachable!());

        let docs = load_document(&path).unwrap_or_else(|_| unreachable!());
        assert_eq!(docs[0].text, "Quarterly memo");
        assert_eq!(docs[0].metadata["format"], "word");
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_doc_that_is_not_zip_fails_to_load() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("old.doc");
        std::fs::write(&path, b"\xd0\xcf\x11\xe0 legacy binary").unwrap_or_else(|_| unreachable!());
        assert!(matches!(load_document(&path), Err(DocumentError::Load { .. })));
    }
}
