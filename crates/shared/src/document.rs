use std::fs;
use std::path::Path;

use scraper::{Html, Selector};
use thiserror::Error;

const DOCUMENT_CONTEXT_HEADER: &str = "참고할 문서 내용:";
const PARSER_REQUIRED_EXTENSIONS: [&str; 7] = ["pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("지원하지 않는 파일 형식입니다: {0}")]
    UnsupportedFormat(String),
    #[error("{0} 문서는 텍스트로 변환한 뒤 첨부해 주세요 (txt, md, csv, html 지원)")]
    ConversionRequired(String),
    #[error("failed to read document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("document {0} contains no text")]
    Empty(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    PlainText,
    Html,
}

/// Text of one attached document, injected into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContext {
    pub name: String,
    pub text: String,
}

impl DocumentContext {
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn load_document(path: &Path) -> Result<DocumentContext, DocumentError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let format = document_format(&extension)?;
    let display_path = path.display().to_string();

    let raw = fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: display_path.clone(),
        source,
    })?;
    let text = match format {
        DocumentFormat::PlainText => raw.trim().to_string(),
        DocumentFormat::Html => html_to_text(&raw),
    };
    if text.is_empty() {
        return Err(DocumentError::Empty(display_path));
    }

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(display_path.as_str())
        .to_string();
    Ok(DocumentContext { name, text })
}

fn document_format(extension: &str) -> Result<DocumentFormat, DocumentError> {
    match extension {
        "txt" | "md" | "csv" => Ok(DocumentFormat::PlainText),
        "html" | "htm" => Ok(DocumentFormat::Html),
        other if PARSER_REQUIRED_EXTENSIONS.contains(&other) => {
            Err(DocumentError::ConversionRequired(other.to_string()))
        }
        other => Err(DocumentError::UnsupportedFormat(other.to_string())),
    }
}

/// Visible text of the body, one line per text node.
fn html_to_text(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let root = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    root.text()
        .map(|chunk| chunk.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Appends the document to the base system prompt.
pub fn system_prompt_with_document(base: &str, document: Option<&DocumentContext>) -> String {
    match document {
        Some(document) => format!("{base}\n\n{DOCUMENT_CONTEXT_HEADER}\n\n{}", document.text),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::{
        DocumentContext, DocumentError, html_to_text, load_document, system_prompt_with_document,
    };

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shared-document-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        let path = dir.join(name);
        fs::write(&path, contents).expect("temp file should be written");
        path
    }

    #[test]
    fn loads_plain_text_documents() {
        let path = temp_file("notes.md", "\n# 회의록\n\n- 출시일: 3월\n");
        let document = load_document(&path).expect("markdown should load");

        assert_eq!(document.name, "notes.md");
        assert_eq!(document.text, "# 회의록\n\n- 출시일: 3월");
    }

    #[test]
    fn html_is_reduced_to_visible_text() {
        let text = html_to_text(
            "<html><head><title>ignored</title></head><body><h1>제목</h1><p>본문   내용</p></body></html>",
        );
        assert_eq!(text, "제목\n본문 내용");
    }

    #[test]
    fn binary_office_formats_require_conversion() {
        let path = temp_file("report.PDF", "%PDF-1.7");
        let err = load_document(&path).expect_err("pdf should be rejected");
        assert!(matches!(err, DocumentError::ConversionRequired(ref ext) if ext == "pdf"));
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        let path = temp_file("archive.zip", "PK");
        let err = load_document(&path).expect_err("zip should be rejected");
        assert_eq!(err.to_string(), "지원하지 않는 파일 형식입니다: zip");
    }

    #[test]
    fn empty_documents_are_rejected() {
        let path = temp_file("empty.txt", "   \n");
        assert!(matches!(
            load_document(&path),
            Err(DocumentError::Empty(_))
        ));
    }

    #[test]
    fn system_prompt_appends_document_context() {
        let document = DocumentContext::from_text("a.txt", "문서 본문");
        assert_eq!(
            system_prompt_with_document("base", Some(&document)),
            "base\n\n참고할 문서 내용:\n\n문서 본문"
        );
        assert_eq!(system_prompt_with_document("base", None), "base");
    }
}
