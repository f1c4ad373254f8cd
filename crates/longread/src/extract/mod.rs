//! Turning a source locator into normalized text.
//!
//! A locator is either an `http(s)://` URL or a file path. The format comes
//! from an explicit hint, or else from the URL's content type or the file
//! extension. Plain text, HTML, PDF and Word (.docx) are supported; legacy
//! binary `.doc` files are rejected with [`ExtractionError::UnsupportedFormat`].
//!
//! Every successful extraction goes through [`normalize`], so the engine
//! always sees `\n` line endings and no byte-order mark.

pub mod docx;
pub mod html;
pub mod pdf;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::error::ExtractionError;

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    Path(PathBuf),
}

impl Source {
    /// `http://` and `https://` locators are URLs; anything else is a path.
    pub fn parse(locator: &str) -> Self {
        let lower = locator.trim().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Source::Url(locator.trim().to_string())
        } else {
            Source::Path(PathBuf::from(locator))
        }
    }

    pub fn locator(&self) -> String {
        match self {
            Source::Url(url) => url.clone(),
            Source::Path(path) => path.display().to_string(),
        }
    }

    /// Format implied by the locator alone.
    pub fn detect_format(&self) -> SourceFormat {
        match self {
            Source::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                SourceFormat::from_extension(path).unwrap_or(SourceFormat::Html)
            }
            Source::Path(path) => path
                .to_str()
                .and_then(SourceFormat::from_extension)
                .unwrap_or(SourceFormat::PlainText),
        }
    }
}

/// Document formats the extractor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    PlainText,
    Html,
    Pdf,
    Word,
}

impl SourceFormat {
    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::PlainText => "text",
            SourceFormat::Html => "html",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Word => "docx",
        }
    }

    fn from_extension(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" | "md" | "markdown" => Some(SourceFormat::PlainText),
            "html" | "htm" | "xhtml" => Some(SourceFormat::Html),
            "pdf" => Some(SourceFormat::Pdf),
            "docx" | "doc" => Some(SourceFormat::Word),
            _ => None,
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(SourceFormat::Html),
            "text/plain" | "text/markdown" => Some(SourceFormat::PlainText),
            "application/pdf" => Some(SourceFormat::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Some(SourceFormat::Word),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" | "plain" | "md" | "markdown" => Ok(SourceFormat::PlainText),
            "html" | "htm" => Ok(SourceFormat::Html),
            "pdf" => Ok(SourceFormat::Pdf),
            "docx" | "doc" | "word" => Ok(SourceFormat::Word),
            other => Err(format!(
                "unknown format '{other}' (expected text, html, pdf, or docx)"
            )),
        }
    }
}

/// Extract normalized text from `source`. `hint` overrides format detection.
pub async fn extract_text(
    source: &Source,
    hint: Option<SourceFormat>,
) -> Result<String, ExtractionError> {
    let text = match source {
        Source::Url(url) => fetch_url(url, hint).await?,
        Source::Path(path) => read_file(path, hint).await?,
    };
    let text = normalize(&text);
    debug!("Extracted {} chars from {}", text.chars().count(), source.locator());
    Ok(text)
}

async fn fetch_url(url: &str, hint: Option<SourceFormat>) -> Result<String, ExtractionError> {
    let network = |message: String| ExtractionError::NetworkFailure {
        url: url.to_string(),
        message,
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("longread/", env!("CARGO_PKG_VERSION")))
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| network(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| network(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(network(format!("HTTP {status}")));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(SourceFormat::from_content_type);
    let format = hint
        .or(content_type)
        .unwrap_or_else(|| Source::Url(url.to_string()).detect_format());
    debug!("Fetched {url}: HTTP {status}, treating as {format}");

    match format {
        SourceFormat::Pdf | SourceFormat::Word => {
            let bytes = resp.bytes().await.map_err(|e| network(e.to_string()))?;
            parse_document(url, format, bytes.to_vec()).await
        }
        SourceFormat::Html => {
            let body = resp.text().await.map_err(|e| network(e.to_string()))?;
            Ok(html::html_to_text(&body))
        }
        SourceFormat::PlainText => resp.text().await.map_err(|e| network(e.to_string())),
    }
}

async fn read_file(path: &Path, hint: Option<SourceFormat>) -> Result<String, ExtractionError> {
    let locator = path.display().to_string();
    let format = hint.unwrap_or_else(|| Source::Path(path.to_path_buf()).detect_format());

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractionError::Unreadable {
            locator: locator.clone(),
            message: e.to_string(),
        })?;
    if matches!(format, SourceFormat::Pdf | SourceFormat::Word) {
        return parse_document(&locator, format, bytes).await;
    }

    let text = String::from_utf8(bytes).map_err(|e| ExtractionError::Unreadable {
        locator: locator.clone(),
        message: format!("not valid UTF-8 ({e})"),
    })?;

    Ok(match format {
        SourceFormat::Html => html::html_to_text(&text),
        _ => text,
    })
}

/// Run a binary-format parser off the async runtime. A parser panic on a
/// malformed file is reported as unreadable input.
async fn parse_document(
    locator: &str,
    format: SourceFormat,
    bytes: Vec<u8>,
) -> Result<String, ExtractionError> {
    let owned = locator.to_string();
    tokio::task::spawn_blocking(move || match format {
        SourceFormat::Word => docx::docx_to_text(&owned, &bytes),
        _ => pdf::pdf_to_text(&owned, &bytes),
    })
    .await
    .map_err(|e| ExtractionError::Unreadable {
        locator: locator.to_string(),
        message: format!("{format} parser failed: {e}"),
    })?
}

/// Normalize line endings, drop a byte-order mark and control characters,
/// and collapse runs of blank lines to one.
pub fn normalize(text: &str) -> String {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    EXCESS_BLANK_LINES.replace_all(&text, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_locators() {
        assert_eq!(
            Source::parse("https://example.com/a"),
            Source::Url("https://example.com/a".into())
        );
        assert_eq!(
            Source::parse("HTTP://EXAMPLE.COM"),
            Source::Url("HTTP://EXAMPLE.COM".into())
        );
        assert_eq!(
            Source::parse("notes/http.txt"),
            Source::Path(PathBuf::from("notes/http.txt"))
        );
    }

    #[test]
    fn detect_formats() {
        assert_eq!(Source::parse("a.PDF").detect_format(), SourceFormat::Pdf);
        assert_eq!(Source::parse("a.docx").detect_format(), SourceFormat::Word);
        assert_eq!(Source::parse("a.htm").detect_format(), SourceFormat::Html);
        assert_eq!(Source::parse("a.log").detect_format(), SourceFormat::PlainText);
        assert_eq!(Source::parse("README").detect_format(), SourceFormat::PlainText);
        assert_eq!(
            Source::parse("https://x.org/page").detect_format(),
            SourceFormat::Html
        );
        assert_eq!(
            Source::parse("https://x.org/paper.pdf?dl=1").detect_format(),
            SourceFormat::Pdf
        );
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(
            SourceFormat::from_content_type("text/html; charset=utf-8"),
            Some(SourceFormat::Html)
        );
        assert_eq!(
            SourceFormat::from_content_type("text/plain"),
            Some(SourceFormat::PlainText)
        );
        assert_eq!(SourceFormat::from_content_type("image/png"), None);
    }

    #[test]
    fn format_hint_parses() {
        assert_eq!("Word".parse::<SourceFormat>().unwrap(), SourceFormat::Word);
        assert!("epub".parse::<SourceFormat>().is_err());
    }

    #[test]
    fn normalize_line_endings_and_blank_runs() {
        assert_eq!(normalize("\u{FEFF}a\r\nb\rc"), "a\nb\nc");
        assert_eq!(normalize("a\n\n \n\n\nb"), "a\n\nb");
        assert_eq!(normalize("tab\there\u{0007}"), "tab\there");
    }

    #[tokio::test]
    async fn reads_plain_text_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "line one\r\n\r\n\r\n\r\nline two").unwrap();
        let source = Source::Path(file.path().to_path_buf());
        let text = extract_text(&source, None).await.unwrap();
        assert_eq!(text, "line one\n\nline two");
    }

    #[tokio::test]
    async fn reads_html_file() {
        let mut file = tempfile::Builder::new().suffix(".html").tempfile().unwrap();
        write!(file, "<html><body><p>Hello</p><p>World</p></body></html>").unwrap();
        let source = Source::Path(file.path().to_path_buf());
        let text = extract_text(&source, None).await.unwrap();
        assert!(text.contains("Hello"));
        assert!(!text.contains("<p>"));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_unreadable() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        write!(file, "%PDF-1.4\nthis is not really a pdf").unwrap();
        let err = extract_text(&Source::Path(file.path().to_path_buf()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { .. }), "{err}");
    }

    #[tokio::test]
    async fn format_hint_overrides_extension() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "plain words").unwrap();
        let err = extract_text(
            &Source::Path(file.path().to_path_buf()),
            Some(SourceFormat::Word),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains(".docx"), "{err}");
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let err = extract_text(&Source::parse("/no/such/file.txt"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_is_unreadable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x66, 0x6f, 0xff, 0xfe]).unwrap();
        let err = extract_text(&Source::Path(file.path().to_path_buf()), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
