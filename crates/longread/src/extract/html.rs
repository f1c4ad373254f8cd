//! HTML to plain text.
//!
//! `html2text` renders the document; `scraper` supplies the page title
//! (which the renderer drops along with the rest of `<head>`) and a bare
//! text fallback when rendering fails.

use scraper::{Html, Selector};

/// Render width. Wide enough that ordinary paragraphs are not hard-wrapped
/// into many short lines.
const RENDER_WIDTH: usize = 200;

/// Convert an HTML document to readable text, title first.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    let body = match html2text::from_read(html.as_bytes(), RENDER_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("html2text failed ({e}); falling back to raw text nodes");
            fallback_text(&document)
        }
    };
    let body = collapse_blank_lines(&body);

    match title {
        Some(title) if !body.trim_start().starts_with(&title) => format!("{title}\n\n{body}"),
        _ => body,
    }
}

fn extract_title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let text = doc
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

fn fallback_text(doc: &Html) -> String {
    let Ok(selector) = Selector::parse("body") else {
        return String::new();
    };
    let root = doc.select(&selector).next().unwrap_or(doc.root_element());
    root.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim every line and keep at most one blank line between blocks.
fn collapse_blank_lines(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 {
                result.push('\n');
            }
        } else {
            blank_run = 0;
            result.push_str(line);
            result.push('\n');
        }
    }
    result.trim().to_string()
}
