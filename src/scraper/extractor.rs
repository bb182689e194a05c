//! Readable-content extraction from raw HTML.
//!
//! Primary path runs a readability pass to isolate the article body, then
//! flattens it to plain text with block boundaries preserved as newlines.
//! When readability finds no main content the whole document is flattened
//! instead. Malformed HTML never errors; it degrades to empty title/text.

use std::io::Cursor;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::Article;

pub fn extract(url: &str, html: &str) -> Article {
    if html.trim().is_empty() {
        return Article::default();
    }

    if let Some(article) = extract_readable(url, html) {
        if !article.text.is_empty() {
            return article;
        }
    }

    extract_whole_document(html)
}

/// Readability pass; `None` when the URL is unparsable or extraction fails.
fn extract_readable(url: &str, html: &str) -> Option<Article> {
    let parsed_url = Url::parse(url).ok()?;
    let mut cursor = Cursor::new(html.as_bytes());
    let product = readability::extractor::extract(&mut cursor, &parsed_url).ok()?;

    let text = html_to_text(&product.content);
    Some(Article {
        title: product.title.trim().to_string(),
        text,
        html: product.content,
    })
}

fn extract_whole_document(html: &str) -> Article {
    let document = Html::parse_document(html);

    let title = title_selector()
        .and_then(|selector| document.select(selector).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    Article {
        title,
        text: html_to_text(html),
        html: html.to_string(),
    }
}

fn title_selector() -> Option<&'static Selector> {
    static TITLE: OnceLock<Option<Selector>> = OnceLock::new();
    TITLE.get_or_init(|| Selector::parse("title").ok()).as_ref()
}

fn noise_regex() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("static regex")
    })
}

/// Flattens HTML to text, one line per text node, script/style stripped.
pub fn html_to_text(html: &str) -> String {
    let cleaned = noise_regex().replace_all(html, " ");
    let fragment = Html::parse_document(&cleaned);

    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
