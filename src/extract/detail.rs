//! Storyline extraction from a single title page.
//!
//! Title pages carry the fullest plot blurb, but where it lives has
//! drifted over the years. Extraction is a fixed fallback chain:
//! JSON-LD description, then the OpenGraph description, then the plot
//! test-id nodes, then the text following a "Storyline" heading. A
//! minimum-length guard rejects truncated junk at every step.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Extract the best available storyline, or `None` if every strategy
/// comes up short.
pub fn storyline_from_html(html: &str, min_len: usize) -> Option<String> {
    let document = Html::parse_document(html);

    if let Some(text) = from_json_ld(&document, min_len) {
        return Some(text);
    }
    if let Some(text) = from_og_description(&document, min_len) {
        return Some(text);
    }
    if let Some(text) = from_plot_nodes(&document, min_len) {
        return Some(text);
    }
    from_storyline_heading(&document, min_len)
}

fn from_json_ld(document: &Html, min_len: usize) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };

        let candidates: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for obj in candidates {
            if let Some(text) = obj
                .get("description")
                .and_then(Value::as_str)
                .map(normalize)
            {
                if text.len() >= min_len {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn from_og_description(document: &Html, min_len: usize) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:description"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(normalize)
        .find(|text| text.len() >= min_len)
}

fn from_plot_nodes(document: &Html, min_len: usize) -> Option<String> {
    let selector =
        Selector::parse(r#"[data-testid="plot-xl"], [data-testid="plot-l"], [data-testid="plot"]"#)
            .ok()?;
    document
        .select(&selector)
        .map(|node| normalize(&node.text().collect::<String>()))
        .find(|text| text.len() >= min_len)
}

fn from_storyline_heading(document: &Html, min_len: usize) -> Option<String> {
    let selector = Selector::parse("h2, h3").ok()?;

    for heading in document.select(&selector) {
        let label: String = heading.text().collect();
        if !label.to_lowercase().contains("storyline") {
            continue;
        }

        // Text lives in the element right after the heading.
        if let Some(next) = heading.next_siblings().filter_map(ElementRef::wrap).next() {
            let text = normalize(&next.text().collect::<String>());
            if text.len() >= min_len {
                return Some(text);
            }
        }
    }
    None
}

fn normalize(raw: &str) -> String {
    raw.replace('\u{200b}', "")
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
