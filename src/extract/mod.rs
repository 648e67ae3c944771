//! Layout adapter: maps a rendered listing page to extraction records.
//!
//! The source flips between markup generations, so parsing is organized
//! as an ordered list of layout variants (newest first); the first
//! variant whose item container matches anything claims the page. Within
//! a variant every field has its own ordered fallback chain of selector
//! strategies: the first strategy yielding a non-empty value wins, and a
//! field whose whole chain fails is emitted as an empty string rather
//! than failing the record. Only a missing identity drops a record.

pub mod detail;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::models::ExtractionRecord;

/// How to pull one field's value out of an item container.
#[derive(Debug, Clone, Copy)]
enum FieldStrategy {
    /// Text of the first matching descendant.
    Text(&'static str),
    /// Text of the nth matching descendant (0-based).
    NthText(&'static str, usize),
    /// Attribute of the first matching descendant.
    Attr(&'static str, &'static str),
}

/// One markup generation: an item container plus per-field chains.
struct VariantSpec {
    name: &'static str,
    container: &'static str,
    link: &'static [FieldStrategy],
    title: &'static [FieldStrategy],
    rating: &'static [FieldStrategy],
    vote_count: &'static [FieldStrategy],
    duration: &'static [FieldStrategy],
    blurb: &'static [FieldStrategy],
}

/// Layout variants in priority order, newest first.
const VARIANTS: &[VariantSpec] = &[
    VariantSpec {
        name: "summary-list",
        container: "li.ipc-metadata-list-summary-item",
        link: &[
            FieldStrategy::Attr("a.ipc-title-link-wrapper", "href"),
            FieldStrategy::Attr("a[href*=\"/title/tt\"]", "href"),
        ],
        title: &[
            FieldStrategy::Text("h3.ipc-title__text"),
            FieldStrategy::Text("a.ipc-title-link-wrapper"),
        ],
        rating: &[FieldStrategy::Text("span.ipc-rating-star--rating")],
        vote_count: &[FieldStrategy::Text("span.ipc-rating-star--voteCount")],
        duration: &[
            FieldStrategy::NthText("div.dli-title-metadata span", 1),
            FieldStrategy::NthText("span.dli-title-metadata-item", 1),
        ],
        blurb: &[FieldStrategy::Text("div.ipc-html-content-inner-div")],
    },
    VariantSpec {
        name: "lister",
        container: "div.lister-item",
        link: &[FieldStrategy::Attr("h3.lister-item-header a", "href")],
        title: &[FieldStrategy::Text("h3.lister-item-header a")],
        rating: &[
            FieldStrategy::Text("div.ratings-imdb-rating strong"),
            FieldStrategy::Attr("div.ratings-imdb-rating", "data-value"),
        ],
        vote_count: &[
            FieldStrategy::Attr("span[name=\"nv\"]", "data-value"),
            FieldStrategy::Text("span[name=\"nv\"]"),
        ],
        duration: &[FieldStrategy::Text("span.runtime")],
        blurb: &[
            FieldStrategy::NthText("p.text-muted", 1),
            FieldStrategy::Text("p.text-muted + p"),
        ],
    },
];

/// Result of parsing one rendered page.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub records: Vec<ExtractionRecord>,
    /// Records discarded because no identity could be derived.
    pub dropped: usize,
    /// Which layout variant claimed the page, if any.
    pub layout: Option<&'static str>,
}

struct CompiledStrategy {
    selector: Selector,
    strategy: FieldStrategy,
}

struct CompiledVariant {
    name: &'static str,
    container: Selector,
    link: Vec<CompiledStrategy>,
    title: Vec<CompiledStrategy>,
    rating: Vec<CompiledStrategy>,
    vote_count: Vec<CompiledStrategy>,
    duration: Vec<CompiledStrategy>,
    blurb: Vec<CompiledStrategy>,
}

/// Polymorphic parser over the known layout variants.
pub struct LayoutAdapter {
    variants: Vec<CompiledVariant>,
    /// Base used to resolve relative item links.
    base: Option<Url>,
}

impl LayoutAdapter {
    /// Build an adapter resolving relative links against `base_url`.
    pub fn new(base_url: &str) -> Self {
        let base = match Url::parse(base_url) {
            Ok(u) => Some(u),
            Err(e) => {
                warn!("Unparseable base URL {base_url:?}: {e}; item links stay relative");
                None
            }
        };

        let variants = VARIANTS
            .iter()
            .filter_map(|spec| {
                let container = match Selector::parse(spec.container) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Skipping layout {}: bad container selector: {e}", spec.name);
                        return None;
                    }
                };
                Some(CompiledVariant {
                    name: spec.name,
                    container,
                    link: compile(spec.link),
                    title: compile(spec.title),
                    rating: compile(spec.rating),
                    vote_count: compile(spec.vote_count),
                    duration: compile(spec.duration),
                    blurb: compile(spec.blurb),
                })
            })
            .collect();

        Self { variants, base }
    }

    /// Parse a rendered page into records. Recomputed fresh on every
    /// call; nothing is cached between invocations.
    pub fn parse(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);

        for variant in &self.variants {
            let items: Vec<ElementRef<'_>> = document.select(&variant.container).collect();
            if items.is_empty() {
                continue;
            }

            let mut page = ParsedPage {
                layout: Some(variant.name),
                ..Default::default()
            };

            for item in items {
                let href = extract_field(item, &variant.link);
                let link = resolve_link(self.base.as_ref(), &href);
                let Some(mut record) = ExtractionRecord::from_link(&link) else {
                    page.dropped += 1;
                    continue;
                };

                record.title = clean_title(&extract_field(item, &variant.title));
                record.rating = extract_field(item, &variant.rating);
                record.vote_count = clean_votes(&extract_field(item, &variant.vote_count));
                record.duration = extract_field(item, &variant.duration);
                record.blurb = extract_field(item, &variant.blurb);
                page.records.push(record);
            }

            return page;
        }

        ParsedPage::default()
    }
}

fn compile(strategies: &'static [FieldStrategy]) -> Vec<CompiledStrategy> {
    strategies
        .iter()
        .filter_map(|&strategy| {
            let raw = match strategy {
                FieldStrategy::Text(s)
                | FieldStrategy::NthText(s, _)
                | FieldStrategy::Attr(s, _) => s,
            };
            match Selector::parse(raw) {
                Ok(selector) => Some(CompiledStrategy { selector, strategy }),
                Err(e) => {
                    warn!("Skipping field strategy {raw:?}: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Run a field's fallback chain; first non-empty value wins.
fn extract_field(item: ElementRef<'_>, chain: &[CompiledStrategy]) -> String {
    for compiled in chain {
        let value = match compiled.strategy {
            FieldStrategy::Text(_) => item
                .select(&compiled.selector)
                .next()
                .map(text_of)
                .unwrap_or_default(),
            FieldStrategy::NthText(_, n) => item
                .select(&compiled.selector)
                .nth(n)
                .map(text_of)
                .unwrap_or_default(),
            FieldStrategy::Attr(_, attr) => item
                .select(&compiled.selector)
                .next()
                .and_then(|e| e.value().attr(attr))
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
        };
        if !value.is_empty() {
            return value;
        }
    }
    String::new()
}

/// Collect element text with whitespace normalized.
fn text_of(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a possibly relative item link against the base URL.
fn resolve_link(base: Option<&Url>, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

/// Strip the positional "12. " prefix the newer layout prepends to
/// titles.
fn clean_title(title: &str) -> String {
    if let Some((prefix, rest)) = title.split_once(". ") {
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
            return rest.trim().to_string();
        }
    }
    title.trim().to_string()
}

/// Normalize a vote count like "(12,345)" to "12345".
fn clean_votes(votes: &str) -> String {
    votes
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ',' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY_PAGE: &str = r#"
    <html><body><ul>
      <li class="ipc-metadata-list-summary-item">
        <a class="ipc-title-link-wrapper" href="/title/tt0000001/?ref_=sr_t_1">
          <h3 class="ipc-title__text">1. First Film</h3>
        </a>
        <div class="dli-title-metadata"><span>2024</span><span>1h 52m</span></div>
        <span class="ipc-rating-star--rating">7.5</span>
        <span class="ipc-rating-star--voteCount">(12,345)</span>
        <div class="ipc-html-content-inner-div">A daring heist goes wrong.</div>
      </li>
      <li class="ipc-metadata-list-summary-item">
        <a class="ipc-title-link-wrapper" href="https://www.example.com/title/tt0000002/?ref_=sr_t_2">
          <h3 class="ipc-title__text">2. Second Film</h3>
        </a>
        <div class="dli-title-metadata"><span>2024</span><span>2h 5m</span></div>
        <span class="ipc-rating-star--voteCount">(99)</span>
      </li>
      <li class="ipc-metadata-list-summary-item">
        <a class="ipc-title-link-wrapper" href="/search/title/?page=2">
          <h3 class="ipc-title__text">Not a title link</h3>
        </a>
      </li>
    </ul></body></html>
    "#;

    const LISTER_PAGE: &str = r#"
    <html><body>
      <div class="lister-item">
        <h3 class="lister-item-header"><a href="/title/tt0000003/?x=1">Old Film</a></h3>
        <span class="runtime">100 min</span>
        <div class="ratings-imdb-rating"><strong>6.8</strong></div>
        <span name="nv" data-value="5432">5,432</span>
        <p class="text-muted">Certificate | Drama</p>
        <p class="text-muted">An old-fashioned drama.</p>
      </div>
    </body></html>
    "#;

    fn adapter() -> LayoutAdapter {
        LayoutAdapter::new("https://www.example.com/search/title/")
    }

    #[test]
    fn parses_summary_list_layout() {
        let page = adapter().parse(SUMMARY_PAGE);

        assert_eq!(page.layout, Some("summary-list"));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.dropped, 1);

        let first = &page.records[0];
        assert_eq!(first.identity, "tt0000001");
        assert_eq!(first.title, "First Film");
        assert_eq!(first.url, "https://www.example.com/title/tt0000001/");
        assert_eq!(first.rating, "7.5");
        assert_eq!(first.vote_count, "12345");
        assert_eq!(first.duration, "1h 52m");
        assert_eq!(first.blurb, "A daring heist goes wrong.");
    }

    #[test]
    fn field_miss_degrades_to_empty_string() {
        let page = adapter().parse(SUMMARY_PAGE);
        let second = &page.records[1];

        // Rating and blurb are absent from the item; everything else
        // still comes through.
        assert_eq!(second.identity, "tt0000002");
        assert_eq!(second.title, "Second Film");
        assert_eq!(second.rating, "");
        assert_eq!(second.blurb, "");
        assert_eq!(second.vote_count, "99");
        assert_eq!(second.duration, "2h 5m");
    }

    #[test]
    fn parses_lister_layout() {
        let page = adapter().parse(LISTER_PAGE);

        assert_eq!(page.layout, Some("lister"));
        assert_eq!(page.records.len(), 1);

        let record = &page.records[0];
        assert_eq!(record.identity, "tt0000003");
        assert_eq!(record.title, "Old Film");
        assert_eq!(record.rating, "6.8");
        assert_eq!(record.vote_count, "5432");
        assert_eq!(record.duration, "100 min");
        assert_eq!(record.blurb, "An old-fashioned drama.");
    }

    #[test]
    fn newest_variant_wins_when_both_match() {
        let mixed = r#"
        <html><body>
          <div class="lister-item">
            <h3 class="lister-item-header"><a href="/title/tt0000003/">Old Film</a></h3>
          </div>
          <li class="ipc-metadata-list-summary-item">
            <a class="ipc-title-link-wrapper" href="/title/tt0000001/"></a>
          </li>
        </body></html>
        "#;
        let page = adapter().parse(mixed);
        assert_eq!(page.layout, Some("summary-list"));
        assert_eq!(page.records[0].identity, "tt0000001");
    }

    #[test]
    fn relative_hrefs_resolve_against_the_base_url() {
        let page = r#"
        <html><body>
          <li class="ipc-metadata-list-summary-item">
            <a class="ipc-title-link-wrapper" href="../../title/tt0000031/?ref_=x">
              <h3 class="ipc-title__text">31. Dotted Path</h3>
            </a>
          </li>
        </body></html>
        "#;
        let page = adapter().parse(page);

        // Path-relative resolution, not origin concatenation.
        assert_eq!(page.records[0].url, "https://www.example.com/title/tt0000031/");
        assert_eq!(page.records[0].identity, "tt0000031");
    }

    #[test]
    fn unknown_markup_yields_nothing() {
        let page = adapter().parse("<html><body><p>maintenance</p></body></html>");
        assert_eq!(page.layout, None);
        assert!(page.records.is_empty());
        assert_eq!(page.dropped, 0);
    }

    #[test]
    fn parse_is_restartable() {
        let a = adapter();
        let first = a.parse(SUMMARY_PAGE);
        let second = a.parse(SUMMARY_PAGE);
        assert_eq!(first.records, second.records);
    }
}
