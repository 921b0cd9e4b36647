// ABOUTME: Field extraction: ordered selector candidates, first usable match wins, then per-field normalization.
// ABOUTME: Also resolves a card's listing link and extracts detail-page fields with a JSON-LD fallback.

//! Selector-based field extraction.
//!
//! Key behaviors:
//! - Candidates are tried in order; within a candidate, matches are tried in
//!   document order. The first value that is non-empty and not made solely of
//!   placeholder characters (`*`, whitespace) wins.
//! - Text extraction joins text nodes with spaces and collapses whitespace.
//! - A candidate that cannot be compiled never matches; extraction of the
//!   field simply continues with the next candidate.
//! - Every extracted value goes through the normalizer for its field.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::ld_json::job_posting_fields;
use crate::model::{ExtractionContext, Field, JobFields};
use crate::normalize::{
    clean_text, collapse_whitespace, normalize_experience, normalize_url, parse_salary_range,
};
use crate::selectors::get_or_compile;
use crate::strategy::{SelectorSpec, SelectorStrategy};

/// Path fragments that suggest an anchor leads to a job posting.
const JOB_PATH_HINTS: &[&str] = &[
    "job", "career", "position", "vacanc", "opening", "posting", "offre", "emploi", "stelle",
];

static JOB_PATH_AC: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(JOB_PATH_HINTS)
        .unwrap()
});

static ANCHOR: Lazy<Option<Selector>> = Lazy::new(|| get_or_compile("a[href]"));

/// Text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// True for values such as `"***"` or `" * "` that carry no information.
fn is_placeholder(s: &str) -> bool {
    s.chars().all(|c| c.is_whitespace() || c == '*')
}

fn spec_value(el: ElementRef<'_>, spec: &SelectorSpec) -> String {
    match spec.attr() {
        Some(attr) => el
            .value()
            .attr(attr)
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        None => element_text(el),
    }
}

/// Returns the first usable value produced by `specs`, searching the
/// descendants of `scope`.
pub fn select_first_text(scope: ElementRef<'_>, specs: &[SelectorSpec]) -> Option<String> {
    for spec in specs {
        let Some(selector) = spec.css().and_then(get_or_compile) else {
            continue;
        };
        for el in scope.select(&selector) {
            let value = spec_value(el, spec);
            if !is_placeholder(&value) {
                return Some(value);
            }
        }
    }
    None
}

/// Extracts the raw value of one field from a card or a document root using
/// the strategy's card candidates. Empty when nothing matched.
pub fn extract_field(scope: ElementRef<'_>, field: Field, strategy: &dyn SelectorStrategy) -> String {
    if field == Field::Url {
        let title = extract_field(scope, Field::Title, strategy);
        return resolve_link(scope, &clean_text(&title), strategy).unwrap_or_default();
    }
    select_first_text(scope, strategy.candidates(field)).unwrap_or_default()
}

/// Applies the field's normalizer to a raw extracted value.
pub fn normalize_field(field: Field, raw: &str, base: &str) -> String {
    match field {
        Field::Url => normalize_url(raw, base),
        Field::Salary => parse_salary_range(&clean_text(raw)),
        Field::ExperienceLevel => normalize_experience(raw),
        _ => clean_text(raw),
    }
}

/// Extracts and normalizes every field of a results-page card.
pub fn extract_card(
    card: ElementRef<'_>,
    ctx: &ExtractionContext,
    strategy: &dyn SelectorStrategy,
) -> JobFields {
    let base = ctx.base.as_str();
    let mut fields = JobFields::default();
    for field in Field::ALL {
        if field == Field::Url {
            continue;
        }
        if let Some(raw) = select_first_text(card, strategy.candidates(field)) {
            fields.set(field, normalize_field(field, &raw, base));
        }
    }
    if let Some(href) = resolve_link(card, &fields.title, strategy) {
        fields.url = normalize_url(&href, base);
    }
    fields
}

fn usable_href(href: &str) -> Option<&str> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    let unusable = href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:");
    (!unusable).then_some(href)
}

fn title_overlaps(anchor_text: &str, title: &str) -> bool {
    let anchor = anchor_text.to_lowercase();
    let title = title.to_lowercase();
    if anchor.is_empty() || title.is_empty() {
        return false;
    }
    if anchor.contains(&title) || (anchor.len() >= 3 && title.contains(&anchor)) {
        return true;
    }
    let words: Vec<&str> = title.split_whitespace().filter(|w| w.len() > 2).collect();
    if words.is_empty() {
        return false;
    }
    let hits = words.iter().filter(|w| anchor.contains(**w)).count();
    hits * 2 >= words.len()
}

/// Picks the anchor that most likely leads to the listing's detail page.
///
/// Priority: portal link selectors, then hrefs with job-indicative path
/// fragments, then anchors whose text overlaps the title, then the first
/// anchor. A card that is itself an anchor counts as its own first anchor.
pub fn resolve_link(
    card: ElementRef<'_>,
    title: &str,
    strategy: &dyn SelectorStrategy,
) -> Option<String> {
    for css in strategy.link_selectors() {
        let Some(selector) = get_or_compile(css) else {
            continue;
        };
        let found = card
            .select(&selector)
            .find_map(|el| el.value().attr("href").and_then(usable_href));
        if let Some(href) = found {
            return Some(href.to_string());
        }
    }

    let mut anchors: Vec<(ElementRef<'_>, &str)> = Vec::new();
    if card.value().name() == "a" {
        if let Some(href) = card.value().attr("href").and_then(usable_href) {
            anchors.push((card, href));
        }
    }
    if let Some(selector) = ANCHOR.as_ref() {
        anchors.extend(
            card.select(selector)
                .filter_map(|el| el.value().attr("href").and_then(usable_href).map(|h| (el, h))),
        );
    }

    let by_path = anchors
        .iter()
        .find(|(_, href)| JOB_PATH_AC.is_match(*href))
        .or_else(|| {
            anchors
                .iter()
                .find(|(el, _)| title_overlaps(&element_text(*el), title))
        })
        .or_else(|| anchors.first());
    by_path.map(|(_, href)| href.to_string())
}

/// Link base for a document: its `<base href>` resolved against the page URL,
/// or the page URL itself.
pub fn document_base(doc: &Html, page_url: &Url) -> Url {
    let Some(selector) = get_or_compile("base[href]") else {
        return page_url.clone();
    };
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// Extracts and normalizes detail-page fields. Fields the selectors leave
/// empty are filled from a JSON-LD `JobPosting` when the page has one.
pub fn extract_detail(
    doc: &Html,
    ctx: &ExtractionContext,
    strategy: &dyn SelectorStrategy,
) -> JobFields {
    let base = ctx.base.as_str();
    let root = doc.root_element();
    let mut fields = JobFields::default();
    for field in Field::ALL {
        if field == Field::Url {
            continue;
        }
        if let Some(raw) = select_first_text(root, strategy.detail_candidates(field)) {
            fields.set(field, normalize_field(field, &raw, base));
        }
    }

    if let Some(posting) = job_posting_fields(doc) {
        let mut structured = JobFields::default();
        for field in Field::ALL {
            let raw = posting.get(field);
            if !raw.is_empty() {
                structured.set(field, normalize_field(field, raw, base));
            }
        }
        fields.fill_missing(&structured);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{load_builtin_registry, Portal};
    use pretty_assertions::assert_eq;

    fn ctx(url: &str) -> ExtractionContext {
        ExtractionContext::new(Url::parse(url).unwrap(), Portal::Generic, "test-agent")
    }

    fn first_card<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        let selector = Selector::parse(css).unwrap();
        doc.select(&selector).next().unwrap()
    }

    #[test]
    fn placeholder_values_are_skipped() {
        let doc = Html::parse_fragment(
            r#"<div class="c"><h2> *** </h2><span class="title">Data Analyst</span></div>"#,
        );
        let strategy = load_builtin_registry().resolve(&Portal::Generic);
        let card = first_card(&doc, "div.c");
        assert_eq!(extract_field(card, Field::Title, &strategy), "Data Analyst");
    }

    #[test]
    fn portal_selectors_win_over_generic() {
        let doc = Html::parse_fragment(
            r#"<div class="job_seen_beacon"><h3>Generic heading</h3>
               <h2 class="jobTitle"><a data-jk="1" href="/rc/clk?jk=1">Rust Developer</a></h2>
               <span class="companyName">Ferris Inc</span></div>"#,
        );
        let registry = load_builtin_registry();
        let card = first_card(&doc, "div.job_seen_beacon");
        let indeed = registry.resolve(&Portal::Indeed);
        let generic = registry.resolve(&Portal::Generic);
        assert_eq!(extract_field(card, Field::Title, &indeed), "Rust Developer");
        assert_eq!(extract_field(card, Field::Title, &generic), "Generic heading");
        assert_eq!(extract_field(card, Field::Company, &indeed), "Ferris Inc");
        assert_eq!(extract_field(card, Field::Url, &indeed), "/rc/clk?jk=1");
    }

    #[test]
    fn attribute_candidates_read_attributes() {
        let doc = Html::parse_fragment(r#"<div class="c"><time datetime="2024-03-01">3 days ago</time></div>"#);
        let card = first_card(&doc, "div.c");
        let specs = vec![SelectorSpec::CssAttr(vec!["time".into(), "datetime".into()])];
        assert_eq!(select_first_text(card, &specs).as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn link_prefers_job_paths_then_title_then_first() {
        let strategy = load_builtin_registry().resolve(&Portal::Generic);

        let doc = Html::parse_fragment(
            r##"<div class="c"><a href="#">skip</a><a href="/company/acme">Acme</a>
                <a href="/careers/42">Apply</a></div>"##,
        );
        assert_eq!(
            resolve_link(first_card(&doc, "div.c"), "Welder", &strategy).as_deref(),
            Some("/careers/42")
        );

        let doc = Html::parse_fragment(
            r#"<div class="c"><a href="/company/acme">Acme</a><a href="/p/9">Senior Welder</a></div>"#,
        );
        assert_eq!(
            resolve_link(first_card(&doc, "div.c"), "Senior Welder", &strategy).as_deref(),
            Some("/p/9")
        );

        let doc = Html::parse_fragment(
            r#"<div class="c"><a href="javascript:void(0)">x</a><a href="/a">A</a><a href="/b">B</a></div>"#,
        );
        assert_eq!(
            resolve_link(first_card(&doc, "div.c"), "Welder", &strategy).as_deref(),
            Some("/a")
        );
    }

    #[test]
    fn card_fields_are_normalized() {
        let doc = Html::parse_fragment(
            r#"<div class="job-card">
                 <h2>  Platform   Engineer </h2>
                 <span class="company">Acme&nbsp;Corp</span>
                 <span class="location">Remote, US</span>
                 <span class="salary">$120k - $150k per year</span>
                 <span class="experience">5+ years</span>
                 <p class="description">Run <b>Kubernetes</b>. Show more Show less</p>
                 <a href="/jobs/77">Platform Engineer</a>
               </div>"#,
        );
        let strategy = load_builtin_registry().resolve(&Portal::Generic);
        let fields = extract_card(
            first_card(&doc, "div.job-card"),
            &ctx("https://careers.example.com/search?q=platform"),
            &strategy,
        );
        assert_eq!(fields.title, "Platform Engineer");
        assert_eq!(fields.company, "Acme Corp");
        assert_eq!(fields.location, "Remote, US");
        assert_eq!(fields.salary, "120,000 - 150,000 per year");
        assert_eq!(fields.experience_level, "Mid-Level (3-5 years)");
        assert_eq!(fields.description, "Run Kubernetes .");
        assert_eq!(fields.url, "https://careers.example.com/jobs/77");
    }

    #[test]
    fn base_element_overrides_page_url() {
        let page = Url::parse("https://example.com/search").unwrap();
        let doc = Html::parse_document(
            r#"<html><head><base href="https://cdn.example.org/jobs/"></head><body></body></html>"#,
        );
        assert_eq!(document_base(&doc, &page).as_str(), "https://cdn.example.org/jobs/");
        let plain = Html::parse_document("<html><body></body></html>");
        assert_eq!(document_base(&plain, &page), page);
    }

    #[test]
    fn detail_fields_fall_back_to_json_ld() {
        let doc = Html::parse_document(
            r#"<html><head><script type="application/ld+json">
                {"@type": "JobPosting", "title": "SRE", "datePosted": "2024-01-02",
                 "validThrough": "2024-02-01", "hiringOrganization": {"name": "Acme"}}
               </script></head>
               <body><h1>Site Reliability Engineer</h1>
               <div class="job-description"><p>On-call   rotation.</p></div>
               <ul class="benefits"><li>Dental</li><li>401k</li></ul></body></html>"#,
        );
        let strategy = load_builtin_registry().resolve(&Portal::Generic);
        let fields = extract_detail(&doc, &ctx("https://example.com/jobs/1"), &strategy);
        assert_eq!(fields.title, "Site Reliability Engineer");
        assert_eq!(fields.description, "On-call rotation.");
        assert_eq!(fields.benefits, "Dental 401k");
        assert_eq!(fields.posted_date, "2024-01-02");
        assert_eq!(fields.application_deadline, "2024-02-01");
        assert_eq!(fields.company, "Acme");
    }
}
