// ABOUTME: Pure text normalizers for extracted job fields: cleaning, URL absolutization, salary and experience parsing.
// ABOUTME: None of these functions fail; unparseable input is returned cleaned or unchanged.

//! Field normalization.
//!
//! Key behaviors:
//! - `clean_text` strips tags and boilerplate toggles and collapses whitespace.
//! - `normalize_url` resolves relative links against a base and degrades to
//!   string concatenation when the base is malformed.
//! - `parse_salary_range` canonicalizes numeric ranges and returns the input
//!   unchanged when no number is found.
//! - `categorize_experience` maps a year count onto five fixed bands.

use aho_corasick::{AhoCorasick, MatchKind};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{00A0}]+").unwrap());

static PLUS_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\+plus$").unwrap());

/// UI toggles that leak into scraped text.
const BOILERPLATE: &[&str] = &[
    "Show more Show less",
    "Show more",
    "Show less",
    "See more",
    "See less",
];

static BOILERPLATE_AC: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(BOILERPLATE)
        .unwrap()
});

/// UTF-8 text decoded as Latin-1, and what it should have been.
const MOJIBAKE: &[(&str, &str)] = &[
    ("â€™", "'"),
    ("â€œ", "\""),
    ("â€", "\""),
    ("Ã©", "é"),
    ("Ã¨", "è"),
    ("Ã´", "ô"),
    ("Ã®", "î"),
    ("Ã¢", "â"),
    ("Ã§", "ç"),
    ("Ã", "à"),
];

static MOJIBAKE_AC: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(MOJIBAKE.iter().map(|(from, _)| *from))
        .unwrap()
});

/// Repairs common UTF-8-read-as-Latin-1 sequences.
pub fn fix_encoding(s: &str) -> String {
    let replacements: Vec<&str> = MOJIBAKE.iter().map(|(_, to)| *to).collect();
    MOJIBAKE_AC.replace_all(s, &replacements)
}

/// Collapses runs of whitespace (including non-breaking spaces) into one space and trims.
pub fn collapse_whitespace(s: &str) -> String {
    SPACE_RE.replace_all(s, " ").trim().to_string()
}

/// Cleans a scraped text value.
///
/// Strips HTML tags, repairs mojibake, removes "Show more"/"Show less" toggles
/// and a trailing `+plus` marker, collapses whitespace and trims.
pub fn clean_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let without_tags = TAG_RE.replace_all(s, "");
    let repaired = fix_encoding(&without_tags);
    let spaces = vec![" "; BOILERPLATE.len()];
    let without_boilerplate = BOILERPLATE_AC.replace_all(&repaired, &spaces);
    let collapsed = collapse_whitespace(&without_boilerplate);
    PLUS_SUFFIX_RE.replace(&collapsed, "").trim().to_string()
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn origin_of(base: &Url) -> String {
    match (base.host_str(), base.port()) {
        (Some(host), Some(port)) => format!("{}://{}:{}", base.scheme(), host, port),
        (Some(host), None) => format!("{}://{}", base.scheme(), host),
        _ => base.scheme().to_string() + ":",
    }
}

/// Resolves `url` against `base`.
///
/// - absolute `http(s)://` URLs pass through;
/// - protocol-relative `//host/path` gains the base scheme;
/// - root-relative `/path` is resolved against the base origin;
/// - anything else is appended to the base path with a `/` separator.
///
/// A malformed base never fails; the result is then plain concatenation.
pub fn normalize_url(url: &str, base: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    if has_http_scheme(url) {
        return url.to_string();
    }

    match Url::parse(base.trim()) {
        Ok(base_url) if base_url.has_host() => {
            if url.starts_with("//") {
                format!("{}:{}", base_url.scheme(), url)
            } else if url.starts_with('/') {
                format!("{}{}", origin_of(&base_url), url)
            } else {
                let prefix = format!("{}{}", origin_of(&base_url), base_url.path());
                join_with_separator(&prefix, url)
            }
        }
        _ => {
            let base = base.trim();
            if url.starts_with("//") {
                format!("https:{}", url)
            } else if base.is_empty() {
                url.to_string()
            } else if url.starts_with('/') {
                format!("{}{}", base.trim_end_matches('/'), url)
            } else {
                join_with_separator(base, url)
            }
        }
    }
}

fn join_with_separator(prefix: &str, tail: &str) -> String {
    if prefix.ends_with('/') {
        format!("{}{}", prefix, tail)
    } else {
        format!("{}/{}", prefix, tail)
    }
}

static SALARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        [$€£¥₹]?\s*
        (?P<min>\d{1,3}(?:[,.]\d{3})+|\d+(?:\.\d+)?)\s*(?P<k1>k\b)?
        (?:
            \s*(?:-|–|—|to)\s*
            [$€£¥₹]?\s*
            (?P<max>\d{1,3}(?:[,.]\d{3})+|\d+(?:\.\d+)?)\s*(?P<k2>k\b)?
        )?
        (?:
            \s*(?:per|/|an|a)?\s*
            (?P<unit>annually|annum|year|yr|month|mo|hourly|hour|hr)\b
        )?",
    )
    .unwrap()
});

static GROUPED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(?:[,.]\d{3})+$").unwrap());

fn parse_amount(raw: &str, thousands: bool) -> Option<f64> {
    let digits = if GROUPED_RE.is_match(raw) {
        raw.replace([',', '.'], "")
    } else {
        raw.to_string()
    };
    let value: f64 = digits.parse().ok()?;
    Some(if thousands { value * 1000.0 } else { value })
}

fn group_thousands(whole: u64) -> String {
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        group_thousands(value as u64)
    } else {
        let whole = value.trunc() as u64;
        let cents = ((value.fract() * 100.0).round() as u64).min(99);
        format!("{}.{:02}", group_thousands(whole), cents)
    }
}

fn period_of(unit: &str) -> &'static str {
    match unit.to_ascii_lowercase().as_str() {
        "month" | "mo" => "month",
        "hour" | "hourly" | "hr" => "hour",
        _ => "year",
    }
}

/// Canonicalizes a free-text salary.
///
/// Two numbers become `"<min> - <max> per <period>"`, one number becomes
/// `"<min>+ per <period>"`. Currency symbols are dropped, `k` suffixes expand
/// to thousands. Text without a number is returned unchanged.
///
/// The period is taken from the text when it names one, so
/// `"£3,500 per month"` stays `"3,500+ per month"` rather than being
/// reported per year; without a period word it is `per year`.
pub fn parse_salary_range(text: &str) -> String {
    let Some(caps) = SALARY_RE.captures(text) else {
        return text.to_string();
    };
    let Some(min) = caps
        .name("min")
        .and_then(|m| parse_amount(m.as_str(), caps.name("k1").is_some()))
    else {
        return text.to_string();
    };
    let period = caps
        .name("unit")
        .map(|m| period_of(m.as_str()))
        .unwrap_or("year");

    // "80-100k" puts the suffix on the upper bound only
    let max_thousands = caps.name("k2").is_some();
    let min = if caps.name("k1").is_none() && max_thousands && min < 1000.0 {
        min * 1000.0
    } else {
        min
    };

    match caps
        .name("max")
        .and_then(|m| parse_amount(m.as_str(), max_thousands))
    {
        Some(max) => format!(
            "{} - {} per {}",
            format_amount(min),
            format_amount(max),
            period
        ),
        None => format!("{}+ per {}", format_amount(min), period),
    }
}

/// Maps a year count onto an experience band. Upper bounds are inclusive.
pub fn categorize_experience(years: f64) -> &'static str {
    if years.is_nan() || years <= 1.0 {
        "Entry Level (0-1 years)"
    } else if years <= 3.0 {
        "Junior (1-3 years)"
    } else if years <= 5.0 {
        "Mid-Level (3-5 years)"
    } else if years <= 8.0 {
        "Senior (5-8 years)"
    } else {
        "Expert (8+ years)"
    }
}

static YEARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+(?:\.\d+)?)\s*(?:\+|(?:-|–|to)\s*\d+(?:\.\d+)?)?\s*(?:years?|yrs?|ans?|années?)\b",
    )
    .unwrap()
});

/// Pulls the (lower-bound) year count out of text like "3+ years" or "2-4 years of experience".
pub fn extract_years(text: &str) -> Option<f64> {
    YEARS_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Bands an experience string when it states a year count, otherwise just cleans it.
pub fn normalize_experience(text: &str) -> String {
    let cleaned = clean_text(text);
    match extract_years(&cleaned) {
        Some(years) => categorize_experience(years).to_string(),
        None => cleaned,
    }
}
