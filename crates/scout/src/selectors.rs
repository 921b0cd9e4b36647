// ABOUTME: Pre-compiled CSS selector cache shared by card location and field extraction.
// ABOUTME: Invalid selectors are cached as None so they are parsed (and logged) only once.

//! Selector caching for repeated DOM queries.
//!
//! Every card on every page runs the same candidate lists, so selectors are
//! compiled once and reused for the life of the process.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;

/// Thread-safe cache of compiled CSS selectors. Invalid selectors map to `None`.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn compile(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::debug!(selector = css, error = %e, "invalid selector; skipping");
            None
        }
    }
}

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `None` for selectors that fail to parse; callers treat that as a
/// candidate that never matches.
pub fn get_or_compile(css: &str) -> Option<Selector> {
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = compile(css);
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    // another thread may have inserted while we compiled
    if let Some(cached) = cache.get(css) {
        return cached.clone();
    }
    cache.insert(css.to_string(), compiled.clone());
    compiled
}

/// Precompiles a batch of selectors into the cache.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    for css in selectors {
        let css = css.as_ref();
        if !cache.contains_key(css) {
            cache.insert(css.to_string(), compile(css));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_selector_is_cached() {
        assert!(get_or_compile("div.job-card > h2").is_some());
        assert!(get_or_compile("div.job-card > h2").is_some());
    }

    #[test]
    fn invalid_selector_returns_none() {
        assert!(get_or_compile("div[[[").is_none());
        assert!(get_or_compile("div[[[").is_none());
    }

    #[test]
    fn precompile_warms_the_cache() {
        precompile_selectors(["span.warm-one", "li:nth-child(2) .warm-two", ":::"]);
        let cache = SELECTOR_CACHE.read().unwrap();
        assert!(cache.get("span.warm-one").is_some_and(Option::is_some));
        assert!(cache.get(":::").is_some_and(Option::is_none));
    }
}
