// ABOUTME: Portal selector strategies: ordered selector candidates per field, loaded from embedded JSON.
// ABOUTME: Resolves a portal id to a strategy whose candidate lists are portal-first, generic-last.

//! Selector strategies.
//!
//! A strategy is data, not code: each portal contributes card container
//! selectors, link selectors and an ordered candidate list per [`Field`].
//! Resolving a portal produces a [`ResolvedStrategy`] whose lists are the
//! portal's own candidates followed by the generic ones, so the generic
//! strategy is the default table entry rather than a scattered fallback.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;
use crate::model::Field;
use crate::selectors::precompile_selectors;

/// Embedded JSON containing the built-in portal strategies.
const BUILTIN_STRATEGIES_JSON: &str = include_str!("../data/strategies.json");

/// Id of the fallback strategy every portal inherits from.
pub const GENERIC_ID: &str = "generic";

/// Specifies how to select content from the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    /// A simple CSS selector string; the element's text is used, e.g. "h2.title"
    Css(String),
    /// A CSS selector with attribute extraction, e.g. ["time", "datetime"]
    CssAttr(Vec<String>),
}

impl Default for SelectorSpec {
    fn default() -> Self {
        SelectorSpec::Css(String::new())
    }
}

impl SelectorSpec {
    /// The CSS part of the spec.
    pub fn css(&self) -> Option<&str> {
        match self {
            SelectorSpec::Css(css) => Some(css),
            SelectorSpec::CssAttr(parts) => parts.first().map(String::as_str),
        }
    }

    /// The attribute to read, if this spec extracts an attribute instead of text.
    pub fn attr(&self) -> Option<&str> {
        match self {
            SelectorSpec::Css(_) => None,
            SelectorSpec::CssAttr(parts) => parts.get(1).map(String::as_str),
        }
    }
}

/// Ordered selector candidates per field.
pub type FieldSelectors = HashMap<Field, Vec<SelectorSpec>>;

/// One portal's selector table as stored in JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalStrategy {
    pub portal: String,
    /// Other ids that route to this strategy.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Card container selectors.
    #[serde(default)]
    pub cards: Vec<String>,
    /// Selectors for the anchor that leads to a listing's detail page.
    #[serde(default)]
    pub links: Vec<String>,
    /// Candidates applied inside a card on a results page.
    #[serde(default)]
    pub fields: FieldSelectors,
    /// Candidates applied to a whole detail page.
    #[serde(default)]
    pub detail: FieldSelectors,
}

/// A job portal with a dedicated strategy, or the generic fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Portal {
    LinkedIn,
    Indeed,
    #[default]
    Generic,
    /// A portal only known through a user-supplied strategy file.
    Custom(String),
}

impl Portal {
    /// Maps a portal id onto a portal. Unrecognized ids never fail; they
    /// become `Custom` and resolve to the generic strategy unless a strategy
    /// with that id is registered.
    pub fn from_id(id: &str) -> Portal {
        let id = id.trim().to_ascii_lowercase();
        match id.as_str() {
            "linkedin" => Portal::LinkedIn,
            "indeed" => Portal::Indeed,
            "" | "*" | "generic" | "other" => Portal::Generic,
            _ => Portal::Custom(id),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Portal::LinkedIn => "linkedin",
            Portal::Indeed => "indeed",
            Portal::Generic => GENERIC_ID,
            Portal::Custom(id) => id,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Portal::Generic)
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The per-portal view the extractor works against: one method per concern,
/// each returning candidates in precedence order.
pub trait SelectorStrategy: Send + Sync {
    fn portal(&self) -> &Portal;
    fn card_selectors(&self) -> &[String];
    fn link_selectors(&self) -> &[String];
    /// Candidates for a field inside a results-page card.
    fn candidates(&self, field: Field) -> &[SelectorSpec];
    /// Candidates for a field on a detail page.
    fn detail_candidates(&self, field: Field) -> &[SelectorSpec];
}

/// A portal strategy merged with the generic one.
#[derive(Debug, Clone, Default)]
pub struct ResolvedStrategy {
    portal: Portal,
    cards: Vec<String>,
    links: Vec<String>,
    fields: FieldSelectors,
    detail: FieldSelectors,
}

impl ResolvedStrategy {
    fn merge(portal: Portal, own: Option<&PortalStrategy>, generic: &PortalStrategy) -> Self {
        let empty = PortalStrategy::default();
        let own = own.unwrap_or(&empty);

        let cards = chain_unique(&own.cards, &generic.cards);
        let links = chain_unique(&own.links, &generic.links);

        let mut fields = FieldSelectors::new();
        let mut detail = FieldSelectors::new();
        for field in Field::ALL {
            let list = chain_unique(
                own.fields.get(&field).map(Vec::as_slice).unwrap_or_default(),
                generic.fields.get(&field).map(Vec::as_slice).unwrap_or_default(),
            );
            // detail pages fall back to the card candidates applied page-wide
            let mut detail_list = chain_unique(
                own.detail.get(&field).map(Vec::as_slice).unwrap_or_default(),
                generic.detail.get(&field).map(Vec::as_slice).unwrap_or_default(),
            );
            for spec in &list {
                if !detail_list.contains(spec) {
                    detail_list.push(spec.clone());
                }
            }
            fields.insert(field, list);
            detail.insert(field, detail_list);
        }

        Self {
            portal,
            cards,
            links,
            fields,
            detail,
        }
    }
}

fn chain_unique<T: Clone + PartialEq>(first: &[T], second: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(first.len() + second.len());
    for item in first.iter().chain(second) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

impl SelectorStrategy for ResolvedStrategy {
    fn portal(&self) -> &Portal {
        &self.portal
    }

    fn card_selectors(&self) -> &[String] {
        &self.cards
    }

    fn link_selectors(&self) -> &[String] {
        &self.links
    }

    fn candidates(&self, field: Field) -> &[SelectorSpec] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or_default()
    }

    fn detail_candidates(&self, field: Field) -> &[SelectorSpec] {
        self.detail.get(&field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Registry of portal strategies keyed by lowercase portal id.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    by_id: HashMap<String, PortalStrategy>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a strategy under its id and aliases, replacing any previous entry.
    pub fn register(&mut self, strategy: PortalStrategy) {
        let id = strategy.portal.trim().to_ascii_lowercase();
        for alias in &strategy.aliases {
            self.by_id
                .insert(alias.trim().to_ascii_lowercase(), strategy.clone());
        }
        self.by_id.insert(id, strategy);
    }

    pub fn get(&self, id: &str) -> Option<&PortalStrategy> {
        self.by_id.get(&id.trim().to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Parses a JSON array of strategies and layers it over the built-in ones.
    pub fn from_json(json: &str) -> Result<Self, ScrapeError> {
        let strategies: Vec<PortalStrategy> = serde_json::from_str(json).map_err(|e| {
            ScrapeError::configuration("", "load strategies", Some(anyhow::Error::new(e)))
        })?;
        let mut registry = load_builtin_registry();
        for strategy in strategies {
            registry.register(strategy);
        }
        registry.precompile();
        Ok(registry)
    }

    /// Resolves a portal to its strategy merged over the generic one.
    /// Portals without an entry get the generic strategy alone.
    pub fn resolve(&self, portal: &Portal) -> ResolvedStrategy {
        let empty = PortalStrategy::default();
        let generic = self.get(GENERIC_ID).unwrap_or(&empty);
        let own = if portal.is_generic() {
            None
        } else {
            self.get(portal.id())
        };
        if own.is_none() && !portal.is_generic() {
            tracing::debug!(portal = %portal, "no dedicated strategy; using generic selectors");
        }
        ResolvedStrategy::merge(portal.clone(), own, generic)
    }

    /// Warms the selector cache with every selector in the registry.
    pub fn precompile(&self) {
        let mut all: Vec<&str> = Vec::new();
        for strategy in self.by_id.values() {
            all.extend(strategy.cards.iter().map(String::as_str));
            all.extend(strategy.links.iter().map(String::as_str));
            for specs in strategy.fields.values().chain(strategy.detail.values()) {
                all.extend(specs.iter().filter_map(SelectorSpec::css));
            }
        }
        precompile_selectors(all);
    }
}

/// Loads the built-in strategy registry from embedded JSON.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed or cannot be deserialized.
pub fn load_builtin_registry() -> StrategyRegistry {
    let strategies: Vec<PortalStrategy> = serde_json::from_str(BUILTIN_STRATEGIES_JSON)
        .expect("failed to parse builtin strategies");

    let mut registry = StrategyRegistry::new();
    for strategy in strategies {
        registry.register(strategy);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn css(s: &str) -> SelectorSpec {
        SelectorSpec::Css(s.to_string())
    }

    #[test]
    fn builtin_registry_has_three_portals() {
        let registry = load_builtin_registry();
        assert!(registry.get("generic").is_some());
        assert!(registry.get("linkedin").is_some());
        assert!(registry.get("indeed").is_some());
        assert!(registry.get("LinkedIn.com").is_some());
    }

    #[test]
    fn portal_ids_route_unknown_to_custom_or_generic() {
        assert_eq!(Portal::from_id("LinkedIn"), Portal::LinkedIn);
        assert_eq!(Portal::from_id("indeed"), Portal::Indeed);
        assert_eq!(Portal::from_id("*"), Portal::Generic);
        assert_eq!(Portal::from_id(""), Portal::Generic);
        assert_eq!(
            Portal::from_id("Glassdoor"),
            Portal::Custom("glassdoor".to_string())
        );
        assert_eq!(Portal::from_id("glassdoor").id(), "glassdoor");
    }

    #[test]
    fn resolved_candidates_are_portal_first_then_generic() {
        let registry = load_builtin_registry();
        let strategy = registry.resolve(&Portal::Indeed);
        let titles = strategy.candidates(Field::Title);
        assert_eq!(titles.first(), Some(&css(".jobTitle")));
        let first_generic = titles
            .iter()
            .position(|s| s == &css("h1, h2, h3, h4"))
            .expect("generic title selector present");
        let last_indeed = titles
            .iter()
            .position(|s| s == &css("a[class*=jobtitle]"))
            .expect("indeed title selector present");
        assert!(last_indeed < first_generic);
    }

    #[test]
    fn unknown_portal_resolves_to_generic_table() {
        let registry = load_builtin_registry();
        let custom = registry.resolve(&Portal::from_id("nowhere"));
        let generic = registry.resolve(&Portal::Generic);
        assert_eq!(custom.candidates(Field::Title), generic.candidates(Field::Title));
        assert_eq!(custom.card_selectors(), generic.card_selectors());
        assert_eq!(custom.portal().id(), "nowhere");
    }

    #[test]
    fn detail_candidates_fall_back_to_card_candidates() {
        let registry = load_builtin_registry();
        let strategy = registry.resolve(&Portal::LinkedIn);
        let detail = strategy.detail_candidates(Field::Description);
        assert_eq!(detail.first(), Some(&css(".show-more-less-html__markup")));
        assert!(detail.contains(&css("p")));
    }

    #[test]
    fn selector_spec_parses_both_shapes() {
        let specs: Vec<SelectorSpec> =
            serde_json::from_str(r#"["h1", ["time", "datetime"]]"#).unwrap();
        assert_eq!(specs[0].css(), Some("h1"));
        assert_eq!(specs[0].attr(), None);
        assert_eq!(specs[1].css(), Some("time"));
        assert_eq!(specs[1].attr(), Some("datetime"));
    }

    #[test]
    fn user_json_overrides_builtin_entries() {
        let json = r#"[
            {"portal": "acme", "cards": ["li.opening"], "fields": {"title": ["span.role"]}},
            {"portal": "indeed", "cards": ["div.result"]}
        ]"#;
        let registry = StrategyRegistry::from_json(json).unwrap();
        let acme = registry.resolve(&Portal::from_id("acme"));
        assert_eq!(acme.card_selectors()[0], "li.opening");
        assert_eq!(acme.candidates(Field::Title)[0], css("span.role"));

        let indeed = registry.resolve(&Portal::Indeed);
        assert_eq!(indeed.card_selectors()[0], "div.result");
        assert!(!indeed.card_selectors().contains(&"td.resultContent".to_string()));
    }

    #[test]
    fn bad_json_is_a_configuration_error() {
        let err = StrategyRegistry::from_json("{not json").unwrap_err();
        assert!(err.is_configuration());
    }
}
