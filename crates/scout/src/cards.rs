// ABOUTME: Card locator: finds repeating job-card containers and drops duplicates by content signature.
// ABOUTME: Matches from all container selectors are unioned in document order; wrappers are skipped, first-seen signature wins.

use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html};

use crate::extract::{element_text, select_first_text};
use crate::model::Field;
use crate::normalize::clean_text;
use crate::selectors::get_or_compile;
use crate::strategy::SelectorStrategy;

/// Characters of card text used when a card has neither title nor company.
const TEXT_SIGNATURE_LEN: usize = 100;

/// Identity of a card for intra-page deduplication: normalized
/// `title|company`, or a prefix of the card text when both are missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardSignature(String);

impl CardSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A located card and its signature.
#[derive(Debug, Clone)]
pub struct CardHandle<'a> {
    pub element: ElementRef<'a>,
    pub signature: CardSignature,
}

/// Computes the dedup signature for a card.
pub fn card_signature(card: ElementRef<'_>, strategy: &dyn SelectorStrategy) -> CardSignature {
    let title = field_key(card, Field::Title, strategy);
    let company = field_key(card, Field::Company, strategy);
    if title.is_empty() && company.is_empty() {
        let text: String = element_text(card)
            .to_lowercase()
            .chars()
            .take(TEXT_SIGNATURE_LEN)
            .collect();
        return CardSignature(format!("text:{}", text));
    }
    CardSignature(format!("{}|{}", title, company))
}

fn field_key(card: ElementRef<'_>, field: Field, strategy: &dyn SelectorStrategy) -> String {
    select_first_text(card, strategy.candidates(field))
        .map(|raw| clean_text(&raw).to_lowercase())
        .unwrap_or_default()
}

/// Finds job cards in a document.
///
/// Every container selector is applied and the matches are unioned, so an
/// element matched by several selectors is visited once. A match that holds
/// two or more differently titled matches is a list wrapper and is skipped;
/// a match nested inside another kept match is part of that card. Cards
/// whose signature was already seen are dropped; output keeps first-seen
/// order.
pub fn locate_cards<'a>(doc: &'a Html, strategy: &dyn SelectorStrategy) -> Vec<CardHandle<'a>> {
    let selectors: Vec<_> = strategy
        .card_selectors()
        .iter()
        .filter_map(|css| get_or_compile(css))
        .collect();
    if selectors.is_empty() {
        return Vec::new();
    }

    let matched: Vec<ElementRef<'a>> = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| selectors.iter().any(|s| s.matches(el)))
        .collect();
    let titles: HashMap<_, String> = matched
        .iter()
        .map(|el| (el.id(), field_key(*el, Field::Title, strategy)))
        .collect();

    let is_wrapper = |el: &ElementRef<'a>| {
        let inner: HashSet<&str> = el
            .descendants()
            .skip(1)
            .filter_map(|node| titles.get(&node.id()))
            .map(String::as_str)
            .filter(|title| !title.is_empty())
            .collect();
        inner.len() >= 2
    };
    let kept: Vec<ElementRef<'a>> = matched
        .iter()
        .copied()
        .filter(|el| {
            let wrapper = is_wrapper(el);
            if wrapper {
                tracing::trace!(tag = el.value().name(), "skipping card list wrapper");
            }
            !wrapper
        })
        .collect();
    let kept_ids: HashSet<_> = kept.iter().map(|el| el.id()).collect();

    let mut seen: HashSet<CardSignature> = HashSet::new();
    let mut cards = Vec::new();
    for element in kept {
        if element.ancestors().any(|a| kept_ids.contains(&a.id())) {
            continue;
        }
        let signature = card_signature(element, strategy);
        if seen.insert(signature.clone()) {
            cards.push(CardHandle { element, signature });
        } else {
            tracing::debug!(signature = signature.as_str(), "dropping duplicate card");
        }
    }
    cards
}
