use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::classify::{BillingCycle, PricingModel};
use crate::dom::{HintAttr, NodeId, PageDom};
use crate::formats::PlanRecord;

static PRICE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\$|€|£)\s?[0-9]{1,3}(?:[,.][0-9]{3})*(?:[.,][0-9]{2})?|\bfree\b|contact\s+(?:sales|us)|request\s+a\s+quote",
    )
    .expect("valid price text regex")
});
static PRICE_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$|€|£|free|contact|quote").expect("valid price-like regex"));

const CARD_HEADING_HINTS: &[&str] = &["plan", "tier", "title"];
const PLAN_NAME_HINTS: &[&str] = &["plan", "tier", "name", "title"];
const BILLING_HINTS: &[&str] = &["billing", "cycle", "period", "per"];

/// Bounds on how much of a page the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_price_nodes: usize,
    pub max_ancestor_depth: usize,
    pub max_currency_symbols: usize,
    pub max_cards: usize,
    pub max_plans: usize,
    pub max_features: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_price_nodes: 120,
            max_ancestor_depth: 6,
            max_currency_symbols: 6,
            max_cards: 12,
            max_plans: 8,
            max_features: 20,
        }
    }
}

/// Finds pricing cards on a rendered page and turns each into a [`PlanRecord`].
pub fn extract_plans<D: PageDom>(dom: &D, limits: &ExtractionLimits) -> Vec<PlanRecord> {
    let price_nodes = find_price_nodes(dom, limits);
    let cards = resolve_cards(dom, &price_nodes, limits);
    tracing::debug!(
        price_nodes = price_nodes.len(),
        cards = cards.len(),
        "resolved plan cards"
    );

    let extracted = cards
        .into_iter()
        .map(|card| extract_card(dom, card, limits))
        .filter(|plan| !plan.price.is_empty() || !plan.plan_name.is_empty())
        .take(limits.max_plans)
        .collect::<Vec<_>>();

    dedup_plans(extracted)
}

fn find_price_nodes<D: PageDom>(dom: &D, limits: &ExtractionLimits) -> Vec<NodeId> {
    let mut found = Vec::new();
    let Some(body) = dom.body() else {
        return found;
    };
    if limits.max_price_nodes == 0 {
        return found;
    }

    let mut stack: Vec<NodeId> = dom.element_children(body).collect();
    stack.reverse();
    while let Some(node) = stack.pop() {
        let text = dom.text(node);
        if !text.is_empty() && PRICE_TEXT_RE.is_match(&text) {
            found.push(node);
            if found.len() >= limits.max_price_nodes {
                break;
            }
        }
        let before = stack.len();
        stack.extend(dom.element_children(node));
        stack[before..].reverse();
    }

    found
}

fn resolve_cards<D: PageDom>(
    dom: &D,
    price_nodes: &[NodeId],
    limits: &ExtractionLimits,
) -> Vec<NodeId> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut cards = Vec::new();
    for &node in price_nodes {
        if cards.len() >= limits.max_cards {
            break;
        }
        let card = resolve_card(dom, node, limits);
        if seen.insert(card) {
            cards.push(card);
        }
    }
    cards
}

/// Nearest ancestor-or-self within the depth limit that looks like a card.
fn resolve_card<D: PageDom>(dom: &D, node: NodeId, limits: &ExtractionLimits) -> NodeId {
    let mut current = Some(node);
    let mut depth = 0;
    while let Some(candidate) = current {
        if depth >= limits.max_ancestor_depth {
            break;
        }
        if looks_like_card(dom, candidate, limits) {
            return candidate;
        }
        current = dom.parent(candidate);
        depth += 1;
    }
    node
}

fn looks_like_card<D: PageDom>(dom: &D, candidate: NodeId, limits: &ExtractionLimits) -> bool {
    let currency_symbols = dom
        .raw_text(candidate)
        .chars()
        .filter(|c| matches!(c, '$' | '€' | '£'))
        .count();
    if currency_symbols > limits.max_currency_symbols {
        return false;
    }

    if dom.layout(candidate).is_columnar() {
        return true;
    }

    let descendants = dom.descendants(candidate);
    let list_items = descendants
        .iter()
        .filter(|&&n| dom.tag(n) == "li")
        .take(2)
        .count();
    if list_items >= 2 {
        return true;
    }

    descendants.iter().any(|&n| {
        dom.is_heading(n)
            || CARD_HEADING_HINTS
                .iter()
                .any(|hint| dom.has_hint(n, HintAttr::Class, hint))
    })
}

fn extract_card<D: PageDom>(dom: &D, card: NodeId, limits: &ExtractionLimits) -> PlanRecord {
    let text = dom.text(card);
    let descendants = dom.descendants(card);

    let mut price = descendants
        .iter()
        .find(|&&n| {
            dom.has_hint(n, HintAttr::Class, "price") || dom.has_hint(n, HintAttr::DataTest, "price")
        })
        .map(|&n| dom.text(n))
        .unwrap_or_default();
    if price.is_empty() || !PRICE_LIKE_RE.is_match(&price) {
        if let Some(found) = PRICE_TEXT_RE.find(&text) {
            price = found.as_str().to_owned();
        }
    }

    let mut plan_name = descendants
        .iter()
        .find(|&&n| {
            dom.is_heading(n)
                || PLAN_NAME_HINTS
                    .iter()
                    .any(|hint| dom.has_hint(n, HintAttr::Class, hint))
        })
        .map(|&n| dom.text(n))
        .unwrap_or_default();
    if plan_name.is_empty() {
        if let Some(previous) = dom.previous_element_sibling(card) {
            plan_name = dom
                .descendants(previous)
                .into_iter()
                .find(|&n| dom.is_heading(n))
                .map(|n| dom.text(n))
                .unwrap_or_default();
        }
    }

    let features = descendants
        .iter()
        .filter(|&&n| dom.tag(n) == "li")
        .map(|&n| dom.text(n))
        .filter(|feature| !feature.is_empty())
        .take(limits.max_features)
        .collect::<Vec<_>>();

    let billing_text = BILLING_HINTS
        .iter()
        .find_map(|hint| {
            descendants
                .iter()
                .find(|&&n| dom.has_hint(n, HintAttr::Class, hint))
        })
        .map(|&n| dom.text(n))
        .unwrap_or_default();
    let billing_source = [billing_text.as_str(), price.as_str(), text.as_str()]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_default();
    let billing_cycle = BillingCycle::infer(billing_source);

    let pricing_model = PricingModel::infer(&format!("{text} {price}"));

    PlanRecord {
        plan_name,
        price,
        pricing_model,
        features,
        billing_cycle,
    }
}

fn dedup_plans(plans: Vec<PlanRecord>) -> Vec<PlanRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    plans
        .into_iter()
        .filter(|plan| seen.insert(plan.dedup_key()))
        .collect()
}
