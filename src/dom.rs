//! Read-only view of a rendered page.
//!
//! The extraction engine only needs a handful of queries per element: its
//! tag, class and `data-test` hints, the computed `display` value, its parent
//! and its ordered children. [`PageDom`] names those capabilities and
//! [`PageSnapshot`] implements them over an arena captured either from a live
//! browser tab ([`SNAPSHOT_SCRIPT`]) or from static markup.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static INLINE_DISPLAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|;)\s*display\s*:\s*([a-z-]+(?:\s+[a-z-]+)?)")
        .expect("valid inline display regex")
});

/// Runs inside the page in one synchronous pass and returns a JSON
/// [`PageSnapshot`]. It only reads the document.
pub const SNAPSHOT_SCRIPT: &str = r#"(() => {
  const nodes = [];
  const body = document.body;
  if (!body) return { body: null, nodes };
  const ids = new Map();
  const record = (el, parent) => {
    const id = nodes.length;
    let display = '';
    try { display = getComputedStyle(el).display || ''; } catch (_) {}
    nodes.push({
      tag: el.tagName.toLowerCase(),
      class: el.getAttribute('class') || '',
      data_test: el.getAttribute('data-test') || '',
      display,
      parent,
      children: [],
    });
    ids.set(el, id);
    if (parent !== null) nodes[parent].children.push({ el: id });
    return id;
  };
  const parentOf = (el) => (el.parentElement ? ids.get(el.parentElement) : undefined);
  if (body.parentElement) record(body.parentElement, null);
  const bodyId = record(body, body.parentElement ? 0 : null);
  const walker = document.createTreeWalker(body, NodeFilter.SHOW_ELEMENT | NodeFilter.SHOW_TEXT);
  while (walker.nextNode()) {
    const node = walker.currentNode;
    if (node.nodeType === Node.TEXT_NODE) {
      const pid = node.parentNode ? ids.get(node.parentNode) : undefined;
      if (pid !== undefined && node.data) nodes[pid].children.push({ text: node.data });
      continue;
    }
    const pid = parentOf(node);
    if (pid === undefined) continue;
    record(node, pid);
  }
  return { body: bodyId, nodes };
})()"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Layout mode reported for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Flex,
    Grid,
    Other,
}

impl Layout {
    pub fn from_display(display: &str) -> Self {
        let display = display.to_ascii_lowercase();
        if display.contains("grid") {
            Self::Grid
        } else if display.contains("flex") {
            Self::Flex
        } else {
            Self::Other
        }
    }

    pub fn is_columnar(self) -> bool {
        matches!(self, Self::Flex | Self::Grid)
    }
}

/// Attribute a hint can be looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintAttr {
    Class,
    DataTest,
}

pub trait PageDom {
    fn body(&self) -> Option<NodeId>;
    fn tag(&self, node: NodeId) -> &str;
    fn attr(&self, node: NodeId, attr: HintAttr) -> &str;
    fn layout(&self, node: NodeId) -> Layout;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> &[Child];

    fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node).iter().filter_map(Child::element)
    }

    /// Raw concatenated text of every descendant text node, like `textContent`.
    fn raw_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut stack: Vec<&[Child]> = vec![self.children(node)];
        while let Some(children) = stack.pop() {
            let Some((first, rest)) = children.split_first() else {
                continue;
            };
            stack.push(rest);
            match first {
                Child::Text { text } => out.push_str(text),
                Child::Element { el } => stack.push(self.children(*el)),
            }
        }
        out
    }

    /// Text content with whitespace runs collapsed to one space and trimmed.
    fn text(&self, node: NodeId) -> String {
        collapse_whitespace(&self.raw_text(node))
    }

    /// Strict descendants in document order.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element_children(node).collect();
        stack.reverse();
        while let Some(current) = stack.pop() {
            out.push(current);
            let before = stack.len();
            stack.extend(self.element_children(current));
            stack[before..].reverse();
        }
        out
    }

    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let mut previous = None;
        for sibling in self.element_children(parent) {
            if sibling == node {
                return previous;
            }
            previous = Some(sibling);
        }
        None
    }

    fn is_heading(&self, node: NodeId) -> bool {
        matches!(self.tag(node), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
    }

    /// Case-insensitive substring test on an attribute, like `[class*="x" i]`.
    fn has_hint(&self, node: NodeId, attr: HintAttr, needle: &str) -> bool {
        let value = self.attr(node, attr);
        !value.is_empty() && value.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    Text { text: String },
    Element { el: NodeId },
}

impl Child {
    fn element(&self) -> Option<NodeId> {
        match self {
            Self::Element { el } => Some(*el),
            Self::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotElement {
    pub tag: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub data_test: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<Child>,
}

/// Arena of elements captured from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub body: Option<NodeId>,
    pub nodes: Vec<SnapshotElement>,
}

impl PageSnapshot {
    /// Builds a snapshot from static markup. Without a layout engine the
    /// display mode comes from an inline `style="display: ..."` declaration.
    pub fn from_html(html: &str) -> Self {
        let document = scraper::Html::parse_document(html);
        let mut snapshot = Self::default();

        let root = document.root_element();
        let root_id = snapshot.push_element(root.value(), None);

        let mut pending = vec![(root, root_id)];
        while let Some((element, id)) = pending.pop() {
            for child in element.children() {
                match child.value() {
                    scraper::Node::Text(text) => snapshot.nodes[id.0].children.push(Child::Text {
                        text: text.to_string(),
                    }),
                    scraper::Node::Element(data) => {
                        let child_id = snapshot.push_element(data, Some(id));
                        snapshot.nodes[id.0]
                            .children
                            .push(Child::Element { el: child_id });
                        if data.name() == "body" && snapshot.body.is_none() {
                            snapshot.body = Some(child_id);
                        }
                        if let Some(child_ref) = scraper::ElementRef::wrap(child) {
                            pending.push((child_ref, child_id));
                        }
                    }
                    _ => {}
                }
            }
        }

        snapshot
    }

    pub fn from_json(value: serde_json::Value) -> anyhow::Result<Self> {
        let snapshot: Self = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push_element(&mut self, data: &scraper::node::Element, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let display = data
            .attr("style")
            .and_then(|style| INLINE_DISPLAY_RE.captures(style))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
            .unwrap_or_default();
        self.nodes.push(SnapshotElement {
            tag: data.name().to_ascii_lowercase(),
            class: data.attr("class").unwrap_or_default().to_owned(),
            data_test: data.attr("data-test").unwrap_or_default().to_owned(),
            display,
            parent,
            children: Vec::new(),
        });
        id
    }

    fn validate(&self) -> anyhow::Result<()> {
        let in_range = |id: NodeId| id.0 < self.nodes.len();
        if let Some(body) = self.body {
            anyhow::ensure!(in_range(body), "snapshot body {} out of range", body.0);
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                anyhow::ensure!(
                    parent.0 < idx,
                    "snapshot node {idx} has invalid parent {}",
                    parent.0
                );
            }
            for child in node.children.iter().filter_map(Child::element) {
                anyhow::ensure!(
                    child.0 > idx && in_range(child),
                    "snapshot node {idx} has invalid child {}",
                    child.0
                );
            }
        }
        Ok(())
    }
}

impl PageDom for PageSnapshot {
    fn body(&self) -> Option<NodeId> {
        self.body
    }

    fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    fn attr(&self, node: NodeId, attr: HintAttr) -> &str {
        let element = &self.nodes[node.0];
        match attr {
            HintAttr::Class => &element.class,
            HintAttr::DataTest => &element.data_test,
        }
    }

    fn layout(&self, node: NodeId) -> Layout {
        Layout::from_display(&self.nodes[node.0].display)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn children(&self, node: NodeId) -> &[Child] {
        &self.nodes[node.0].children
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_tag(snapshot: &PageSnapshot, tag: &str) -> NodeId {
        let idx = snapshot
            .nodes
            .iter()
            .position(|n| n.tag == tag)
            .unwrap_or_else(|| panic!("missing <{tag}>"));
        NodeId(idx)
    }

    #[test]
    fn text_matches_text_content_with_collapsed_whitespace() {
        let snapshot = PageSnapshot::from_html(
            "<html><body><div id=x>  Pro <b>plan</b>\n\t<span>$29<!-- c -->/mo</span> </div></body></html>",
        );
        let div = find_tag(&snapshot, "div");
        assert_eq!(snapshot.text(div), "Pro plan $29/mo");
        assert_eq!(snapshot.raw_text(div), "  Pro plan\n\t$29/mo ");
    }

    #[test]
    fn descendants_are_in_document_order() {
        let snapshot = PageSnapshot::from_html(
            "<body><section><h2>A</h2><ul><li>1</li><li>2</li></ul></section><p>z</p></body>",
        );
        let body = snapshot.body().unwrap();
        let tags = snapshot
            .descendants(body)
            .into_iter()
            .map(|id| snapshot.tag(id).to_owned())
            .collect::<Vec<_>>();
        assert_eq!(tags, vec!["section", "h2", "ul", "li", "li", "p"]);
    }

    #[test]
    fn parent_and_previous_sibling() {
        let snapshot = PageSnapshot::from_html("<body><h3>Team</h3><div>$49</div></body>");
        let div = find_tag(&snapshot, "div");
        let h3 = find_tag(&snapshot, "h3");
        assert_eq!(snapshot.previous_element_sibling(div), Some(h3));
        assert_eq!(snapshot.previous_element_sibling(h3), None);
        assert_eq!(snapshot.parent(div), snapshot.body());
    }

    #[test]
    fn inline_display_drives_layout() {
        let snapshot = PageSnapshot::from_html(
            r#"<body><div style="color: red; display: inline-flex"></div><main style="DISPLAY:grid"></main><p style="display:block"></p></body>"#,
        );
        assert_eq!(snapshot.layout(find_tag(&snapshot, "div")), Layout::Flex);
        assert_eq!(snapshot.layout(find_tag(&snapshot, "main")), Layout::Grid);
        assert_eq!(snapshot.layout(find_tag(&snapshot, "p")), Layout::Other);
    }

    #[test]
    fn hints_are_case_insensitive_substrings() {
        let snapshot = PageSnapshot::from_html(
            r#"<body><div class="PricingCard__Price" data-test="plan-Price"></div></body>"#,
        );
        let div = find_tag(&snapshot, "div");
        assert!(snapshot.has_hint(div, HintAttr::Class, "price"));
        assert!(snapshot.has_hint(div, HintAttr::DataTest, "price"));
        assert!(!snapshot.has_hint(div, HintAttr::Class, "tier"));
    }

    #[test]
    fn browser_json_round_trips_through_validation() {
        let value = serde_json::json!({
            "body": 0,
            "nodes": [
                {"tag": "body", "class": "", "data_test": "", "display": "block", "parent": null,
                 "children": [{"el": 1}]},
                {"tag": "div", "class": "card", "data_test": "", "display": "flex", "parent": 0,
                 "children": [{"text": " $9 "}, {"el": 2}]},
                {"tag": "span", "parent": 1, "children": [{"text": "/month"}]}
            ]
        });
        let snapshot = PageSnapshot::from_json(value).unwrap();
        assert_eq!(snapshot.text(NodeId(1)), "$9 /month");
        assert_eq!(snapshot.layout(NodeId(1)), Layout::Flex);
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn browser_json_with_dangling_child_is_rejected() {
        let value = serde_json::json!({
            "body": 0,
            "nodes": [{"tag": "body", "parent": null, "children": [{"el": 7}]}]
        });
        assert!(PageSnapshot::from_json(value).is_err());
    }
}
