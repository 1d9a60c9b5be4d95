//! The per-attempt runtime tree.

use std::collections::HashMap;

use assay_core::assessment::NodeId;
use serde::Serialize;

/// A selected item reference in delivery position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeItem {
    pub node: NodeId,
    pub identifier: String,
    pub href: String,
    /// 1-based occurrence of this item in delivery order; above 1 only when
    /// drawn more than once with replacement.
    pub instance: u32,
    /// Identifiers of every enclosing section, outermost first, including
    /// invisible sections that were flattened away.
    pub sections: Vec<String>,
}

/// A visible section and its delivered children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeSection {
    pub node: NodeId,
    pub identifier: String,
    pub title: String,
    pub children: Vec<RuntimeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeNode {
    Section(RuntimeSection),
    Item(RuntimeItem),
}

impl RuntimeNode {
    pub fn node(&self) -> NodeId {
        match self {
            RuntimeNode::Section(section) => section.node,
            RuntimeNode::Item(item) => item.node,
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            RuntimeNode::Section(section) => &section.identifier,
            RuntimeNode::Item(item) => &item.identifier,
        }
    }

    fn collect_items<'a>(&'a self, out: &mut Vec<&'a RuntimeItem>) {
        match self {
            RuntimeNode::Item(item) => out.push(item),
            RuntimeNode::Section(section) => {
                for child in &section.children {
                    child.collect_items(out);
                }
            }
        }
    }

    fn items_mut<'a>(&'a mut self, out: &mut Vec<&'a mut RuntimeItem>) {
        match self {
            RuntimeNode::Item(item) => out.push(item),
            RuntimeNode::Section(section) => {
                for child in &mut section.children {
                    child.items_mut(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimePart {
    pub identifier: String,
    pub children: Vec<RuntimeNode>,
}

/// What one attempt delivers: parts, visible sections and items in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeTree {
    pub test: String,
    pub parts: Vec<RuntimePart>,
}

impl RuntimeTree {
    /// Every delivered item, in delivery order.
    pub fn items(&self) -> Vec<&RuntimeItem> {
        let mut out = Vec::new();
        for part in &self.parts {
            for child in &part.children {
                child.collect_items(&mut out);
            }
        }
        out
    }

    pub(crate) fn number_instances(&mut self) {
        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut items = Vec::new();
        for part in &mut self.parts {
            for child in &mut part.children {
                child.items_mut(&mut items);
            }
        }
        for item in items {
            let count = seen.entry(item.identifier.clone()).or_insert(0);
            *count += 1;
            item.instance = *count;
        }
    }
}
