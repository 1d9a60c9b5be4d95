//! Test definitions: parts, the section tree and item references.
//!
//! Sections and item references live in one arena owned by the
//! [`TestDefinition`] and are addressed by [`NodeId`]. Runtime trees built
//! from a definition hold `NodeId`s rather than copies of the nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expression::ExprArena;
use crate::model::{ItemDefinition, VariableDeclaration};
use crate::rules::OutcomeRule;

/// Handle to a section or item reference in a [`TestDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A selection rule: draw `select` children per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub select: usize,
    pub with_replacement: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionNode {
    pub identifier: String,
    pub title: String,
    /// Invisible sections only group; they are flattened out of runtime trees.
    pub visible: bool,
    pub fixed: bool,
    pub required: bool,
    /// Invisible sections with this flag shuffle as one block.
    pub keep_together: bool,
    pub selection: Option<Selection>,
    pub shuffle: bool,
    pub children: Vec<NodeId>,
}

impl SectionNode {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: String::new(),
            visible: true,
            fixed: false,
            required: false,
            keep_together: true,
            selection: None,
            shuffle: false,
            children: Vec::new(),
        }
    }
}

/// A reference to an item definition from a section.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRef {
    pub identifier: String,
    pub href: String,
    pub fixed: bool,
    pub required: bool,
    pub categories: Vec<String>,
}

impl ItemRef {
    pub fn new(identifier: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            href: href.into(),
            fixed: false,
            required: false,
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestNode {
    Section(SectionNode),
    Item(ItemRef),
}

impl TestNode {
    pub fn identifier(&self) -> &str {
        match self {
            TestNode::Section(s) => &s.identifier,
            TestNode::Item(i) => &i.identifier,
        }
    }

    pub fn is_fixed(&self) -> bool {
        match self {
            TestNode::Section(s) => s.fixed,
            TestNode::Item(i) => i.fixed,
        }
    }

    pub fn is_required(&self) -> bool {
        match self {
            TestNode::Section(s) => s.required,
            TestNode::Item(i) => i.required,
        }
    }

    pub fn as_section(&self) -> Option<&SectionNode> {
        match self {
            TestNode::Section(s) => Some(s),
            TestNode::Item(_) => None,
        }
    }
}

/// A part: the top-level sections delivered together.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPart {
    pub identifier: String,
    pub sections: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct TestDefinition {
    pub identifier: String,
    pub title: String,
    /// Test-level outcome declarations.
    pub declarations: Vec<VariableDeclaration>,
    pub outcome_processing: Vec<OutcomeRule>,
    pub parts: Vec<TestPart>,
    pub nodes: Vec<TestNode>,
    /// Item definitions keyed by href.
    pub items: BTreeMap<String, Arc<ItemDefinition>>,
    pub expressions: ExprArena,
}

impl TestDefinition {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            declarations: Vec::new(),
            outcome_processing: Vec::new(),
            parts: Vec::new(),
            nodes: Vec::new(),
            items: BTreeMap::new(),
            expressions: ExprArena::default(),
        }
    }

    pub fn add_node(&mut self, node: TestNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Look up a node. Ids only come from [`TestDefinition::add_node`], so
    /// a missing node is a caller bug and yields `None`.
    pub fn node(&self, id: NodeId) -> Option<&TestNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn section(&self, id: NodeId) -> Option<&SectionNode> {
        self.node(id).and_then(TestNode::as_section)
    }

    pub fn section_mut(&mut self, id: NodeId) -> Option<&mut SectionNode> {
        match self.nodes.get_mut(id.0 as usize) {
            Some(TestNode::Section(section)) => Some(section),
            _ => None,
        }
    }

    pub fn find_item_ref(&self, identifier: &str) -> Option<(NodeId, &ItemRef)> {
        self.nodes
            .iter()
            .enumerate()
            .find_map(|(i, node)| match node {
                TestNode::Item(item) if item.identifier == identifier => {
                    Some((NodeId(i as u32), item))
                }
                _ => None,
            })
    }

    pub fn item_definition(&self, item: &ItemRef) -> Option<&Arc<ItemDefinition>> {
        self.items.get(&item.href)
    }

    pub fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        self.declarations
            .iter()
            .find(|d| d.identifier == identifier)
    }

    /// Resolve a test-level declaration or a dotted `item.variable`
    /// reference into an item's declarations.
    pub fn resolve_declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        if let Some(declaration) = self.declaration(identifier) {
            return Some(declaration);
        }
        let (item_id, variable) = identifier.split_once('.')?;
        let (_, item_ref) = self.find_item_ref(item_id)?;
        self.item_definition(item_ref)?.declaration(variable)
    }

    /// Every item reference in the test, in document order.
    pub fn item_refs(&self) -> impl Iterator<Item = (NodeId, &ItemRef)> {
        self.nodes.iter().enumerate().filter_map(|(i, node)| match node {
            TestNode::Item(item) => Some((NodeId(i as u32), item)),
            TestNode::Section(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{BaseType, Cardinality};

    fn sample() -> TestDefinition {
        let mut test = TestDefinition::new("t1", "Test");
        let mut item = ItemDefinition::new("q1", "Q1");
        item.declare(VariableDeclaration::outcome(
            "SCORE",
            Cardinality::Single,
            BaseType::Float,
        ));
        test.items.insert("q1.toml".into(), Arc::new(item));
        let q1 = test.add_node(TestNode::Item(ItemRef::new("q1", "q1.toml")));
        let mut section = SectionNode::new("s1");
        section.children.push(q1);
        let s1 = test.add_node(TestNode::Section(section));
        test.parts.push(TestPart {
            identifier: "p1".into(),
            sections: vec![s1],
        });
        test.declarations.push(VariableDeclaration::outcome(
            "TOTAL",
            Cardinality::Single,
            BaseType::Float,
        ));
        test
    }

    #[test]
    fn resolves_dotted_references() {
        let test = sample();
        assert!(test.resolve_declaration("TOTAL").is_some());
        let score = test.resolve_declaration("q1.SCORE").unwrap();
        assert_eq!(score.identifier, "SCORE");
        assert!(test.resolve_declaration("q1.MISSING").is_none());
        assert!(test.resolve_declaration("q9.SCORE").is_none());
    }

    #[test]
    fn node_lookup() {
        let test = sample();
        let (id, item) = test.find_item_ref("q1").unwrap();
        assert_eq!(id, NodeId(0));
        assert_eq!(item.href, "q1.toml");
        assert!(test.section(NodeId(1)).is_some());
        assert!(test.section(NodeId(0)).is_none());
        assert_eq!(test.item_refs().count(), 1);
    }
}
