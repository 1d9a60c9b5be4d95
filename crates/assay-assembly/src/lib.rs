//! assay-assembly — Per-attempt test assembly.
//!
//! Turns a declarative section tree into the runtime tree one attempt
//! delivers: children are selected, recursively assembled, ordered, and
//! invisible sections are flattened away.

pub mod ordering;
pub mod selection;
pub mod tree;

use assay_core::assessment::{NodeId, TestDefinition, TestNode};
use assay_core::random::RandomSource;
use tracing::{info, warn};

pub use tree::{RuntimeItem, RuntimeNode, RuntimePart, RuntimeSection, RuntimeTree};

/// Assemble the runtime tree for one attempt.
///
/// A pure function of the definition and the random source: a seeded
/// source always yields the same tree.
pub fn assemble_test(test: &TestDefinition, rng: &mut RandomSource) -> RuntimeTree {
    let mut parts = Vec::with_capacity(test.parts.len());
    for part in &test.parts {
        let children = part
            .sections
            .iter()
            .filter_map(|id| assemble_node(test, *id, &[], rng))
            .collect();
        parts.push(RuntimePart {
            identifier: part.identifier.clone(),
            children: ordering::flatten_invisible(children, test),
        });
    }
    let mut tree = RuntimeTree {
        test: test.identifier.clone(),
        parts,
    };
    tree.number_instances();
    info!(
        test = %test.identifier,
        parts = tree.parts.len(),
        items = tree.items().len(),
        "assembled test"
    );
    tree
}

fn assemble_node(
    test: &TestDefinition,
    id: NodeId,
    ancestry: &[String],
    rng: &mut RandomSource,
) -> Option<RuntimeNode> {
    match test.node(id) {
        None => {
            warn!(node = %id, "section refers to a missing node");
            None
        }
        Some(TestNode::Item(item)) => Some(RuntimeNode::Item(RuntimeItem {
            node: id,
            identifier: item.identifier.clone(),
            href: item.href.clone(),
            instance: 1,
            sections: ancestry.to_vec(),
        })),
        Some(TestNode::Section(section)) => {
            let mut path = ancestry.to_vec();
            path.push(section.identifier.clone());
            let selected = selection::select_children(section, test, rng);
            let children = selected
                .into_iter()
                .filter_map(|child| assemble_node(test, child, &path, rng))
                .collect();
            let children = ordering::order_children(children, section.shuffle, test, rng);
            Some(RuntimeNode::Section(RuntimeSection {
                node: id,
                identifier: section.identifier.clone(),
                title: section.title.clone(),
                children,
            }))
        }
    }
}
