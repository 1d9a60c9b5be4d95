//! Selection and ordering properties of test assembly.

use std::collections::HashMap;

use assay_assembly::{assemble_test, RuntimeTree};
use assay_core::assessment::{ItemRef, NodeId, SectionNode, Selection, TestDefinition, TestNode, TestPart};
use assay_core::random::seeded;
use proptest::prelude::*;

/// A test with one section over `k` items, `fixed` marking locked items.
fn single_section(k: usize, fixed: &[bool], configure: impl FnOnce(&mut SectionNode)) -> TestDefinition {
    let mut test = TestDefinition::new("t", "T");
    let children: Vec<NodeId> = (0..k)
        .map(|i| {
            let mut item = ItemRef::new(format!("q{i}"), format!("q{i}.toml"));
            item.fixed = fixed.get(i).copied().unwrap_or(false);
            test.add_node(TestNode::Item(item))
        })
        .collect();
    let mut section = SectionNode::new("s");
    section.children = children;
    configure(&mut section);
    let section = test.add_node(TestNode::Section(section));
    test.parts.push(TestPart {
        identifier: "p".into(),
        sections: vec![section],
    });
    test
}

fn delivered(tree: &RuntimeTree) -> Vec<String> {
    tree.items().into_iter().map(|i| i.identifier.clone()).collect()
}

proptest! {
    #[test]
    fn selection_without_replacement_draws_distinct(k in 1usize..12, n_frac in 0.0f64..=1.0, seed in any::<u64>()) {
        let n = ((k as f64) * n_frac).round() as usize;
        let test = single_section(k, &[], |s| {
            s.selection = Some(Selection { select: n, with_replacement: false });
        });
        let ids = delivered(&assemble_test(&test, &mut seeded(seed)));
        prop_assert_eq!(ids.len(), n);
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn selecting_every_child_yields_each_once(k in 1usize..12, seed in any::<u64>()) {
        let test = single_section(k, &[], |s| {
            s.selection = Some(Selection { select: k, with_replacement: false });
        });
        let mut ids = delivered(&assemble_test(&test, &mut seeded(seed)));
        ids.sort();
        let mut expected: Vec<String> = (0..k).map(|i| format!("q{i}")).collect();
        expected.sort();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn shuffling_keeps_fixed_positions(fixed in prop::collection::vec(any::<bool>(), 1..12), seed in any::<u64>()) {
        let k = fixed.len();
        let test = single_section(k, &fixed, |s| s.shuffle = true);
        let ids = delivered(&assemble_test(&test, &mut seeded(seed)));
        for (i, locked) in fixed.iter().enumerate() {
            if *locked {
                prop_assert_eq!(&ids[i], &format!("q{i}"));
            }
        }
        let mut sorted = ids.clone();
        sorted.sort();
        let mut expected: Vec<String> = (0..k).map(|i| format!("q{i}")).collect();
        expected.sort();
        prop_assert_eq!(sorted, expected);
    }
}

#[test]
fn selection_with_replacement_is_roughly_uniform() {
    let k = 4;
    let test = single_section(k, &[], |s| {
        s.selection = Some(Selection {
            select: 1,
            with_replacement: true,
        });
    });
    let trials = 8000;
    let mut rng = seeded(42);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..trials {
        for id in delivered(&assemble_test(&test, &mut rng)) {
            *counts.entry(id).or_default() += 1;
        }
    }
    let expected = trials as f64 / k as f64;
    for i in 0..k {
        let seen = counts.get(&format!("q{i}")).copied().unwrap_or(0) as f64;
        assert!(
            (seen - expected).abs() < expected * 0.1,
            "q{i} drawn {seen} times, expected about {expected}"
        );
    }
}

#[test]
fn required_children_survive_selection() {
    let mut test = single_section(6, &[], |s| {
        s.selection = Some(Selection {
            select: 2,
            with_replacement: false,
        });
    });
    if let Some(TestNode::Item(item)) = test.nodes.get_mut(3) {
        item.required = true;
    }
    for seed in 0..40 {
        let ids = delivered(&assemble_test(&test, &mut seeded(seed)));
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"q3".to_string()));
    }
}

#[test]
fn runtime_tree_serializes() {
    let test = single_section(2, &[], |_| {});
    let tree = assemble_test(&test, &mut seeded(0));
    let json = serde_json::to_value(&tree).unwrap();
    assert_eq!(json["parts"][0]["children"][0]["type"], "section");
    assert_eq!(json["parts"][0]["children"][0]["children"][1]["identifier"], "q1");
}
