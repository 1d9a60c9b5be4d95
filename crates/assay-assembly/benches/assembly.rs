use criterion::{black_box, criterion_group, criterion_main, Criterion};

use assay_assembly::assemble_test;
use assay_core::assessment::{ItemRef, NodeId, SectionNode, Selection, TestDefinition, TestNode, TestPart};
use assay_core::random::seeded;

/// Ten shuffled sections of twenty items, each drawing half of them.
fn pool() -> TestDefinition {
    let mut test = TestDefinition::new("bench", "Bench");
    let mut sections = Vec::new();
    for s in 0..10 {
        let children: Vec<NodeId> = (0..20)
            .map(|i| {
                let id = format!("s{s}q{i}");
                test.add_node(TestNode::Item(ItemRef::new(id.clone(), format!("{id}.toml"))))
            })
            .collect();
        let mut section = SectionNode::new(format!("s{s}"));
        section.shuffle = true;
        section.visible = s % 2 == 0;
        section.selection = Some(Selection {
            select: 10,
            with_replacement: false,
        });
        section.children = children;
        sections.push(test.add_node(TestNode::Section(section)));
    }
    test.parts.push(TestPart {
        identifier: "p".into(),
        sections,
    });
    test
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    let test = pool();

    group.bench_function("select_and_shuffle", |b| {
        let mut rng = seeded(7);
        b.iter(|| assemble_test(black_box(&test), &mut rng))
    });

    group.finish();
}

criterion_group!(benches, bench_assembly);
criterion_main!(benches);
