//! Per-section child selection.

use assay_core::assessment::{NodeId, SectionNode, Selection, TestDefinition};
use assay_core::random::RandomSource;
use rand::Rng;
use tracing::{debug, warn};

/// Choose which children of `section` take part in this attempt.
///
/// Returns child positions in document order; a position repeats when it
/// was drawn more than once with replacement. Without a selection rule
/// every child is kept once.
pub fn select_children(
    section: &SectionNode,
    test: &TestDefinition,
    rng: &mut RandomSource,
) -> Vec<NodeId> {
    let Some(selection) = section.selection else {
        return section.children.clone();
    };
    let required: Vec<bool> = section
        .children
        .iter()
        .map(|id| test.node(*id).is_some_and(|node| node.is_required()))
        .collect();
    let counts = draw(&required, selection, &section.identifier, rng);

    let mut selected = Vec::with_capacity(counts.iter().sum());
    for (id, count) in section.children.iter().zip(counts) {
        selected.extend(std::iter::repeat(*id).take(count));
    }
    debug!(
        section = %section.identifier,
        select = selection.select,
        selected = selected.len(),
        "selected section children"
    );
    selected
}

/// How many times each child is drawn. Required children are always
/// included and count toward the target.
pub(crate) fn draw(
    required: &[bool],
    selection: Selection,
    section: &str,
    rng: &mut RandomSource,
) -> Vec<usize> {
    let available = required.len();
    let mut counts: Vec<usize> = required.iter().map(|r| usize::from(*r)).collect();
    if available == 0 {
        return counts;
    }
    let already = counts.iter().sum::<usize>();
    let mut remaining = selection.select.saturating_sub(already);

    if selection.with_replacement {
        for _ in 0..remaining {
            counts[rng.gen_range(0..available)] += 1;
        }
        return counts;
    }

    let mut capacity: Vec<usize> = counts.iter().map(|c| 1 - c).collect();
    let open = capacity.iter().sum::<usize>();
    if remaining > open {
        warn!(
            section,
            select = selection.select,
            available,
            "selection exceeds the children available without replacement; capping"
        );
        remaining = open;
    }
    for _ in 0..remaining {
        let candidates: Vec<usize> = (0..available).filter(|i| capacity[*i] > 0).collect();
        let pick = candidates[rng.gen_range(0..candidates.len())];
        capacity[pick] -= 1;
        counts[pick] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::random::seeded;

    fn selection(select: usize, with_replacement: bool) -> Selection {
        Selection {
            select,
            with_replacement,
        }
    }

    #[test]
    fn required_children_are_always_drawn() {
        let mut rng = seeded(11);
        for _ in 0..50 {
            let counts = draw(&[false, true, false, false], selection(2, false), "s", &mut rng);
            assert_eq!(counts[1], 1);
            assert_eq!(counts.iter().sum::<usize>(), 2);
        }
    }

    #[test]
    fn required_beyond_target_are_kept() {
        let mut rng = seeded(1);
        let counts = draw(&[true, true, true], selection(1, false), "s", &mut rng);
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn oversized_selection_is_capped() {
        let mut rng = seeded(5);
        let counts = draw(&[false, false, false], selection(10, false), "s", &mut rng);
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn replacement_allows_repeats() {
        let mut rng = seeded(2);
        let counts = draw(&[false, false], selection(10, true), "s", &mut rng);
        assert_eq!(counts.iter().sum::<usize>(), 10);
    }

    #[test]
    fn empty_sections_select_nothing() {
        let mut rng = seeded(2);
        assert!(draw(&[], selection(3, true), "s", &mut rng).is_empty());
    }
}
