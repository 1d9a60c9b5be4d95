//! Interaction-specific response validation.

use std::collections::HashSet;

use assay_core::model::{Choice, Interaction, InteractionKind};
use assay_core::value::{Scalar, Value};

fn identifiers(value: &Value) -> Vec<&str> {
    value
        .scalars()
        .into_iter()
        .filter_map(|s| match s {
            Scalar::Identifier(id) | Scalar::String(id) => Some(id.as_str()),
            _ => None,
        })
        .collect()
}

fn all_offered(ids: &[&str], choices: &[Choice]) -> bool {
    ids.iter()
        .all(|id| choices.iter().any(|c| c.identifier == *id))
}

/// Whether `value` is an acceptable response to `interaction`.
/// An unanswered interaction is valid unless it requires a minimum number
/// of choices.
pub fn validate_interaction(interaction: &Interaction, value: &Value) -> bool {
    match &interaction.kind {
        InteractionKind::Choice {
            choices,
            min_choices,
            max_choices,
            ..
        } => {
            let ids = identifiers(value);
            all_offered(&ids, choices)
                && ids.len() >= *min_choices
                && (*max_choices == 0 || ids.len() <= *max_choices)
        }
        InteractionKind::Order { choices, .. } => {
            let ids = identifiers(value);
            let distinct: HashSet<&str> = ids.iter().copied().collect();
            all_offered(&ids, choices) && distinct.len() == ids.len()
        }
        InteractionKind::TextEntry { pattern_mask } => {
            match (pattern_mask, value.as_single().and_then(Scalar::as_str)) {
                (Some(mask), Some(text)) => mask.is_match(text),
                _ => true,
            }
        }
        InteractionKind::Slider {
            lower_bound,
            upper_bound,
        } => match value.as_f64() {
            Some(x) => *lower_bound <= x && x <= *upper_bound,
            None => value.is_null(),
        },
        InteractionKind::EndAttempt { .. } => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::model::PatternMask;
    use assay_core::value::BaseType;

    fn choice(min: usize, max: usize) -> Interaction {
        Interaction::new(
            "R",
            InteractionKind::Choice {
                choices: vec![Choice::new("A"), Choice::new("B"), Choice::new("C")],
                shuffle: false,
                min_choices: min,
                max_choices: max,
            },
        )
    }

    fn ids(raw: &[&str]) -> Value {
        Value::multiple(
            BaseType::Identifier,
            raw.iter().map(|s| Scalar::Identifier(s.to_string())),
        )
    }

    #[test]
    fn choice_counts_and_identifiers() {
        assert!(validate_interaction(&choice(1, 2), &ids(&["A", "B"])));
        assert!(!validate_interaction(&choice(1, 2), &ids(&["A", "B", "C"])));
        assert!(!validate_interaction(&choice(1, 0), &Value::Null));
        assert!(!validate_interaction(&choice(0, 0), &ids(&["Z"])));
        assert!(validate_interaction(&choice(0, 0), &Value::Null));
    }

    #[test]
    fn order_rejects_duplicates() {
        let order = Interaction::new(
            "R",
            InteractionKind::Order {
                choices: vec![Choice::new("A"), Choice::new("B")],
                shuffle: false,
            },
        );
        let value = |raw: &[&str]| {
            Value::ordered(
                BaseType::Identifier,
                raw.iter().map(|s| Scalar::Identifier(s.to_string())),
            )
        };
        assert!(validate_interaction(&order, &value(&["B", "A"])));
        assert!(!validate_interaction(&order, &value(&["A", "A"])));
    }

    #[test]
    fn text_entry_pattern_mask() {
        let text = Interaction::new(
            "R",
            InteractionKind::TextEntry {
                pattern_mask: Some(PatternMask::new("[0-9]{3}").unwrap()),
            },
        );
        assert!(validate_interaction(&text, &Value::string("123")));
        assert!(!validate_interaction(&text, &Value::string("12a")));
        assert!(!validate_interaction(&text, &Value::string("1234")));
    }

    #[test]
    fn slider_bounds() {
        let slider = Interaction::new(
            "R",
            InteractionKind::Slider {
                lower_bound: 0.0,
                upper_bound: 10.0,
            },
        );
        assert!(validate_interaction(&slider, &Value::integer(10)));
        assert!(!validate_interaction(&slider, &Value::float(10.5)));
    }
}
