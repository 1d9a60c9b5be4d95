//! Property tests for value equality and null semantics.

use assay_core::value::{BaseType, Scalar, Value};
use proptest::prelude::*;

fn identifiers() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,4}", 0..8)
}

fn scalars(ids: &[String]) -> Vec<Scalar> {
    ids.iter().cloned().map(Scalar::Identifier).collect()
}

proptest! {
    #[test]
    fn null_equals_only_null_or_empty(ids in identifiers(), single in any::<i64>()) {
        let multiple = Value::multiple(BaseType::Identifier, scalars(&ids));
        let ordered = Value::ordered(BaseType::Identifier, scalars(&ids));
        prop_assert_eq!(Value::Null == multiple, ids.is_empty());
        prop_assert_eq!(Value::Null == ordered, ids.is_empty());
        prop_assert!(Value::Null != Value::integer(single));
        prop_assert!(Value::Null == Value::record(Vec::new()));
    }

    #[test]
    fn multiple_equality_ignores_order(ids in identifiers(), seed in any::<u64>()) {
        let mut shuffled = ids.clone();
        let mut rng = assay_core::random::seeded(seed);
        rand::seq::SliceRandom::shuffle(shuffled.as_mut_slice(), &mut rng);
        prop_assert_eq!(
            Value::multiple(BaseType::Identifier, scalars(&ids)),
            Value::multiple(BaseType::Identifier, scalars(&shuffled))
        );
    }

    #[test]
    fn ordered_equality_respects_positions(ids in prop::collection::hash_set("[a-z]{1,4}", 2..8)) {
        let ids: Vec<String> = ids.into_iter().collect();
        let mut reversed = ids.clone();
        reversed.reverse();
        prop_assert_ne!(
            Value::ordered(BaseType::Identifier, scalars(&ids)),
            Value::ordered(BaseType::Identifier, scalars(&reversed))
        );
    }

    #[test]
    fn bag_equality_counts_repeats(id in "[a-z]{1,4}", other in "[A-Z]{1,4}") {
        let twice = Value::multiple(
            BaseType::Identifier,
            scalars(&[id.clone(), id.clone(), other.clone()]),
        );
        let once = Value::multiple(
            BaseType::Identifier,
            scalars(&[id.clone(), other.clone(), other]),
        );
        prop_assert_ne!(twice, once);
    }
}

#[test]
fn records_compare_by_field_set() {
    let a = Value::record([
        ("x".to_string(), Scalar::Integer(1)),
        ("y".to_string(), Scalar::String("a".into())),
    ]);
    let b = Value::record([
        ("y".to_string(), Scalar::String("a".into())),
        ("x".to_string(), Scalar::Integer(1)),
    ]);
    let c = Value::record([("x".to_string(), Scalar::Integer(1))]);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn containers_of_different_cardinality_differ() {
    let ids = scalars(&["a".into(), "b".into()]);
    assert_ne!(
        Value::multiple(BaseType::Identifier, ids.clone()),
        Value::ordered(BaseType::Identifier, ids)
    );
}
