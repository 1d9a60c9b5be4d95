//! Type signatures used during validation.
//!
//! A [`Signature`] is a pair of sets: the cardinalities and the base types an
//! expression may produce (or that its parent accepts). Validation narrows
//! the two by intersection; an empty side means the expression can never
//! satisfy its parent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{BaseType, Cardinality};

/// Bitset over [`BaseType`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BaseTypeSet(u16);

impl BaseTypeSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self((1 << 11) - 1);
    pub const BOOLEAN: Self = Self::of(BaseType::Boolean);
    pub const INTEGER: Self = Self::of(BaseType::Integer);
    pub const FLOAT: Self = Self::of(BaseType::Float);
    pub const NUMERIC: Self = Self::of(BaseType::Integer).union(Self::of(BaseType::Float));
    pub const STRING: Self = Self::of(BaseType::String);
    pub const IDENTIFIER: Self = Self::of(BaseType::Identifier);
    pub const DURATION: Self = Self::of(BaseType::Duration);
    /// Everything `match` and `member` can compare.
    pub const COMPARABLE: Self = Self::ALL.without(BaseType::Duration);

    pub const fn of(base_type: BaseType) -> Self {
        Self(1 << base_type as u16)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn without(self, base_type: BaseType) -> Self {
        Self(self.0 & !Self::of(base_type).0)
    }

    pub const fn contains(self, base_type: BaseType) -> bool {
        self.0 & Self::of(base_type).0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = BaseType> {
        BaseType::ALL.into_iter().filter(move |bt| self.contains(*bt))
    }
}

impl FromIterator<BaseType> for BaseTypeSet {
    fn from_iter<I: IntoIterator<Item = BaseType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::EMPTY, |set, bt| set.union(Self::of(bt)))
    }
}

impl fmt::Debug for BaseTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for BaseTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return f.write_str("any");
        }
        let names: Vec<&str> = self.iter().map(BaseType::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Bitset over [`Cardinality`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CardinalitySet(u8);

impl CardinalitySet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b1111);
    pub const SINGLE: Self = Self::of(Cardinality::Single);
    pub const MULTIPLE: Self = Self::of(Cardinality::Multiple);
    pub const ORDERED: Self = Self::of(Cardinality::Ordered);
    pub const RECORD: Self = Self::of(Cardinality::Record);
    pub const CONTAINERS: Self = Self::MULTIPLE.union(Self::ORDERED);
    pub const NOT_RECORD: Self = Self::SINGLE.union(Self::CONTAINERS);

    pub const fn of(cardinality: Cardinality) -> Self {
        Self(1 << cardinality as u8)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn contains(self, cardinality: Cardinality) -> bool {
        self.0 & Self::of(cardinality).0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Cardinality> {
        Cardinality::ALL
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

impl fmt::Debug for CardinalitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for CardinalitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return f.write_str("any");
        }
        let names: Vec<&str> = self.iter().map(Cardinality::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// What an expression produces, or what a parent accepts at a child position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub cardinalities: CardinalitySet,
    pub base_types: BaseTypeSet,
}

impl Signature {
    pub const ANY: Self = Self::new(CardinalitySet::ALL, BaseTypeSet::ALL);
    pub const SINGLE_BOOLEAN: Self = Self::single(BaseTypeSet::BOOLEAN);
    pub const SINGLE_INTEGER: Self = Self::single(BaseTypeSet::INTEGER);
    pub const SINGLE_FLOAT: Self = Self::single(BaseTypeSet::FLOAT);
    pub const SINGLE_NUMERIC: Self = Self::single(BaseTypeSet::NUMERIC);

    pub const fn new(cardinalities: CardinalitySet, base_types: BaseTypeSet) -> Self {
        Self {
            cardinalities,
            base_types,
        }
    }

    pub const fn single(base_types: BaseTypeSet) -> Self {
        Self::new(CardinalitySet::SINGLE, base_types)
    }

    /// The signature of a declared variable. Records admit every base type
    /// since their fields are heterogeneous.
    pub fn of_declaration(cardinality: Cardinality, base_type: Option<BaseType>) -> Self {
        let base_types = match (cardinality, base_type) {
            (Cardinality::Record, _) | (_, None) => BaseTypeSet::ALL,
            (_, Some(bt)) => BaseTypeSet::of(bt),
        };
        Self::new(CardinalitySet::of(cardinality), base_types)
    }

    pub const fn intersect(self, other: Self) -> Self {
        Self::new(
            self.cardinalities.intersect(other.cardinalities),
            self.base_types.intersect(other.base_types),
        )
    }

    pub const fn is_empty(self) -> bool {
        self.cardinalities.is_empty() || self.base_types.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.cardinalities, self.base_types)
    }
}

/// Numeric base types produced by an aggregate over operands that may
/// each produce the given base types.
///
/// * any operand unable to produce integer or float: no valid type;
/// * any operand that can only produce float: float;
/// * no operand able to produce float: integer;
/// * otherwise both remain possible.
pub fn numeric_aggregate(operands: &[BaseTypeSet]) -> BaseTypeSet {
    let mut float_only = false;
    let mut float_possible = false;
    for operand in operands {
        let numeric = operand.intersect(BaseTypeSet::NUMERIC);
        if numeric.is_empty() {
            return BaseTypeSet::EMPTY;
        }
        if *operand == BaseTypeSet::FLOAT {
            float_only = true;
        }
        if numeric.contains(BaseType::Float) {
            float_possible = true;
        }
    }
    if float_only {
        BaseTypeSet::FLOAT
    } else if !float_possible {
        BaseTypeSet::INTEGER
    } else {
        BaseTypeSet::NUMERIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_narrows() {
        let numeric = Signature::SINGLE_NUMERIC;
        let any = Signature::ANY;
        assert_eq!(numeric.intersect(any), numeric);
        let records = Signature::new(CardinalitySet::RECORD, BaseTypeSet::ALL);
        assert!(numeric.intersect(records).is_empty());
        let strings = Signature::single(BaseTypeSet::STRING);
        assert!(numeric.intersect(strings).is_empty());
    }

    #[test]
    fn declaration_signatures() {
        let sig = Signature::of_declaration(Cardinality::Multiple, Some(BaseType::Identifier));
        assert_eq!(sig.cardinalities, CardinalitySet::MULTIPLE);
        assert_eq!(sig.base_types, BaseTypeSet::IDENTIFIER);
        let rec = Signature::of_declaration(Cardinality::Record, None);
        assert_eq!(rec.base_types, BaseTypeSet::ALL);
    }

    #[test]
    fn numeric_aggregate_rule() {
        use BaseTypeSet as B;
        assert_eq!(numeric_aggregate(&[B::INTEGER, B::INTEGER]), B::INTEGER);
        assert_eq!(numeric_aggregate(&[B::INTEGER, B::FLOAT]), B::FLOAT);
        assert_eq!(numeric_aggregate(&[B::NUMERIC, B::INTEGER]), B::NUMERIC);
        assert_eq!(numeric_aggregate(&[B::NUMERIC, B::FLOAT]), B::FLOAT);
        // producing float among non-numeric kinds is not "float only"
        assert_eq!(
            numeric_aggregate(&[B::FLOAT.union(B::STRING), B::INTEGER]),
            B::NUMERIC
        );
        assert_eq!(numeric_aggregate(&[B::FLOAT, B::STRING]), B::EMPTY);
        assert_eq!(numeric_aggregate(&[B::ALL, B::INTEGER]), B::NUMERIC);
        assert_eq!(numeric_aggregate(&[]), B::INTEGER);
    }

    #[test]
    fn display() {
        assert_eq!(
            Signature::SINGLE_NUMERIC.to_string(),
            "{single} x {integer, float}"
        );
        assert_eq!(Signature::ANY.to_string(), "any x any");
    }
}
