//! Runtime values.
//!
//! A [`Value`] is either NULL or a container of one of four cardinalities
//! holding [`Scalar`]s drawn from the closed [`BaseType`] set. Equality
//! follows the assessment rules exactly: NULL equals every empty container,
//! `multiple` containers compare as bags and `ordered` containers compare
//! position by position.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// The scalar kinds a value can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    Boolean,
    Integer,
    Float,
    String,
    Identifier,
    Point,
    Pair,
    DirectedPair,
    Duration,
    File,
    Uri,
}

impl BaseType {
    pub const ALL: [BaseType; 11] = [
        BaseType::Boolean,
        BaseType::Integer,
        BaseType::Float,
        BaseType::String,
        BaseType::Identifier,
        BaseType::Point,
        BaseType::Pair,
        BaseType::DirectedPair,
        BaseType::Duration,
        BaseType::File,
        BaseType::Uri,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BaseType::Boolean => "boolean",
            BaseType::Integer => "integer",
            BaseType::Float => "float",
            BaseType::String => "string",
            BaseType::Identifier => "identifier",
            BaseType::Point => "point",
            BaseType::Pair => "pair",
            BaseType::DirectedPair => "directedPair",
            BaseType::Duration => "duration",
            BaseType::File => "file",
            BaseType::Uri => "uri",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Float)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "boolean" | "bool" => Ok(BaseType::Boolean),
            "integer" | "int" => Ok(BaseType::Integer),
            "float" => Ok(BaseType::Float),
            "string" => Ok(BaseType::String),
            "identifier" => Ok(BaseType::Identifier),
            "point" => Ok(BaseType::Point),
            "pair" => Ok(BaseType::Pair),
            "directedpair" => Ok(BaseType::DirectedPair),
            "duration" => Ok(BaseType::Duration),
            "file" => Ok(BaseType::File),
            "uri" => Ok(BaseType::Uri),
            _ => Err(format!("unknown base type: {s}")),
        }
    }
}

/// The shape of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multiple,
    Ordered,
    Record,
}

impl Cardinality {
    pub const ALL: [Cardinality; 4] = [
        Cardinality::Single,
        Cardinality::Multiple,
        Cardinality::Ordered,
        Cardinality::Record,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Cardinality::Single => "single",
            Cardinality::Multiple => "multiple",
            Cardinality::Ordered => "ordered",
            Cardinality::Record => "record",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Cardinality::Single),
            "multiple" => Ok(Cardinality::Multiple),
            "ordered" => Ok(Cardinality::Ordered),
            "record" => Ok(Cardinality::Record),
            other => Err(format!("unknown cardinality: {other}")),
        }
    }
}

/// An uploaded file response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileValue {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A single value of one base type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),
    Point(i64, i64),
    /// Unordered pair of identifiers.
    Pair(String, String),
    DirectedPair(String, String),
    /// Seconds.
    Duration(f64),
    File(FileValue),
    Uri(String),
}

impl Scalar {
    pub fn base_type(&self) -> BaseType {
        match self {
            Scalar::Boolean(_) => BaseType::Boolean,
            Scalar::Integer(_) => BaseType::Integer,
            Scalar::Float(_) => BaseType::Float,
            Scalar::String(_) => BaseType::String,
            Scalar::Identifier(_) => BaseType::Identifier,
            Scalar::Point(..) => BaseType::Point,
            Scalar::Pair(..) => BaseType::Pair,
            Scalar::DirectedPair(..) => BaseType::DirectedPair,
            Scalar::Duration(_) => BaseType::Duration,
            Scalar::File(_) => BaseType::File,
            Scalar::Uri(_) => BaseType::Uri,
        }
    }

    /// Parse a textual literal as the given base type.
    pub fn parse(base_type: BaseType, raw: &str) -> Result<Scalar, ValueError> {
        let unparseable = || ValueError::Unparseable {
            base_type,
            raw: raw.to_string(),
        };
        let trimmed = raw.trim();
        match base_type {
            BaseType::Boolean => match trimmed {
                "true" | "1" => Ok(Scalar::Boolean(true)),
                "false" | "0" => Ok(Scalar::Boolean(false)),
                _ => Err(unparseable()),
            },
            BaseType::Integer => trimmed
                .trim_start_matches('+')
                .parse()
                .map(Scalar::Integer)
                .map_err(|_| unparseable()),
            BaseType::Float => parse_float(trimmed)
                .map(Scalar::Float)
                .ok_or_else(unparseable),
            BaseType::Duration => parse_float(trimmed)
                .filter(|secs| *secs >= 0.0)
                .map(Scalar::Duration)
                .ok_or_else(unparseable),
            BaseType::String => Ok(Scalar::String(raw.to_string())),
            BaseType::Uri => Ok(Scalar::Uri(trimmed.to_string())),
            BaseType::Identifier => {
                if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
                    Err(unparseable())
                } else {
                    Ok(Scalar::Identifier(trimmed.to_string()))
                }
            }
            BaseType::Point => {
                let (x, y) = two_tokens(trimmed).ok_or_else(unparseable)?;
                let x = x.parse().map_err(|_| unparseable())?;
                let y = y.parse().map_err(|_| unparseable())?;
                Ok(Scalar::Point(x, y))
            }
            BaseType::Pair => {
                let (a, b) = two_tokens(trimmed).ok_or_else(unparseable)?;
                Ok(Scalar::Pair(a.to_string(), b.to_string()))
            }
            BaseType::DirectedPair => {
                let (a, b) = two_tokens(trimmed).ok_or_else(unparseable)?;
                Ok(Scalar::DirectedPair(a.to_string(), b.to_string()))
            }
            BaseType::File => Err(ValueError::NotTextual(BaseType::File)),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Textual view of string-like scalars.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) | Scalar::Identifier(s) | Scalar::Uri(s) => Some(s),
            _ => None,
        }
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    match raw {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => raw.parse().ok(),
    }
}

fn two_tokens(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Some((a, b)),
        _ => None,
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Identifier(a), Scalar::Identifier(b)) => a == b,
            (Scalar::Uri(a), Scalar::Uri(b)) => a == b,
            (Scalar::Point(ax, ay), Scalar::Point(bx, by)) => ax == bx && ay == by,
            (Scalar::Pair(a1, a2), Scalar::Pair(b1, b2)) => {
                (a1 == b1 && a2 == b2) || (a1 == b2 && a2 == b1)
            }
            (Scalar::DirectedPair(a1, a2), Scalar::DirectedPair(b1, b2)) => a1 == b1 && a2 == b2,
            (Scalar::Duration(a), Scalar::Duration(b)) => a == b,
            (Scalar::File(a), Scalar::File(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::String(s) | Scalar::Identifier(s) | Scalar::Uri(s) => f.write_str(s),
            Scalar::Point(x, y) => write!(f, "{x} {y}"),
            Scalar::Pair(a, b) | Scalar::DirectedPair(a, b) => write!(f, "{a} {b}"),
            Scalar::Duration(secs) => write!(f, "{secs}s"),
            Scalar::File(file) => write!(f, "file:{}", file.name),
        }
    }
}

/// A runtime value of any cardinality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    #[default]
    Null,
    Single(Scalar),
    Multiple {
        base_type: BaseType,
        values: Vec<Scalar>,
    },
    Ordered {
        base_type: BaseType,
        values: Vec<Scalar>,
    },
    Record(BTreeMap<String, Scalar>),
}

impl Value {
    pub fn boolean(b: bool) -> Self {
        Value::Single(Scalar::Boolean(b))
    }

    pub fn integer(i: i64) -> Self {
        Value::Single(Scalar::Integer(i))
    }

    pub fn float(f: f64) -> Self {
        Value::Single(Scalar::Float(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::Single(Scalar::String(s.into()))
    }

    pub fn identifier(s: impl Into<String>) -> Self {
        Value::Single(Scalar::Identifier(s.into()))
    }

    pub fn duration(secs: f64) -> Self {
        Value::Single(Scalar::Duration(secs))
    }

    pub fn multiple(base_type: BaseType, values: impl IntoIterator<Item = Scalar>) -> Self {
        Value::Multiple {
            base_type,
            values: values.into_iter().collect(),
        }
    }

    pub fn ordered(base_type: BaseType, values: impl IntoIterator<Item = Scalar>) -> Self {
        Value::Ordered {
            base_type,
            values: values.into_iter().collect(),
        }
    }

    pub fn record(fields: impl IntoIterator<Item = (String, Scalar)>) -> Self {
        Value::Record(fields.into_iter().collect())
    }

    /// Assemble a value of the given shape from already-typed scalars.
    ///
    /// No scalars yields NULL for single cardinality and an empty container
    /// otherwise.
    pub fn from_scalars(
        cardinality: Cardinality,
        base_type: BaseType,
        mut scalars: Vec<Scalar>,
    ) -> Result<Value, ValueError> {
        match cardinality {
            Cardinality::Single => match scalars.len() {
                0 => Ok(Value::Null),
                1 => Ok(Value::Single(scalars.remove(0))),
                n => Err(ValueError::TooManyValues(n)),
            },
            Cardinality::Multiple => Ok(Value::multiple(base_type, scalars)),
            Cardinality::Ordered => Ok(Value::ordered(base_type, scalars)),
            Cardinality::Record => Err(ValueError::RecordFromList),
        }
    }

    /// Parse a list of literals into a value of the given shape.
    pub fn parse(
        cardinality: Cardinality,
        base_type: BaseType,
        raw: &[impl AsRef<str>],
    ) -> Result<Value, ValueError> {
        let scalars = raw
            .iter()
            .map(|r| Scalar::parse(base_type, r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Value::from_scalars(cardinality, base_type, scalars)
    }

    /// NULL or an empty container.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Single(_) => false,
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => values.is_empty(),
            Value::Record(fields) => fields.is_empty(),
        }
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        match self {
            Value::Null => None,
            Value::Single(_) => Some(Cardinality::Single),
            Value::Multiple { .. } => Some(Cardinality::Multiple),
            Value::Ordered { .. } => Some(Cardinality::Ordered),
            Value::Record(_) => Some(Cardinality::Record),
        }
    }

    /// Base type of single values and containers; records and NULL have none.
    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            Value::Single(s) => Some(s.base_type()),
            Value::Multiple { base_type, .. } | Value::Ordered { base_type, .. } => {
                Some(*base_type)
            }
            Value::Null | Value::Record(_) => None,
        }
    }

    pub fn as_single(&self) -> Option<&Scalar> {
        match self {
            Value::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_single().and_then(Scalar::as_bool)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_single().and_then(Scalar::as_f64)
    }

    /// Elements of a `multiple` or `ordered` container.
    pub fn elements(&self) -> Option<&[Scalar]> {
        match self {
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Elements of a single value or a container, NULL yielding none.
    pub fn scalars(&self) -> Vec<&Scalar> {
        match self {
            Value::Null | Value::Record(_) => Vec::new(),
            Value::Single(s) => vec![s],
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => {
                values.iter().collect()
            }
        }
    }

    /// Whether this value may be stored in a variable of the given shape.
    pub fn fits(&self, cardinality: Cardinality, base_type: Option<BaseType>) -> bool {
        if self.is_null() {
            return true;
        }
        if self.cardinality() != Some(cardinality) {
            return false;
        }
        match (cardinality, base_type) {
            (Cardinality::Record, _) => true,
            (_, Some(expected)) => self.base_type() == Some(expected),
            (_, None) => false,
        }
    }

    /// Integer to float widening, the one implicit conversion.
    pub fn widen_to_float(self) -> Value {
        let widen = |s: Scalar| match s {
            Scalar::Integer(i) => Scalar::Float(i as f64),
            other => other,
        };
        match self {
            Value::Single(s) => Value::Single(widen(s)),
            Value::Multiple {
                base_type: BaseType::Integer,
                values,
            } => Value::multiple(BaseType::Float, values.into_iter().map(widen)),
            Value::Ordered {
                base_type: BaseType::Integer,
                values,
            } => Value::ordered(BaseType::Float, values.into_iter().map(widen)),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.is_null() || other.is_null() {
            return self.is_null() && other.is_null();
        }
        match (self, other) {
            (Value::Single(a), Value::Single(b)) => a == b,
            (
                Value::Ordered {
                    base_type: ta,
                    values: a,
                },
                Value::Ordered {
                    base_type: tb,
                    values: b,
                },
            ) => ta == tb && a == b,
            (
                Value::Multiple {
                    base_type: ta,
                    values: a,
                },
                Value::Multiple {
                    base_type: tb,
                    values: b,
                },
            ) => ta == tb && bag_equal(a, b),
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

/// Permutation-insensitive comparison honouring duplicate counts.
fn bag_equal(a: &[Scalar], b: &[Scalar]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for x in a {
        for (i, y) in b.iter().enumerate() {
            if !used[i] && x == y {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Single(s) => write!(f, "{s}"),
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Record(fields) => {
                let items: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<Scalar> {
        values
            .iter()
            .map(|v| Scalar::Identifier(v.to_string()))
            .collect()
    }

    #[test]
    fn null_equals_empty_containers_of_any_kind() {
        assert_eq!(Value::Null, Value::multiple(BaseType::Integer, vec![]));
        assert_eq!(Value::Null, Value::ordered(BaseType::String, vec![]));
        assert_eq!(Value::Null, Value::record(vec![]));
        assert_eq!(
            Value::multiple(BaseType::Integer, vec![]),
            Value::ordered(BaseType::Point, vec![])
        );
        assert_ne!(Value::Null, Value::integer(0));
        assert_ne!(Value::Null, Value::string(""));
    }

    #[test]
    fn multiple_is_a_bag() {
        let a = Value::multiple(BaseType::Identifier, ids(&["A", "B", "B"]));
        let b = Value::multiple(BaseType::Identifier, ids(&["B", "A", "B"]));
        let c = Value::multiple(BaseType::Identifier, ids(&["A", "A", "B"]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ordered_is_positional() {
        let a = Value::ordered(BaseType::Identifier, ids(&["A", "B"]));
        let b = Value::ordered(BaseType::Identifier, ids(&["B", "A"]));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn multiple_and_ordered_never_equal_when_non_empty() {
        let a = Value::multiple(BaseType::Identifier, ids(&["A"]));
        let b = Value::ordered(BaseType::Identifier, ids(&["A"]));
        assert_ne!(a, b);
    }

    #[test]
    fn pairs_are_unordered_directed_pairs_are_not() {
        let p = Scalar::Pair("A".into(), "B".into());
        let q = Scalar::Pair("B".into(), "A".into());
        assert_eq!(p, q);
        let dp = Scalar::DirectedPair("A".into(), "B".into());
        let dq = Scalar::DirectedPair("B".into(), "A".into());
        assert_ne!(dp, dq);
    }

    #[test]
    fn parse_literals() {
        assert_eq!(
            Scalar::parse(BaseType::Boolean, "1").unwrap(),
            Scalar::Boolean(true)
        );
        assert_eq!(
            Scalar::parse(BaseType::Point, " 3 4 ").unwrap(),
            Scalar::Point(3, 4)
        );
        assert_eq!(
            Scalar::parse(BaseType::Float, "INF").unwrap(),
            Scalar::Float(f64::INFINITY)
        );
        assert!(Scalar::parse(BaseType::Identifier, "two words").is_err());
        assert!(Scalar::parse(BaseType::Integer, "1.5").is_err());
        assert!(matches!(
            Scalar::parse(BaseType::File, "x"),
            Err(ValueError::NotTextual(BaseType::File))
        ));
    }

    #[test]
    fn from_scalars_shapes() {
        let v = Value::from_scalars(Cardinality::Single, BaseType::Integer, vec![]).unwrap();
        assert!(matches!(v, Value::Null));
        let err = Value::from_scalars(
            Cardinality::Single,
            BaseType::Integer,
            vec![Scalar::Integer(1), Scalar::Integer(2)],
        );
        assert!(matches!(err, Err(ValueError::TooManyValues(2))));
    }

    #[test]
    fn fits_and_widening() {
        let v = Value::integer(3);
        assert!(v.fits(Cardinality::Single, Some(BaseType::Integer)));
        assert!(!v.fits(Cardinality::Single, Some(BaseType::Float)));
        assert!(v
            .clone()
            .widen_to_float()
            .fits(Cardinality::Single, Some(BaseType::Float)));
        assert!(Value::Null.fits(Cardinality::Multiple, Some(BaseType::Point)));
    }

    #[test]
    fn base_type_names_round_trip() {
        for bt in BaseType::ALL {
            assert_eq!(bt.as_str().parse::<BaseType>().unwrap(), bt);
        }
        assert_eq!(
            "directed_pair".parse::<BaseType>().unwrap(),
            BaseType::DirectedPair
        );
    }

    #[test]
    fn display() {
        let v = Value::multiple(BaseType::Integer, vec![Scalar::Integer(1), Scalar::Integer(2)]);
        assert_eq!(v.to_string(), "[1, 2]");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
