//! Tag registry: the static contract of every built-in expression.
//!
//! The registry is the single source of truth for shape validation. For each
//! tag it records the child count bounds, the signature required at each
//! child position, how the produced signature is derived, whether the node
//! must be re-evaluated on every read, and how to build the node's payload
//! from declarative attributes.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::BuildError;
use crate::types::{BaseTypeSet, CardinalitySet, Signature};
use crate::value::{BaseType, Cardinality, Scalar, Value};

use super::kind::{CustomNode, ExprKind, ItemCount, ItemFilter};

/// How a node's produced signature is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produced {
    Fixed(Signature),
    /// Numeric aggregate of the children's base types.
    Numeric(CardinalitySet),
    /// The given cardinalities over the base types all children share.
    ChildBaseTypes(CardinalitySet),
    /// The last child's cardinality over the base types all children share.
    LastChildShape,
    /// Taken from the literal payload.
    Literal,
    /// Taken from the referenced variable's declaration.
    Declared,
    /// Reported by the custom operator.
    Extension,
}

/// The static contract of one expression tag.
pub struct ExpressionSpec {
    pub tag: &'static str,
    pub min_children: usize,
    pub max_children: Option<usize>,
    /// Signature required of the child at a position.
    pub required: fn(usize) -> Signature,
    pub produced: Produced,
    /// Re-validate and re-evaluate on every read instead of memoizing.
    pub variable: bool,
    /// Only valid in test-level outcome processing.
    pub test_only: bool,
    pub build: fn(&Attributes) -> Result<ExprKind, BuildError>,
}

impl ExpressionSpec {
    pub fn arity_text(&self) -> String {
        match self.max_children {
            Some(max) if max == self.min_children => max.to_string(),
            Some(max) => format!("{}..{}", self.min_children, max),
            None => format!("at least {}", self.min_children),
        }
    }

    pub fn accepts(&self, children: usize) -> bool {
        children >= self.min_children && self.max_children.is_none_or(|max| children <= max)
    }
}

/// A vendor-specific operator supplied by an [`ExtensionRegistry`].
pub trait CustomOperator: Send + Sync {
    /// What the operator can produce.
    fn produced(&self) -> Signature {
        Signature::ANY
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value, String>;
}

/// Resolves tags the built-in registry does not know.
pub trait ExtensionRegistry: Send + Sync {
    fn resolve(&self, class: &str) -> Option<Arc<dyn CustomOperator>>;
}

/// An extension registry that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtensions;

impl ExtensionRegistry for NoExtensions {
    fn resolve(&self, _class: &str) -> Option<Arc<dyn CustomOperator>> {
        None
    }
}

/// An extension registry backed by a map of class names.
#[derive(Default, Clone)]
pub struct ExtensionMap {
    operators: HashMap<String, Arc<dyn CustomOperator>>,
}

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: impl Into<String>, operator: Arc<dyn CustomOperator>) {
        self.operators.insert(class.into(), operator);
    }
}

impl ExtensionRegistry for ExtensionMap {
    fn resolve(&self, class: &str) -> Option<Arc<dyn CustomOperator>> {
        self.operators.get(class).cloned()
    }
}

/// An attribute value from a declarative expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<String>),
}

impl Attribute {
    /// Textual form, as it would appear in markup.
    pub fn raw(&self) -> String {
        match self {
            Attribute::String(s) => s.clone(),
            Attribute::Integer(i) => i.to_string(),
            Attribute::Float(f) => f.to_string(),
            Attribute::Boolean(b) => b.to_string(),
            Attribute::List(items) => items.join(" "),
        }
    }
}

/// The attributes of one declarative expression.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    tag: String,
    values: BTreeMap<String, Attribute>,
}

impl Attributes {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Attribute) {
        self.values.insert(name.into(), value);
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.values.get(name)
    }

    fn missing(&self, name: &str) -> BuildError {
        BuildError::MissingAttribute {
            tag: self.tag.clone(),
            attribute: name.to_string(),
        }
    }

    fn invalid(&self, name: &str, reason: impl Into<String>) -> BuildError {
        BuildError::InvalidAttribute {
            tag: self.tag.clone(),
            attribute: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn string(&self, name: &str) -> Result<String, BuildError> {
        self.get(name)
            .map(Attribute::raw)
            .ok_or_else(|| self.missing(name))
    }

    pub fn optional_string(&self, name: &str) -> Option<String> {
        self.get(name).map(Attribute::raw)
    }

    pub fn integer(&self, name: &str) -> Result<i64, BuildError> {
        match self.get(name) {
            Some(Attribute::Integer(i)) => Ok(*i),
            Some(other) => other
                .raw()
                .trim()
                .parse()
                .map_err(|_| self.invalid(name, "expected an integer")),
            None => Err(self.missing(name)),
        }
    }

    pub fn integer_or(&self, name: &str, default: i64) -> Result<i64, BuildError> {
        match self.get(name) {
            Some(_) => self.integer(name),
            None => Ok(default),
        }
    }

    pub fn count(&self, name: &str) -> Result<usize, BuildError> {
        let value = self.integer(name)?;
        usize::try_from(value).map_err(|_| self.invalid(name, "must not be negative"))
    }

    pub fn float(&self, name: &str) -> Result<f64, BuildError> {
        match self.get(name) {
            Some(Attribute::Float(f)) => Ok(*f),
            Some(Attribute::Integer(i)) => Ok(*i as f64),
            Some(other) => other
                .raw()
                .trim()
                .parse()
                .map_err(|_| self.invalid(name, "expected a number")),
            None => Err(self.missing(name)),
        }
    }

    pub fn float_or(&self, name: &str, default: f64) -> Result<f64, BuildError> {
        match self.get(name) {
            Some(_) => self.float(name),
            None => Ok(default),
        }
    }

    pub fn boolean_or(&self, name: &str, default: bool) -> Result<bool, BuildError> {
        match self.get(name) {
            Some(Attribute::Boolean(b)) => Ok(*b),
            Some(other) => match other.raw().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(name, "expected true or false")),
            },
            None => Ok(default),
        }
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(Attribute::List(items)) => items.clone(),
            Some(other) => other.raw().split_whitespace().map(String::from).collect(),
            None => Vec::new(),
        }
    }

    pub fn parsed<T>(&self, name: &str) -> Result<T, BuildError>
    where
        T: FromStr<Err = String>,
    {
        self.string(name)?
            .parse()
            .map_err(|e: String| self.invalid(name, e))
    }

    pub fn parsed_or<T>(&self, name: &str, default: T) -> Result<T, BuildError>
    where
        T: FromStr<Err = String>,
    {
        match self.get(name) {
            Some(_) => self.parsed(name),
            None => Ok(default),
        }
    }
}

const CONTAINER_ANY: Signature = Signature::new(CardinalitySet::CONTAINERS, BaseTypeSet::ALL);
const SINGLE_STRING: Signature = Signature::single(BaseTypeSet::STRING);
const SINGLE_DURATION: Signature = Signature::single(BaseTypeSet::DURATION);

fn spec(
    tag: &'static str,
    min_children: usize,
    max_children: Option<usize>,
    required: fn(usize) -> Signature,
    produced: Produced,
    build: fn(&Attributes) -> Result<ExprKind, BuildError>,
) -> ExpressionSpec {
    ExpressionSpec {
        tag,
        min_children,
        max_children,
        required,
        produced,
        variable: false,
        test_only: false,
        build,
    }
}

fn leaf(
    tag: &'static str,
    produced: Produced,
    build: fn(&Attributes) -> Result<ExprKind, BuildError>,
) -> ExpressionSpec {
    spec(tag, 0, Some(0), |_| Signature::ANY, produced, build)
}

fn variable(mut spec: ExpressionSpec) -> ExpressionSpec {
    spec.variable = true;
    spec
}

fn test_only(mut spec: ExpressionSpec) -> ExpressionSpec {
    spec.variable = true;
    spec.test_only = true;
    spec
}

fn item_filter(attrs: &Attributes) -> ItemFilter {
    ItemFilter {
        section: attrs.optional_string("section"),
        include_category: attrs.list("include_category"),
        exclude_category: attrs.list("exclude_category"),
    }
}

fn build_base_value(attrs: &Attributes) -> Result<ExprKind, BuildError> {
    let base_type: BaseType = attrs.parsed("base_type")?;
    let raw = attrs.string("value")?;
    let scalar = Scalar::parse(base_type, &raw)?;
    Ok(ExprKind::BaseValue(Value::Single(scalar)))
}

fn build_random_integer(attrs: &Attributes) -> Result<ExprKind, BuildError> {
    let min = attrs.integer_or("min", 0)?;
    let max = attrs.integer("max")?;
    let step = attrs.integer_or("step", 1)?;
    if step < 1 {
        return Err(BuildError::InvalidAttribute {
            tag: attrs.tag().to_string(),
            attribute: "step".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(ExprKind::RandomInteger { min, max, step })
}

fn build_pattern(attrs: &Attributes) -> Result<ExprKind, BuildError> {
    let pattern = attrs.string("pattern")?;
    let anchored = format!("^(?:{pattern})$");
    let pattern = Regex::new(&anchored).map_err(|e| BuildError::InvalidAttribute {
        tag: attrs.tag().to_string(),
        attribute: "pattern".into(),
        reason: e.to_string(),
    })?;
    Ok(ExprKind::PatternMatch { pattern })
}

fn build_equal(attrs: &Attributes) -> Result<ExprKind, BuildError> {
    use super::kind::ToleranceMode;

    let mode = attrs.parsed_or("tolerance_mode", ToleranceMode::Exact)?;
    let tolerance = match attrs.get("tolerance") {
        Some(Attribute::Float(f)) => (*f, *f),
        Some(Attribute::Integer(i)) => (*i as f64, *i as f64),
        Some(_) => {
            let parts = attrs
                .list("tolerance")
                .iter()
                .map(|p| p.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| BuildError::InvalidAttribute {
                    tag: attrs.tag().to_string(),
                    attribute: "tolerance".into(),
                    reason: e.to_string(),
                })?;
            match parts.as_slice() {
                [t] => (*t, *t),
                [lower, upper] => (*lower, *upper),
                _ => {
                    return Err(BuildError::InvalidAttribute {
                        tag: attrs.tag().to_string(),
                        attribute: "tolerance".into(),
                        reason: "expected one or two numbers".into(),
                    })
                }
            }
        }
        None if mode == ToleranceMode::Exact => (0.0, 0.0),
        None => return Err(BuildError::MissingAttribute {
            tag: attrs.tag().to_string(),
            attribute: "tolerance".into(),
        }),
    };
    Ok(ExprKind::Equal {
        mode,
        tolerance,
        include_lower: attrs.boolean_or("include_lower_bound", true)?,
        include_upper: attrs.boolean_or("include_upper_bound", true)?,
    })
}

fn rounding(attrs: &Attributes) -> Result<(super::kind::RoundingMode, u32), BuildError> {
    use super::kind::RoundingMode;

    let mode = attrs.parsed_or("rounding_mode", RoundingMode::SignificantFigures)?;
    let figures = attrs.count("figures")?;
    let figures = u32::try_from(figures).map_err(|_| BuildError::InvalidAttribute {
        tag: attrs.tag().to_string(),
        attribute: "figures".into(),
        reason: "too large".into(),
    })?;
    if mode == RoundingMode::SignificantFigures && figures == 0 {
        return Err(BuildError::InvalidAttribute {
            tag: attrs.tag().to_string(),
            attribute: "figures".into(),
            reason: "significant figures must be at least 1".into(),
        });
    }
    Ok((mode, figures))
}

fn build_test_variables(attrs: &Attributes) -> Result<ExprKind, BuildError> {
    let base_type = match attrs.get("base_type") {
        Some(_) => Some(attrs.parsed::<BaseType>("base_type")?),
        None => None,
    };
    Ok(ExprKind::TestVariables {
        identifier: attrs.string("identifier")?,
        base_type,
        filter: item_filter(attrs),
    })
}

fn build_number(attrs: &Attributes) -> Result<ExprKind, BuildError> {
    let what = match attrs.tag() {
        "numberSelected" => ItemCount::Selected,
        "numberPresented" => ItemCount::Presented,
        "numberResponded" => ItemCount::Responded,
        "numberCorrect" => ItemCount::Correct,
        "numberIncorrect" => ItemCount::Incorrect,
        other => {
            return Err(BuildError::InvalidAttribute {
                tag: other.to_string(),
                attribute: "tag".into(),
                reason: "not an item count".into(),
            })
        }
    };
    Ok(ExprKind::Number {
        what,
        filter: item_filter(attrs),
    })
}

fn builtin_specs() -> Vec<ExpressionSpec> {
    use Produced::*;

    let boolean = Fixed(Signature::SINGLE_BOOLEAN);

    vec![
        // literals and references
        leaf("baseValue", Literal, build_base_value),
        leaf("null", Literal, |_| Ok(ExprKind::Null)),
        variable(leaf("variable", Declared, |a| {
            Ok(ExprKind::Variable {
                identifier: a.string("identifier")?,
            })
        })),
        variable(leaf("correct", Declared, |a| {
            Ok(ExprKind::Correct {
                identifier: a.string("identifier")?,
            })
        })),
        variable(leaf("default", Declared, |a| {
            Ok(ExprKind::Default {
                identifier: a.string("identifier")?,
            })
        })),
        variable(leaf("mapResponse", Fixed(Signature::SINGLE_FLOAT), |a| {
            Ok(ExprKind::MapResponse {
                identifier: a.string("identifier")?,
            })
        })),
        // randomness
        variable(leaf(
            "randomInteger",
            Fixed(Signature::SINGLE_INTEGER),
            build_random_integer,
        )),
        variable(leaf("randomFloat", Fixed(Signature::SINGLE_FLOAT), |a| {
            Ok(ExprKind::RandomFloat {
                min: a.float_or("min", 0.0)?,
                max: a.float("max")?,
            })
        })),
        variable(spec(
            "random",
            1,
            Some(1),
            |_| CONTAINER_ANY,
            ChildBaseTypes(CardinalitySet::SINGLE),
            |_| Ok(ExprKind::Random),
        )),
        // containers
        spec(
            "multiple",
            0,
            None,
            |_| Signature::new(
                CardinalitySet::SINGLE.union(CardinalitySet::MULTIPLE),
                BaseTypeSet::ALL,
            ),
            ChildBaseTypes(CardinalitySet::MULTIPLE),
            |_| Ok(ExprKind::Multiple),
        ),
        spec(
            "ordered",
            0,
            None,
            |_| Signature::new(
                CardinalitySet::SINGLE.union(CardinalitySet::ORDERED),
                BaseTypeSet::ALL,
            ),
            ChildBaseTypes(CardinalitySet::ORDERED),
            |_| Ok(ExprKind::Ordered),
        ),
        spec(
            "containerSize",
            1,
            Some(1),
            |_| CONTAINER_ANY,
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::ContainerSize),
        ),
        spec("isNull", 1, Some(1), |_| Signature::ANY, boolean, |_| {
            Ok(ExprKind::IsNull)
        }),
        spec(
            "index",
            1,
            Some(1),
            |_| Signature::new(CardinalitySet::ORDERED, BaseTypeSet::ALL),
            ChildBaseTypes(CardinalitySet::SINGLE),
            |a| {
                let n = a.count("n")?;
                if n == 0 {
                    return Err(BuildError::InvalidAttribute {
                        tag: a.tag().to_string(),
                        attribute: "n".into(),
                        reason: "indices start at 1".into(),
                    });
                }
                Ok(ExprKind::Index { n })
            },
        ),
        spec(
            "fieldValue",
            1,
            Some(1),
            |_| Signature::new(CardinalitySet::RECORD, BaseTypeSet::ALL),
            Fixed(Signature::single(BaseTypeSet::ALL)),
            |a| {
                Ok(ExprKind::FieldValue {
                    field: a.string("field")?,
                })
            },
        ),
        spec(
            "member",
            2,
            Some(2),
            |pos| match pos {
                0 => Signature::single(BaseTypeSet::COMPARABLE),
                _ => Signature::new(CardinalitySet::CONTAINERS, BaseTypeSet::COMPARABLE),
            },
            boolean,
            |_| Ok(ExprKind::Member),
        ),
        spec(
            "delete",
            2,
            Some(2),
            |pos| match pos {
                0 => Signature::single(BaseTypeSet::COMPARABLE),
                _ => Signature::new(CardinalitySet::CONTAINERS, BaseTypeSet::COMPARABLE),
            },
            LastChildShape,
            |_| Ok(ExprKind::Delete),
        ),
        spec(
            "contains",
            2,
            Some(2),
            |_| Signature::new(CardinalitySet::CONTAINERS, BaseTypeSet::COMPARABLE),
            boolean,
            |_| Ok(ExprKind::Contains),
        ),
        spec("substring", 2, Some(2), |_| SINGLE_STRING, boolean, |a| {
            Ok(ExprKind::Substring {
                case_sensitive: a.boolean_or("case_sensitive", true)?,
            })
        }),
        // logic
        spec(
            "not",
            1,
            Some(1),
            |_| Signature::SINGLE_BOOLEAN,
            boolean,
            |_| Ok(ExprKind::Not),
        ),
        spec("and", 1, None, |_| Signature::SINGLE_BOOLEAN, boolean, |_| {
            Ok(ExprKind::And)
        }),
        spec("or", 1, None, |_| Signature::SINGLE_BOOLEAN, boolean, |_| {
            Ok(ExprKind::Or)
        }),
        spec("anyN", 1, None, |_| Signature::SINGLE_BOOLEAN, boolean, |a| {
            Ok(ExprKind::AnyN {
                min: a.count("min")?,
                max: a.count("max")?,
            })
        }),
        // comparison
        spec(
            "match",
            2,
            Some(2),
            |_| Signature::new(CardinalitySet::ALL, BaseTypeSet::COMPARABLE),
            boolean,
            |_| Ok(ExprKind::Match),
        ),
        spec("stringMatch", 2, Some(2), |_| SINGLE_STRING, boolean, |a| {
            Ok(ExprKind::StringMatch {
                case_sensitive: a.boolean_or("case_sensitive", true)?,
                substring: a.boolean_or("substring", false)?,
            })
        }),
        spec(
            "patternMatch",
            1,
            Some(1),
            |_| SINGLE_STRING,
            boolean,
            build_pattern,
        ),
        spec(
            "equal",
            2,
            Some(2),
            |_| Signature::SINGLE_NUMERIC,
            boolean,
            build_equal,
        ),
        spec(
            "equalRounded",
            2,
            Some(2),
            |_| Signature::SINGLE_NUMERIC,
            boolean,
            |a| {
                let (mode, figures) = rounding(a)?;
                Ok(ExprKind::EqualRounded { mode, figures })
            },
        ),
        spec("lt", 2, Some(2), |_| Signature::SINGLE_NUMERIC, boolean, |_| {
            Ok(ExprKind::Lt)
        }),
        spec("gt", 2, Some(2), |_| Signature::SINGLE_NUMERIC, boolean, |_| {
            Ok(ExprKind::Gt)
        }),
        spec("lte", 2, Some(2), |_| Signature::SINGLE_NUMERIC, boolean, |_| {
            Ok(ExprKind::Lte)
        }),
        spec("gte", 2, Some(2), |_| Signature::SINGLE_NUMERIC, boolean, |_| {
            Ok(ExprKind::Gte)
        }),
        spec("durationLT", 2, Some(2), |_| SINGLE_DURATION, boolean, |_| {
            Ok(ExprKind::DurationLt)
        }),
        spec("durationGTE", 2, Some(2), |_| SINGLE_DURATION, boolean, |_| {
            Ok(ExprKind::DurationGte)
        }),
        // arithmetic
        spec(
            "sum",
            1,
            None,
            |_| Signature::SINGLE_NUMERIC,
            Numeric(CardinalitySet::SINGLE),
            |_| Ok(ExprKind::Sum),
        ),
        spec(
            "product",
            1,
            None,
            |_| Signature::SINGLE_NUMERIC,
            Numeric(CardinalitySet::SINGLE),
            |_| Ok(ExprKind::Product),
        ),
        spec(
            "subtract",
            2,
            Some(2),
            |_| Signature::SINGLE_NUMERIC,
            Numeric(CardinalitySet::SINGLE),
            |_| Ok(ExprKind::Subtract),
        ),
        spec(
            "divide",
            2,
            Some(2),
            |_| Signature::SINGLE_NUMERIC,
            Fixed(Signature::SINGLE_FLOAT),
            |_| Ok(ExprKind::Divide),
        ),
        spec(
            "power",
            2,
            Some(2),
            |_| Signature::SINGLE_NUMERIC,
            Fixed(Signature::SINGLE_FLOAT),
            |_| Ok(ExprKind::Power),
        ),
        spec(
            "integerDivide",
            2,
            Some(2),
            |_| Signature::SINGLE_INTEGER,
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::IntegerDivide),
        ),
        spec(
            "integerModulus",
            2,
            Some(2),
            |_| Signature::SINGLE_INTEGER,
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::IntegerModulus),
        ),
        spec(
            "truncate",
            1,
            Some(1),
            |_| Signature::SINGLE_NUMERIC,
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::Truncate),
        ),
        spec(
            "round",
            1,
            Some(1),
            |_| Signature::SINGLE_NUMERIC,
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::Round),
        ),
        spec(
            "roundTo",
            1,
            Some(1),
            |_| Signature::SINGLE_NUMERIC,
            Fixed(Signature::SINGLE_FLOAT),
            |a| {
                let (mode, figures) = rounding(a)?;
                Ok(ExprKind::RoundTo { mode, figures })
            },
        ),
        spec(
            "integerToFloat",
            1,
            Some(1),
            |_| Signature::SINGLE_INTEGER,
            Fixed(Signature::SINGLE_FLOAT),
            |_| Ok(ExprKind::IntegerToFloat),
        ),
        spec(
            "min",
            1,
            None,
            |_| Signature::new(CardinalitySet::NOT_RECORD, BaseTypeSet::NUMERIC),
            Numeric(CardinalitySet::SINGLE),
            |_| Ok(ExprKind::Min),
        ),
        spec(
            "max",
            1,
            None,
            |_| Signature::new(CardinalitySet::NOT_RECORD, BaseTypeSet::NUMERIC),
            Numeric(CardinalitySet::SINGLE),
            |_| Ok(ExprKind::Max),
        ),
        spec(
            "gcd",
            1,
            None,
            |_| Signature::new(CardinalitySet::NOT_RECORD, BaseTypeSet::INTEGER),
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::Gcd),
        ),
        spec(
            "lcm",
            1,
            None,
            |_| Signature::new(CardinalitySet::NOT_RECORD, BaseTypeSet::INTEGER),
            Fixed(Signature::SINGLE_INTEGER),
            |_| Ok(ExprKind::Lcm),
        ),
        spec(
            "repeat",
            1,
            None,
            |_| Signature::new(
                CardinalitySet::SINGLE.union(CardinalitySet::ORDERED),
                BaseTypeSet::ALL,
            ),
            ChildBaseTypes(CardinalitySet::ORDERED),
            |a| {
                Ok(ExprKind::Repeat {
                    times: a.count("times")?,
                })
            },
        ),
        leaf("mathConstant", Fixed(Signature::SINGLE_FLOAT), |a| {
            Ok(ExprKind::MathConstant(a.parsed("name")?))
        }),
        spec(
            "mathOperator",
            1,
            Some(2),
            |_| Signature::SINGLE_NUMERIC,
            Fixed(Signature::SINGLE_FLOAT),
            |a| Ok(ExprKind::MathOperator(a.parsed("name")?)),
        ),
        // extension point; the builder never runs since resolution needs
        // the extension registry
        variable(spec(
            "customOperator",
            0,
            None,
            |_| Signature::ANY,
            Extension,
            |a| {
                Ok(ExprKind::Unsupported {
                    tag: a.optional_string("class").unwrap_or_else(|| a.tag().to_string()),
                })
            },
        )),
        // test level
        test_only(leaf(
            "testVariables",
            Fixed(Signature::SINGLE_NUMERIC),
            build_test_variables,
        )),
        test_only(leaf(
            "numberSelected",
            Fixed(Signature::SINGLE_INTEGER),
            build_number,
        )),
        test_only(leaf(
            "numberPresented",
            Fixed(Signature::SINGLE_INTEGER),
            build_number,
        )),
        test_only(leaf(
            "numberResponded",
            Fixed(Signature::SINGLE_INTEGER),
            build_number,
        )),
        test_only(leaf(
            "numberCorrect",
            Fixed(Signature::SINGLE_INTEGER),
            build_number,
        )),
        test_only(leaf(
            "numberIncorrect",
            Fixed(Signature::SINGLE_INTEGER),
            build_number,
        )),
    ]
}

static REGISTRY: LazyLock<HashMap<&'static str, ExpressionSpec>> = LazyLock::new(|| {
    builtin_specs()
        .into_iter()
        .map(|spec| (spec.tag, spec))
        .collect()
});

/// Look up the contract registered for a tag.
pub fn lookup(tag: &str) -> Option<&'static ExpressionSpec> {
    REGISTRY.get(tag)
}

/// Every registered tag, sorted.
pub fn tags() -> Vec<&'static str> {
    let mut tags: Vec<_> = REGISTRY.keys().copied().collect();
    tags.sort_unstable();
    tags
}

/// Build an expression kind from its tag and attributes.
///
/// Tags the registry does not know are offered to the extension registry
/// and otherwise become [`ExprKind::Unsupported`], so an unknown vendor tag
/// never stops a definition from loading.
pub fn build_kind(
    attrs: &Attributes,
    extensions: &dyn ExtensionRegistry,
) -> Result<ExprKind, BuildError> {
    let tag = attrs.tag();
    if tag == "customOperator" {
        let class = attrs.string("class")?;
        return Ok(resolve_extension(class, extensions));
    }
    match lookup(tag) {
        Some(spec) => (spec.build)(attrs),
        None => Ok(resolve_extension(tag.to_string(), extensions)),
    }
}

fn resolve_extension(class: String, extensions: &dyn ExtensionRegistry) -> ExprKind {
    match extensions.resolve(&class) {
        Some(operator) => ExprKind::Custom(CustomNode { class, operator }),
        None => ExprKind::Unsupported { tag: class },
    }
}

/// The declared shape of a literal payload.
pub(crate) fn literal_signature(value: &Value) -> Signature {
    match (value.cardinality(), value.base_type()) {
        (Some(Cardinality::Record), _) => {
            Signature::new(CardinalitySet::RECORD, BaseTypeSet::ALL)
        }
        (Some(cardinality), Some(base_type)) => {
            Signature::of_declaration(cardinality, Some(base_type))
        }
        _ => Signature::ANY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_its_tag() {
        for tag in tags() {
            let spec = lookup(tag).unwrap();
            assert_eq!(spec.tag, tag);
        }
        assert!(lookup("sum").is_some());
        assert!(lookup("numberCorrect").unwrap().test_only);
        assert!(lookup("variable").unwrap().variable);
        assert!(!lookup("sum").unwrap().variable);
    }

    #[test]
    fn arity_text() {
        assert_eq!(lookup("not").unwrap().arity_text(), "1");
        assert_eq!(lookup("mathOperator").unwrap().arity_text(), "1..2");
        assert_eq!(lookup("sum").unwrap().arity_text(), "at least 1");
        assert!(lookup("sum").unwrap().accepts(5));
        assert!(!lookup("sum").unwrap().accepts(0));
    }

    #[test]
    fn builds_base_value() {
        let attrs = Attributes::new("baseValue")
            .with("base_type", Attribute::String("integer".into()))
            .with("value", Attribute::Integer(7));
        let kind = build_kind(&attrs, &NoExtensions).unwrap();
        assert!(matches!(kind, ExprKind::BaseValue(v) if v == Value::integer(7)));
    }

    #[test]
    fn missing_attribute_is_a_build_error() {
        let attrs = Attributes::new("variable");
        let err = build_kind(&attrs, &NoExtensions).unwrap_err();
        assert!(matches!(err, BuildError::MissingAttribute { .. }));
    }

    #[test]
    fn unknown_tags_become_unsupported() {
        let kind = build_kind(&Attributes::new("vendorThing"), &NoExtensions).unwrap();
        assert!(matches!(kind, ExprKind::Unsupported { tag } if tag == "vendorThing"));
    }

    struct Double;

    impl CustomOperator for Double {
        fn produced(&self) -> Signature {
            Signature::SINGLE_INTEGER
        }

        fn evaluate(&self, args: &[Value]) -> Result<Value, String> {
            match args.first().and_then(|v| v.as_single()).and_then(Scalar::as_integer) {
                Some(i) => Ok(Value::integer(i * 2)),
                None => Err("expected an integer".into()),
            }
        }
    }

    #[test]
    fn extensions_resolve_custom_operators() {
        let mut extensions = ExtensionMap::new();
        extensions.register("com.example.double", Arc::new(Double));
        let attrs = Attributes::new("customOperator")
            .with("class", Attribute::String("com.example.double".into()));
        let kind = build_kind(&attrs, &extensions).unwrap();
        assert!(matches!(kind, ExprKind::Custom(node) if node.class == "com.example.double"));
    }

    #[test]
    fn pattern_is_anchored() {
        let attrs = Attributes::new("patternMatch").with("pattern", Attribute::String("a+".into()));
        match build_kind(&attrs, &NoExtensions).unwrap() {
            ExprKind::PatternMatch { pattern } => {
                assert!(pattern.is_match("aaa"));
                assert!(!pattern.is_match("baaa"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn equal_tolerance_list() {
        let attrs = Attributes::new("equal")
            .with("tolerance_mode", Attribute::String("absolute".into()))
            .with("tolerance", Attribute::String("0.1 0.2".into()));
        match build_kind(&attrs, &NoExtensions).unwrap() {
            ExprKind::Equal { tolerance, .. } => assert_eq!(tolerance, (0.1, 0.2)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
