//! The closed set of expression kinds and their construction-time payloads.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;

use crate::value::{BaseType, Value};

use super::registry::CustomOperator;

/// How `equal` compares its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    Exact,
    Absolute,
    Relative,
}

impl FromStr for ToleranceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ToleranceMode::Exact),
            "absolute" => Ok(ToleranceMode::Absolute),
            "relative" => Ok(ToleranceMode::Relative),
            other => Err(format!("unknown tolerance mode: {other}")),
        }
    }
}

/// Rounding used by `equalRounded` and `roundTo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    SignificantFigures,
    DecimalPlaces,
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "significant_figures" | "significantFigures" => Ok(RoundingMode::SignificantFigures),
            "decimal_places" | "decimalPlaces" => Ok(RoundingMode::DecimalPlaces),
            other => Err(format!("unknown rounding mode: {other}")),
        }
    }
}

impl RoundingMode {
    pub fn round(self, x: f64, figures: u32) -> f64 {
        if !x.is_finite() || x == 0.0 {
            return x;
        }
        let digits = match self {
            RoundingMode::DecimalPlaces => figures as i32,
            RoundingMode::SignificantFigures => {
                figures as i32 - x.abs().log10().floor() as i32 - 1
            }
        };
        round_at(x, digits)
    }
}

/// Round to `digits` places after the decimal point; negative digits round
/// to tens, hundreds and so on.
fn round_at(x: f64, digits: i32) -> f64 {
    if digits >= 0 {
        let scale = 10f64.powi(digits);
        (x * scale).round() / scale
    } else {
        let scale = 10f64.powi(-digits);
        (x / scale).round() * scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathConstant {
    Pi,
    E,
}

impl FromStr for MathConstant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pi" => Ok(MathConstant::Pi),
            "e" => Ok(MathConstant::E),
            other => Err(format!("unknown constant: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Asin,
    Acos,
    Atan,
    Atan2,
    Asec,
    Acsc,
    Acot,
    Sinh,
    Cosh,
    Tanh,
    Sech,
    Csch,
    Coth,
    Log,
    Ln,
    Exp,
    Abs,
    Signum,
    Floor,
    Ceil,
    ToDegrees,
    ToRadians,
}

impl MathFunction {
    pub fn arity(self) -> usize {
        match self {
            MathFunction::Atan2 => 2,
            _ => 1,
        }
    }
}

impl FromStr for MathFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use MathFunction::*;
        Ok(match s {
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            "sec" => Sec,
            "csc" => Csc,
            "cot" => Cot,
            "asin" => Asin,
            "acos" => Acos,
            "atan" => Atan,
            "atan2" => Atan2,
            "asec" => Asec,
            "acsc" => Acsc,
            "acot" => Acot,
            "sinh" => Sinh,
            "cosh" => Cosh,
            "tanh" => Tanh,
            "sech" => Sech,
            "csch" => Csch,
            "coth" => Coth,
            "log" => Log,
            "ln" => Ln,
            "exp" => Exp,
            "abs" => Abs,
            "signum" => Signum,
            "floor" => Floor,
            "ceil" => Ceil,
            "toDegrees" | "to_degrees" => ToDegrees,
            "toRadians" | "to_radians" => ToRadians,
            other => return Err(format!("unknown math operator: {other}")),
        })
    }
}

/// Restricts test-level queries to part of the test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub section: Option<String>,
    pub include_category: Vec<String>,
    pub exclude_category: Vec<String>,
}

impl ItemFilter {
    pub fn matches(&self, sections: &[&str], categories: &[String]) -> bool {
        if let Some(section) = &self.section {
            if !sections.contains(&section.as_str()) {
                return false;
            }
        }
        if !self.include_category.is_empty()
            && !categories.iter().any(|c| self.include_category.contains(c))
        {
            return false;
        }
        !categories.iter().any(|c| self.exclude_category.contains(c))
    }
}

/// Which items a `number*` expression counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCount {
    Selected,
    Presented,
    Responded,
    Correct,
    Incorrect,
}

/// A test-level query answered by the environment.
#[derive(Debug, Clone, Copy)]
pub enum TestQuery<'a> {
    Count {
        what: ItemCount,
        filter: &'a ItemFilter,
    },
    /// Sum of one item variable across the matching items.
    Variables {
        identifier: &'a str,
        base_type: Option<BaseType>,
        filter: &'a ItemFilter,
    },
}

/// A resolved vendor operator.
#[derive(Clone)]
pub struct CustomNode {
    pub class: String,
    pub operator: Arc<dyn CustomOperator>,
}

impl fmt::Debug for CustomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomNode")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Every expression the engine knows, with attributes fixed at build time.
#[derive(Debug, Clone)]
pub enum ExprKind {
    BaseValue(Value),
    Null,
    Variable { identifier: String },
    Correct { identifier: String },
    Default { identifier: String },
    MapResponse { identifier: String },
    RandomInteger { min: i64, max: i64, step: i64 },
    RandomFloat { min: f64, max: f64 },
    Random,
    Multiple,
    Ordered,
    ContainerSize,
    IsNull,
    Index { n: usize },
    FieldValue { field: String },
    Member,
    Delete,
    Contains,
    Substring { case_sensitive: bool },
    Not,
    And,
    Or,
    AnyN { min: usize, max: usize },
    Match,
    StringMatch { case_sensitive: bool, substring: bool },
    PatternMatch { pattern: Regex },
    Equal {
        mode: ToleranceMode,
        tolerance: (f64, f64),
        include_lower: bool,
        include_upper: bool,
    },
    EqualRounded { mode: RoundingMode, figures: u32 },
    Lt,
    Gt,
    Lte,
    Gte,
    DurationLt,
    DurationGte,
    Sum,
    Product,
    Subtract,
    Divide,
    Power,
    IntegerDivide,
    IntegerModulus,
    Truncate,
    Round,
    RoundTo { mode: RoundingMode, figures: u32 },
    IntegerToFloat,
    Min,
    Max,
    Gcd,
    Lcm,
    Repeat { times: usize },
    MathConstant(MathConstant),
    MathOperator(MathFunction),
    Custom(CustomNode),
    /// A tag neither built in nor resolved by an extension.
    Unsupported { tag: String },
    TestVariables {
        identifier: String,
        base_type: Option<BaseType>,
        filter: ItemFilter,
    },
    Number { what: ItemCount, filter: ItemFilter },
}

impl ExprKind {
    /// The declarative tag this kind is registered under.
    pub fn tag(&self) -> &str {
        match self {
            ExprKind::BaseValue(_) => "baseValue",
            ExprKind::Null => "null",
            ExprKind::Variable { .. } => "variable",
            ExprKind::Correct { .. } => "correct",
            ExprKind::Default { .. } => "default",
            ExprKind::MapResponse { .. } => "mapResponse",
            ExprKind::RandomInteger { .. } => "randomInteger",
            ExprKind::RandomFloat { .. } => "randomFloat",
            ExprKind::Random => "random",
            ExprKind::Multiple => "multiple",
            ExprKind::Ordered => "ordered",
            ExprKind::ContainerSize => "containerSize",
            ExprKind::IsNull => "isNull",
            ExprKind::Index { .. } => "index",
            ExprKind::FieldValue { .. } => "fieldValue",
            ExprKind::Member => "member",
            ExprKind::Delete => "delete",
            ExprKind::Contains => "contains",
            ExprKind::Substring { .. } => "substring",
            ExprKind::Not => "not",
            ExprKind::And => "and",
            ExprKind::Or => "or",
            ExprKind::AnyN { .. } => "anyN",
            ExprKind::Match => "match",
            ExprKind::StringMatch { .. } => "stringMatch",
            ExprKind::PatternMatch { .. } => "patternMatch",
            ExprKind::Equal { .. } => "equal",
            ExprKind::EqualRounded { .. } => "equalRounded",
            ExprKind::Lt => "lt",
            ExprKind::Gt => "gt",
            ExprKind::Lte => "lte",
            ExprKind::Gte => "gte",
            ExprKind::DurationLt => "durationLT",
            ExprKind::DurationGte => "durationGTE",
            ExprKind::Sum => "sum",
            ExprKind::Product => "product",
            ExprKind::Subtract => "subtract",
            ExprKind::Divide => "divide",
            ExprKind::Power => "power",
            ExprKind::IntegerDivide => "integerDivide",
            ExprKind::IntegerModulus => "integerModulus",
            ExprKind::Truncate => "truncate",
            ExprKind::Round => "round",
            ExprKind::RoundTo { .. } => "roundTo",
            ExprKind::IntegerToFloat => "integerToFloat",
            ExprKind::Min => "min",
            ExprKind::Max => "max",
            ExprKind::Gcd => "gcd",
            ExprKind::Lcm => "lcm",
            ExprKind::Repeat { .. } => "repeat",
            ExprKind::MathConstant(_) => "mathConstant",
            ExprKind::MathOperator(_) => "mathOperator",
            ExprKind::Custom(_) => "customOperator",
            ExprKind::Unsupported { tag } => tag,
            ExprKind::TestVariables { .. } => "testVariables",
            ExprKind::Number { what, .. } => match what {
                ItemCount::Selected => "numberSelected",
                ItemCount::Presented => "numberPresented",
                ItemCount::Responded => "numberResponded",
                ItemCount::Correct => "numberCorrect",
                ItemCount::Incorrect => "numberIncorrect",
            },
        }
    }

    /// The variable identifier this kind reads, if any.
    pub fn referenced_variable(&self) -> Option<&str> {
        match self {
            ExprKind::Variable { identifier }
            | ExprKind::Correct { identifier }
            | ExprKind::Default { identifier }
            | ExprKind::MapResponse { identifier } => Some(identifier),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_figures() {
        let mode = RoundingMode::SignificantFigures;
        assert_eq!(mode.round(1234.5, 2), 1200.0);
        assert_eq!(mode.round(0.012345, 3), 0.0123);
        assert_eq!(mode.round(0.0, 3), 0.0);
    }

    #[test]
    fn decimal_places() {
        assert_eq!(RoundingMode::DecimalPlaces.round(3.14159, 2), 3.14);
        assert_eq!(RoundingMode::DecimalPlaces.round(2.5, 0), 3.0);
    }

    #[test]
    fn filters() {
        let filter = ItemFilter {
            section: Some("s1".into()),
            include_category: vec!["math".into()],
            exclude_category: vec!["bonus".into()],
        };
        assert!(filter.matches(&["s1"], &["math".into()]));
        assert!(!filter.matches(&["s2"], &["math".into()]));
        assert!(!filter.matches(&["s1"], &["math".into(), "bonus".into()]));
        assert!(!filter.matches(&["s1"], &[]));
        assert!(ItemFilter::default().matches(&[], &[]));
    }
}
