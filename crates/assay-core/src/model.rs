//! Declarative item model.
//!
//! These types are the read-only definition an attempt is evaluated against:
//! variable declarations, interactions, and the processing rule lists. They
//! are built once (usually by [`crate::parser`]) and shared between attempts.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::expression::ExprArena;
use crate::rules::{ResponseRule, TemplateRule};
use crate::types::{BaseTypeSet, Signature};
use crate::value::{BaseType, Cardinality, Scalar, Value};

/// Built-in response variable counting attempts.
pub const NUM_ATTEMPTS: &str = "numAttempts";
/// Built-in response variable accumulating time spent, in seconds.
pub const DURATION: &str = "duration";
/// Built-in outcome variable tracking completion.
pub const COMPLETION_STATUS: &str = "completionStatus";

pub const STATUS_NOT_ATTEMPTED: &str = "not_attempted";
pub const STATUS_UNKNOWN: &str = "unknown";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_INCOMPLETE: &str = "incomplete";

/// Which phase owns a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableClass {
    Template,
    Response,
    Outcome,
}

impl std::fmt::Display for VariableClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableClass::Template => write!(f, "template"),
            VariableClass::Response => write!(f, "response"),
            VariableClass::Outcome => write!(f, "outcome"),
        }
    }
}

impl std::str::FromStr for VariableClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "template" => Ok(VariableClass::Template),
            "response" => Ok(VariableClass::Response),
            "outcome" => Ok(VariableClass::Outcome),
            other => Err(format!("unknown variable class: {other}")),
        }
    }
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub identifier: String,
    pub class: VariableClass,
    pub cardinality: Cardinality,
    /// `None` only for records.
    pub base_type: Option<BaseType>,
    pub default_value: Option<Value>,
    /// Response variables only.
    pub correct_response: Option<Value>,
    /// Response variables only; drives `mapResponse`.
    pub mapping: Option<Mapping>,
}

impl VariableDeclaration {
    pub fn new(
        identifier: impl Into<String>,
        class: VariableClass,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            class,
            cardinality,
            base_type,
            default_value: None,
            correct_response: None,
            mapping: None,
        }
    }

    pub fn template(identifier: impl Into<String>, cardinality: Cardinality, base_type: BaseType) -> Self {
        Self::new(identifier, VariableClass::Template, cardinality, Some(base_type))
    }

    pub fn response(identifier: impl Into<String>, cardinality: Cardinality, base_type: BaseType) -> Self {
        Self::new(identifier, VariableClass::Response, cardinality, Some(base_type))
    }

    pub fn outcome(identifier: impl Into<String>, cardinality: Cardinality, base_type: BaseType) -> Self {
        Self::new(identifier, VariableClass::Outcome, cardinality, Some(base_type))
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_correct(mut self, value: Value) -> Self {
        self.correct_response = Some(value);
        self
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn signature(&self) -> Signature {
        Signature::of_declaration(self.cardinality, self.base_type)
    }

    /// What an expression assigned to this variable may produce. Float
    /// variables also accept integers, which are widened on assignment.
    pub fn assignment_signature(&self) -> Signature {
        let mut signature = self.signature();
        if self.base_type == Some(BaseType::Float) {
            signature.base_types = BaseTypeSet::NUMERIC;
        }
        signature
    }

    /// Bring a computed value into the declared shape, or `None` if it
    /// cannot be stored here.
    pub fn conform(&self, value: Value) -> Option<Value> {
        let value = if self.base_type == Some(BaseType::Float) {
            value.widen_to_float()
        } else {
            value
        };
        if value.fits(self.cardinality, self.base_type) {
            Some(value)
        } else {
            None
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(
            self.identifier.as_str(),
            NUM_ATTEMPTS | DURATION | COMPLETION_STATUS
        )
    }
}

/// One `key -> value` entry of a response mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Scalar,
    pub value: f64,
}

/// Maps response values to scores for `mapResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub entries: Vec<MapEntry>,
    pub default_value: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub case_sensitive: bool,
}

impl Default for Mapping {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            default_value: 0.0,
            lower_bound: None,
            upper_bound: None,
            case_sensitive: true,
        }
    }
}

impl Mapping {
    fn lookup(&self, key: &Scalar) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| match (&entry.key, key) {
                (Scalar::String(a), Scalar::String(b)) if !self.case_sensitive => {
                    a.to_lowercase() == b.to_lowercase()
                }
                (a, b) => a == b,
            })
            .map(|entry| entry.value)
    }

    /// Score a response. Containers sum the mapped value of each distinct
    /// element once; the total is clamped to the declared bounds.
    pub fn map(&self, response: &Value) -> f64 {
        let raw = match response {
            Value::Single(scalar) => self.lookup(scalar).unwrap_or(self.default_value),
            Value::Null => self.default_value,
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => {
                let mut seen: Vec<&Scalar> = Vec::new();
                let mut total = 0.0;
                for value in values {
                    if seen.contains(&value) {
                        continue;
                    }
                    seen.push(value);
                    total += self.lookup(value).unwrap_or(self.default_value);
                }
                total
            }
            Value::Record(_) => self.default_value,
        };
        let raw = self.lower_bound.map_or(raw, |lower| raw.max(lower));
        self.upper_bound.map_or(raw, |upper| raw.min(upper))
    }
}

/// A selectable option of a choice or order interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub identifier: String,
    /// Keeps its position when the interaction shuffles.
    pub fixed: bool,
}

impl Choice {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fixed: false,
        }
    }

    pub fn fixed(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fixed: true,
        }
    }
}

/// A text-entry pattern, compiled once and matched against the whole response.
#[derive(Debug, Clone)]
pub struct PatternMask {
    source: String,
    pattern: Regex,
}

impl PatternMask {
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let pattern = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self { source, pattern })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

impl PartialEq for PatternMask {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionKind {
    Choice {
        choices: Vec<Choice>,
        shuffle: bool,
        min_choices: usize,
        /// Zero means unbounded.
        max_choices: usize,
    },
    Order {
        choices: Vec<Choice>,
        shuffle: bool,
    },
    TextEntry {
        pattern_mask: Option<PatternMask>,
    },
    Slider {
        lower_bound: f64,
        upper_bound: f64,
    },
    EndAttempt {
        count_attempt: bool,
    },
}

/// A candidate-facing control bound to one response variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub response_identifier: String,
    pub kind: InteractionKind,
}

impl Interaction {
    pub fn new(response_identifier: impl Into<String>, kind: InteractionKind) -> Self {
        Self {
            response_identifier: response_identifier.into(),
            kind,
        }
    }

    /// Choices subject to per-attempt shuffling, if any.
    pub fn shuffled_choices(&self) -> Option<&[Choice]> {
        match &self.kind {
            InteractionKind::Choice {
                choices,
                shuffle: true,
                ..
            }
            | InteractionKind::Order {
                choices,
                shuffle: true,
            } => Some(choices),
            _ => None,
        }
    }
}

/// A complete item definition.
#[derive(Debug, Clone)]
pub struct ItemDefinition {
    pub identifier: String,
    pub title: String,
    /// Adaptive items keep outcome values between attempts.
    pub adaptive: bool,
    pub declarations: Vec<VariableDeclaration>,
    pub interactions: Vec<Interaction>,
    pub template_processing: Vec<TemplateRule>,
    pub response_processing: Vec<ResponseRule>,
    pub expressions: ExprArena,
}

impl ItemDefinition {
    /// A new item carrying the built-in variables.
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        let declarations = vec![
            VariableDeclaration::response(NUM_ATTEMPTS, Cardinality::Single, BaseType::Integer)
                .with_default(Value::integer(0)),
            VariableDeclaration::response(DURATION, Cardinality::Single, BaseType::Float)
                .with_default(Value::float(0.0)),
            VariableDeclaration::outcome(
                COMPLETION_STATUS,
                Cardinality::Single,
                BaseType::Identifier,
            )
            .with_default(Value::identifier(STATUS_NOT_ATTEMPTED)),
        ];
        Self {
            identifier: identifier.into(),
            title: title.into(),
            adaptive: false,
            declarations,
            interactions: Vec::new(),
            template_processing: Vec::new(),
            response_processing: Vec::new(),
            expressions: ExprArena::default(),
        }
    }

    /// Add a declaration, replacing any existing one with the same identifier.
    pub fn declare(&mut self, declaration: VariableDeclaration) -> &mut Self {
        match self
            .declarations
            .iter_mut()
            .find(|d| d.identifier == declaration.identifier)
        {
            Some(existing) => *existing = declaration,
            None => self.declarations.push(declaration),
        }
        self
    }

    pub fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        self.declarations
            .iter()
            .find(|d| d.identifier == identifier)
    }

    pub fn declarations_of(
        &self,
        class: VariableClass,
    ) -> impl Iterator<Item = &VariableDeclaration> {
        self.declarations.iter().filter(move |d| d.class == class)
    }

    pub fn interaction_for(&self, response_identifier: &str) -> Option<&Interaction> {
        self.interactions
            .iter()
            .find(|i| i.response_identifier == response_identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_declared() {
        let item = ItemDefinition::new("q1", "Question 1");
        assert!(item.declaration(NUM_ATTEMPTS).is_some());
        assert!(item.declaration(DURATION).is_some());
        let status = item.declaration(COMPLETION_STATUS).unwrap();
        assert_eq!(status.class, VariableClass::Outcome);
        assert!(status.is_builtin());
    }

    #[test]
    fn declare_replaces_by_identifier() {
        let mut item = ItemDefinition::new("q1", "Question 1");
        item.declare(VariableDeclaration::outcome(
            "SCORE",
            Cardinality::Single,
            BaseType::Integer,
        ));
        item.declare(VariableDeclaration::outcome(
            "SCORE",
            Cardinality::Single,
            BaseType::Float,
        ));
        let scores: Vec<_> = item
            .declarations
            .iter()
            .filter(|d| d.identifier == "SCORE")
            .collect();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].base_type, Some(BaseType::Float));
    }

    #[test]
    fn float_declarations_accept_integers() {
        let decl = VariableDeclaration::outcome("SCORE", Cardinality::Single, BaseType::Float);
        assert!(decl
            .assignment_signature()
            .base_types
            .contains(BaseType::Integer));
        assert_eq!(decl.conform(Value::integer(2)), Some(Value::float(2.0)));
        assert_eq!(decl.conform(Value::string("x")), None);
    }

    #[test]
    fn mapping_sums_distinct_elements_and_clamps() {
        let mapping = Mapping {
            entries: vec![
                MapEntry {
                    key: Scalar::Identifier("A".into()),
                    value: 2.0,
                },
                MapEntry {
                    key: Scalar::Identifier("B".into()),
                    value: 1.5,
                },
            ],
            default_value: -1.0,
            lower_bound: Some(0.0),
            upper_bound: Some(3.0),
            case_sensitive: true,
        };
        let ids = |v: &[&str]| {
            Value::multiple(
                BaseType::Identifier,
                v.iter().map(|s| Scalar::Identifier(s.to_string())),
            )
        };
        assert_eq!(mapping.map(&ids(&["A", "A"])), 2.0);
        assert_eq!(mapping.map(&ids(&["A", "B"])), 3.0);
        assert_eq!(mapping.map(&ids(&["C"])), 0.0);
        assert_eq!(mapping.map(&Value::identifier("B")), 1.5);
    }

    #[test]
    fn case_insensitive_string_keys() {
        let mapping = Mapping {
            entries: vec![MapEntry {
                key: Scalar::String("Paris".into()),
                value: 1.0,
            }],
            case_sensitive: false,
            ..Default::default()
        };
        assert_eq!(mapping.map(&Value::string("PARIS")), 1.0);
    }
}
