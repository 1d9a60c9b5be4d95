//! Error and diagnostic types.
//!
//! Definition problems never abort evaluation. They are collected as
//! [`Diagnostic`]s next to the (possibly NULL) result so callers decide
//! what to do with them.

use std::fmt;

use thiserror::Error;

use crate::expression::ExprId;
use crate::types::Signature;
use crate::value::BaseType;

/// Failures converting text into typed values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot parse '{raw}' as {base_type}")]
    Unparseable { base_type: BaseType, raw: String },

    #[error("{0} values cannot be written as text")]
    NotTextual(BaseType),

    #[error("single cardinality takes at most one value, got {0}")]
    TooManyValues(usize),

    #[error("record values cannot be built from a plain list")]
    RecordFromList,
}

/// Failures constructing an expression node from its declarative form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("<{tag}> is missing attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },

    #[error("<{tag}> has invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        reason: String,
    },

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Problems with the definition itself, reported as diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("'{identifier}' is not a {expected} variable")]
    WrongVariableClass { identifier: String, expected: String },

    #[error("<{tag}> takes {expected} children but has {found}")]
    Arity {
        tag: String,
        expected: String,
        found: usize,
    },

    #[error("<{tag}> produces {produced} where {required} is required")]
    TypeMismatch {
        tag: String,
        required: Signature,
        produced: Signature,
    },

    #[error("unsupported expression <{0}>")]
    Unsupported(String),

    #[error("<{0}> is only available in test-level processing")]
    TestOnly(String),

    #[error("<{tag}> failed: {reason}")]
    Runtime { tag: String, reason: String },

    #[error("value {value} cannot be assigned to '{identifier}'")]
    Assignment { identifier: String, value: String },
}

/// A definition error located at an expression node, if there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub node: Option<ExprId>,
    pub error: DefinitionError,
}

impl Diagnostic {
    pub fn new(node: Option<ExprId>, error: DefinitionError) -> Self {
        Self { node, error }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(f, "[{node}] {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}
