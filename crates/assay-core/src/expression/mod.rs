//! The expression engine.
//!
//! Expressions are stored in an [`ExprArena`] owned by the definition they
//! belong to and addressed by [`ExprId`]. Nodes are immutable once built;
//! everything computed while evaluating (validated signatures, memoized
//! values, diagnostics) lives in a [`Pass`] owned by the caller, so the same
//! definition can be evaluated by many attempts at once.

pub mod eval;
pub mod kind;
pub mod ops;
pub mod registry;

use std::collections::HashMap;
use std::fmt;

use crate::error::{BuildError, Diagnostic};
use crate::model::{Mapping, VariableDeclaration};
use crate::types::Signature;
use crate::value::Value;

pub use eval::Evaluator;
pub use kind::{ExprKind, ItemCount, ItemFilter, TestQuery};
pub use registry::{
    Attribute, Attributes, CustomOperator, ExtensionMap, ExtensionRegistry, NoExtensions,
};

/// Handle to a node in an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub children: Vec<ExprId>,
    /// Set when this node or any descendant must be re-read on every use.
    pub variable: bool,
}

/// Owns the expression nodes of one definition.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node over already-added children.
    pub fn add(&mut self, kind: ExprKind, children: Vec<ExprId>) -> ExprId {
        let own = match &kind {
            ExprKind::Custom(_) => true,
            ExprKind::Unsupported { .. } => false,
            other => registry::lookup(other.tag()).is_some_and(|spec| spec.variable),
        };
        let variable = own
            || children
                .iter()
                .any(|c| self.get(*c).is_some_and(|n| n.variable));
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(ExprNode {
            kind,
            children,
            variable,
        });
        id
    }

    /// Build a node from its declarative tag and attributes.
    pub fn build(
        &mut self,
        attrs: &Attributes,
        children: Vec<ExprId>,
        extensions: &dyn ExtensionRegistry,
    ) -> Result<ExprId, BuildError> {
        let kind = registry::build_kind(attrs, extensions)?;
        Ok(self.add(kind, children))
    }

    pub fn get(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &ExprNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ExprId(i as u32), node))
    }

    pub fn base_value(&mut self, value: Value) -> ExprId {
        self.add(ExprKind::BaseValue(value), Vec::new())
    }

    pub fn variable(&mut self, identifier: impl Into<String>) -> ExprId {
        self.add(
            ExprKind::Variable {
                identifier: identifier.into(),
            },
            Vec::new(),
        )
    }

    pub fn correct(&mut self, identifier: impl Into<String>) -> ExprId {
        self.add(
            ExprKind::Correct {
                identifier: identifier.into(),
            },
            Vec::new(),
        )
    }
}

/// Read access to the variables an expression may reference.
pub trait Environment {
    fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration>;

    /// Current value; NULL when unset.
    fn value(&self, identifier: &str) -> Value;

    /// Default value, honouring per-attempt overrides.
    fn default_value(&self, identifier: &str) -> Value;

    /// Correct response, honouring per-attempt overrides.
    fn correct_response(&self, identifier: &str) -> Value;

    fn mapping(&self, identifier: &str) -> Option<&Mapping> {
        self.declaration(identifier)
            .and_then(|d| d.mapping.as_ref())
    }

    /// Answer a test-level query; item-level environments answer none.
    fn test_query(&self, _query: &TestQuery<'_>) -> Option<Value> {
        None
    }

    fn is_test_level(&self) -> bool {
        false
    }
}

/// Everything one evaluation pass computes.
#[derive(Debug, Default)]
pub struct Pass {
    memo: HashMap<ExprId, Value>,
    checked: HashMap<ExprId, Option<Signature>>,
    diagnostics: Vec<Diagnostic>,
}

impl Pass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic unless an identical one is already present.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub(crate) fn memoized(&self, id: ExprId) -> Option<&Value> {
        self.memo.get(&id)
    }

    pub(crate) fn memoize(&mut self, id: ExprId, value: Value) {
        self.memo.insert(id, value);
    }

    pub(crate) fn checked(&self, id: ExprId) -> Option<Option<Signature>> {
        self.checked.get(&id).copied()
    }

    pub(crate) fn record_check(&mut self, id: ExprId, result: Option<Signature>) {
        self.checked.insert(id, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn variable_flag_propagates_to_ancestors() {
        let mut arena = ExprArena::new();
        let literal = arena.base_value(Value::integer(1));
        let var = arena.variable("X");
        let sum = arena.add(ExprKind::Sum, vec![literal, var]);
        let stable = arena.add(ExprKind::Sum, vec![literal, literal]);
        assert!(!arena.get(literal).unwrap().variable);
        assert!(arena.get(var).unwrap().variable);
        assert!(arena.get(sum).unwrap().variable);
        assert!(!arena.get(stable).unwrap().variable);
    }

    #[test]
    fn diagnostics_are_deduplicated() {
        let mut pass = Pass::new();
        let diag = Diagnostic::new(
            Some(ExprId(0)),
            crate::error::DefinitionError::UnknownVariable("X".into()),
        );
        pass.report(diag.clone());
        pass.report(diag);
        assert_eq!(pass.diagnostics().len(), 1);
    }
}
