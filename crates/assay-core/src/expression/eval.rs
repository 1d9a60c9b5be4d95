//! Validation and evaluation of expression trees.

use tracing::debug;

use crate::error::{DefinitionError, Diagnostic};
use crate::model::VariableClass;
use crate::random::RandomSource;
use crate::types::{numeric_aggregate, BaseTypeSet, Signature};
use crate::value::Value;

use super::kind::ExprKind;
use super::registry::{self, ExpressionSpec, Produced};
use super::{ops, Environment, ExprArena, ExprId, ExprNode, Pass};

/// Validates and evaluates expressions of one arena.
///
/// Validation runs top-down: every node intersects what its parent requires
/// with what it produces. A node that fails validation records a diagnostic
/// and evaluates to NULL; its parent still proceeds as if the child had
/// produced the required signature.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    arena: &'a ExprArena,
}

impl<'a> Evaluator<'a> {
    pub fn new(arena: &'a ExprArena) -> Self {
        Self { arena }
    }

    /// Validate the tree under `root` without evaluating it.
    pub fn validate(
        &self,
        root: ExprId,
        required: Signature,
        env: &dyn Environment,
        pass: &mut Pass,
    ) -> Option<Signature> {
        self.check(root, required, env, pass)
    }

    /// Validate then evaluate the tree under `root`.
    pub fn evaluate(
        &self,
        root: ExprId,
        required: Signature,
        env: &dyn Environment,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Value {
        self.eval_node(root, required, env, rng, pass)
    }

    /// Evaluate a condition; NULL counts as false.
    pub fn evaluate_condition(
        &self,
        root: ExprId,
        env: &dyn Environment,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> bool {
        self.evaluate(root, Signature::SINGLE_BOOLEAN, env, rng, pass)
            .as_bool()
            .unwrap_or(false)
    }

    fn check(
        &self,
        id: ExprId,
        required: Signature,
        env: &dyn Environment,
        pass: &mut Pass,
    ) -> Option<Signature> {
        let Some(node) = self.arena.get(id) else {
            pass.report(Diagnostic::new(
                Some(id),
                DefinitionError::Unsupported(format!("dangling expression {id}")),
            ));
            return None;
        };
        if !node.variable {
            if let Some(cached) = pass.checked(id) {
                return cached;
            }
        }
        let result = self.check_node(id, node, required, env, pass);
        if !node.variable {
            pass.record_check(id, result);
        }
        result
    }

    fn check_node(
        &self,
        id: ExprId,
        node: &ExprNode,
        required: Signature,
        env: &dyn Environment,
        pass: &mut Pass,
    ) -> Option<Signature> {
        let fail = |pass: &mut Pass, error: DefinitionError| -> Option<Signature> {
            pass.report(Diagnostic::new(Some(id), error));
            None
        };

        let tag = node.kind.tag();
        let spec = match (&node.kind, registry::lookup(tag)) {
            (ExprKind::Unsupported { .. }, _) | (_, None) => {
                return fail(pass, DefinitionError::Unsupported(tag.to_string()))
            }
            (_, Some(spec)) => spec,
        };

        if spec.test_only && !env.is_test_level() {
            return fail(pass, DefinitionError::TestOnly(tag.to_string()));
        }
        if !spec.accepts(node.children.len()) {
            return fail(
                pass,
                DefinitionError::Arity {
                    tag: tag.to_string(),
                    expected: spec.arity_text(),
                    found: node.children.len(),
                },
            );
        }
        if let Some(identifier) = node.kind.referenced_variable() {
            match env.declaration(identifier) {
                None => {
                    return fail(pass, DefinitionError::UnknownVariable(identifier.to_string()))
                }
                Some(declaration)
                    if matches!(
                        node.kind,
                        ExprKind::Correct { .. } | ExprKind::MapResponse { .. }
                    ) && declaration.class != VariableClass::Response =>
                {
                    return fail(
                        pass,
                        DefinitionError::WrongVariableClass {
                            identifier: identifier.to_string(),
                            expected: VariableClass::Response.to_string(),
                        },
                    )
                }
                Some(_) => {}
            }
        }

        let mut children = Vec::with_capacity(node.children.len());
        for (pos, child) in node.children.iter().enumerate() {
            let child_required = (spec.required)(pos);
            let signature = self
                .check(*child, child_required, env, pass)
                .unwrap_or(child_required);
            children.push(signature);
        }

        let produced = produced_signature(spec, node, &children, env)?;
        let narrowed = produced.intersect(required);
        if narrowed.is_empty() {
            return fail(
                pass,
                DefinitionError::TypeMismatch {
                    tag: tag.to_string(),
                    required,
                    produced,
                },
            );
        }
        Some(narrowed)
    }

    fn eval_node(
        &self,
        id: ExprId,
        required: Signature,
        env: &dyn Environment,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Value {
        let Some(node) = self.arena.get(id) else {
            self.check(id, required, env, pass);
            return Value::Null;
        };
        if !node.variable {
            if let Some(value) = pass.memoized(id) {
                return value.clone();
            }
        }
        let value = self.compute(id, node, required, env, rng, pass);
        if !node.variable {
            pass.memoize(id, value.clone());
        }
        value
    }

    fn compute(
        &self,
        id: ExprId,
        node: &ExprNode,
        required: Signature,
        env: &dyn Environment,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Value {
        if self.check(id, required, env, pass).is_none() {
            return Value::Null;
        }
        let Some(spec) = registry::lookup(node.kind.tag()) else {
            return Value::Null;
        };
        let mut args = Vec::with_capacity(node.children.len());
        for (pos, child) in node.children.iter().enumerate() {
            args.push(self.eval_node(*child, (spec.required)(pos), env, rng, pass));
        }
        match ops::apply(&node.kind, args, env, rng) {
            Ok(value) => value,
            Err(error) => {
                debug!(node = %id, tag = node.kind.tag(), %error, "expression evaluation failed");
                pass.report(Diagnostic::new(
                    Some(id),
                    DefinitionError::Runtime {
                        tag: node.kind.tag().to_string(),
                        reason: error.to_string(),
                    },
                ));
                Value::Null
            }
        }
    }
}

/// Base types every child can produce.
fn shared_base_types(children: &[Signature]) -> BaseTypeSet {
    children
        .iter()
        .fold(BaseTypeSet::ALL, |acc, child| acc.intersect(child.base_types))
}

fn produced_signature(
    spec: &ExpressionSpec,
    node: &ExprNode,
    children: &[Signature],
    env: &dyn Environment,
) -> Option<Signature> {
    match spec.produced {
        Produced::Fixed(signature) => Some(signature),
        Produced::Numeric(cardinalities) => {
            let operands: Vec<BaseTypeSet> = children.iter().map(|c| c.base_types).collect();
            Some(Signature::new(cardinalities, numeric_aggregate(&operands)))
        }
        Produced::ChildBaseTypes(cardinalities) => {
            Some(Signature::new(cardinalities, shared_base_types(children)))
        }
        Produced::LastChildShape => children
            .last()
            .map(|last| Signature::new(last.cardinalities, shared_base_types(children))),
        Produced::Literal => match &node.kind {
            ExprKind::BaseValue(value) => Some(registry::literal_signature(value)),
            _ => Some(Signature::ANY),
        },
        Produced::Declared => node
            .kind
            .referenced_variable()
            .and_then(|identifier| env.declaration(identifier))
            .map(|declaration| declaration.signature()),
        Produced::Extension => match &node.kind {
            ExprKind::Custom(custom) => Some(custom.operator.produced()),
            _ => Some(Signature::ANY),
        },
    }
}
