//! Static validation of whole definitions.
//!
//! Walks every rule and checks its expression against the signature the
//! rule requires, without evaluating anything. Problems come back as the
//! same [`Diagnostic`]s evaluation would report.

use crate::assessment::TestDefinition;
use crate::error::{DefinitionError, Diagnostic};
use crate::expression::{Environment, Evaluator, ExprId, Pass};
use crate::model::{ItemDefinition, VariableClass, VariableDeclaration};
use crate::rules::{Condition, OutcomeRule, ResponseRule, TemplateRule};
use crate::types::Signature;
use crate::value::Value;

/// Declarations of one item, with no values.
pub struct ItemScope<'a>(pub &'a ItemDefinition);

impl Environment for ItemScope<'_> {
    fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        self.0.declaration(identifier)
    }

    fn value(&self, _identifier: &str) -> Value {
        Value::Null
    }

    fn default_value(&self, identifier: &str) -> Value {
        self.declaration(identifier)
            .and_then(|d| d.default_value.clone())
            .unwrap_or_default()
    }

    fn correct_response(&self, identifier: &str) -> Value {
        self.declaration(identifier)
            .and_then(|d| d.correct_response.clone())
            .unwrap_or_default()
    }
}

/// Declarations visible to test-level outcome processing.
pub struct TestScope<'a>(pub &'a TestDefinition);

impl Environment for TestScope<'_> {
    fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        self.0.resolve_declaration(identifier)
    }

    fn value(&self, _identifier: &str) -> Value {
        Value::Null
    }

    fn default_value(&self, identifier: &str) -> Value {
        self.declaration(identifier)
            .and_then(|d| d.default_value.clone())
            .unwrap_or_default()
    }

    fn correct_response(&self, identifier: &str) -> Value {
        self.declaration(identifier)
            .and_then(|d| d.correct_response.clone())
            .unwrap_or_default()
    }

    fn is_test_level(&self) -> bool {
        true
    }
}

struct Walker<'a> {
    evaluator: Evaluator<'a>,
    env: &'a dyn Environment,
    pass: Pass,
}

impl Walker<'_> {
    fn expression(&mut self, id: ExprId, required: Signature) {
        self.evaluator.validate(id, required, self.env, &mut self.pass);
    }

    /// Check an assignment target and its expression.
    fn assignment(&mut self, identifier: &str, classes: &[VariableClass], expression: ExprId) {
        let required = match self.env.declaration(identifier) {
            None => {
                self.pass.report(Diagnostic::new(
                    None,
                    DefinitionError::UnknownVariable(identifier.to_string()),
                ));
                Signature::ANY
            }
            Some(declaration) if !classes.contains(&declaration.class) => {
                let expected: Vec<String> = classes.iter().map(ToString::to_string).collect();
                self.pass.report(Diagnostic::new(
                    None,
                    DefinitionError::WrongVariableClass {
                        identifier: identifier.to_string(),
                        expected: expected.join(" or "),
                    },
                ));
                declaration.assignment_signature()
            }
            Some(declaration) => declaration.assignment_signature(),
        };
        self.expression(expression, required);
    }

    fn condition<R>(&mut self, condition: &Condition<R>, mut rule: impl FnMut(&mut Self, &R)) {
        for branch in &condition.branches {
            self.expression(branch.when, Signature::SINGLE_BOOLEAN);
            for r in &branch.rules {
                rule(self, r);
            }
        }
        for r in &condition.otherwise {
            rule(self, r);
        }
    }

    fn template_rule(&mut self, rule: &TemplateRule) {
        match rule {
            TemplateRule::SetTemplateValue {
                identifier,
                expression,
            } => self.assignment(identifier, &[VariableClass::Template], *expression),
            TemplateRule::SetDefaultValue {
                identifier,
                expression,
            } => self.assignment(
                identifier,
                &[VariableClass::Response, VariableClass::Outcome],
                *expression,
            ),
            TemplateRule::SetCorrectResponse {
                identifier,
                expression,
            } => self.assignment(identifier, &[VariableClass::Response], *expression),
            TemplateRule::Condition(condition) => {
                self.condition(condition, |walker, r| walker.template_rule(r))
            }
            TemplateRule::Constraint(expression) => {
                self.expression(*expression, Signature::SINGLE_BOOLEAN)
            }
            TemplateRule::Exit => {}
        }
    }

    fn response_rule(&mut self, rule: &ResponseRule) {
        match rule {
            ResponseRule::SetOutcomeValue {
                identifier,
                expression,
            } => self.assignment(identifier, &[VariableClass::Outcome], *expression),
            ResponseRule::Condition(condition) => {
                self.condition(condition, |walker, r| walker.response_rule(r))
            }
            ResponseRule::Fragment(rules) => {
                for r in rules {
                    self.response_rule(r);
                }
            }
            ResponseRule::Exit => {}
        }
    }

    fn outcome_rule(&mut self, rule: &OutcomeRule) {
        match rule {
            OutcomeRule::SetOutcomeValue {
                identifier,
                expression,
            } => self.assignment(identifier, &[VariableClass::Outcome], *expression),
            OutcomeRule::Condition(condition) => {
                self.condition(condition, |walker, r| walker.outcome_rule(r))
            }
            OutcomeRule::Exit => {}
        }
    }
}

fn declaration_diagnostics(declarations: &[VariableDeclaration], pass: &mut Pass) {
    for declaration in declarations {
        let values = [&declaration.default_value, &declaration.correct_response];
        for value in values.into_iter().flatten() {
            if !value.fits(declaration.cardinality, declaration.base_type) {
                pass.report(Diagnostic::new(
                    None,
                    DefinitionError::Assignment {
                        identifier: declaration.identifier.clone(),
                        value: value.to_string(),
                    },
                ));
            }
        }
    }
}

/// Validate every rule and interaction of an item.
pub fn validate_item(item: &ItemDefinition) -> Vec<Diagnostic> {
    let scope = ItemScope(item);
    let mut walker = Walker {
        evaluator: Evaluator::new(&item.expressions),
        env: &scope,
        pass: Pass::new(),
    };
    declaration_diagnostics(&item.declarations, &mut walker.pass);
    for interaction in &item.interactions {
        let identifier = &interaction.response_identifier;
        match item.declaration(identifier) {
            None => walker.pass.report(Diagnostic::new(
                None,
                DefinitionError::UnknownVariable(identifier.clone()),
            )),
            Some(d) if d.class != VariableClass::Response => {
                walker.pass.report(Diagnostic::new(
                    None,
                    DefinitionError::WrongVariableClass {
                        identifier: identifier.clone(),
                        expected: VariableClass::Response.to_string(),
                    },
                ))
            }
            Some(_) => {}
        }
    }
    for rule in &item.template_processing {
        walker.template_rule(rule);
    }
    for rule in &item.response_processing {
        walker.response_rule(rule);
    }
    walker.pass.into_diagnostics()
}

/// Validate test-level outcome processing. Items are validated separately.
pub fn validate_test(test: &TestDefinition) -> Vec<Diagnostic> {
    let scope = TestScope(test);
    let mut walker = Walker {
        evaluator: Evaluator::new(&test.expressions),
        env: &scope,
        pass: Pass::new(),
    };
    declaration_diagnostics(&test.declarations, &mut walker.pass);
    for rule in &test.outcome_processing {
        walker.outcome_rule(rule);
    }
    walker.pass.into_diagnostics()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExprKind;
    use crate::templates::{apply_template, ResponseTemplate, RESPONSE};
    use crate::value::{BaseType, Cardinality};

    fn item_with_response() -> ItemDefinition {
        let mut item = ItemDefinition::new("q", "Q");
        item.declare(
            VariableDeclaration::response(RESPONSE, Cardinality::Single, BaseType::Identifier)
                .with_correct(Value::identifier("A")),
        );
        item
    }

    #[test]
    fn template_items_are_clean() {
        let mut item = item_with_response();
        apply_template(&mut item, ResponseTemplate::MatchCorrect);
        assert!(validate_item(&item).is_empty());
    }

    #[test]
    fn unknown_variable_is_reported() {
        let mut item = item_with_response();
        item.declare(VariableDeclaration::outcome(
            "SCORE",
            Cardinality::Single,
            BaseType::Float,
        ));
        let missing = item.expressions.variable("NOPE");
        item.response_processing.push(ResponseRule::SetOutcomeValue {
            identifier: "SCORE".into(),
            expression: missing,
        });
        let diagnostics = validate_item(&item);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0].error,
            DefinitionError::UnknownVariable(id) if id == "NOPE"
        ));
    }

    #[test]
    fn type_mismatch_is_reported_without_failing_the_parent() {
        let mut item = item_with_response();
        item.declare(VariableDeclaration::outcome(
            "SCORE",
            Cardinality::Single,
            BaseType::Float,
        ));
        let text = item.expressions.base_value(Value::string("x"));
        let one = item.expressions.base_value(Value::integer(1));
        let sum = item.expressions.add(ExprKind::Sum, vec![text, one]);
        item.response_processing.push(ResponseRule::SetOutcomeValue {
            identifier: "SCORE".into(),
            expression: sum,
        });
        let diagnostics = validate_item(&item);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].node, Some(text));
        assert!(matches!(
            diagnostics[0].error,
            DefinitionError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn assignment_to_wrong_class() {
        let mut item = item_with_response();
        let one = item.expressions.base_value(Value::identifier("B"));
        item.response_processing.push(ResponseRule::SetOutcomeValue {
            identifier: RESPONSE.into(),
            expression: one,
        });
        let diagnostics = validate_item(&item);
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d.error, DefinitionError::WrongVariableClass { .. })));
    }

    #[test]
    fn test_only_expressions_are_rejected_in_items() {
        let mut item = item_with_response();
        item.declare(VariableDeclaration::outcome(
            "SCORE",
            Cardinality::Single,
            BaseType::Integer,
        ));
        let count = item.expressions.add(
            ExprKind::Number {
                what: crate::expression::ItemCount::Correct,
                filter: Default::default(),
            },
            Vec::new(),
        );
        item.response_processing.push(ResponseRule::SetOutcomeValue {
            identifier: "SCORE".into(),
            expression: count,
        });
        let diagnostics = validate_item(&item);
        assert!(matches!(diagnostics[0].error, DefinitionError::TestOnly(_)));
    }
}
