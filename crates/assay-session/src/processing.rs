//! The three processing phases.
//!
//! Each phase evaluates an ordered rule list against attempt state. Rules
//! return a [`Flow`] instead of unwinding, so exit and retry signals are
//! handled by the phase that owns them and never reach the caller.

use std::collections::BTreeMap;

use assay_core::assessment::TestDefinition;
use assay_core::error::{DefinitionError, Diagnostic};
use assay_core::expression::{Environment, Evaluator, ExprId, Pass, TestQuery};
use assay_core::model::{
    ItemDefinition, VariableClass, VariableDeclaration, COMPLETION_STATUS, DURATION, NUM_ATTEMPTS,
    STATUS_COMPLETED, STATUS_NOT_ATTEMPTED, STATUS_UNKNOWN,
};
use assay_core::random::RandomSource;
use assay_core::rules::{Condition, OutcomeRule, ResponseRule, TemplateRule};
use assay_core::state::AttemptState;
use assay_core::types::Signature;
use assay_core::value::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default bound on template-processing retries.
pub const MAX_TEMPLATE_RETRIES: u32 = 100;

/// Control signal threaded back up the rule stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    ExitPhase,
    RetryPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateState {
    Generating,
    Retry,
    /// The rule list finished, either at its end or through an exit rule.
    Exited,
    RetryLimitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateReport {
    pub state: TemplateState,
    /// Passes over the rule list, including the final one.
    pub attempts: u32,
}

/// An item attempt seen through the expression [`Environment`].
pub struct AttemptEnv<'a> {
    item: &'a ItemDefinition,
    state: &'a dyn AttemptState,
}

impl<'a> AttemptEnv<'a> {
    pub fn new(item: &'a ItemDefinition, state: &'a dyn AttemptState) -> Self {
        Self { item, state }
    }
}

impl Environment for AttemptEnv<'_> {
    fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        self.item.declaration(identifier)
    }

    fn value(&self, identifier: &str) -> Value {
        self.state.value(identifier).cloned().unwrap_or_default()
    }

    fn default_value(&self, identifier: &str) -> Value {
        if let Some(value) = self.state.overridden_default(identifier) {
            return value.clone();
        }
        self.declaration(identifier)
            .and_then(|d| d.default_value.clone())
            .unwrap_or_default()
    }

    fn correct_response(&self, identifier: &str) -> Value {
        if let Some(value) = self.state.overridden_correct(identifier) {
            return value.clone();
        }
        self.declaration(identifier)
            .and_then(|d| d.correct_response.clone())
            .unwrap_or_default()
    }
}

/// Results of the items in a test, answered for outcome processing.
pub trait ItemResults {
    /// Value of `identifier` in the first delivered instance of `item`.
    fn item_value(&self, item: &str, identifier: &str) -> Option<Value>;
    fn query(&self, query: &TestQuery<'_>) -> Option<Value>;
}

/// Test-level outcome state seen through the expression [`Environment`].
pub struct TestEnv<'a> {
    test: &'a TestDefinition,
    state: &'a dyn AttemptState,
    results: &'a dyn ItemResults,
}

impl<'a> TestEnv<'a> {
    pub fn new(
        test: &'a TestDefinition,
        state: &'a dyn AttemptState,
        results: &'a dyn ItemResults,
    ) -> Self {
        Self {
            test,
            state,
            results,
        }
    }
}

impl Environment for TestEnv<'_> {
    fn declaration(&self, identifier: &str) -> Option<&VariableDeclaration> {
        self.test.resolve_declaration(identifier)
    }

    fn value(&self, identifier: &str) -> Value {
        if self.test.declaration(identifier).is_some() {
            return self.state.value(identifier).cloned().unwrap_or_default();
        }
        identifier
            .split_once('.')
            .and_then(|(item, variable)| self.results.item_value(item, variable))
            .unwrap_or_default()
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

    fn test_query(&self, query: &TestQuery<'_>) -> Option<Value> {
        self.results.query(query)
    }

    fn is_test_level(&self) -> bool {
        true
    }
}

/// Store `value` in the declared shape; a mismatch is reported and stores NULL.
fn conform(declaration: &VariableDeclaration, value: Value, pass: &mut Pass) -> Value {
    let text = value.to_string();
    match declaration.conform(value) {
        Some(value) => value,
        None => {
            pass.report(Diagnostic::new(
                None,
                DefinitionError::Assignment {
                    identifier: declaration.identifier.clone(),
                    value: text,
                },
            ));
            Value::Null
        }
    }
}

/// Find an assignment target of one of the allowed classes.
fn target<'d>(
    declaration: Option<&'d VariableDeclaration>,
    identifier: &str,
    classes: &[VariableClass],
    pass: &mut Pass,
) -> Option<&'d VariableDeclaration> {
    match declaration {
        None => {
            pass.report(Diagnostic::new(
                None,
                DefinitionError::UnknownVariable(identifier.to_string()),
            ));
            None
        }
        Some(d) if !classes.contains(&d.class) => {
            let expected: Vec<String> = classes.iter().map(ToString::to_string).collect();
            pass.report(Diagnostic::new(
                None,
                DefinitionError::WrongVariableClass {
                    identifier: identifier.to_string(),
                    expected: expected.join(" or "),
                },
            ));
            None
        }
        Some(d) => Some(d),
    }
}

/// Pick the rules of the first branch whose condition holds.
fn chosen<'c, R>(condition: &'c Condition<R>, mut holds: impl FnMut(ExprId) -> bool) -> &'c [R] {
    for branch in &condition.branches {
        if holds(branch.when) {
            return &branch.rules;
        }
    }
    &condition.otherwise
}

/// Runs template and response processing for one item.
pub struct ItemProcessor<'a> {
    item: &'a ItemDefinition,
    evaluator: Evaluator<'a>,
    max_retries: u32,
}

impl<'a> ItemProcessor<'a> {
    pub fn new(item: &'a ItemDefinition) -> Self {
        Self {
            item,
            evaluator: Evaluator::new(&item.expressions),
            max_retries: MAX_TEMPLATE_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn evaluate(
        &self,
        state: &dyn AttemptState,
        expression: ExprId,
        required: Signature,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Value {
        let env = AttemptEnv::new(self.item, state);
        self.evaluator
            .evaluate(expression, required, &env, rng, pass)
    }

    fn condition_holds(
        &self,
        state: &dyn AttemptState,
        expression: ExprId,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> bool {
        let env = AttemptEnv::new(self.item, state);
        self.evaluator.evaluate_condition(expression, &env, rng, pass)
    }

    /// Reset every variable of `class` to its (possibly overridden) default.
    fn reset(&self, state: &mut dyn AttemptState, class: VariableClass) {
        let defaults: Vec<(String, Value)> = {
            let env = AttemptEnv::new(self.item, &*state);
            self.item
                .declarations_of(class)
                .map(|d| (d.identifier.clone(), env.default_value(&d.identifier)))
                .collect()
        };
        for (identifier, value) in defaults {
            state.set_value(&identifier, value);
        }
    }

    /// Run template processing until it exits, completes, or exhausts the
    /// retry bound. External defaults override declared template defaults.
    pub fn template_processing(
        &self,
        state: &mut dyn AttemptState,
        external_defaults: &BTreeMap<String, Value>,
        rng: &mut RandomSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> TemplateReport {
        let mut pass = Pass::new();
        let mut report = TemplateReport {
            state: TemplateState::Generating,
            attempts: 0,
        };
        loop {
            report.attempts += 1;
            restore_external_defaults(state, external_defaults);
            self.reset(state, VariableClass::Template);

            match self.template_rules(&self.item.template_processing, state, rng, &mut pass) {
                Flow::Continue | Flow::ExitPhase => {
                    report.state = TemplateState::Exited;
                    break;
                }
                Flow::RetryPhase if report.attempts > self.max_retries => {
                    warn!(
                        item = %self.item.identifier,
                        attempts = report.attempts,
                        "template constraints never satisfied; keeping default values"
                    );
                    restore_external_defaults(state, external_defaults);
                    self.reset(state, VariableClass::Template);
                    report.state = TemplateState::RetryLimitExceeded;
                    break;
                }
                Flow::RetryPhase => {
                    debug!(item = %self.item.identifier, attempt = report.attempts, "template constraint failed");
                    report.state = TemplateState::Retry;
                }
            }
        }
        diagnostics.extend(pass.into_diagnostics());
        report
    }

    fn template_rules(
        &self,
        rules: &[TemplateRule],
        state: &mut dyn AttemptState,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Flow {
        for rule in rules {
            let flow = self.template_rule(rule, state, rng, pass);
            if flow != Flow::Continue {
                return flow;
            }
        }
        Flow::Continue
    }

    fn template_rule(
        &self,
        rule: &TemplateRule,
        state: &mut dyn AttemptState,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Flow {
        debug!(rule = rule.name(), "template rule");
        match rule {
            TemplateRule::SetTemplateValue {
                identifier,
                expression,
            } => {
                if let Some(value) = self.assigned(
                    identifier,
                    &[VariableClass::Template],
                    *expression,
                    state,
                    rng,
                    pass,
                ) {
                    state.set_value(identifier, value);
                }
                Flow::Continue
            }
            TemplateRule::SetDefaultValue {
                identifier,
                expression,
            } => {
                if let Some(value) = self.assigned(
                    identifier,
                    &[VariableClass::Response, VariableClass::Outcome],
                    *expression,
                    state,
                    rng,
                    pass,
                ) {
                    state.set_overridden_default(identifier, Some(value));
                }
                Flow::Continue
            }
            TemplateRule::SetCorrectResponse {
                identifier,
                expression,
            } => {
                if let Some(value) = self.assigned(
                    identifier,
                    &[VariableClass::Response],
                    *expression,
                    state,
                    rng,
                    pass,
                ) {
                    state.set_overridden_correct(identifier, Some(value));
                }
                Flow::Continue
            }
            TemplateRule::Condition(condition) => {
                let rules = chosen(condition, |when| self.condition_holds(&*state, when, rng, pass));
                self.template_rules(rules, state, rng, pass)
            }
            TemplateRule::Constraint(expression) => {
                if self.condition_holds(&*state, *expression, rng, pass) {
                    Flow::Continue
                } else {
                    Flow::RetryPhase
                }
            }
            TemplateRule::Exit => {
                debug!(item = %self.item.identifier, "template processing exited");
                Flow::ExitPhase
            }
        }
    }

    /// Evaluate an assignment's expression into the target's shape.
    fn assigned(
        &self,
        identifier: &str,
        classes: &[VariableClass],
        expression: ExprId,
        state: &dyn AttemptState,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Option<Value> {
        let declaration = target(self.item.declaration(identifier), identifier, classes, pass)?;
        let value = self.evaluate(
            state,
            expression,
            declaration.assignment_signature(),
            rng,
            pass,
        );
        Some(conform(declaration, value, pass))
    }

    /// Run response processing once.
    ///
    /// Non-adaptive items start from default outcomes on every call;
    /// adaptive items keep the outcomes of earlier attempts.
    pub fn response_processing(
        &self,
        state: &mut dyn AttemptState,
        count_attempt: bool,
        rng: &mut RandomSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        if count_attempt {
            let attempts = state.attempt_count() + 1;
            state.set_attempt_count(attempts);
        }
        state.set_value(NUM_ATTEMPTS, Value::integer(i64::from(state.attempt_count())));
        state.set_value(DURATION, Value::float(state.duration()));

        if !self.item.adaptive {
            self.reset(state, VariableClass::Outcome);
        }

        let mut pass = Pass::new();
        if self.response_rules(&self.item.response_processing, state, rng, &mut pass)
            == Flow::ExitPhase
        {
            debug!(item = %self.item.identifier, "response processing exited");
        }

        if !self.item.adaptive {
            state.set_value(COMPLETION_STATUS, Value::identifier(STATUS_COMPLETED));
        } else if state.value(COMPLETION_STATUS) == Some(&Value::identifier(STATUS_NOT_ATTEMPTED)) {
            state.set_value(COMPLETION_STATUS, Value::identifier(STATUS_UNKNOWN));
        }
        diagnostics.extend(pass.into_diagnostics());
    }

    fn response_rules(
        &self,
        rules: &[ResponseRule],
        state: &mut dyn AttemptState,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Flow {
        for rule in rules {
            debug!(rule = rule.name(), "response rule");
            let flow = match rule {
                ResponseRule::SetOutcomeValue {
                    identifier,
                    expression,
                } => {
                    if let Some(value) = self.assigned(
                        identifier,
                        &[VariableClass::Outcome],
                        *expression,
                        state,
                        rng,
                        pass,
                    ) {
                        state.set_value(identifier, value);
                    }
                    Flow::Continue
                }
                ResponseRule::Condition(condition) => {
                    let rules =
                        chosen(condition, |when| self.condition_holds(&*state, when, rng, pass));
                    self.response_rules(rules, state, rng, pass)
                }
                ResponseRule::Fragment(rules) => self.response_rules(rules, state, rng, pass),
                ResponseRule::Exit => Flow::ExitPhase,
            };
            if flow != Flow::Continue {
                return flow;
            }
        }
        Flow::Continue
    }
}

/// Runs test-level outcome processing.
pub struct OutcomeProcessor<'a> {
    test: &'a TestDefinition,
    evaluator: Evaluator<'a>,
}

impl<'a> OutcomeProcessor<'a> {
    pub fn new(test: &'a TestDefinition) -> Self {
        Self {
            test,
            evaluator: Evaluator::new(&test.expressions),
        }
    }

    /// Evaluate the outcome rules once. An `exit_test` rule ends the pass.
    pub fn run(
        &self,
        state: &mut dyn AttemptState,
        results: &dyn ItemResults,
        rng: &mut RandomSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let mut pass = Pass::new();
        if self.rules(&self.test.outcome_processing, state, results, rng, &mut pass)
            == Flow::ExitPhase
        {
            debug!(test = %self.test.identifier, "outcome processing exited");
        }
        diagnostics.extend(pass.into_diagnostics());
    }

    fn rules(
        &self,
        rules: &[OutcomeRule],
        state: &mut dyn AttemptState,
        results: &dyn ItemResults,
        rng: &mut RandomSource,
        pass: &mut Pass,
    ) -> Flow {
        for rule in rules {
            debug!(rule = rule.name(), "outcome rule");
            let flow = match rule {
                OutcomeRule::SetOutcomeValue {
                    identifier,
                    expression,
                } => {
                    let declaration = target(
                        self.test.declaration(identifier),
                        identifier,
                        &[VariableClass::Outcome],
                        pass,
                    );
                    if let Some(declaration) = declaration {
                        let env = TestEnv::new(self.test, &*state, results);
                        let value = self.evaluator.evaluate(
                            *expression,
                            declaration.assignment_signature(),
                            &env,
                            rng,
                            pass,
                        );
                        let value = conform(declaration, value, pass);
                        state.set_value(identifier, value);
                    }
                    Flow::Continue
                }
                OutcomeRule::Condition(condition) => {
                    let rules = chosen(condition, |when| {
                        let env = TestEnv::new(self.test, &*state, results);
                        self.evaluator.evaluate_condition(when, &env, rng, pass)
                    });
                    self.rules(rules, state, results, rng, pass)
                }
                OutcomeRule::Exit => Flow::ExitPhase,
            };
            if flow != Flow::Continue {
                return flow;
            }
        }
        Flow::Continue
    }
}

/// Drop overrides left by an earlier template pass, keeping only the external ones.
fn restore_external_defaults(state: &mut dyn AttemptState, external_defaults: &BTreeMap<String, Value>) {
    state.clear_overrides();
    for (identifier, value) in external_defaults {
        state.set_overridden_default(identifier, Some(value.clone()));
    }
}
