//! Processing rules.
//!
//! Each phase evaluates an ordered list of rules. Rules reference their
//! expressions by [`ExprId`] into the owning definition's arena.

use crate::expression::ExprId;

/// One `if` or `else if` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch<R> {
    pub when: ExprId,
    pub rules: Vec<R>,
}

/// An if / else-if / else chain. The first branch whose condition is true
/// runs; a NULL condition counts as false.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition<R> {
    pub branches: Vec<Branch<R>>,
    pub otherwise: Vec<R>,
}

impl<R> Condition<R> {
    pub fn new(when: ExprId, rules: Vec<R>) -> Self {
        Self {
            branches: vec![Branch { when, rules }],
            otherwise: Vec::new(),
        }
    }

    pub fn else_if(mut self, when: ExprId, rules: Vec<R>) -> Self {
        self.branches.push(Branch { when, rules });
        self
    }

    pub fn otherwise(mut self, rules: Vec<R>) -> Self {
        self.otherwise = rules;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateRule {
    SetTemplateValue {
        identifier: String,
        expression: ExprId,
    },
    /// Overrides the default of a response or outcome variable for this attempt.
    SetDefaultValue {
        identifier: String,
        expression: ExprId,
    },
    /// Overrides the correct response of a response variable for this attempt.
    SetCorrectResponse {
        identifier: String,
        expression: ExprId,
    },
    Condition(Condition<TemplateRule>),
    /// Restarts template processing unless the expression is true.
    Constraint(ExprId),
    Exit,
}

impl TemplateRule {
    pub fn name(&self) -> &'static str {
        match self {
            TemplateRule::SetTemplateValue { .. } => "set_template_value",
            TemplateRule::SetDefaultValue { .. } => "set_default_value",
            TemplateRule::SetCorrectResponse { .. } => "set_correct_response",
            TemplateRule::Condition(_) => "template_condition",
            TemplateRule::Constraint(_) => "template_constraint",
            TemplateRule::Exit => "exit_template",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseRule {
    SetOutcomeValue {
        identifier: String,
        expression: ExprId,
    },
    Condition(Condition<ResponseRule>),
    /// A group of rules; an exit inside it ends the whole phase.
    Fragment(Vec<ResponseRule>),
    Exit,
}

impl ResponseRule {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseRule::SetOutcomeValue { .. } => "set_outcome_value",
            ResponseRule::Condition(_) => "response_condition",
            ResponseRule::Fragment(_) => "response_fragment",
            ResponseRule::Exit => "exit_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeRule {
    SetOutcomeValue {
        identifier: String,
        expression: ExprId,
    },
    Condition(Condition<OutcomeRule>),
    Exit,
}

impl OutcomeRule {
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeRule::SetOutcomeValue { .. } => "set_outcome_value",
            OutcomeRule::Condition(_) => "outcome_condition",
            OutcomeRule::Exit => "exit_test",
        }
    }
}
