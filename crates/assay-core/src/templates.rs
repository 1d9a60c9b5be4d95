//! Standard response-processing templates.
//!
//! Templates expand into ordinary rules over the conventional `RESPONSE`
//! and `SCORE` variables, so they run through the same engine as
//! hand-written processing.

use std::str::FromStr;

use crate::expression::{ExprId, ExprKind};
use crate::model::{ItemDefinition, VariableDeclaration};
use crate::rules::{Condition, ResponseRule};
use crate::value::{BaseType, Cardinality, Value};

pub const RESPONSE: &str = "RESPONSE";
pub const SCORE: &str = "SCORE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTemplate {
    /// SCORE is 1 when RESPONSE matches its correct response, else 0.
    MatchCorrect,
    /// SCORE is the mapped value of RESPONSE, 0 when unanswered.
    MapResponse,
}

impl FromStr for ResponseTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match_correct" => Ok(ResponseTemplate::MatchCorrect),
            "map_response" => Ok(ResponseTemplate::MapResponse),
            other => Err(format!("unknown response processing template: {other}")),
        }
    }
}

/// Replace the item's response processing with the template's rules,
/// declaring SCORE if the item does not.
pub fn apply_template(item: &mut ItemDefinition, template: ResponseTemplate) {
    if item.declaration(SCORE).is_none() {
        item.declare(
            VariableDeclaration::outcome(SCORE, Cardinality::Single, BaseType::Float)
                .with_default(Value::float(0.0)),
        );
    }

    let arena = &mut item.expressions;
    let zero = arena.base_value(Value::float(0.0));
    let rules = match template {
        ResponseTemplate::MatchCorrect => {
            let response = arena.variable(RESPONSE);
            let correct = arena.correct(RESPONSE);
            let matched = arena.add(ExprKind::Match, vec![response, correct]);
            let one = arena.base_value(Value::float(1.0));
            vec![ResponseRule::Condition(
                Condition::new(matched, vec![set_score(one)]).otherwise(vec![set_score(zero)]),
            )]
        }
        ResponseTemplate::MapResponse => {
            let response = arena.variable(RESPONSE);
            let unanswered = arena.add(ExprKind::IsNull, vec![response]);
            let mapped = arena.add(
                ExprKind::MapResponse {
                    identifier: RESPONSE.to_string(),
                },
                Vec::new(),
            );
            vec![ResponseRule::Condition(
                Condition::new(unanswered, vec![set_score(zero)])
                    .otherwise(vec![set_score(mapped)]),
            )]
        }
    };
    item.response_processing = rules;
}

fn set_score(expression: ExprId) -> ResponseRule {
    ResponseRule::SetOutcomeValue {
        identifier: SCORE.to_string(),
        expression,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_correct_declares_score() {
        let mut item = ItemDefinition::new("q", "Q");
        item.declare(VariableDeclaration::response(
            RESPONSE,
            Cardinality::Single,
            BaseType::Identifier,
        ));
        apply_template(&mut item, ResponseTemplate::MatchCorrect);
        assert!(item.declaration(SCORE).is_some());
        assert_eq!(item.response_processing.len(), 1);
        assert!(matches!(
            &item.response_processing[0],
            ResponseRule::Condition(c) if c.branches.len() == 1 && c.otherwise.len() == 1
        ));
    }

    #[test]
    fn parses_names() {
        assert_eq!(
            "map_response".parse::<ResponseTemplate>().unwrap(),
            ResponseTemplate::MapResponse
        );
        assert!("nope".parse::<ResponseTemplate>().is_err());
    }
}
