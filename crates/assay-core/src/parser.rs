//! TOML definition loader.
//!
//! Loads item and test definitions from TOML files. Tests reference their
//! items by `href`, resolved relative to the test file. Expressions are
//! written as tables with a `tag`, optional `children` and any attributes:
//!
//! ```toml
//! expression = { tag = "sum", children = [
//!     { tag = "variable", identifier = "A" },
//!     { tag = "baseValue", base_type = "integer", value = 1 },
//! ] }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::assessment::{ItemRef, NodeId, SectionNode, Selection, TestDefinition, TestNode, TestPart};
use crate::expression::{Attribute, Attributes, ExprArena, ExprId, ExtensionRegistry, NoExtensions};
use crate::model::{
    Choice, Interaction, InteractionKind, ItemDefinition, MapEntry, Mapping, PatternMask,
    VariableClass, VariableDeclaration,
};
use crate::rules::{Branch, Condition, OutcomeRule, ResponseRule, TemplateRule};
use crate::templates::{apply_template, ResponseTemplate};
use crate::value::{BaseType, Cardinality, Scalar, Value};

/// Intermediate TOML structure for item files.
#[derive(Debug, Deserialize)]
struct TomlItemFile {
    item: TomlItemHeader,
    #[serde(default)]
    declarations: Vec<TomlDeclaration>,
    #[serde(default)]
    interactions: Vec<TomlInteraction>,
    #[serde(default)]
    template_processing: Vec<TomlTemplateRule>,
    #[serde(default)]
    response_processing: Vec<TomlResponseRule>,
}

#[derive(Debug, Deserialize)]
struct TomlItemHeader {
    identifier: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    adaptive: bool,
    #[serde(default)]
    response_processing_template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlDeclaration {
    identifier: String,
    class: String,
    cardinality: String,
    #[serde(default)]
    base_type: Option<String>,
    #[serde(default)]
    default: Option<toml::Value>,
    #[serde(default)]
    correct: Option<toml::Value>,
    #[serde(default)]
    mapping: Option<TomlMapping>,
}

#[derive(Debug, Deserialize)]
struct TomlMapping {
    #[serde(default)]
    entries: BTreeMap<String, f64>,
    #[serde(default)]
    default_value: f64,
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
    #[serde(default = "default_true")]
    case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TomlInteraction {
    Choice {
        response: String,
        choices: Vec<String>,
        #[serde(default)]
        fixed: Vec<String>,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        min_choices: usize,
        #[serde(default)]
        max_choices: usize,
    },
    Order {
        response: String,
        choices: Vec<String>,
        #[serde(default)]
        fixed: Vec<String>,
        #[serde(default)]
        shuffle: bool,
    },
    TextEntry {
        response: String,
        #[serde(default)]
        pattern_mask: Option<String>,
    },
    Slider {
        response: String,
        lower_bound: f64,
        upper_bound: f64,
    },
    EndAttempt {
        response: String,
        #[serde(default = "default_true")]
        count_attempt: bool,
    },
}

#[derive(Debug, Deserialize)]
struct TomlExpr {
    tag: String,
    #[serde(default)]
    children: Vec<TomlExpr>,
    #[serde(flatten)]
    attributes: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
struct TomlBranch<R> {
    when: TomlExpr,
    #[serde(default)]
    rules: Vec<R>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
enum TomlTemplateRule {
    SetTemplateValue {
        identifier: String,
        expression: TomlExpr,
    },
    SetDefaultValue {
        identifier: String,
        expression: TomlExpr,
    },
    SetCorrectResponse {
        identifier: String,
        expression: TomlExpr,
    },
    TemplateCondition {
        branches: Vec<TomlBranch<TomlTemplateRule>>,
        #[serde(default)]
        otherwise: Vec<TomlTemplateRule>,
    },
    TemplateConstraint {
        expression: TomlExpr,
    },
    ExitTemplate,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
enum TomlResponseRule {
    SetOutcomeValue {
        identifier: String,
        expression: TomlExpr,
    },
    ResponseCondition {
        branches: Vec<TomlBranch<TomlResponseRule>>,
        #[serde(default)]
        otherwise: Vec<TomlResponseRule>,
    },
    ResponseFragment {
        rules: Vec<TomlResponseRule>,
    },
    ExitResponse,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
enum TomlOutcomeRule {
    SetOutcomeValue {
        identifier: String,
        expression: TomlExpr,
    },
    OutcomeCondition {
        branches: Vec<TomlBranch<TomlOutcomeRule>>,
        #[serde(default)]
        otherwise: Vec<TomlOutcomeRule>,
    },
    ExitTest,
}

/// Intermediate TOML structure for test files.
#[derive(Debug, Deserialize)]
struct TomlTestFile {
    test: TomlTestHeader,
    #[serde(default)]
    declarations: Vec<TomlDeclaration>,
    #[serde(default)]
    outcome_processing: Vec<TomlOutcomeRule>,
    #[serde(default)]
    parts: Vec<TomlPart>,
}

#[derive(Debug, Deserialize)]
struct TomlTestHeader {
    identifier: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct TomlPart {
    identifier: String,
    #[serde(default)]
    sections: Vec<TomlSection>,
}

#[derive(Debug, Deserialize)]
struct TomlSection {
    identifier: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    fixed: bool,
    #[serde(default)]
    required: bool,
    #[serde(default = "default_true")]
    keep_together: bool,
    #[serde(default)]
    shuffle: bool,
    #[serde(default)]
    select: Option<usize>,
    #[serde(default)]
    with_replacement: bool,
    #[serde(default)]
    children: Vec<TomlChild>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TomlChild {
    Item(TomlItemRef),
    Section(TomlSection),
}

#[derive(Debug, Deserialize)]
struct TomlItemRef {
    identifier: String,
    href: String,
    #[serde(default)]
    fixed: bool,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    categories: Vec<String>,
}

fn parse_enum<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(|e: String| anyhow!(e))
}

fn toml_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a literal written in TOML into a value of the declared shape.
fn literal(
    cardinality: Cardinality,
    base_type: Option<BaseType>,
    raw: &toml::Value,
) -> Result<Value> {
    if cardinality == Cardinality::Record {
        let table = raw
            .as_table()
            .ok_or_else(|| anyhow!("record values are written as tables of fields"))?;
        let mut fields = BTreeMap::new();
        for (name, field) in table {
            let field = field
                .as_table()
                .ok_or_else(|| anyhow!("record field '{name}' needs base_type and value"))?;
            let field_type: BaseType = parse_enum(
                field
                    .get("base_type")
                    .and_then(toml::Value::as_str)
                    .ok_or_else(|| anyhow!("record field '{name}' is missing base_type"))?,
            )?;
            let text = field
                .get("value")
                .map(toml_text)
                .ok_or_else(|| anyhow!("record field '{name}' is missing value"))?;
            fields.insert(name.clone(), Scalar::parse(field_type, &text)?);
        }
        return Ok(Value::Record(fields));
    }
    let base_type = base_type.ok_or_else(|| anyhow!("a base_type is required"))?;
    let texts: Vec<String> = match raw {
        toml::Value::Array(items) => items.iter().map(toml_text).collect(),
        other => vec![toml_text(other)],
    };
    Ok(Value::parse(cardinality, base_type, &texts)?)
}

fn declaration(raw: TomlDeclaration) -> Result<VariableDeclaration> {
    let identifier = raw.identifier;
    let context = || format!("declaration '{identifier}'");
    let class: VariableClass = parse_enum(&raw.class).with_context(context)?;
    let cardinality: Cardinality = parse_enum(&raw.cardinality).with_context(context)?;
    let base_type: Option<BaseType> = raw
        .base_type
        .as_deref()
        .map(parse_enum)
        .transpose()
        .with_context(context)?;
    if base_type.is_none() && cardinality != Cardinality::Record {
        bail!("declaration '{identifier}' needs a base_type");
    }

    let mut declaration = VariableDeclaration::new(identifier.clone(), class, cardinality, base_type);
    if let Some(default) = &raw.default {
        declaration.default_value =
            Some(literal(cardinality, base_type, default).with_context(context)?);
    }
    if let Some(correct) = &raw.correct {
        declaration.correct_response =
            Some(literal(cardinality, base_type, correct).with_context(context)?);
    }
    if let Some(mapping) = raw.mapping {
        let key_type = base_type.ok_or_else(|| anyhow!("records cannot be mapped"))?;
        let entries = mapping
            .entries
            .iter()
            .map(|(key, value)| -> Result<MapEntry> {
                Ok(MapEntry {
                    key: Scalar::parse(key_type, key)?,
                    value: *value,
                })
            })
            .collect::<Result<Vec<_>>>()
            .with_context(context)?;
        declaration.mapping = Some(Mapping {
            entries,
            default_value: mapping.default_value,
            lower_bound: mapping.lower_bound,
            upper_bound: mapping.upper_bound,
            case_sensitive: mapping.case_sensitive,
        });
    }
    Ok(declaration)
}

fn choices(ids: Vec<String>, fixed: &[String]) -> Vec<Choice> {
    ids.into_iter()
        .map(|id| Choice {
            fixed: fixed.contains(&id),
            identifier: id,
        })
        .collect()
}

fn interaction(raw: TomlInteraction) -> Result<Interaction> {
    Ok(match raw {
        TomlInteraction::Choice {
            response,
            choices: ids,
            fixed,
            shuffle,
            min_choices,
            max_choices,
        } => Interaction::new(
            response,
            InteractionKind::Choice {
                choices: choices(ids, &fixed),
                shuffle,
                min_choices,
                max_choices,
            },
        ),
        TomlInteraction::Order {
            response,
            choices: ids,
            fixed,
            shuffle,
        } => Interaction::new(
            response,
            InteractionKind::Order {
                choices: choices(ids, &fixed),
                shuffle,
            },
        ),
        TomlInteraction::TextEntry {
            response,
            pattern_mask,
        } => {
            let pattern_mask = pattern_mask
                .map(PatternMask::new)
                .transpose()
                .with_context(|| format!("invalid pattern_mask for '{response}'"))?;
            Interaction::new(response, InteractionKind::TextEntry { pattern_mask })
        }
        TomlInteraction::Slider {
            response,
            lower_bound,
            upper_bound,
        } => Interaction::new(
            response,
            InteractionKind::Slider {
                lower_bound,
                upper_bound,
            },
        ),
        TomlInteraction::EndAttempt {
            response,
            count_attempt,
        } => Interaction::new(response, InteractionKind::EndAttempt { count_attempt }),
    })
}

fn attribute(value: &toml::Value) -> Attribute {
    match value {
        toml::Value::String(s) => Attribute::String(s.clone()),
        toml::Value::Integer(i) => Attribute::Integer(*i),
        toml::Value::Float(f) => Attribute::Float(*f),
        toml::Value::Boolean(b) => Attribute::Boolean(*b),
        toml::Value::Array(items) => Attribute::List(items.iter().map(toml_text).collect()),
        other => Attribute::String(other.to_string()),
    }
}

/// Builds expressions into one arena.
struct ExprBuilder<'a> {
    arena: &'a mut ExprArena,
    extensions: &'a dyn ExtensionRegistry,
}

impl ExprBuilder<'_> {
    fn build(&mut self, expr: TomlExpr) -> Result<ExprId> {
        let mut children = Vec::with_capacity(expr.children.len());
        for child in expr.children {
            children.push(self.build(child)?);
        }
        let mut attrs = Attributes::new(expr.tag);
        for (name, value) in &expr.attributes {
            attrs.insert(name.clone(), attribute(value));
        }
        Ok(self.arena.build(&attrs, children, self.extensions)?)
    }

    fn condition<T, R>(
        &mut self,
        branches: Vec<TomlBranch<T>>,
        otherwise: Vec<T>,
        mut rule: impl FnMut(&mut Self, T) -> Result<R>,
    ) -> Result<Condition<R>> {
        let mut built = Vec::with_capacity(branches.len());
        for branch in branches {
            let when = self.build(branch.when)?;
            let rules = branch
                .rules
                .into_iter()
                .map(|r| rule(self, r))
                .collect::<Result<Vec<_>>>()?;
            built.push(Branch { when, rules });
        }
        let otherwise = otherwise
            .into_iter()
            .map(|r| rule(self, r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Condition {
            branches: built,
            otherwise,
        })
    }

    fn template_rule(&mut self, raw: TomlTemplateRule) -> Result<TemplateRule> {
        Ok(match raw {
            TomlTemplateRule::SetTemplateValue {
                identifier,
                expression,
            } => TemplateRule::SetTemplateValue {
                identifier,
                expression: self.build(expression)?,
            },
            TomlTemplateRule::SetDefaultValue {
                identifier,
                expression,
            } => TemplateRule::SetDefaultValue {
                identifier,
                expression: self.build(expression)?,
            },
            TomlTemplateRule::SetCorrectResponse {
                identifier,
                expression,
            } => TemplateRule::SetCorrectResponse {
                identifier,
                expression: self.build(expression)?,
            },
            TomlTemplateRule::TemplateCondition {
                branches,
                otherwise,
            } => TemplateRule::Condition(self.condition(branches, otherwise, Self::template_rule)?),
            TomlTemplateRule::TemplateConstraint { expression } => {
                TemplateRule::Constraint(self.build(expression)?)
            }
            TomlTemplateRule::ExitTemplate => TemplateRule::Exit,
        })
    }

    fn response_rule(&mut self, raw: TomlResponseRule) -> Result<ResponseRule> {
        Ok(match raw {
            TomlResponseRule::SetOutcomeValue {
                identifier,
                expression,
            } => ResponseRule::SetOutcomeValue {
                identifier,
                expression: self.build(expression)?,
            },
            TomlResponseRule::ResponseCondition {
                branches,
                otherwise,
            } => ResponseRule::Condition(self.condition(branches, otherwise, Self::response_rule)?),
            TomlResponseRule::ResponseFragment { rules } => ResponseRule::Fragment(
                rules
                    .into_iter()
                    .map(|r| self.response_rule(r))
                    .collect::<Result<Vec<_>>>()?,
            ),
            TomlResponseRule::ExitResponse => ResponseRule::Exit,
        })
    }

    fn outcome_rule(&mut self, raw: TomlOutcomeRule) -> Result<OutcomeRule> {
        Ok(match raw {
            TomlOutcomeRule::SetOutcomeValue {
                identifier,
                expression,
            } => OutcomeRule::SetOutcomeValue {
                identifier,
                expression: self.build(expression)?,
            },
            TomlOutcomeRule::OutcomeCondition {
                branches,
                otherwise,
            } => OutcomeRule::Condition(self.condition(branches, otherwise, Self::outcome_rule)?),
            TomlOutcomeRule::ExitTest => OutcomeRule::Exit,
        })
    }
}

/// Load an item definition from a TOML file.
pub fn load_item(path: &Path) -> Result<ItemDefinition> {
    load_item_with(path, &NoExtensions)
}

/// Load an item definition, resolving vendor tags through `extensions`.
pub fn load_item_with(path: &Path, extensions: &dyn ExtensionRegistry) -> Result<ItemDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item file: {}", path.display()))?;
    parse_item_str_with(&content, path, extensions)
}

/// Parse an item definition from a TOML string (useful for testing).
pub fn parse_item_str(content: &str, source_path: &Path) -> Result<ItemDefinition> {
    parse_item_str_with(content, source_path, &NoExtensions)
}

pub fn parse_item_str_with(
    content: &str,
    source_path: &Path,
    extensions: &dyn ExtensionRegistry,
) -> Result<ItemDefinition> {
    let parsed: TomlItemFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut item = ItemDefinition::new(parsed.item.identifier, parsed.item.title);
    item.adaptive = parsed.item.adaptive;
    for raw in parsed.declarations {
        item.declare(declaration(raw)?);
    }
    item.interactions = parsed
        .interactions
        .into_iter()
        .map(interaction)
        .collect::<Result<_>>()?;

    if let Some(template) = &parsed.item.response_processing_template {
        let template: ResponseTemplate = parse_enum(template)?;
        apply_template(&mut item, template);
    }

    let mut builder = ExprBuilder {
        arena: &mut item.expressions,
        extensions,
    };
    let template_rules = parsed
        .template_processing
        .into_iter()
        .map(|r| builder.template_rule(r))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("in template processing of {}", source_path.display()))?;
    let response_rules = parsed
        .response_processing
        .into_iter()
        .map(|r| builder.response_rule(r))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("in response processing of {}", source_path.display()))?;

    item.template_processing = template_rules;
    item.response_processing.extend(response_rules);
    Ok(item)
}

/// Load a test definition and every item it references.
pub fn load_test(path: &Path) -> Result<TestDefinition> {
    load_test_with(path, &NoExtensions)
}

pub fn load_test_with(path: &Path, extensions: &dyn ExtensionRegistry) -> Result<TestDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read test file: {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_test_str_with(&content, path, extensions, |href| {
        load_item_with(&base.join(href), extensions)
    })
}

/// Parse a test definition, loading referenced items through `resolve`.
pub fn parse_test_str(
    content: &str,
    source_path: &Path,
    resolve: impl FnMut(&str) -> Result<ItemDefinition>,
) -> Result<TestDefinition> {
    parse_test_str_with(content, source_path, &NoExtensions, resolve)
}

pub fn parse_test_str_with(
    content: &str,
    source_path: &Path,
    extensions: &dyn ExtensionRegistry,
    mut resolve: impl FnMut(&str) -> Result<ItemDefinition>,
) -> Result<TestDefinition> {
    let parsed: TomlTestFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut test = TestDefinition::new(parsed.test.identifier, parsed.test.title);
    for raw in parsed.declarations {
        test.declarations.push(declaration(raw)?);
    }

    for part in parsed.parts {
        let mut sections = Vec::with_capacity(part.sections.len());
        for section in part.sections {
            sections.push(add_section(&mut test, section, &mut resolve)?);
        }
        test.parts.push(TestPart {
            identifier: part.identifier,
            sections,
        });
    }

    let mut builder = ExprBuilder {
        arena: &mut test.expressions,
        extensions,
    };
    let outcome_rules = parsed
        .outcome_processing
        .into_iter()
        .map(|r| builder.outcome_rule(r))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("in outcome processing of {}", source_path.display()))?;
    test.outcome_processing = outcome_rules;
    Ok(test)
}

fn add_section(
    test: &mut TestDefinition,
    raw: TomlSection,
    resolve: &mut impl FnMut(&str) -> Result<ItemDefinition>,
) -> Result<NodeId> {
    let mut children = Vec::with_capacity(raw.children.len());
    for child in raw.children {
        let id = match child {
            TomlChild::Section(section) => add_section(test, section, resolve)?,
            TomlChild::Item(item) => {
                if !test.items.contains_key(&item.href) {
                    let definition = resolve(&item.href)
                        .with_context(|| format!("failed to load item '{}'", item.identifier))?;
                    test.items.insert(item.href.clone(), Arc::new(definition));
                }
                test.add_node(TestNode::Item(ItemRef {
                    identifier: item.identifier,
                    href: item.href,
                    fixed: item.fixed,
                    required: item.required,
                    categories: item.categories,
                }))
            }
        };
        children.push(id);
    }
    let selection = raw.select.map(|select| Selection {
        select,
        with_replacement: raw.with_replacement,
    });
    Ok(test.add_node(TestNode::Section(SectionNode {
        identifier: raw.identifier,
        title: raw.title,
        visible: raw.visible,
        fixed: raw.fixed,
        required: raw.required,
        keep_together: raw.keep_together,
        selection,
        shuffle: raw.shuffle,
        children,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExprKind;
    use crate::rules::ResponseRule;

    const ITEM: &str = r#"
[item]
identifier = "capital"
title = "Capital of France"

[[declarations]]
identifier = "RESPONSE"
class = "response"
cardinality = "single"
base_type = "identifier"
correct = "PARIS"

[declarations.mapping]
default_value = 0.0
entries = { PARIS = 1.0, LYON = 0.25 }

[[declarations]]
identifier = "SCORE"
class = "outcome"
cardinality = "single"
base_type = "float"
default = 0.0

[[interactions]]
type = "choice"
response = "RESPONSE"
choices = ["PARIS", "LYON", "NONE"]
fixed = ["NONE"]
shuffle = true
max_choices = 1

[[response_processing]]
rule = "set_outcome_value"
identifier = "SCORE"
expression = { tag = "mapResponse", identifier = "RESPONSE" }
"#;

    #[test]
    fn parses_item() {
        let item = parse_item_str(ITEM, Path::new("capital.toml")).unwrap();
        assert_eq!(item.identifier, "capital");
        let response = item.declaration("RESPONSE").unwrap();
        assert_eq!(response.correct_response, Some(Value::identifier("PARIS")));
        assert_eq!(response.mapping.as_ref().unwrap().entries.len(), 2);
        assert_eq!(
            item.declaration("SCORE").unwrap().default_value,
            Some(Value::float(0.0))
        );
        match &item.interactions[0].kind {
            InteractionKind::Choice { choices, shuffle, .. } => {
                assert!(shuffle);
                assert!(choices[2].fixed);
                assert!(!choices[0].fixed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &item.response_processing[0],
            ResponseRule::SetOutcomeValue { identifier, .. } if identifier == "SCORE"
        ));
    }

    #[test]
    fn nested_expressions_and_conditions() {
        let content = r#"
[item]
identifier = "sum"

[[declarations]]
identifier = "A"
class = "template"
cardinality = "single"
base_type = "integer"

[[template_processing]]
rule = "set_template_value"
identifier = "A"
expression = { tag = "randomInteger", min = 1, max = 9 }

[[template_processing]]
rule = "template_constraint"
expression = { tag = "gt", children = [
    { tag = "variable", identifier = "A" },
    { tag = "baseValue", base_type = "integer", value = 2 },
] }

[[template_processing]]
rule = "template_condition"
otherwise = [{ rule = "exit_template" }]

[[template_processing.branches]]
when = { tag = "isNull", children = [{ tag = "variable", identifier = "A" }] }
rules = [{ rule = "exit_template" }]
"#;
        let item = parse_item_str(content, Path::new("sum.toml")).unwrap();
        assert_eq!(item.template_processing.len(), 3);
        match &item.template_processing[1] {
            TemplateRule::Constraint(id) => {
                let node = item.expressions.get(*id).unwrap();
                assert!(matches!(node.kind, ExprKind::Gt));
                assert_eq!(node.children.len(), 2);
                assert!(node.variable);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &item.template_processing[2],
            TemplateRule::Condition(c) if c.branches.len() == 1 && c.otherwise == vec![TemplateRule::Exit]
        ));
    }

    #[test]
    fn branch_rules_default_to_empty() {
        let content = r#"
[item]
identifier = "empty_branch"

[[declarations]]
identifier = "SCORE"
class = "outcome"
cardinality = "single"
base_type = "float"

[[response_processing]]
rule = "response_condition"

[[response_processing.branches]]
when = { tag = "baseValue", base_type = "boolean", value = true }
"#;
        let item = parse_item_str(content, Path::new("empty_branch.toml")).unwrap();
        assert!(matches!(
            &item.response_processing[0],
            ResponseRule::Condition(c)
                if c.branches.len() == 1 && c.branches[0].rules.is_empty() && c.otherwise.is_empty()
        ));
    }

    #[test]
    fn unknown_tags_load_as_unsupported() {
        let content = r#"
[item]
identifier = "vendor"

[[declarations]]
identifier = "SCORE"
class = "outcome"
cardinality = "single"
base_type = "float"

[[response_processing]]
rule = "set_outcome_value"
identifier = "SCORE"
expression = { tag = "acmeScore", weight = 2 }
"#;
        let item = parse_item_str(content, Path::new("vendor.toml")).unwrap();
        let (_, node) = item.expressions.iter().next().unwrap();
        assert!(matches!(&node.kind, ExprKind::Unsupported { tag } if tag == "acmeScore"));
    }

    #[test]
    fn bad_literal_has_context() {
        let content = r#"
[item]
identifier = "bad"

[[declarations]]
identifier = "N"
class = "outcome"
cardinality = "single"
base_type = "integer"
default = "seven"
"#;
        let err = parse_item_str(content, Path::new("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("declaration 'N'"));
    }

    #[test]
    fn pattern_mask_compiled_at_load() {
        let content = |mask: &str| {
            format!(
                r#"
[item]
identifier = "text"

[[declarations]]
identifier = "RESPONSE"
class = "response"
cardinality = "single"
base_type = "string"

[[interactions]]
type = "text_entry"
response = "RESPONSE"
pattern_mask = '{mask}'
"#
            )
        };
        let item = parse_item_str(&content("[0-9]+"), Path::new("text.toml")).unwrap();
        match &item.interactions[0].kind {
            InteractionKind::TextEntry {
                pattern_mask: Some(mask),
            } => {
                assert_eq!(mask.as_str(), "[0-9]+");
                assert!(mask.is_match("42"));
                assert!(!mask.is_match("42a"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = parse_item_str(&content("[0-9"), Path::new("text.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("invalid pattern_mask for 'RESPONSE'"));
    }

    #[test]
    fn parses_test_with_resolver() {
        let content = r#"
[test]
identifier = "t"

[[declarations]]
identifier = "TOTAL"
class = "outcome"
cardinality = "single"
base_type = "float"

[[outcome_processing]]
rule = "set_outcome_value"
identifier = "TOTAL"
expression = { tag = "testVariables", identifier = "SCORE" }

[[parts]]
identifier = "p1"

[[parts.sections]]
identifier = "s1"
shuffle = true
select = 1
children = [
    { type = "item", identifier = "q1", href = "q1.toml" },
    { type = "section", identifier = "group", visible = false, children = [
        { type = "item", identifier = "q2", href = "q1.toml", required = true },
    ] },
]
"#;
        let mut loads = 0;
        let test = parse_test_str(content, Path::new("t.toml"), |href| {
            loads += 1;
            Ok(ItemDefinition::new(href, href))
        })
        .unwrap();
        assert_eq!(loads, 1);
        assert_eq!(test.parts[0].sections.len(), 1);
        let section = test.section(test.parts[0].sections[0]).unwrap();
        assert_eq!(section.selection.unwrap().select, 1);
        assert_eq!(section.children.len(), 2);
        let (_, q2) = test.find_item_ref("q2").unwrap();
        assert!(q2.required);
        assert_eq!(test.outcome_processing.len(), 1);
    }

    #[test]
    fn load_test_resolves_relative_hrefs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("q1.toml"), ITEM).unwrap();
        let test = r#"
[test]
identifier = "t"

[[parts]]
identifier = "p1"

[[parts.sections]]
identifier = "s1"
children = [{ type = "item", identifier = "q1", href = "q1.toml" }]
"#;
        let path = dir.path().join("test.toml");
        std::fs::write(&path, test).unwrap();
        let loaded = load_test(&path).unwrap();
        assert_eq!(loaded.items["q1.toml"].identifier, "capital");
    }
}
