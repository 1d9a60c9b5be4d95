//! Binding raw submitted strings to typed response values.

use assay_core::model::VariableDeclaration;
use assay_core::value::{BaseType, Value};

use crate::error::BindingError;

/// Converts the raw strings submitted for one response variable into a
/// value of its declared shape.
pub trait ResponseBinder: Send + Sync {
    fn bind(&self, declaration: &VariableDeclaration, raw: &[String])
        -> Result<Value, BindingError>;
}

/// Parses each submitted string as one element of the declared base type.
/// Blank entries are ignored except for string variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBinder;

impl ResponseBinder for DefaultBinder {
    fn bind(
        &self,
        declaration: &VariableDeclaration,
        raw: &[String],
    ) -> Result<Value, BindingError> {
        let parse_error = |reason: String| BindingError::Parse {
            identifier: declaration.identifier.clone(),
            reason,
        };
        let base_type = declaration
            .base_type
            .ok_or_else(|| parse_error("record responses cannot be bound from strings".into()))?;
        let entries: Vec<&str> = raw
            .iter()
            .map(String::as_str)
            .filter(|s| base_type == BaseType::String || !s.trim().is_empty())
            .collect();
        Value::parse(declaration.cardinality, base_type, &entries)
            .map_err(|e| parse_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::value::{Cardinality, Scalar};

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn binds_multiple_identifiers() {
        let declaration =
            VariableDeclaration::response("R", Cardinality::Multiple, BaseType::Identifier);
        let value = DefaultBinder.bind(&declaration, &strings(&["B", "A"])).unwrap();
        assert_eq!(
            value,
            Value::multiple(
                BaseType::Identifier,
                [Scalar::Identifier("A".into()), Scalar::Identifier("B".into())]
            )
        );
    }

    #[test]
    fn blank_numeric_input_is_null() {
        let declaration =
            VariableDeclaration::response("R", Cardinality::Single, BaseType::Integer);
        assert!(DefaultBinder.bind(&declaration, &strings(&[" "])).unwrap().is_null());
    }

    #[test]
    fn unparseable_input_is_a_binding_error() {
        let declaration = VariableDeclaration::response("R", Cardinality::Single, BaseType::Float);
        let err = DefaultBinder
            .bind(&declaration, &strings(&["three"]))
            .unwrap_err();
        assert!(matches!(err, BindingError::Parse { identifier, .. } if identifier == "R"));
    }

    #[test]
    fn single_rejects_several_values() {
        let declaration =
            VariableDeclaration::response("R", Cardinality::Single, BaseType::Identifier);
        assert!(DefaultBinder.bind(&declaration, &strings(&["A", "B"])).is_err());
    }
}
