//! Subcommand implementations.

pub mod assemble;
pub mod init;
pub mod run;
pub mod simulate;
pub mod validate;

use std::collections::BTreeMap;

use anyhow::Result;

/// Parse repeated `ID=VALUE` arguments, collecting every value given for
/// the same identifier in order.
pub fn parse_assignments(args: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut assignments: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arg in args {
        let Some((identifier, value)) = arg.split_once('=') else {
            anyhow::bail!("expected ID=VALUE, got '{arg}'");
        };
        let identifier = identifier.trim();
        anyhow::ensure!(!identifier.is_empty(), "missing identifier in '{arg}'");
        assignments
            .entry(identifier.to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_identifiers_accumulate() {
        let args = vec!["R=A".to_string(), "R=B".to_string(), "S= x".to_string()];
        let parsed = parse_assignments(&args).unwrap();
        assert_eq!(parsed["R"], vec!["A", "B"]);
        assert_eq!(parsed["S"], vec![" x"]);
    }

    #[test]
    fn missing_equals_is_an_error() {
        assert!(parse_assignments(&["RESPONSE".to_string()]).is_err());
        assert!(parse_assignments(&["=A".to_string()]).is_err());
    }
}
