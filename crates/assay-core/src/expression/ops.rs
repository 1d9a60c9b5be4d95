//! Runtime semantics of every expression kind.
//!
//! Operators receive their already-evaluated children. A NULL operand makes
//! most operators produce NULL; genuine failures (overflow, division by
//! zero, an index past the end) are returned as [`OpError`] and turned into
//! diagnostics by the evaluator.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::random::RandomSource;
use crate::value::{BaseType, Scalar, Value};

use super::kind::{ExprKind, MathConstant, MathFunction, TestQuery, ToleranceMode};
use super::Environment;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    #[error("integer overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} is out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("expected {expected}, found {found}")]
    WrongType { expected: &'static str, found: String },

    #[error("empty range [{min}, {max}]")]
    EmptyRange { min: String, max: String },

    #[error("containers mix {0} and {1}")]
    MixedBaseTypes(BaseType, BaseType),

    #[error("no mapping declared for '{0}'")]
    NoMapping(String),

    #[error("{0}")]
    Extension(String),
}

type OpResult = Result<Value, OpError>;

fn wrong(expected: &'static str, found: &Value) -> OpError {
    OpError::WrongType {
        expected,
        found: found.to_string(),
    }
}

/// A numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(scalar: &Scalar) -> Option<Num> {
        match scalar {
            Scalar::Integer(i) => Some(Num::Int(*i)),
            Scalar::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::integer(i),
            Num::Float(f) => Value::float(f),
        }
    }
}

/// The numbers of single operands; `None` when any operand is NULL.
fn numbers(args: &[Value]) -> Result<Option<Vec<Num>>, OpError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Null => return Ok(None),
            Value::Single(s) => out.push(Num::of(s).ok_or_else(|| wrong("a number", arg))?),
            other => return Err(wrong("a single number", other)),
        }
    }
    Ok(Some(out))
}

/// Numbers of single or container operands, flattened.
fn flattened_numbers(args: &[Value]) -> Result<Option<Vec<Num>>, OpError> {
    let mut out = Vec::new();
    for arg in args {
        if arg.is_null() {
            return Ok(None);
        }
        if matches!(arg, Value::Record(_)) {
            return Err(wrong("numbers", arg));
        }
        for scalar in arg.scalars() {
            out.push(Num::of(scalar).ok_or_else(|| wrong("numbers", arg))?);
        }
    }
    Ok(Some(out))
}

fn integers(nums: &[Num]) -> Option<Vec<i64>> {
    nums.iter()
        .map(|n| match n {
            Num::Int(i) => Some(*i),
            Num::Float(_) => None,
        })
        .collect()
}

fn booleans(args: &[Value]) -> Result<Vec<Option<bool>>, OpError> {
    args.iter()
        .map(|arg| match arg {
            Value::Null => Ok(None),
            Value::Single(Scalar::Boolean(b)) => Ok(Some(*b)),
            other => Err(wrong("a boolean", other)),
        })
        .collect()
}

fn string_of(value: &Value) -> Result<Option<&str>, OpError> {
    match value {
        Value::Null => Ok(None),
        Value::Single(Scalar::String(s)) => Ok(Some(s)),
        other => Err(wrong("a string", other)),
    }
}

fn duration_of(value: &Value) -> Result<Option<f64>, OpError> {
    match value {
        Value::Null => Ok(None),
        Value::Single(Scalar::Duration(d)) => Ok(Some(*d)),
        other => Err(wrong("a duration", other)),
    }
}

fn pair(args: Vec<Value>) -> (Value, Value) {
    let mut it = args.into_iter();
    (it.next().unwrap_or_default(), it.next().unwrap_or_default())
}

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or_default()
}

/// Evaluate one node given its children's values.
pub fn apply(
    kind: &ExprKind,
    args: Vec<Value>,
    env: &dyn Environment,
    rng: &mut RandomSource,
) -> OpResult {
    match kind {
        ExprKind::BaseValue(value) => Ok(value.clone()),
        ExprKind::Null | ExprKind::Unsupported { .. } => Ok(Value::Null),
        ExprKind::Variable { identifier } => Ok(env.value(identifier)),
        ExprKind::Correct { identifier } => Ok(env.correct_response(identifier)),
        ExprKind::Default { identifier } => Ok(env.default_value(identifier)),
        ExprKind::MapResponse { identifier } => {
            let mapping = env
                .mapping(identifier)
                .ok_or_else(|| OpError::NoMapping(identifier.clone()))?;
            Ok(Value::float(mapping.map(&env.value(identifier))))
        }
        ExprKind::RandomInteger { min, max, step } => random_integer(*min, *max, *step, rng),
        ExprKind::RandomFloat { min, max } => {
            if min > max {
                return Err(OpError::EmptyRange {
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
            Ok(Value::float(rng.gen_range(*min..=*max)))
        }
        ExprKind::Random => {
            let container = first(args);
            Ok(container
                .elements()
                .and_then(|values| values.choose(rng))
                .cloned()
                .map_or(Value::Null, Value::Single))
        }
        ExprKind::Multiple => collect(args, false),
        ExprKind::Ordered => collect(args, true),
        ExprKind::ContainerSize => {
            let container = first(args);
            let len = container.elements().map_or(0, <[Scalar]>::len);
            Ok(Value::integer(len as i64))
        }
        ExprKind::IsNull => Ok(Value::boolean(first(args).is_null())),
        ExprKind::Index { n } => {
            let container = first(args);
            match container.elements() {
                None => Ok(Value::Null),
                Some(values) => values
                    .get(n - 1)
                    .cloned()
                    .map(Value::Single)
                    .ok_or(OpError::IndexOutOfRange {
                        index: *n,
                        len: values.len(),
                    }),
            }
        }
        ExprKind::FieldValue { field } => match first(args) {
            Value::Record(mut fields) => Ok(fields.remove(field).map_or(Value::Null, Value::Single)),
            Value::Null => Ok(Value::Null),
            other => Err(wrong("a record", &other)),
        },
        ExprKind::Member => {
            let (needle, haystack) = pair(args);
            if needle.is_null() || haystack.is_null() {
                return Ok(Value::Null);
            }
            let needle = needle.as_single().ok_or_else(|| wrong("a single value", &needle))?;
            Ok(Value::boolean(haystack.scalars().contains(&needle)))
        }
        ExprKind::Delete => {
            let (needle, haystack) = pair(args);
            if needle.is_null() || haystack.is_null() {
                return Ok(Value::Null);
            }
            let needle = needle
                .as_single()
                .ok_or_else(|| wrong("a single value", &needle))?
                .clone();
            match haystack {
                Value::Multiple { base_type, values } => Ok(Value::multiple(
                    base_type,
                    values.into_iter().filter(|v| *v != needle),
                )),
                Value::Ordered { base_type, values } => Ok(Value::ordered(
                    base_type,
                    values.into_iter().filter(|v| *v != needle),
                )),
                other => Err(wrong("a container", &other)),
            }
        }
        ExprKind::Contains => {
            let (outer, inner) = pair(args);
            if outer.is_null() || inner.is_null() {
                return Ok(Value::Null);
            }
            contains(&outer, &inner)
        }
        ExprKind::Substring { case_sensitive } => {
            let (needle, haystack) = pair(args);
            match (string_of(&needle)?, string_of(&haystack)?) {
                (Some(n), Some(h)) if *case_sensitive => Ok(Value::boolean(h.contains(n))),
                (Some(n), Some(h)) => Ok(Value::boolean(
                    h.to_lowercase().contains(&n.to_lowercase()),
                )),
                _ => Ok(Value::Null),
            }
        }
        ExprKind::Not => match booleans(&args)?.first().copied().flatten() {
            Some(b) => Ok(Value::boolean(!b)),
            None => Ok(Value::Null),
        },
        ExprKind::And => {
            let values = booleans(&args)?;
            if values.contains(&Some(false)) {
                Ok(Value::boolean(false))
            } else if values.contains(&None) {
                Ok(Value::Null)
            } else {
                Ok(Value::boolean(true))
            }
        }
        ExprKind::Or => {
            let values = booleans(&args)?;
            if values.contains(&Some(true)) {
                Ok(Value::boolean(true))
            } else if values.contains(&None) {
                Ok(Value::Null)
            } else {
                Ok(Value::boolean(false))
            }
        }
        ExprKind::AnyN { min, max } => {
            let values = booleans(&args)?;
            let trues = values.iter().filter(|v| **v == Some(true)).count();
            let nulls = values.iter().filter(|v| v.is_none()).count();
            if trues > *max || trues + nulls < *min {
                Ok(Value::boolean(false))
            } else if trues >= *min && trues + nulls <= *max {
                Ok(Value::boolean(true))
            } else {
                Ok(Value::Null)
            }
        }
        ExprKind::Match => {
            let (a, b) = pair(args);
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            if a.cardinality() != b.cardinality() {
                return Err(wrong("operands of the same cardinality", &b));
            }
            Ok(Value::boolean(a == b))
        }
        ExprKind::StringMatch {
            case_sensitive,
            substring,
        } => {
            let (a, b) = pair(args);
            match (string_of(&a)?, string_of(&b)?) {
                (Some(a), Some(b)) => {
                    let (a, b) = if *case_sensitive {
                        (a.to_string(), b.to_string())
                    } else {
                        (a.to_lowercase(), b.to_lowercase())
                    };
                    let matched = if *substring { a.contains(&b) } else { a == b };
                    Ok(Value::boolean(matched))
                }
                _ => Ok(Value::Null),
            }
        }
        ExprKind::PatternMatch { pattern } => match string_of(&first(args))? {
            Some(s) => Ok(Value::boolean(pattern.is_match(s))),
            None => Ok(Value::Null),
        },
        ExprKind::Equal {
            mode,
            tolerance,
            include_lower,
            include_upper,
        } => compare(&args, |x, y| {
            let (x, y) = (x.as_f64(), y.as_f64());
            let (lower, upper) = match mode {
                ToleranceMode::Exact => return x == y,
                ToleranceMode::Absolute => (x - tolerance.0, x + tolerance.1),
                ToleranceMode::Relative => (
                    x * (1.0 - tolerance.0 / 100.0),
                    x * (1.0 + tolerance.1 / 100.0),
                ),
            };
            let above = if *include_lower { y >= lower } else { y > lower };
            let below = if *include_upper { y <= upper } else { y < upper };
            above && below
        }),
        ExprKind::EqualRounded { mode, figures } => compare(&args, |x, y| {
            mode.round(x.as_f64(), *figures) == mode.round(y.as_f64(), *figures)
        }),
        ExprKind::Lt => compare(&args, |x, y| ordering(x, y) == Some(Ordering::Less)),
        ExprKind::Gt => compare(&args, |x, y| ordering(x, y) == Some(Ordering::Greater)),
        ExprKind::Lte => compare(&args, |x, y| {
            matches!(ordering(x, y), Some(Ordering::Less | Ordering::Equal))
        }),
        ExprKind::Gte => compare(&args, |x, y| {
            matches!(ordering(x, y), Some(Ordering::Greater | Ordering::Equal))
        }),
        ExprKind::DurationLt | ExprKind::DurationGte => {
            let (a, b) = pair(args);
            match (duration_of(&a)?, duration_of(&b)?) {
                (Some(a), Some(b)) => Ok(Value::boolean(match kind {
                    ExprKind::DurationLt => a < b,
                    _ => a >= b,
                })),
                _ => Ok(Value::Null),
            }
        }
        ExprKind::Sum => fold_numbers(&args, |a, b| a.checked_add(b), |a, b| a + b),
        ExprKind::Product => fold_numbers(&args, |a, b| a.checked_mul(b), |a, b| a * b),
        ExprKind::Subtract => fold_numbers(&args, |a, b| a.checked_sub(b), |a, b| a - b),
        ExprKind::Divide => match numbers(&args)?.as_deref() {
            Some([x, y]) => {
                let divisor = y.as_f64();
                if divisor == 0.0 {
                    return Err(OpError::DivisionByZero);
                }
                Ok(Value::float(x.as_f64() / divisor))
            }
            _ => Ok(Value::Null),
        },
        ExprKind::Power => match numbers(&args)?.as_deref() {
            Some([x, y]) => {
                let result = x.as_f64().powf(y.as_f64());
                if result.is_infinite() {
                    return Err(OpError::Overflow);
                }
                Ok(Value::float(result))
            }
            _ => Ok(Value::Null),
        },
        ExprKind::IntegerDivide | ExprKind::IntegerModulus => {
            match numbers(&args)?.as_deref() {
                Some([Num::Int(x), Num::Int(y)]) => {
                    let quotient = floor_div(*x, *y)?;
                    if matches!(kind, ExprKind::IntegerDivide) {
                        Ok(Value::integer(quotient))
                    } else {
                        let product = y.checked_mul(quotient).ok_or(OpError::Overflow)?;
                        Ok(Value::integer(x.checked_sub(product).ok_or(OpError::Overflow)?))
                    }
                }
                Some(_) => Err(OpError::WrongType {
                    expected: "integers",
                    found: "a float".into(),
                }),
                None => Ok(Value::Null),
            }
        }
        ExprKind::Truncate | ExprKind::Round => match numbers(&args)?.as_deref() {
            Some([Num::Int(i)]) => Ok(Value::integer(*i)),
            Some([Num::Float(f)]) => {
                let rounded = match kind {
                    ExprKind::Round => (f + 0.5).floor(),
                    _ => f.trunc(),
                };
                to_integer(rounded)
            }
            _ => Ok(Value::Null),
        },
        ExprKind::RoundTo { mode, figures } => match numbers(&args)?.as_deref() {
            Some([x]) => {
                let x = x.as_f64();
                if x.is_finite() {
                    Ok(Value::float(mode.round(x, *figures)))
                } else {
                    Ok(Value::float(x))
                }
            }
            _ => Ok(Value::Null),
        },
        ExprKind::IntegerToFloat => match numbers(&args)?.as_deref() {
            Some([x]) => Ok(Value::float(x.as_f64())),
            _ => Ok(Value::Null),
        },
        ExprKind::Min | ExprKind::Max => {
            let Some(nums) = flattened_numbers(&args)? else {
                return Ok(Value::Null);
            };
            let pick_min = matches!(kind, ExprKind::Min);
            let better = |candidate: Num, current: Num| match ordering(candidate, current) {
                Some(Ordering::Less) => pick_min,
                Some(Ordering::Greater) => !pick_min,
                _ => false,
            };
            let best = nums
                .iter()
                .copied()
                .reduce(|current, candidate| if better(candidate, current) { candidate } else { current });
            let all_integer = integers(&nums).is_some();
            Ok(match best {
                Some(n) if all_integer => n.into_value(),
                Some(n) => Value::float(n.as_f64()),
                None => Value::Null,
            })
        }
        ExprKind::Gcd | ExprKind::Lcm => {
            let Some(nums) = flattened_numbers(&args)? else {
                return Ok(Value::Null);
            };
            let ints = integers(&nums).ok_or(OpError::WrongType {
                expected: "integers",
                found: "a float".into(),
            })?;
            let result = if matches!(kind, ExprKind::Gcd) {
                ints.iter().try_fold(0i64, |acc, x| gcd(acc, *x))?
            } else {
                ints.iter().try_fold(1i64, |acc, x| lcm(acc, *x))?
            };
            Ok(Value::integer(result))
        }
        ExprKind::Repeat { times } => {
            args.len().checked_mul(*times).ok_or(OpError::Overflow)?;
            let mut repeated = Vec::new();
            for _ in 0..*times {
                repeated.extend(args.iter().cloned());
            }
            collect(repeated, true)
        }
        ExprKind::MathConstant(constant) => Ok(Value::float(match constant {
            MathConstant::Pi => std::f64::consts::PI,
            MathConstant::E => std::f64::consts::E,
        })),
        ExprKind::MathOperator(function) => {
            let Some(nums) = numbers(&args)? else {
                return Ok(Value::Null);
            };
            if nums.len() != function.arity() {
                return Err(OpError::WrongType {
                    expected: "operands matching the operator",
                    found: format!("{} operands", nums.len()),
                });
            }
            let x = nums[0].as_f64();
            let y = nums.get(1).map_or(0.0, |n| n.as_f64());
            let result = math(*function, x, y);
            Ok(if result.is_finite() {
                Value::float(result)
            } else {
                Value::Null
            })
        }
        ExprKind::Custom(node) => node.operator.evaluate(&args).map_err(OpError::Extension),
        ExprKind::TestVariables {
            identifier,
            base_type,
            filter,
        } => Ok(env
            .test_query(&TestQuery::Variables {
                identifier,
                base_type: *base_type,
                filter,
            })
            .unwrap_or_default()),
        ExprKind::Number { what, filter } => Ok(env
            .test_query(&TestQuery::Count {
                what: *what,
                filter,
            })
            .unwrap_or_default()),
    }
}

fn random_integer(min: i64, max: i64, step: i64, rng: &mut RandomSource) -> OpResult {
    if min > max {
        return Err(OpError::EmptyRange {
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    let step = step.max(1);
    let steps = max.checked_sub(min).ok_or(OpError::Overflow)? / step;
    let k = rng.gen_range(0..=steps);
    let offset = k.checked_mul(step).ok_or(OpError::Overflow)?;
    Ok(Value::integer(min.checked_add(offset).ok_or(OpError::Overflow)?))
}

/// Concatenate single values and containers into one container.
fn collect(args: Vec<Value>, ordered: bool) -> OpResult {
    let mut base_type: Option<BaseType> = None;
    let mut values = Vec::new();
    for arg in args {
        if arg.is_null() {
            continue;
        }
        let arg_type = arg.base_type().ok_or_else(|| wrong("a typed value", &arg))?;
        match base_type {
            None => base_type = Some(arg_type),
            Some(expected) if expected != arg_type => {
                return Err(OpError::MixedBaseTypes(expected, arg_type))
            }
            Some(_) => {}
        }
        match arg {
            Value::Single(s) => values.push(s),
            Value::Multiple { values: more, .. } | Value::Ordered { values: more, .. } => {
                values.extend(more)
            }
            _ => {}
        }
    }
    Ok(match base_type {
        None => Value::Null,
        Some(bt) if ordered => Value::ordered(bt, values),
        Some(bt) => Value::multiple(bt, values),
    })
}

fn contains(outer: &Value, inner: &Value) -> OpResult {
    match (outer, inner) {
        (Value::Multiple { values: a, .. }, Value::Multiple { values: b, .. }) => {
            let mut used = vec![false; a.len()];
            let all = b.iter().all(|x| {
                match a
                    .iter()
                    .enumerate()
                    .position(|(i, y)| !used[i] && y == x)
                {
                    Some(i) => {
                        used[i] = true;
                        true
                    }
                    None => false,
                }
            });
            Ok(Value::boolean(all))
        }
        (Value::Ordered { values: a, .. }, Value::Ordered { values: b, .. }) => {
            let found = b.len() <= a.len() && a.windows(b.len()).any(|w| w == b.as_slice());
            Ok(Value::boolean(found))
        }
        _ => Err(wrong("two containers of the same cardinality", inner)),
    }
}

fn compare(args: &[Value], test: impl Fn(Num, Num) -> bool) -> OpResult {
    match numbers(args)?.as_deref() {
        Some([x, y]) => Ok(Value::boolean(test(*x, *y))),
        _ => Ok(Value::Null),
    }
}

fn ordering(x: Num, y: Num) -> Option<Ordering> {
    match (x, y) {
        (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
        _ => x.as_f64().partial_cmp(&y.as_f64()),
    }
}

/// Left fold staying in integers while every operand is an integer.
fn fold_numbers(
    args: &[Value],
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> OpResult {
    let Some(nums) = numbers(args)? else {
        return Ok(Value::Null);
    };
    if let Some(ints) = integers(&nums) {
        let mut iter = ints.into_iter();
        let Some(head) = iter.next() else {
            return Ok(Value::Null);
        };
        let total = iter.try_fold(head, |acc, x| int_op(acc, x).ok_or(OpError::Overflow))?;
        return Ok(Value::integer(total));
    }
    let total = nums
        .iter()
        .map(|n| n.as_f64())
        .reduce(float_op)
        .unwrap_or_default();
    Ok(Value::float(total))
}

fn floor_div(x: i64, y: i64) -> Result<i64, OpError> {
    if y == 0 {
        return Err(OpError::DivisionByZero);
    }
    let quotient = x.checked_div(y).ok_or(OpError::Overflow)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn to_integer(x: f64) -> OpResult {
    if !x.is_finite() {
        return Ok(Value::Null);
    }
    if x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(OpError::Overflow);
    }
    Ok(Value::integer(x as i64))
}

fn gcd(a: i64, b: i64) -> Result<i64, OpError> {
    let (mut a, mut b) = (
        a.checked_abs().ok_or(OpError::Overflow)?,
        b.checked_abs().ok_or(OpError::Overflow)?,
    );
    while b != 0 {
        (a, b) = (b, a % b);
    }
    Ok(a)
}

fn lcm(a: i64, b: i64) -> Result<i64, OpError> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let divisor = gcd(a, b)?;
    (a / divisor)
        .checked_mul(b)
        .and_then(i64::checked_abs)
        .ok_or(OpError::Overflow)
}

fn math(function: MathFunction, x: f64, y: f64) -> f64 {
    use MathFunction::*;
    match function {
        Sin => x.sin(),
        Cos => x.cos(),
        Tan => x.tan(),
        Sec => 1.0 / x.cos(),
        Csc => 1.0 / x.sin(),
        Cot => 1.0 / x.tan(),
        Asin => x.asin(),
        Acos => x.acos(),
        Atan => x.atan(),
        Atan2 => x.atan2(y),
        Asec => (1.0 / x).acos(),
        Acsc => (1.0 / x).asin(),
        Acot => (1.0 / x).atan(),
        Sinh => x.sinh(),
        Cosh => x.cosh(),
        Tanh => x.tanh(),
        Sech => 1.0 / x.cosh(),
        Csch => 1.0 / x.sinh(),
        Coth => 1.0 / x.tanh(),
        Log => x.log10(),
        Ln => x.ln(),
        Exp => x.exp(),
        Abs => x.abs(),
        Signum => {
            if x == 0.0 {
                0.0
            } else {
                x.signum()
            }
        }
        Floor => x.floor(),
        Ceil => x.ceil(),
        ToDegrees => x.to_degrees(),
        ToRadians => x.to_radians(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableDeclaration;
    use crate::random::seeded;

    struct Empty;

    impl Environment for Empty {
        fn declaration(&self, _identifier: &str) -> Option<&VariableDeclaration> {
            None
        }
        fn value(&self, _identifier: &str) -> Value {
            Value::Null
        }
        fn default_value(&self, _identifier: &str) -> Value {
            Value::Null
        }
        fn correct_response(&self, _identifier: &str) -> Value {
            Value::Null
        }
    }

    fn run(kind: ExprKind, args: Vec<Value>) -> OpResult {
        apply(&kind, args, &Empty, &mut seeded(7))
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|i| Value::integer(*i)).collect()
    }

    #[test]
    fn sum_stays_integer_until_a_float_appears() {
        assert_eq!(run(ExprKind::Sum, ints(&[1, 2, 3])).unwrap(), Value::integer(6));
        let mixed = vec![Value::integer(1), Value::float(0.5)];
        assert_eq!(run(ExprKind::Sum, mixed).unwrap(), Value::float(1.5));
        assert_eq!(
            run(ExprKind::Sum, vec![Value::integer(1), Value::Null]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn overflow_is_an_error() {
        let err = run(ExprKind::Sum, ints(&[i64::MAX, 1])).unwrap_err();
        assert_eq!(err, OpError::Overflow);
    }

    #[test]
    fn integer_division_floors() {
        assert_eq!(
            run(ExprKind::IntegerDivide, ints(&[-7, 2])).unwrap(),
            Value::integer(-4)
        );
        assert_eq!(
            run(ExprKind::IntegerModulus, ints(&[-7, 2])).unwrap(),
            Value::integer(1)
        );
        assert_eq!(
            run(ExprKind::IntegerDivide, ints(&[7, 0])).unwrap_err(),
            OpError::DivisionByZero
        );
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let err = run(ExprKind::Divide, vec![Value::float(1.0), Value::integer(0)]).unwrap_err();
        assert_eq!(err, OpError::DivisionByZero);
    }

    #[test]
    fn three_valued_logic() {
        let t = Value::boolean(true);
        let f = Value::boolean(false);
        assert_eq!(
            run(ExprKind::And, vec![t.clone(), Value::Null]).unwrap(),
            Value::Null
        );
        assert_eq!(
            run(ExprKind::And, vec![f.clone(), Value::Null]).unwrap(),
            Value::boolean(false)
        );
        assert_eq!(
            run(ExprKind::Or, vec![t.clone(), Value::Null]).unwrap(),
            Value::boolean(true)
        );
        let any = ExprKind::AnyN { min: 2, max: 3 };
        assert_eq!(
            run(any.clone(), vec![t.clone(), t.clone(), f.clone()]).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(
            run(any.clone(), vec![t.clone(), Value::Null, f]).unwrap(),
            Value::Null
        );
        assert_eq!(
            run(any, vec![t.clone(), t.clone(), t.clone(), t]).unwrap(),
            Value::boolean(false)
        );
    }

    #[test]
    fn rounding() {
        assert_eq!(
            run(ExprKind::Round, vec![Value::float(2.5)]).unwrap(),
            Value::integer(3)
        );
        assert_eq!(
            run(ExprKind::Round, vec![Value::float(-2.5)]).unwrap(),
            Value::integer(-2)
        );
        assert_eq!(
            run(ExprKind::Truncate, vec![Value::float(-2.7)]).unwrap(),
            Value::integer(-2)
        );
    }

    #[test]
    fn containers() {
        let a = Value::identifier("A");
        let b = Value::identifier("B");
        let multiple = run(ExprKind::Multiple, vec![a.clone(), b.clone(), Value::Null]).unwrap();
        assert_eq!(
            run(ExprKind::ContainerSize, vec![multiple.clone()]).unwrap(),
            Value::integer(2)
        );
        assert_eq!(
            run(ExprKind::Member, vec![b.clone(), multiple.clone()]).unwrap(),
            Value::boolean(true)
        );
        let deleted = run(ExprKind::Delete, vec![a.clone(), multiple]).unwrap();
        assert_eq!(
            deleted,
            Value::multiple(BaseType::Identifier, vec![Scalar::Identifier("B".into())])
        );
        let ordered = run(ExprKind::Ordered, vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(
            run(ExprKind::Index { n: 2 }, vec![ordered.clone()]).unwrap(),
            b
        );
        assert!(matches!(
            run(ExprKind::Index { n: 3 }, vec![ordered]),
            Err(OpError::IndexOutOfRange { index: 3, len: 2 })
        ));
        assert_eq!(
            run(ExprKind::ContainerSize, vec![Value::Null]).unwrap(),
            Value::integer(0)
        );
        assert!(matches!(
            run(ExprKind::Multiple, vec![a, Value::integer(1)]),
            Err(OpError::MixedBaseTypes(..))
        ));
    }

    #[test]
    fn ordered_contains_is_a_contiguous_run() {
        let seq = |ids: &[&str]| {
            Value::ordered(
                BaseType::Identifier,
                ids.iter().map(|s| Scalar::Identifier(s.to_string())),
            )
        };
        assert_eq!(
            contains(&seq(&["A", "B", "C"]), &seq(&["B", "C"])).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(
            contains(&seq(&["A", "B", "C"]), &seq(&["A", "C"])).unwrap(),
            Value::boolean(false)
        );
    }

    #[test]
    fn equal_with_tolerance() {
        let kind = ExprKind::Equal {
            mode: ToleranceMode::Absolute,
            tolerance: (0.1, 0.1),
            include_lower: true,
            include_upper: false,
        };
        assert_eq!(
            run(kind.clone(), vec![Value::float(1.0), Value::float(0.95)]).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(
            run(kind, vec![Value::float(1.0), Value::float(1.2)]).unwrap(),
            Value::boolean(false)
        );
    }

    #[test]
    fn min_max_gcd_lcm_flatten_containers() {
        let container = Value::multiple(BaseType::Integer, vec![Scalar::Integer(4), Scalar::Integer(6)]);
        assert_eq!(
            run(ExprKind::Max, vec![container.clone(), Value::integer(5)]).unwrap(),
            Value::integer(6)
        );
        assert_eq!(
            run(ExprKind::Min, vec![container.clone(), Value::float(4.5)]).unwrap(),
            Value::float(4.0)
        );
        assert_eq!(
            run(ExprKind::Gcd, vec![container.clone()]).unwrap(),
            Value::integer(2)
        );
        assert_eq!(
            run(ExprKind::Lcm, vec![container]).unwrap(),
            Value::integer(12)
        );
    }

    #[test]
    fn random_integer_respects_step() {
        let mut rng = seeded(1);
        for _ in 0..100 {
            let value = random_integer(2, 10, 4, &mut rng).unwrap();
            let i = value.as_single().and_then(Scalar::as_integer).unwrap();
            assert!([2, 6, 10].contains(&i));
        }
        assert!(random_integer(5, 1, 1, &mut rng).is_err());
    }

    #[test]
    fn random_integer_full_range_reports_overflow() {
        let mut rng = seeded(1);
        assert!(matches!(
            random_integer(i64::MIN, i64::MAX, 1, &mut rng),
            Err(OpError::Overflow)
        ));
        let value = random_integer(i64::MAX - 1, i64::MAX, 1, &mut rng).unwrap();
        let i = value.as_single().and_then(Scalar::as_integer).unwrap();
        assert!(i >= i64::MAX - 1);
    }

    #[test]
    fn repeat_zero_times_is_null() {
        assert_eq!(
            run(ExprKind::Repeat { times: 0 }, vec![Value::integer(1)]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn repeat_builds_ordered() {
        let result = run(
            ExprKind::Repeat { times: 2 },
            vec![Value::integer(1), Value::integer(2)],
        )
        .unwrap();
        assert_eq!(
            result,
            Value::ordered(
                BaseType::Integer,
                [1, 2, 1, 2].into_iter().map(Scalar::Integer)
            )
        );
    }
}
