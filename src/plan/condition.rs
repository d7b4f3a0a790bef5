//! Condition evaluation for conditional linkage.
//!
//! A condition tests a single state variable against an expected value.
//! Missing variables evaluate the same as JSON null.

use serde_json::Value;

use crate::{
    model::{ComparisonOperator, Condition, ConditionValue},
    runtime::ExecutionState,
};

/// Evaluate a condition against execution state.
pub fn evaluate(
    condition: &Condition,
    state: &ExecutionState,
) -> bool {
    let actual = state.get(&condition.variable);
    evaluate_comparison(&actual, condition.operator, &condition.value)
}

fn evaluate_comparison(
    actual: &Option<Value>,
    operator: ComparisonOperator,
    expected: &Option<ConditionValue>,
) -> bool {
    match operator {
        ComparisonOperator::Null => actual.is_none() || matches!(actual, Some(Value::Null)),
        ComparisonOperator::NotNull => actual.is_some() && !matches!(actual, Some(Value::Null)),
        ComparisonOperator::Empty => match actual {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        },
        ComparisonOperator::NotEmpty => match actual {
            None => false,
            Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(arr)) => !arr.is_empty(),
            Some(Value::Object(obj)) => !obj.is_empty(),
            _ => true,
        },
        _ => {
            let Some(actual_val) = actual else {
                return false;
            };
            evaluate_with_value(actual_val, operator, expected)
        }
    }
}

/// Evaluate comparison operators that require a value.
fn evaluate_with_value(
    actual: &Value,
    operator: ComparisonOperator,
    expected: &Option<ConditionValue>,
) -> bool {
    let expected = match expected {
        Some(v) => v,
        None => return false,
    };

    match operator {
        ComparisonOperator::Contains => eval_contains(actual, expected),
        ComparisonOperator::NotContains => !eval_contains(actual, expected),
        ComparisonOperator::Is => eval_is(actual, expected),
        ComparisonOperator::IsNot => !eval_is(actual, expected),
        ComparisonOperator::In => eval_in(actual, expected),
        ComparisonOperator::NotIn => !eval_in(actual, expected),
        ComparisonOperator::Eq => eval_eq(actual, expected),
        ComparisonOperator::Ne => !eval_eq(actual, expected),
        ComparisonOperator::Gt => eval_cmp(actual, expected, |a, b| a > b),
        ComparisonOperator::Lt => eval_cmp(actual, expected, |a, b| a < b),
        ComparisonOperator::Ge => eval_cmp(actual, expected, |a, b| a >= b),
        ComparisonOperator::Le => eval_cmp(actual, expected, |a, b| a <= b),
        _ => false,
    }
}

fn eval_contains(
    actual: &Value,
    expected: &ConditionValue,
) -> bool {
    match (actual, expected) {
        (Value::String(s), ConditionValue::Str(e)) => s.contains(e),
        (Value::Array(arr), ConditionValue::Str(e)) => arr.iter().any(|v| v.as_str() == Some(e.as_str())),
        _ => false,
    }
}

fn eval_is(
    actual: &Value,
    expected: &ConditionValue,
) -> bool {
    match (actual, expected) {
        (Value::String(s), ConditionValue::Str(e)) => s == e,
        (Value::Bool(b), ConditionValue::Str(e)) => (*b && e == "true") || (!*b && e == "false"),
        _ => false,
    }
}

fn eval_in(
    actual: &Value,
    expected: &ConditionValue,
) -> bool {
    match expected {
        ConditionValue::List(list) => match actual {
            Value::String(s) => list.contains(s),
            Value::Number(n) => list.contains(&n.to_string()),
            _ => false,
        },
        ConditionValue::Str(s) => match actual {
            Value::String(a) => s.contains(a.as_str()),
            _ => false,
        },
    }
}

fn eval_eq(
    actual: &Value,
    expected: &ConditionValue,
) -> bool {
    match (actual, expected) {
        (Value::Number(n), ConditionValue::Str(s)) => {
            if let Ok(e) = s.parse::<f64>() {
                n.as_f64() == Some(e)
            } else {
                false
            }
        }
        (Value::String(a), ConditionValue::Str(e)) => a == e,
        _ => false,
    }
}

fn eval_cmp<F>(
    actual: &Value,
    expected: &ConditionValue,
    cmp: F,
) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (actual, expected) {
        (Value::Number(n), ConditionValue::Str(s)) => {
            if let (Some(a), Ok(e)) = (n.as_f64(), s.parse::<f64>()) {
                cmp(a, e)
            } else {
                false
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::evaluate;
    use crate::{
        model::{ComparisonOperator, Condition, ConditionValue},
        runtime::ExecutionState,
    };

    fn condition(
        variable: &str,
        operator: ComparisonOperator,
        value: Option<&str>,
    ) -> Condition {
        Condition {
            variable: variable.to_string(),
            operator,
            value: value.map(|v| ConditionValue::Str(v.to_string())),
        }
    }

    #[test]
    fn test_is_and_numeric_comparisons() {
        let state = ExecutionState::from(json!({ "decision": "approve", "score": 7 }));

        assert!(evaluate(&condition("decision", ComparisonOperator::Is, Some("approve")), &state));
        assert!(!evaluate(&condition("decision", ComparisonOperator::Is, Some("reject")), &state));
        assert!(evaluate(&condition("score", ComparisonOperator::Gt, Some("5")), &state));
        assert!(evaluate(&condition("score", ComparisonOperator::Le, Some("7")), &state));
    }

    #[test]
    fn test_missing_variable_is_null() {
        let state = ExecutionState::new();
        assert!(evaluate(&condition("anything", ComparisonOperator::Null, None), &state));
        assert!(!evaluate(&condition("anything", ComparisonOperator::Eq, Some("1")), &state));
    }
}
