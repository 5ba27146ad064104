//! Condition Evaluator: a small, total expression evaluator over the
//! enriched context.
//!
//! Every operator is defined for missing fields (treated as empty, not an
//! error) and for type mismatches (numeric comparison on a non-numeric
//! value is false, never a panic). An `or` combinator starts a new
//! alternative group, resolved left to right: `[{A,and},{B,or},{C,and}]`
//! evaluates as `(A) OR (B AND C)`.

use chrono::{Datelike, Timelike};
use serde_json::Value;

use crate::domain::models::context::EvaluationContext;
use crate::domain::models::rule::{Condition, ConditionOperator, LogicalOperator};

/// Result of one condition check, kept for simulation/debug output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConditionCheck {
    pub field: String,
    pub operator: ConditionOperator,
    pub passed: bool,
}

/// Outcome of evaluating a rule's condition list.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConditionEvaluation {
    pub matched: bool,
    /// First failing condition of the last group tried, for diagnostics.
    pub reason: Option<String>,
    pub checks: Vec<ConditionCheck>,
}

/// Evaluate a rule's conditions against the context. An empty list matches.
pub fn evaluate(conditions: &[Condition], context: &EvaluationContext) -> ConditionEvaluation {
    if conditions.is_empty() {
        return ConditionEvaluation {
            matched: true,
            reason: None,
            checks: Vec::new(),
        };
    }

    let mut checks = Vec::with_capacity(conditions.len());
    let mut any_group_matched = false;
    let mut group_matched = true;
    let mut failed: Option<String> = None;

    for (i, condition) in conditions.iter().enumerate() {
        // `or` on a non-first condition closes the previous group.
        if i > 0 && condition.logical == LogicalOperator::Or {
            any_group_matched |= group_matched;
            group_matched = true;
        }

        let actual = context.lookup(&condition.field);
        let passed = check(condition.operator, &actual, &condition.value);
        checks.push(ConditionCheck {
            field: condition.field.clone(),
            operator: condition.operator,
            passed,
        });

        if !passed {
            group_matched = false;
            failed = Some(format!(
                "{} {:?} did not hold",
                condition.field, condition.operator
            ));
        }
    }
    any_group_matched |= group_matched;

    ConditionEvaluation {
        matched: any_group_matched,
        reason: if any_group_matched { None } else { failed },
        checks,
    }
}

/// Apply one operator. Total: never panics, unknown shapes are false.
fn check(operator: ConditionOperator, actual: &Value, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => loose_eq(actual, expected),
        ConditionOperator::NotEquals => !loose_eq(actual, expected),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !contains(actual, expected),
        ConditionOperator::StartsWith => str_pair(actual, expected)
            .map(|(a, e)| a.to_lowercase().starts_with(&e.to_lowercase()))
            .unwrap_or(false),
        ConditionOperator::EndsWith => str_pair(actual, expected)
            .map(|(a, e)| a.to_lowercase().ends_with(&e.to_lowercase()))
            .unwrap_or(false),
        ConditionOperator::GreaterThan => num_pair(actual, expected)
            .map(|(a, e)| a > e)
            .unwrap_or(false),
        ConditionOperator::LessThan => num_pair(actual, expected)
            .map(|(a, e)| a < e)
            .unwrap_or(false),
        ConditionOperator::IsEmpty => is_empty(actual),
        ConditionOperator::IsNotEmpty => !is_empty(actual),
        ConditionOperator::In => in_set(actual, expected),
        ConditionOperator::NotIn => !in_set(actual, expected),
        ConditionOperator::MatchesRegex => matches_regex(actual, expected),
        ConditionOperator::TimeWithin => time_within(actual, expected),
        ConditionOperator::DayOfWeek => day_of_week(actual, expected),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Equality with numeric coercion and case-insensitive strings.
fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if let Some((a, e)) = num_pair(actual, expected) {
        return (a - e).abs() < f64::EPSILON;
    }
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => a.eq_ignore_ascii_case(e),
        _ => actual == expected,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(haystack) => expected
            .as_str()
            .map(|needle| haystack.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
        _ => false,
    }
}

fn in_set(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(options) => options.iter().any(|option| loose_eq(actual, option)),
        _ => false,
    }
}

fn matches_regex(actual: &Value, expected: &Value) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_str(), expected.as_str()) else {
        return false;
    };
    // An invalid pattern evaluates false rather than erroring.
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

fn str_pair<'a>(actual: &'a Value, expected: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((actual.as_str()?, expected.as_str()?))
}

fn num_pair(actual: &Value, expected: &Value) -> Option<(f64, f64)> {
    Some((as_number(actual)?, as_number(expected)?))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `time_within` expects `{"start": "HH:MM", "end": "HH:MM"}` with an
/// optional `"timezone"` (IANA name, default UTC) and tests the actual
/// value as an RFC3339 timestamp. Overnight windows (`22:00`–`06:00`)
/// wrap past midnight.
fn time_within(actual: &Value, expected: &Value) -> bool {
    let Some(timestamp) = actual
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
    else {
        return false;
    };

    let (Some(start), Some(end)) = (
        expected.get("start").and_then(Value::as_str).and_then(parse_minutes),
        expected.get("end").and_then(Value::as_str).and_then(parse_minutes),
    ) else {
        return false;
    };

    let minute_of_day = match expected.get("timezone").and_then(Value::as_str) {
        Some(tz_name) => match tz_name.parse::<chrono_tz::Tz>() {
            Ok(tz) => {
                let local = timestamp.with_timezone(&tz);
                local.hour() * 60 + local.minute()
            }
            Err(_) => return false,
        },
        None => {
            let utc = timestamp.with_timezone(&chrono::Utc);
            utc.hour() * 60 + utc.minute()
        }
    };

    if start <= end {
        minute_of_day >= start && minute_of_day < end
    } else {
        minute_of_day >= start || minute_of_day < end
    }
}

/// `day_of_week` expects an array of day names or indices (0 = Monday)
/// and tests the actual value as an RFC3339 timestamp (UTC weekday).
fn day_of_week(actual: &Value, expected: &Value) -> bool {
    let Some(timestamp) = actual
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
    else {
        return false;
    };
    let weekday = timestamp
        .with_timezone(&chrono::Utc)
        .weekday()
        .num_days_from_monday();

    let Some(days) = expected.as_array() else {
        return false;
    };
    days.iter().any(|day| match day {
        Value::Number(n) => n.as_u64() == Some(u64::from(weekday)),
        Value::String(name) => day_index(name) == Some(weekday),
        _ => false,
    })
}

fn day_index(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "monday" | "mon" => Some(0),
        "tuesday" | "tue" => Some(1),
        "wednesday" | "wed" => Some(2),
        "thursday" | "thu" => Some(3),
        "friday" | "fri" => Some(4),
        "saturday" | "sat" => Some(5),
        "sunday" | "sun" => Some(6),
        _ => None,
    }
}

fn parse_minutes(hhmm: &str) -> Option<u32> {
    let (h, m) = hhmm.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}
