//! Typed comparison of visitor attributes against condition literals

use std::cmp::Ordering;

use crate::models::{Operator, Variable};

/// How a variable's values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Always compared numerically
    Integer,
    /// Compared numerically only when the literal is all digits, otherwise
    /// lexically. `HH:MM` and `YYYY-MM-DD` order correctly as strings.
    Text,
}

impl Variable {
    pub fn coercion(self) -> Coercion {
        match self {
            Variable::ScreenWidth | Variable::ScreenHeight => Coercion::Integer,
            _ => Coercion::Text,
        }
    }
}

/// A value after coercion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparable<'a> {
    /// Attribute absent from the request, or not parseable as the
    /// required type
    Missing,
    Int(i64),
    Str(&'a str),
}

pub(crate) fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Coerce the observed value and the literal to comparable values
pub fn coerce<'a>(
    variable: Variable,
    observed: Option<&'a str>,
    literal: &'a str,
) -> (Comparable<'a>, Comparable<'a>) {
    let numeric = variable.coercion() == Coercion::Integer || is_all_digits(literal);

    if numeric {
        if let Ok(literal) = literal.trim().parse::<i64>() {
            let observed = observed
                .and_then(|o| o.trim().parse::<i64>().ok())
                .map_or(Comparable::Missing, Comparable::Int);
            return (observed, Comparable::Int(literal));
        }
    }

    let observed = observed.map_or(Comparable::Missing, Comparable::Str);
    (observed, Comparable::Str(literal))
}

fn ordering(observed: &Comparable<'_>, literal: &Comparable<'_>) -> Option<Ordering> {
    match (observed, literal) {
        (Comparable::Int(a), Comparable::Int(b)) => Some(a.cmp(b)),
        (Comparable::Str(a), Comparable::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Evaluate a single comparison.
///
/// A missing observed value only satisfies `≠`. `Contains` always works on
/// the raw strings.
pub fn compare(
    operator: Operator,
    variable: Variable,
    observed: Option<&str>,
    literal: &str,
) -> bool {
    if operator == Operator::Contains {
        return observed.is_some_and(|o| o.contains(literal));
    }

    let (observed, literal) = coerce(variable, observed, literal);
    if observed == Comparable::Missing {
        return operator == Operator::NotEqual;
    }

    let Some(ord) = ordering(&observed, &literal) else {
        return operator == Operator::NotEqual;
    };

    match operator {
        Operator::Equal => ord == Ordering::Equal,
        Operator::NotEqual => ord != Ordering::Equal,
        Operator::Greater => ord == Ordering::Greater,
        Operator::GreaterOrEqual => ord != Ordering::Less,
        Operator::Less => ord == Ordering::Less,
        Operator::LessOrEqual => ord != Ordering::Greater,
        Operator::Contains => false,
    }
}
