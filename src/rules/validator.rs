//! Structural checks run when a link's rules are created or redefined

use thiserror::Error;

use crate::models::{Condition, Operator, Rule, RuleInput, RuleSet, Variable};
use crate::rules::coercion::Coercion;

pub const DEFAULT_MAX_RULES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("short link id must be non-empty and alphanumeric")]
    InvalidLinkId,
    #[error("at least one rule is required")]
    NoRules,
    #[error("too many rules (max {0})")]
    TooManyRules(usize),
    #[error("rule {0}: destination must be an http(s) URL")]
    InvalidUrl(usize),
    #[error("rule {0}: only the final rule may have no conditions")]
    MissingConditions(usize),
    #[error("rule {rule}: invalid variable '{name}'")]
    InvalidVariable { rule: usize, name: String },
    #[error("rule {rule}: invalid operator '{name}'")]
    InvalidOperator { rule: usize, name: String },
    #[error("rule {rule}: a value was not provided for {variable}")]
    EmptyValue { rule: usize, variable: Variable },
    #[error("rule {0}: URL Parameter name must be alphanumeric")]
    InvalidParam(usize),
    #[error("rule {rule}: {variable} expects an integer value")]
    NotInteger { rule: usize, variable: Variable },
    #[error("invalid variable '{0}'")]
    UnknownVariable(String),
    #[error("{0}")]
    InvalidQuery(String),
}

fn is_alphanumeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Normalise a short link id to its stored (lowercase) form
pub fn validate_link_id(id: &str) -> Result<String, ValidationError> {
    if is_alphanumeric(id) {
        Ok(id.to_ascii_lowercase())
    } else {
        Err(ValidationError::InvalidLinkId)
    }
}

fn validate_condition(
    rule: usize,
    input: &crate::models::ConditionInput,
) -> Result<Condition, ValidationError> {
    let variable = input
        .variable
        .parse::<Variable>()
        .map_err(|name| ValidationError::InvalidVariable { rule, name })?;
    let operator = input
        .operator
        .parse::<Operator>()
        .map_err(|name| ValidationError::InvalidOperator { rule, name })?;

    let param = if variable == Variable::UrlParameter {
        // parameter values may legitimately be empty
        match input.param.as_deref() {
            Some(name) if is_alphanumeric(name) => Some(name.to_string()),
            _ => return Err(ValidationError::InvalidParam(rule)),
        }
    } else {
        if input.value.is_empty() {
            return Err(ValidationError::EmptyValue { rule, variable });
        }
        None
    };

    if variable.coercion() == Coercion::Integer
        && operator != Operator::Contains
        && input.value.trim().parse::<i64>().is_err()
    {
        return Err(ValidationError::NotInteger { rule, variable });
    }

    Ok(Condition {
        variable,
        operator,
        value: input.value.clone(),
        param,
    })
}

fn check_structure(rules: &[Rule], max_rules: usize) -> Result<(), ValidationError> {
    if rules.is_empty() {
        return Err(ValidationError::NoRules);
    }
    if rules.len() > max_rules {
        return Err(ValidationError::TooManyRules(max_rules));
    }

    let last = rules.len() - 1;
    for (i, rule) in rules.iter().enumerate() {
        if !(rule.url.starts_with("http://") || rule.url.starts_with("https://")) {
            return Err(ValidationError::InvalidUrl(i));
        }
        if rule.conditions.is_empty() && i != last {
            return Err(ValidationError::MissingConditions(i));
        }
    }

    Ok(())
}

/// Validate owner-submitted rules into a `RuleSet`
pub fn validate_rules(inputs: &[RuleInput], max_rules: usize) -> Result<RuleSet, ValidationError> {
    let rules = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let conditions = input
                .conditions
                .iter()
                .map(|c| validate_condition(i, c))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Rule {
                url: input.url.trim().to_string(),
                combinator: input.combinator,
                conditions,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    check_structure(&rules, max_rules)?;
    Ok(RuleSet::new_unchecked(rules))
}

/// Re-check rules loaded from storage, which are already typed
pub fn revalidate(rules: Vec<Rule>) -> Result<RuleSet, ValidationError> {
    check_structure(&rules, usize::MAX)?;
    Ok(RuleSet::new_unchecked(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Combinator, ConditionInput};

    fn cond(variable: &str, operator: &str, value: &str) -> ConditionInput {
        ConditionInput {
            variable: variable.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
            param: None,
        }
    }

    fn rule(url: &str, conditions: Vec<ConditionInput>) -> RuleInput {
        RuleInput {
            url: url.to_string(),
            combinator: Combinator::And,
            conditions,
        }
    }

    #[test]
    fn test_valid_rules() {
        let rules = validate_rules(
            &[
                rule("https://a.example", vec![cond("Language", "=", "English")]),
                rule("https://b.example", vec![cond("Screen Width", ">=", "1024")]),
                rule("http://c.example", vec![]),
            ],
            DEFAULT_MAX_RULES,
        )
        .unwrap();

        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules()[1].conditions[0].operator, Operator::GreaterOrEqual);
    }

    #[test]
    fn test_empty_non_final_rule_rejected() {
        let err = validate_rules(
            &[rule("https://a.example", vec![]), rule("https://b.example", vec![])],
            DEFAULT_MAX_RULES,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingConditions(0));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = validate_rules(
            &[
                rule("https://a.example", vec![cond("OS", "~=", "Linux")]),
                rule("https://b.example", vec![]),
            ],
            DEFAULT_MAX_RULES,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperator { rule: 0, .. }));
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let err = validate_rules(
            &[
                rule("https://a.example", vec![cond("Shoe Size", "=", "9")]),
                rule("https://b.example", vec![]),
            ],
            DEFAULT_MAX_RULES,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidVariable { .. }));
    }

    #[test]
    fn test_empty_value_allowed_only_for_url_parameter() {
        let err = validate_rules(
            &[
                rule("https://a.example", vec![cond("Browser", "=", "")]),
                rule("https://b.example", vec![]),
            ],
            DEFAULT_MAX_RULES,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyValue { .. }));

        let mut param = cond("URL Parameter", "=", "");
        param.param = Some("ref".to_string());
        assert!(validate_rules(
            &[rule("https://a.example", vec![param]), rule("https://b.example", vec![])],
            DEFAULT_MAX_RULES,
        )
        .is_ok());
    }

    #[test]
    fn test_url_parameter_needs_valid_name() {
        let mut param = cond("URL Parameter", "=", "x");
        param.param = Some("bad name".to_string());
        let err = validate_rules(
            &[rule("https://a.example", vec![param]), rule("https://b.example", vec![])],
            DEFAULT_MAX_RULES,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidParam(0));
    }

    #[test]
    fn test_screen_size_needs_integer() {
        let err = validate_rules(
            &[
                rule("https://a.example", vec![cond("Screen Height", "<", "tall")]),
                rule("https://b.example", vec![]),
            ],
            DEFAULT_MAX_RULES,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::NotInteger { .. }));
    }

    #[test]
    fn test_rule_limits() {
        assert_eq!(validate_rules(&[], DEFAULT_MAX_RULES).unwrap_err(), ValidationError::NoRules);

        let many: Vec<RuleInput> = (0..4)
            .map(|_| rule("https://a.example", vec![cond("OS", "=", "Linux")]))
            .collect();
        assert_eq!(
            validate_rules(&many, 3).unwrap_err(),
            ValidationError::TooManyRules(3)
        );
    }

    #[test]
    fn test_non_http_destination_rejected() {
        let err = validate_rules(&[rule("ftp://files.example", vec![])], DEFAULT_MAX_RULES)
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidUrl(0));
    }

    #[test]
    fn test_link_id() {
        assert_eq!(validate_link_id("AbC123").unwrap(), "abc123");
        assert!(validate_link_id("").is_err());
        assert!(validate_link_id("a&b").is_err());
    }
}
