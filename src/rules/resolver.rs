//! Picks the destination of a short link for one visitor

use std::collections::HashMap;

use crate::models::{Combinator, Condition, Rule, RuleSet, Variable, VisitorSnapshot};
use crate::rules::coercion::compare;

/// Outcome of evaluating a rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub url: &'a str,
    pub rule_index: usize,
}

/// Parse a raw `key=value&key=value` string. The first occurrence of a key
/// wins and keys without `=` map to an empty value.
pub fn parse_params(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

struct Observations<'a> {
    snapshot: &'a VisitorSnapshot,
    params: HashMap<String, String>,
}

impl<'a> Observations<'a> {
    fn new(snapshot: &'a VisitorSnapshot) -> Self {
        Self {
            snapshot,
            params: parse_params(&snapshot.params),
        }
    }

    fn lookup(&self, condition: &Condition) -> Option<&str> {
        match condition.variable {
            Variable::UrlParameter => condition
                .param
                .as_deref()
                .and_then(|name| self.params.get(name))
                .map(String::as_str),
            variable => self.snapshot.get(variable),
        }
    }

    fn satisfies(&self, condition: &Condition) -> bool {
        compare(
            condition.operator,
            condition.variable,
            self.lookup(condition),
            &condition.value,
        )
    }

    fn matches(&self, rule: &Rule) -> bool {
        match rule.combinator {
            Combinator::And => rule.conditions.iter().all(|c| self.satisfies(c)),
            Combinator::Or => rule.conditions.iter().any(|c| self.satisfies(c)),
        }
    }
}

/// Evaluate `rules` in order and return the first match, or the final
/// catch-all rule when nothing else matches.
pub fn resolve<'a>(rules: &'a RuleSet, snapshot: &VisitorSnapshot) -> Resolution<'a> {
    let observations = Observations::new(snapshot);
    let catch_all = rules.catch_all_index();

    let rule_index = rules.rules()[..catch_all]
        .iter()
        .position(|rule| observations.matches(rule))
        .unwrap_or(catch_all);

    Resolution {
        url: &rules.rules()[rule_index].url,
        rule_index,
    }
}
