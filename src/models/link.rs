use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visitor attributes a condition can inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variable {
    Language,
    Time,
    #[serde(rename = "Time Zone")]
    TimeZone,
    Date,
    #[serde(rename = "OS")]
    Os,
    Browser,
    #[serde(rename = "URL Parameter")]
    UrlParameter,
    #[serde(rename = "Screen Width")]
    ScreenWidth,
    #[serde(rename = "Screen Height")]
    ScreenHeight,
    #[serde(rename = "Has Touchscreen")]
    HasTouchscreen,
    #[serde(rename = "Using Ad Blocker")]
    UsingAdBlocker,
    Country,
}

impl Variable {
    pub const ALL: [Variable; 12] = [
        Variable::Language,
        Variable::Time,
        Variable::TimeZone,
        Variable::Date,
        Variable::Os,
        Variable::Browser,
        Variable::UrlParameter,
        Variable::ScreenWidth,
        Variable::ScreenHeight,
        Variable::HasTouchscreen,
        Variable::UsingAdBlocker,
        Variable::Country,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Variable::Language => "Language",
            Variable::Time => "Time",
            Variable::TimeZone => "Time Zone",
            Variable::Date => "Date",
            Variable::Os => "OS",
            Variable::Browser => "Browser",
            Variable::UrlParameter => "URL Parameter",
            Variable::ScreenWidth => "Screen Width",
            Variable::ScreenHeight => "Screen Height",
            Variable::HasTouchscreen => "Has Touchscreen",
            Variable::UsingAdBlocker => "Using Ad Blocker",
            Variable::Country => "Country",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Comparison applied between the observed value and the literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "≠", alias = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "≥", alias = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "≤", alias = "<=")]
    LessOrEqual,
    Contains,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "≠",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => "≥",
            Operator::Less => "<",
            Operator::LessOrEqual => "≤",
            Operator::Contains => "Contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Operator::Equal),
            "≠" | "!=" => Ok(Operator::NotEqual),
            ">" => Ok(Operator::Greater),
            "≥" | ">=" => Ok(Operator::GreaterOrEqual),
            "<" => Ok(Operator::Less),
            "≤" | "<=" => Ok(Operator::LessOrEqual),
            "Contains" => Ok(Operator::Contains),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: Variable,
    pub operator: Operator,
    pub value: String,
    /// Only meaningful for `Variable::UrlParameter`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub url: String,
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Ordered rule list that has passed validation.
///
/// Only the final rule may have no conditions; it acts as the catch-all.
/// Instances are produced by `rules::validator`, which is what lets the
/// resolver skip structural checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    pub(crate) fn new_unchecked(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn catch_all_index(&self) -> usize {
        self.0.len().saturating_sub(1)
    }
}

/// Unvalidated condition as submitted by a link owner
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionInput {
    pub variable: String,
    pub operator: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub param: Option<String>,
}

/// Unvalidated rule as submitted by a link owner
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub url: String,
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<ConditionInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortLink {
    /// Public alias, may be reused after deletion
    pub id: String,
    /// Analytics identity, rotated whenever the rules are redefined
    pub uid: String,
    pub rules: RuleSet,
    /// Redirect count per rule, same length as `rules`
    pub counters: Vec<i64>,
    pub first_event_minute: Option<i64>,
    pub owner: Option<String>,
    pub deleted: bool,
    pub created_at: i64,
}

impl ShortLink {
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owner.as_deref() == Some(username)
    }
}
