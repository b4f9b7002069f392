mod link;
mod visitor;

pub use link::{
    Combinator, Condition, ConditionInput, Operator, Rule, RuleInput, RuleSet, ShortLink, Variable,
};
pub use visitor::VisitorSnapshot;
