//! Rule evaluation engine
//!
//! A short link owns an ordered list of rules. Each rule combines its
//! conditions with AND or OR; the first rule that holds decides the
//! destination and the final rule catches everything else.

pub mod coercion;
pub mod resolver;
pub mod validator;

pub use coercion::{compare, Coercion, Comparable};
pub use resolver::{parse_params, resolve, Resolution};
pub use validator::{
    revalidate, validate_link_id, validate_rules, ValidationError, DEFAULT_MAX_RULES,
};
