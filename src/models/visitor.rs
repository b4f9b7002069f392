use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::Variable;

/// Attributes observed for a single redirect request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisitorSnapshot {
    pub values: BTreeMap<Variable, String>,
    /// Raw `key=value&...` string from the visited URL
    pub params: String,
}

impl VisitorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from loosely typed client data.
    ///
    /// Unknown keys are ignored. A "URL Parameter" entry is only used when
    /// `params` is empty.
    pub fn from_raw(data: HashMap<String, String>, params: String) -> Self {
        let mut snapshot = Self {
            values: BTreeMap::new(),
            params,
        };

        for (key, value) in data {
            match key.parse::<Variable>() {
                Ok(Variable::UrlParameter) => {
                    if snapshot.params.is_empty() {
                        snapshot.params = value;
                    }
                }
                Ok(variable) => {
                    snapshot.values.insert(variable, value);
                }
                Err(_) => {}
            }
        }

        snapshot
    }

    pub fn with(mut self, variable: Variable, value: impl Into<String>) -> Self {
        self.set(variable, value);
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    pub fn set(&mut self, variable: Variable, value: impl Into<String>) {
        if variable == Variable::UrlParameter {
            self.params = value.into();
        } else {
            self.values.insert(variable, value.into());
        }
    }

    pub fn get(&self, variable: Variable) -> Option<&str> {
        self.values.get(&variable).map(String::as_str)
    }

    /// Every (variable, value) pair worth counting, URL parameters included
    pub fn observed(&self) -> Vec<(Variable, String)> {
        let mut observed: Vec<(Variable, String)> = self
            .values
            .iter()
            .map(|(variable, value)| (*variable, value.clone()))
            .collect();

        let params = self.params.trim_start_matches('?');
        if !params.is_empty() {
            observed.push((Variable::UrlParameter, params.to_string()));
        }

        observed
    }
}
