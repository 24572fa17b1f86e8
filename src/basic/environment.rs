//! Global variable store shared by every logical thread

use std::collections::HashMap;

/// Case-insensitive map of variable name to value.
/// Unset variables read as the empty string.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    variables: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> &str {
        self.variables
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
