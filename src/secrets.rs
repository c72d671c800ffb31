//! Resolved secrets
//!
//! Values are read once at startup and exposed to templates as
//! `secret.<name>`. They never show up in `Debug` output.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

const ENV_PREFIX: &str = "CHATFLOW_SECRET_";

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, Secret>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `CHATFLOW_SECRET_<NAME>` variables as lower-cased `<name>`
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        vars.into_iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(ENV_PREFIX)?;
                (!name.is_empty()).then(|| (name.to_lowercase(), Secret::new(value)))
            })
            .collect()
    }

    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn get(&self, name: &str) -> Option<&Secret> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Secret)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Secret)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (String, Secret)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars() {
        let secrets = Secrets::from_vars([
            ("CHATFLOW_SECRET_API_TOKEN".to_string(), "t0k3n".to_string()),
            ("CHATFLOW_SECRET_".to_string(), "ignored".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets.get("api_token").map(Secret::expose), Some("t0k3n"));
    }

    #[test]
    fn test_debug_is_redacted() {
        let secrets: Secrets = [("key".to_string(), Secret::new("hunter2"))]
            .into_iter()
            .collect();
        let printed = format!("{secrets:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }
}
