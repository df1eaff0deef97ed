use crate::error::{Result, StoreError};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SEPARATOR: &str = "/";

/// Maps (namespace, name) pairs onto flat string keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyer {
    default_namespace: String,
    separator: String,
}

impl Keyer {
    pub fn new(default_namespace: impl Into<String>, separator: impl Into<String>) -> Result<Self> {
        let default_namespace = default_namespace.into();
        let separator = separator.into();

        if separator.is_empty() {
            return Err(StoreError::InvalidInput(
                "key separator must not be empty".to_string(),
            ));
        }
        if default_namespace.is_empty() || default_namespace.contains(&separator) {
            return Err(StoreError::InvalidInput(format!(
                "default namespace {default_namespace:?} is empty or contains \
                 the separator {separator:?}"
            )));
        }

        Ok(Self {
            default_namespace,
            separator,
        })
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Root key for list and watch-list calls: the namespace for namespace-scoped
    /// calls, the default namespace otherwise.
    pub fn key_root(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => self.default_namespace.clone(),
        }
    }

    pub fn key(&self, namespace: Option<&str>, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(StoreError::InvalidInput("name must not be empty".to_string()));
        }
        if name.contains(&self.separator) {
            return Err(StoreError::InvalidInput(format!(
                "name {name:?} contains the key separator {:?}",
                self.separator
            )));
        }

        let root = self.key_root(namespace);
        if root.contains(&self.separator) {
            return Err(StoreError::InvalidInput(format!(
                "namespace {root:?} contains the key separator {:?}",
                self.separator
            )));
        }

        Ok(format!("{root}{}{name}", self.separator))
    }

    /// Splits a key into (namespace, name). A root-only key decodes to
    /// `(key, "")`.
    pub fn decode_key(&self, key: &str) -> Result<(String, String)> {
        if key.is_empty() {
            return Err(StoreError::InvalidInput("key must not be empty".to_string()));
        }

        let parts: Vec<&str> = key.split(self.separator.as_str()).collect();
        match parts.as_slice() {
            [root] => Ok(((*root).to_string(), String::new())),
            [namespace, name] => Ok(((*namespace).to_string(), (*name).to_string())),
            _ => Err(StoreError::InvalidInput(format!(
                "key {key:?} has more than two segments"
            ))),
        }
    }
}

impl Default for Keyer {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}
