//! Caller-supplied configuration for resolver passes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DockerfileError, Result};

/// Build-argument overrides (`--build-arg KEY=VALUE` / `--build-arg KEY`).
///
/// A key mapped to `None` was named without a value, meaning "use the
/// in-file default". Keys are unique, so the order the caller supplied them
/// in carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildArgs {
    args: BTreeMap<String, Option<String>>,
}

impl BuildArgs {
    /// Empty override set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build overrides from `KEY=VALUE` or bare `KEY` strings.
    ///
    /// A repeated key keeps the last value given.
    pub fn from_kv_strings<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::new();
        for raw in values {
            let raw = raw.as_ref();
            let (key, value) = match raw.split_once('=') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (raw, None),
            };
            if key.is_empty() {
                return Err(DockerfileError::Config(format!(
                    "build argument '{}' has an empty name",
                    raw
                )));
            }
            if out.args.contains_key(key) {
                tracing::debug!(key, "Build argument given more than once, keeping the last value");
            }
            out.args.insert(key.to_string(), value);
        }
        Ok(out)
    }

    /// Load overrides from a YAML (or JSON) mapping of name to value.
    ///
    /// ```text
    /// BASE: ubuntu
    /// TAG: "22.04"
    /// PROXY: ~
    /// ```
    pub fn from_yaml(content: &str) -> Result<Self> {
        let args: Self = serde_yaml::from_str(content)?;
        if args.args.keys().any(|k| k.is_empty()) {
            return Err(DockerfileError::Config(
                "build argument with an empty name".to_string(),
            ));
        }
        Ok(args)
    }

    /// Add or replace one override.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.args.insert(key.into(), value);
    }

    /// `Some(None)` when the key is present without a value.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.args.get(key).map(|v| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kv_strings() {
        let args = BuildArgs::from_kv_strings(["BASE=ubuntu", "TAG", "EMPTY="]).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args.get("BASE"), Some(Some("ubuntu")));
        assert_eq!(args.get("TAG"), Some(None));
        assert_eq!(args.get("EMPTY"), Some(Some("")));
        assert_eq!(args.get("MISSING"), None);
    }

    #[test]
    fn test_from_kv_strings_value_with_equals() {
        let args = BuildArgs::from_kv_strings(["OPTS=a=b"]).unwrap();
        assert_eq!(args.get("OPTS"), Some(Some("a=b")));
    }

    #[test]
    fn test_from_kv_strings_last_wins() {
        let args = BuildArgs::from_kv_strings(["TAG=1", "TAG=2"]).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.get("TAG"), Some(Some("2")));
    }

    #[test]
    fn test_from_kv_strings_empty_key() {
        let err = BuildArgs::from_kv_strings(["=value"]).unwrap_err();
        assert!(matches!(err, DockerfileError::Config(_)));
    }

    #[test]
    fn test_from_yaml() {
        let args = BuildArgs::from_yaml("BASE: ubuntu\nTAG: \"22.04\"\nPROXY: ~\n").unwrap();
        assert_eq!(args.get("BASE"), Some(Some("ubuntu")));
        assert_eq!(args.get("TAG"), Some(Some("22.04")));
        assert_eq!(args.get("PROXY"), Some(None));
    }

    #[test]
    fn test_from_json() {
        let args = BuildArgs::from_yaml(r#"{"BASE": "alpine", "TAG": null}"#).unwrap();
        assert_eq!(args.get("BASE"), Some(Some("alpine")));
        assert_eq!(args.get("TAG"), Some(None));
    }

    #[test]
    fn test_from_yaml_invalid() {
        let err = BuildArgs::from_yaml("- not\n- a map\n").unwrap_err();
        assert!(matches!(err, DockerfileError::Serialization(_)));
    }

    #[test]
    fn test_iter_is_key_ordered() {
        let args = BuildArgs::from_kv_strings(["B=2", "A=1"]).unwrap();
        let keys: Vec<&str> = args.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_serialize_roundtrip_shape() {
        let mut args = BuildArgs::new();
        args.insert("BASE", Some("alpine".to_string()));
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"BASE":"alpine"}"#);
    }
}
