//! The configuration tree of one model.

use crate::errors::{ConfigurationError, Result, SetupError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Option keys that request a remake of their stage.
pub const REMAKE_FLAGS: [&str; 3] = ["remake", "remake_arrays", "remake_top"];

/// Block holding model-level settings rather than stage options.
pub const MODEL_BLOCK: &str = "model";

/// Holds the merged configuration tree: stage name to option block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigStore {
    tree: Map<String, Value>,
}

impl ConfigStore {
    /// Wraps an already-parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or any stage block is not a mapping.
    pub fn new(config: Value) -> Result<Self> {
        match config {
            Value::Object(tree) => Ok(Self { tree }),
            Value::Null => Ok(Self::default()),
            other => Err(ConfigurationError::new(format!(
                "configuration root must be a mapping, got {}",
                json_type(&other)
            ))
            .into()),
        }
    }

    /// Parses YAML text.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for invalid YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::new(value)
    }

    /// Parses JSON text.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for invalid JSON.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::new(value)
    }

    /// Deep-merges `defaults` beneath the current tree; existing values win.
    #[must_use]
    pub fn with_defaults(mut self, defaults: &Value) -> Self {
        if let Value::Object(defaults) = defaults {
            merge_beneath(&mut self.tree, defaults);
        }
        self
    }

    /// Makes sure every named stage has a (possibly empty) block.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing block is not a mapping.
    pub fn ensure_blocks<'a>(&mut self, stages: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for stage in stages {
            let block = self
                .tree
                .entry(stage.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if block.is_null() {
                *block = Value::Object(Map::new());
            }
            if !block.is_object() {
                return Err(ConfigurationError::new(format!(
                    "option block must be a mapping, got {}",
                    json_type(block)
                ))
                .for_stage(stage)
                .into());
            }
        }
        Ok(())
    }

    /// The whole tree.
    #[must_use]
    pub fn tree(&self) -> &Map<String, Value> {
        &self.tree
    }

    /// The raw option block for a stage.
    #[must_use]
    pub fn block(&self, stage: &str) -> Option<&Value> {
        self.tree.get(stage)
    }

    /// Deserializes a stage's block, using defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error scoped to the stage if the block does
    /// not match the expected shape.
    pub fn options<T: DeserializeOwned + Default>(&self, stage: &str) -> Result<T> {
        parse_block(stage, self.tree.get(stage))
    }

    /// Reads one option.
    #[must_use]
    pub fn get_option(&self, stage: &str, key: &str) -> Option<&Value> {
        self.tree.get(stage)?.get(key)
    }

    /// Sets one option, creating the block if needed.
    pub fn set_option(&mut self, stage: &str, key: &str, value: Value) {
        let block = self
            .tree
            .entry(stage.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !block.is_object() {
            *block = Value::Object(Map::new());
        }
        if let Value::Object(map) = block {
            map.insert(key.to_string(), value);
        }
    }

    /// Returns true if any remake flag is set in the stage's block.
    #[must_use]
    pub fn remake_requested(&self, stage: &str) -> bool {
        REMAKE_FLAGS
            .iter()
            .any(|flag| matches!(self.get_option(stage, flag), Some(Value::Bool(true))))
    }

    /// Requests a remake of a stage.
    pub fn set_remake(&mut self, stage: &str) {
        self.set_option(stage, "remake", Value::Bool(true));
    }

    /// Resets every remake flag present in the stage's block.
    pub fn clear_remake(&mut self, stage: &str) {
        if let Some(Value::Object(map)) = self.tree.get_mut(stage) {
            for flag in REMAKE_FLAGS {
                if let Some(v) = map.get_mut(flag) {
                    *v = Value::Bool(false);
                }
            }
        }
    }

    /// Top-level keys that are neither stages nor the model block.
    #[must_use]
    pub fn passthrough(&self, known: &[&str]) -> Map<String, Value> {
        self.tree
            .iter()
            .filter(|(k, _)| k.as_str() != MODEL_BLOCK && !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// SHA-256 of the canonical JSON form, ignoring remake flags.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut canonical = self.tree.clone();
        for block in canonical.values_mut() {
            if let Value::Object(map) = block {
                for flag in REMAKE_FLAGS {
                    map.remove(flag);
                }
            }
        }
        // serde_json maps are key-sorted, so the string form is canonical.
        let text = Value::Object(canonical).to_string();
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    /// Model name from the `model` block.
    #[must_use]
    pub fn model_name(&self) -> String {
        ["name", "modelname"]
            .iter()
            .find_map(|key| self.get_option(MODEL_BLOCK, key).and_then(Value::as_str))
            .unwrap_or("model")
            .to_string()
    }

    /// Workspace directory from the `model` block.
    #[must_use]
    pub fn workspace(&self) -> String {
        ["workspace", "model_ws", "sim_ws"]
            .iter()
            .find_map(|key| self.get_option(MODEL_BLOCK, key).and_then(Value::as_str))
            .unwrap_or(".")
            .to_string()
    }
}

/// Deserializes one option block into its typed form.
///
/// # Errors
///
/// Returns a configuration error scoped to `stage`.
pub fn parse_block<T: DeserializeOwned + Default>(stage: &str, block: Option<&Value>) -> Result<T> {
    match block {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            SetupError::Configuration(ConfigurationError::new(e.to_string()).for_stage(stage))
        }),
    }
}

fn merge_beneath(target: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, default) in defaults {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default.clone());
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(nested) = default {
                    merge_beneath(existing, nested);
                }
            }
            Some(_) => {}
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_rejects_non_mapping_root() {
        assert!(ConfigStore::new(json!([1, 2])).is_err());
        assert!(ConfigStore::new(Value::Null).unwrap().tree().is_empty());
    }

    #[test]
    fn test_defaults_merge_beneath() {
        let store = ConfigStore::new(json!({"dis": {"top": 5.0}, "extra": 1}))
            .unwrap()
            .with_defaults(&json!({"dis": {"top": 1.0, "length_units": "feet"}, "tdis": {}}));

        assert_eq!(store.get_option("dis", "top"), Some(&json!(5.0)));
        assert_eq!(store.get_option("dis", "length_units"), Some(&json!("feet")));
        assert!(store.block("tdis").is_some());
    }

    #[test]
    fn test_remake_flags_set_and_clear() {
        let mut store = ConfigStore::new(json!({"dis": {"remake_top": true}})).unwrap();
        assert!(store.remake_requested("dis"));
        assert!(!store.remake_requested("grid"));

        store.clear_remake("dis");
        assert!(!store.remake_requested("dis"));

        store.set_remake("grid");
        assert!(store.remake_requested("grid"));
    }

    #[test]
    fn test_hash_ignores_remake_flags_and_key_order() {
        let a = ConfigStore::new(json!({"grid": {"nrow": 2, "ncol": 3}})).unwrap();
        let mut b = ConfigStore::from_json_str(r#"{"grid": {"ncol": 3, "nrow": 2}}"#).unwrap();
        assert_eq!(a.hash(), b.hash());

        b.set_remake("grid");
        assert_eq!(a.hash(), b.hash());

        b.set_option("grid", "nrow", json!(4));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_typed_options_error_names_stage() {
        let store = ConfigStore::new(json!({"grid": {"nrow": "ten"}})).unwrap();
        let err = store.options::<GridOptions>("grid").unwrap_err();
        match err {
            SetupError::Configuration(e) => assert_eq!(e.stage.as_deref(), Some("grid")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_yaml_and_passthrough() {
        let store = ConfigStore::from_yaml_str(
            "model:\n  name: pfl\n  model_ws: out\ngrid:\n  nrow: 2\nnotes: hello\n",
        )
        .unwrap();
        assert_eq!(store.model_name(), "pfl");
        assert_eq!(store.workspace(), "out");
        let extra = store.passthrough(&["grid"]);
        assert_eq!(extra.keys().collect::<Vec<_>>(), vec!["notes"]);
    }

    #[test]
    fn test_ensure_blocks() {
        let mut store = ConfigStore::new(json!({"oc": null})).unwrap();
        store.ensure_blocks(["oc", "ims"]).unwrap();
        assert_eq!(store.block("oc"), Some(&json!({})));
        assert_eq!(store.block("ims"), Some(&json!({})));

        let mut bad = ConfigStore::new(json!({"oc": 3})).unwrap();
        assert!(bad.ensure_blocks(["oc"]).is_err());
    }
}
