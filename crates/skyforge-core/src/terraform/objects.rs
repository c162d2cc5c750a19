//! Terraform JSON configuration blocks.
//!
//! Each builder returns one top-level JSON object; a stage combines them with
//! [`merge_all`] and writes the result as `*.tf.json`.

use serde_json::{Map, Value, json};

/// A `terraform { backend "<kind>" { ... } }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Backend {
    pub kind: String,
    pub settings: Map<String, Value>,
}

impl Backend {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            settings: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    pub fn to_object(&self) -> Value {
        json!({"terraform": {"backend": {self.kind.clone(): self.settings}}})
    }
}

pub fn provider(name: &str, settings: Value) -> Value {
    json!({"provider": {name: settings}})
}

pub fn required_provider(name: &str, source: &str, version: &str) -> Value {
    json!({"terraform": {"required_providers": {name: {"source": source, "version": version}}}})
}

pub fn data(kind: &str, name: &str, settings: Value) -> Value {
    json!({"data": {kind: {name: settings}}})
}

pub fn variable(name: &str, settings: Value) -> Value {
    json!({"variable": {name: settings}})
}

/// Merge `right` into `left`.
///
/// Objects merge key by key, arrays concatenate, and for any other pair the
/// left value is kept.
pub fn deep_merge(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            for (key, r_value) in r {
                let value = match l.get(key) {
                    Some(l_value) => deep_merge(l_value, r_value),
                    None => r_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        (Value::Array(l), Value::Array(r)) => {
            Value::Array(l.iter().chain(r.iter()).cloned().collect())
        }
        (l, _) => l.clone(),
    }
}

pub fn merge_all<'a>(objects: impl IntoIterator<Item = &'a Value>) -> Value {
    objects
        .into_iter()
        .fold(Value::Object(Map::new()), |acc, obj| deep_merge(&acc, obj))
}

/// Pretty JSON for a `*.tf.json` file.
pub fn to_tf_json(objects: &[Value]) -> anyhow::Result<String> {
    let mut text = serde_json::to_string_pretty(&merge_all(objects))?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_recurses_concatenates_and_keeps_left_scalars() {
        let left = json!({"a": {"b": 1, "list": [1]}, "s": "left"});
        let right = json!({"a": {"c": 2, "list": [2]}, "s": "right", "t": true});

        let merged = deep_merge(&left, &right);

        assert_eq!(
            merged,
            json!({"a": {"b": 1, "c": 2, "list": [1, 2]}, "s": "left", "t": true})
        );
    }

    #[test]
    fn backend_and_providers_share_terraform_block() {
        let backend = Backend::new("s3")
            .with("bucket", "demo-dev-terraform-state")
            .with("encrypt", true);
        let objects = vec![
            backend.to_object(),
            required_provider("aws", "hashicorp/aws", "5.12.0"),
            provider("aws", json!({"region": "us-east-1"})),
        ];

        let merged = merge_all(&objects);

        assert_eq!(
            merged["terraform"]["backend"]["s3"]["bucket"],
            "demo-dev-terraform-state"
        );
        assert_eq!(
            merged["terraform"]["required_providers"]["aws"]["source"],
            "hashicorp/aws"
        );
        assert_eq!(merged["provider"]["aws"]["region"], "us-east-1");
    }

    #[test]
    fn tf_json_ends_with_newline_and_parses() {
        let text = to_tf_json(&[variable("name", json!({"type": "string"}))]).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["variable"]["name"]["type"], "string");
    }
}
