//! YAML parser with helpful error messages

use std::path::Path;

use serde_yaml::Value;

use super::schema::SkyforgeConfig;
use crate::error::{DeployError, DeployResult};

/// String values with this prefix are replaced by the named environment variable.
pub const SECRET_PREFIX: &str = "SKYFORGE_SECRET_";

/// Parse skyforge-config.yaml, resolving secret placeholders from the
/// process environment.
pub fn parse_config(path: &Path) -> DeployResult<SkyforgeConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    parse_config_str(&content)
        .map_err(|e| DeployError::Config(format!("{}: {}", path.display(), strip_prefix(e))))
}

/// Parse configuration content from a string.
pub fn parse_config_str(content: &str) -> DeployResult<SkyforgeConfig> {
    parse_config_with(content, |name| std::env::var(name).ok())
}

/// Parse configuration content, resolving placeholders through `lookup`.
pub fn parse_config_with<F>(content: &str, lookup: F) -> DeployResult<SkyforgeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document = parse_document(content)?;
    substitute_secrets(&mut document, &lookup)?;

    let config: SkyforgeConfig = serde_yaml::from_value(document)
        .map_err(|e| DeployError::Config(format!("schema error: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Parse the raw document, keeping unknown keys for round-tripping.
pub fn parse_document(content: &str) -> DeployResult<Value> {
    let document: Value =
        serde_yaml::from_str(content).map_err(|e| enhance_yaml_error(e, content))?;
    match document {
        Value::Mapping(_) => Ok(document),
        Value::Null => Err(DeployError::Config("configuration file is empty".to_string())),
        _ => Err(DeployError::Config(
            "configuration file must be a mapping at the top level".to_string(),
        )),
    }
}

/// Serialize a raw document back to YAML.
pub fn to_yaml(document: &Value) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(document)?)
}

/// Replace every `SKYFORGE_SECRET_<VAR>` string with the value of `<VAR>`.
pub fn substitute_secrets<F>(value: &mut Value, lookup: &F) -> DeployResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if let Some(var) = s.strip_prefix(SECRET_PREFIX) {
                let resolved = lookup(var).ok_or_else(|| {
                    DeployError::Config(format!(
                        "environment variable {var} referenced by {s} is not set"
                    ))
                })?;
                *s = resolved;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_secrets(item, lookup)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                substitute_secrets(item, lookup)?;
            }
        }
        Value::Tagged(tagged) => substitute_secrets(&mut tagged.value, lookup)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

fn enhance_yaml_error(error: serde_yaml::Error, content: &str) -> DeployError {
    match error.location() {
        Some(location) => {
            let line_num = location.line();
            DeployError::Config(format!(
                "YAML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                get_line_context(content, line_num),
                error
            ))
        }
        None => DeployError::Config(format!("YAML parsing error: {error}")),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 2).min(lines.len());
    if start >= end {
        return String::new();
    }

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_prefix(error: DeployError) -> String {
    match error {
        DeployError::Config(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LOCAL: &str = "project_name: demo\nprovider: local\n";

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config_str(LOCAL).unwrap();
        assert_eq!(config.project_name, "demo");
    }

    #[test]
    fn test_empty_document_is_rejected() {
        let err = parse_config_str("").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_syntax_error_reports_line_context() {
        let content = "project_name: demo\nprovider: local\nsecurity: [unclosed\n";
        let err = parse_config_str(content).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line"), "{msg}");
        assert!(msg.contains(">>>"), "{msg}");
    }

    #[test]
    fn test_secret_placeholder_is_resolved() {
        let content = format!(
            "{LOCAL}security:\n  keycloak:\n    initial_root_password: SKYFORGE_SECRET_ROOT_PW\n"
        );
        let config = parse_config_with(&content, |name| {
            (name == "ROOT_PW").then(|| "hunter2".to_string())
        })
        .unwrap();
        assert_eq!(
            config.security.keycloak.initial_root_password.as_deref(),
            Some("hunter2")
        );
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let content = format!("{LOCAL}domain: SKYFORGE_SECRET_DOMAIN\n");
        let err = parse_config_with(&content, |_| None).unwrap_err();
        assert!(err.to_string().contains("DOMAIN"));
    }

    #[test]
    fn test_parse_from_file_names_path_on_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "project_name: demo").unwrap();
        writeln!(file, "provider: nowhere").unwrap();

        let err = parse_config(file.path()).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
