use lime_core::{LimeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::env;

use crate::lime_home;

// Matches ${VAR} and ${VAR:-default}
static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Recursively substitute environment variables in every string of a JSON value.
pub fn substitute_env_vars(value: &mut Value) -> Result<()> {
    let mut missing = Vec::new();
    substitute_collecting(value, &mut missing);

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(LimeError::ConfigError(format!(
            "Missing required environment variables: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn substitute_collecting(value: &mut Value, missing: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            *s = substitute_in_string(s, missing);
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                substitute_collecting(v, missing);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                substitute_collecting(v, missing);
            }
        }
        _ => {}
    }
}

fn substitute_in_string(input: &str, missing: &mut Vec<String>) -> String {
    ENV_VAR_REGEX
        .replace_all(input, |cap: &regex::Captures| {
            let var_name = &cap[1];
            if let Ok(value) = env::var(var_name) {
                return value;
            }
            if let Some(default) = cap.get(2) {
                return default.as_str().to_string();
            }
            // LIME_HOME always resolves, falling back to ~/.lime-ai
            if var_name == "LIME_HOME" {
                return lime_home().to_string_lossy().to_string();
            }
            missing.push(var_name.to_string());
            String::new()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitute_env_vars() {
        env::set_var("LIME_TEST_VAR", "test_value");

        let mut value = json!({
            "path": "${LIME_TEST_VAR}/some/path",
            "default": "${LIME_NON_EXISTENT:-default_value}",
            "nested": {
                "list": ["${LIME_TEST_VAR}", 42]
            }
        });

        substitute_env_vars(&mut value).unwrap();

        assert_eq!(value["path"], "test_value/some/path");
        assert_eq!(value["default"], "default_value");
        assert_eq!(value["nested"]["list"][0], "test_value");
        assert_eq!(value["nested"]["list"][1], 42);

        env::remove_var("LIME_TEST_VAR");
    }

    #[test]
    fn test_missing_variable_is_config_error() {
        let mut value = json!({"api_key": "${LIME_DEFINITELY_UNSET_VAR}"});
        let err = substitute_env_vars(&mut value).unwrap_err();
        assert!(matches!(err, LimeError::ConfigError(_)));
        assert!(err.to_string().contains("LIME_DEFINITELY_UNSET_VAR"));
    }
}
