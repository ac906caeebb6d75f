use once_cell::sync::Lazy;
use regex::Regex;
use research_core::{ResearchError, Result};
use serde_yaml::{Number, Value};
use std::env;

// Matches ${VAR} and ${VAR:-default}
static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Recursively substitute environment variables in every string of a YAML document.
///
/// A scalar that is exactly one placeholder and resolves to a number becomes
/// a YAML number, so `max_history_length: "${MAX_HISTORY:-10}"` works.
pub fn substitute_env_vars(value: &mut Value) -> Result<()> {
    let mut missing = Vec::new();
    collect_substitutions(value, &mut missing);

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(ResearchError::ConfigError(format!(
            "Missing required environment variables: {}. Set them or give a ${{VAR:-default}} fallback.",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn collect_substitutions(value: &mut Value, missing: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let whole = ENV_VAR_REGEX
                .find(s)
                .is_some_and(|m| m.start() == 0 && m.end() == s.len());
            let replaced = substitute_in_string(s, missing);
            *value = match whole.then(|| parse_number(&replaced)).flatten() {
                Some(number) => Value::Number(number),
                None => Value::String(replaced),
            };
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                collect_substitutions(v, missing);
            }
        }
        Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                collect_substitutions(v, missing);
            }
        }
        Value::Tagged(tagged) => collect_substitutions(&mut tagged.value, missing),
        _ => {}
    }
}

fn substitute_in_string(input: &str, missing: &mut Vec<String>) -> String {
    ENV_VAR_REGEX
        .replace_all(input, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        missing.push(var_name.to_string());
                        String::new()
                    }
                },
            }
        })
        .into_owned()
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    text.parse::<u64>()
        .map(Number::from)
        .or_else(|_| text.parse::<i64>().map(Number::from))
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(Number::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_env_vars() {
        env::set_var("RESEARCH_TEST_VAR", "test_value");

        let mut value: Value = serde_yaml::from_str(
            r#"
path: "${RESEARCH_TEST_VAR}/some/path"
default: "${RESEARCH_NON_EXISTENT:-default_value}"
nested:
  list:
    - "${RESEARCH_TEST_VAR}"
count: 3
"#,
        )
        .unwrap();

        substitute_env_vars(&mut value).unwrap();

        assert_eq!(value["path"], Value::from("test_value/some/path"));
        assert_eq!(value["default"], Value::from("default_value"));
        assert_eq!(value["nested"]["list"][0], Value::from("test_value"));
        assert_eq!(value["count"].as_u64(), Some(3));

        env::remove_var("RESEARCH_TEST_VAR");
    }

    #[test]
    fn test_whole_placeholder_resolving_to_number_is_typed() {
        env::set_var("RESEARCH_TEST_TIMEOUT", "45");

        let mut value: Value = serde_yaml::from_str(
            r#"
history: "${RESEARCH_UNSET_HISTORY:-7}"
timeout: "${RESEARCH_TEST_TIMEOUT}"
ratio: "${RESEARCH_UNSET_RATIO:-0.5}"
label: "v${RESEARCH_UNSET_VERSION:-2}"
name: "${RESEARCH_UNSET_NAME:-assistant}"
"#,
        )
        .unwrap();

        substitute_env_vars(&mut value).unwrap();

        assert_eq!(value["history"].as_u64(), Some(7));
        assert_eq!(value["timeout"].as_u64(), Some(45));
        assert_eq!(value["ratio"].as_f64(), Some(0.5));
        assert_eq!(value["label"], Value::from("v2"));
        assert_eq!(value["name"], Value::from("assistant"));

        env::remove_var("RESEARCH_TEST_TIMEOUT");
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let mut value = Value::from("${RESEARCH_DEFINITELY_UNSET_VAR}/x");
        let err = substitute_env_vars(&mut value).unwrap_err();
        assert!(err.to_string().contains("RESEARCH_DEFINITELY_UNSET_VAR"));
    }
}
