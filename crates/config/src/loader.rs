//! Configuration loading.
//!
//! Discovery order: explicit `--config` path, the `ANTWORT_CONFIG`
//! environment variable, `./config.yaml`, `/etc/antwort/config.yaml`, then
//! defaults only. The raw YAML tree is rewritten before deserialization:
//! `*_file` keys are replaced by the referenced file's contents and
//! `ANTWORT_`-prefixed environment variables override values, nested with
//! `_`.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use indoc::indoc;
use serde_yaml::Value;

use crate::Config;

const ENV_PREFIX: &str = "ANTWORT_";
const CONFIG_ENV: &str = "ANTWORT_CONFIG";
const LOCAL_PATH: &str = "./config.yaml";
const SYSTEM_PATH: &str = "/etc/antwort/config.yaml";

/// Nested mapping keys the env-override walker may descend into when the
/// file does not mention them. Needed because key names themselves contain
/// underscores.
const KNOWN_SECTIONS: &[&str] = &[
    "server",
    "auth",
    "rate_limits",
    "storage",
    "llm",
    "tools",
    "engine",
    "agents",
    "admin",
    "jwt",
    "oauth_proxy",
    "mtls",
    "per_ip",
    "per_subject",
    "mcp",
    "builtin",
    "sandbox",
    "providers",
    "servers",
];

/// Resolve the configuration file path per the discovery order. `None` means
/// run on defaults.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    for candidate in [LOCAL_PATH, SYSTEM_PATH] {
        let path = PathBuf::from(candidate);

        if path.exists() {
            return Some(path);
        }
    }

    None
}

pub(crate) fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut raw = match discover(explicit) {
        Some(path) => {
            log::debug!("loading configuration from {}", path.display());

            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read configuration file {}", path.display()))?;

            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse configuration file {}", path.display()))?
        }
        None => {
            log::debug!("no configuration file found, using defaults");
            Value::Mapping(Default::default())
        }
    };

    resolve_file_references(&mut raw)?;
    apply_env_overrides(&mut raw, std::env::vars().filter(|(k, _)| k != CONFIG_ENV));

    let config = serde_yaml::from_value(raw).context("invalid configuration")?;
    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if !config.llm.has_providers() {
        bail!(indoc! {r#"
            No inference backends configured. Antwort requires at least one provider under `llm.providers`.

            Example configuration:

              llm:
                providers:
                  openai:
                    type: chat_completions
                    base_url: "https://api.openai.com/v1"
                    api_key_file: /var/run/secrets/openai-key
        "#});
    }

    if let Some(name) = &config.llm.default_provider
        && !config.llm.providers.contains_key(name)
    {
        bail!("llm.default_provider names `{name}` but no such provider is configured");
    }

    if config.llm.default_provider().is_none() {
        bail!("llm.default_provider is required when more than one provider is configured");
    }

    Ok(())
}

/// Replace every `<key>_file: <path>` entry with `<key>: <file contents>`.
/// An explicit `<key>` in the same mapping wins over the indirection.
fn resolve_file_references(value: &mut Value) -> anyhow::Result<()> {
    match value {
        Value::Mapping(map) => {
            let file_keys: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| match (k.as_str(), v.as_str()) {
                    (Some(key), Some(_)) if key.ends_with("_file") && key.len() > "_file".len() => {
                        Some(key.to_string())
                    }
                    _ => None,
                })
                .collect();

            for file_key in file_keys {
                let Some(Value::String(path)) = map.remove(Value::String(file_key.clone())) else {
                    continue;
                };

                let target = file_key.trim_end_matches("_file").to_string();

                if map.contains_key(Value::String(target.clone())) {
                    continue;
                }

                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read secret file `{path}` for `{target}`"))?;

                map.insert(Value::String(target), Value::String(content.trim_end().to_string()));
            }

            for (_, child) in map.iter_mut() {
                resolve_file_references(child)?;
            }
        }
        Value::Sequence(values) => {
            for child in values.iter_mut() {
                resolve_file_references(child)?;
            }
        }
        _ => {}
    }

    Ok(())
}

fn apply_env_overrides(raw: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    if !matches!(raw, Value::Mapping(_)) {
        return;
    }

    let mut overrides: Vec<(String, String)> = vars
        .filter_map(|(key, value)| {
            key.strip_prefix(ENV_PREFIX)
                .map(|rest| (rest.to_ascii_lowercase(), value))
        })
        .collect();

    // Deterministic application order.
    overrides.sort();

    for (key, value) in overrides {
        let tokens: Vec<&str> = key.split('_').filter(|t| !t.is_empty()).collect();

        if tokens.is_empty() {
            continue;
        }

        if !apply_override(raw, &tokens, &value, true) {
            log::warn!("ignoring environment override ANTWORT_{}", key.to_ascii_uppercase());
        }
    }
}

/// Greedy longest-prefix descent: an existing mapping key wins, then a known
/// section name (created on demand), and the remaining tokens join into the
/// leaf key. At the root, unknown leaves are refused so stray `ANTWORT_*`
/// variables cannot poison deserialization.
fn apply_override(value: &mut Value, tokens: &[&str], raw: &str, root: bool) -> bool {
    let Value::Mapping(map) = value else {
        return false;
    };

    for split in (1..tokens.len()).rev() {
        let key = Value::String(tokens[..split].join("_"));

        if let Some(child) = map.get_mut(&key)
            && matches!(child, Value::Mapping(_))
            && apply_override(child, &tokens[split..], raw, false)
        {
            return true;
        }
    }

    for split in (1..tokens.len()).rev() {
        let joined = tokens[..split].join("_");

        if !KNOWN_SECTIONS.contains(&joined.as_str()) {
            continue;
        }

        let key = Value::String(joined);
        let child = map
            .entry(key)
            .or_insert_with(|| Value::Mapping(Default::default()));

        if apply_override(child, &tokens[split..], raw, false) {
            return true;
        }
    }

    let leaf = tokens.join("_");

    if root && !map.contains_key(Value::String(leaf.clone())) {
        return false;
    }

    map.insert(Value::String(leaf), parse_scalar(raw));
    true
}

/// Interpret an override value the way YAML would.
fn parse_scalar(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }

    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }

    if let Ok(f) = raw.parse::<f64>() {
        return Value::Number(serde_yaml::Number::from(f));
    }

    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;
    use secrecy::ExposeSecret;

    use super::*;

    fn parse_with_env(yaml: &str, vars: &[(&str, &str)]) -> Config {
        let mut raw: Value = serde_yaml::from_str(yaml).unwrap();
        resolve_file_references(&mut raw).unwrap();
        apply_env_overrides(
            &mut raw,
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        );

        serde_yaml::from_value(raw).unwrap()
    }

    #[test]
    fn env_overrides_existing_value() {
        let config = parse_with_env(
            indoc! {r#"
                engine:
                  max_turns: 4
            "#},
            &[("ANTWORT_ENGINE_MAX_TURNS", "7")],
        );

        assert_eq!(config.engine.max_turns, 7);
    }

    #[test]
    fn env_override_creates_missing_sections() {
        let config = parse_with_env("{}", &[("ANTWORT_SERVER_LISTEN_ADDRESS", "127.0.0.1:9000")]);

        assert_eq!(
            config.server.listen_address,
            Some("127.0.0.1:9000".parse().unwrap())
        );
    }

    #[test]
    fn env_override_reaches_nested_known_sections() {
        let config = parse_with_env("{}", &[("ANTWORT_SERVER_ADMIN_ENABLED", "true")]);
        assert!(config.server.admin.enabled);
    }

    #[test]
    fn env_override_with_underscored_section() {
        let config = parse_with_env("{}", &[("ANTWORT_RATE_LIMITS_ENABLED", "true")]);
        assert!(config.rate_limits.enabled);
    }

    #[test]
    fn file_reference_resolves_secret() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sk-from-file").unwrap();

        let yaml = format!(
            indoc! {r#"
                llm:
                  providers:
                    upstream:
                      type: chat_completions
                      base_url: "https://api.example.com/v1"
                      api_key_file: "{}"
            "#},
            file.path().display()
        );

        let config = parse_with_env(&yaml, &[]);
        let provider = &config.llm.providers["upstream"];

        assert_eq!(provider.api_key.as_ref().unwrap().expose_secret(), "sk-from-file");
    }

    #[test]
    fn validate_requires_a_provider() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        let err = validate(&config).unwrap_err().to_string();

        assert!(err.contains("No inference backends configured"), "{err}");
    }

    #[test]
    fn validate_checks_default_provider_name() {
        let config: Config = serde_yaml::from_str(indoc! {r#"
            llm:
              default_provider: missing
              providers:
                local:
                  type: chat_completions
                  base_url: "http://localhost:11434/v1"
        "#})
        .unwrap();

        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("default_provider"), "{err}");
    }

    #[test]
    fn validate_accepts_single_provider() {
        let config: Config = serde_yaml::from_str(indoc! {r#"
            llm:
              providers:
                local:
                  type: chat_completions
                  base_url: "http://localhost:11434/v1"
        "#})
        .unwrap();

        validate(&config).unwrap();
    }
}
