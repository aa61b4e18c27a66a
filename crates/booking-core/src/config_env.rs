use std::env;

use url::Url;

use crate::config::ConfigError;

pub(crate) type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(crate) fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

pub(crate) fn require_env(lookup: EnvLookup<'_>, key: &str) -> Result<String, ConfigError> {
    optional_trimmed_env(lookup, key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

pub(crate) fn parse_u32_env(
    lookup: EnvLookup<'_>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match optional_trimmed_env(lookup, key) {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_u64_env(
    lookup: EnvLookup<'_>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match optional_trimmed_env(lookup, key) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_bool_env(
    lookup: EnvLookup<'_>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match optional_trimmed_env(lookup, key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool(key.to_string())),
        },
        None => Ok(default),
    }
}

pub(crate) fn optional_trimmed_env(lookup: EnvLookup<'_>, key: &str) -> Option<String> {
    lookup(key).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub(crate) fn require_http_url(key: &str, value: String) -> Result<String, ConfigError> {
    let parsed = Url::parse(&value).map_err(|err| {
        ConfigError::InvalidConfiguration(format!("{key} must be a valid URL: {err}"))
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(value),
        _ => Err(ConfigError::InvalidConfiguration(format!(
            "{key} must be an http:// or https:// URL with a host"
        ))),
    }
}
