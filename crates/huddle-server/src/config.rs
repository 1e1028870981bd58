use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use huddle_api::StreamSettings;
use huddle_core::ChatConfig;

/// Secrets that ship in sample .env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Base URL of the record lookup service; commands are unavailable without it.
    pub lookup_url: Option<String>,
    pub chat: ChatConfig,
    pub stream: StreamSettings,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("HUDDLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HUDDLE_JWT_SECRET is unset or still a placeholder; it must match the identity service's secret");
        }

        let defaults = ChatConfig::default();
        let stream_defaults = StreamSettings::default();

        let chat = ChatConfig {
            admin_roles: list(&get, "HUDDLE_ADMIN_ROLES").unwrap_or(defaults.admin_roles),
            creator_roles: list(&get, "HUDDLE_CREATOR_ROLES").unwrap_or(defaults.creator_roles),
            lookup_inline: Duration::from_millis(parse(&get, "HUDDLE_LOOKUP_INLINE_MS", 750)?),
            lookup_deadline: Duration::from_millis(parse(&get, "HUDDLE_LOOKUP_DEADLINE_MS", 10_000)?),
            max_body_chars: parse(&get, "HUDDLE_MAX_BODY_CHARS", defaults.max_body_chars)?,
            max_attachment_bytes: parse(&get, "HUDDLE_MAX_ATTACHMENT_BYTES", defaults.max_attachment_bytes)?,
            history_limit: parse(&get, "HUDDLE_HISTORY_LIMIT", defaults.history_limit)?,
        };
        if chat.lookup_deadline < chat.lookup_inline {
            bail!("HUDDLE_LOOKUP_DEADLINE_MS must not be shorter than HUDDLE_LOOKUP_INLINE_MS");
        }
        if chat.history_limit == 0 {
            bail!("HUDDLE_HISTORY_LIMIT must be at least 1");
        }

        let stream = StreamSettings {
            buffer: parse(&get, "HUDDLE_STREAM_BUFFER", stream_defaults.buffer)?,
            idle_timeout: Duration::from_secs(parse(
                &get,
                "HUDDLE_STREAM_IDLE_SECS",
                stream_defaults.idle_timeout.as_secs(),
            )?),
        };

        Ok(Self {
            host: get("HUDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "HUDDLE_PORT", 3000)?,
            db_path: get("HUDDLE_DB_PATH").unwrap_or_else(|| "huddle.db".into()).into(),
            jwt_secret,
            lookup_url: get("HUDDLE_LOOKUP_URL").filter(|url| !url.trim().is_empty()),
            chat,
            stream,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Comma-separated list; `None` when unset so the default applies.
fn list(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    get(key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn rejects_missing_or_placeholder_secret() {
        assert!(ServerConfig::from_source(source(&[])).is_err());
        assert!(ServerConfig::from_source(source(&[("HUDDLE_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = ServerConfig::from_source(source(&[("HUDDLE_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.chat.lookup_inline, Duration::from_millis(750));
        assert_eq!(cfg.stream.buffer, 64);
        assert!(cfg.lookup_url.is_none());
    }

    #[test]
    fn overrides_and_lists() {
        let cfg = ServerConfig::from_source(source(&[
            ("HUDDLE_JWT_SECRET", "s3cret"),
            ("HUDDLE_ADMIN_ROLES", "root, ops ,"),
            ("HUDDLE_PORT", "8080"),
            ("HUDDLE_LOOKUP_URL", "http://records.internal"),
        ]))
        .unwrap();
        assert_eq!(cfg.chat.admin_roles, vec!["root", "ops"]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.lookup_url.as_deref(), Some("http://records.internal"));
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = ServerConfig::from_source(source(&[("HUDDLE_JWT_SECRET", "s3cret"), ("HUDDLE_PORT", "eighty")]));
        assert!(err.is_err());
        let err = ServerConfig::from_source(source(&[
            ("HUDDLE_JWT_SECRET", "s3cret"),
            ("HUDDLE_LOOKUP_INLINE_MS", "5000"),
            ("HUDDLE_LOOKUP_DEADLINE_MS", "100"),
        ]));
        assert!(err.is_err());
    }
}
