//! Process-wide settings, read once at startup from the environment.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `APP_ENV` | `development` | `production` hardens error bodies |
//! | `PORT` | `3000` | listening port |
//! | `APP_KEYS` | dev-only fallback | comma-separated session signing keys, newest first |
//! | `REDIS_URL` | unset | use Redis stores (needs the `redis` feature) |
//! | `RATE_LIMIT_MAX` | `100` | requests per window per client |
//! | `RATE_LIMIT_WINDOW_MS` | `60000` | window length |
//! | `COMPRESS_THRESHOLD` | `2048` | minimum body size to compress |
//! | `REQUEST_TIMEOUT_MS` | unset | per-request deadline |
//! | `MAX_BODY_BYTES` | `1048576` | largest request body accepted |
//!
//! A `.env` file in the working directory is loaded first, if present.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::Error;
use crate::server::DEFAULT_MAX_BODY;

/// Signing key used when none is configured outside production.
const DEVELOPMENT_KEY: &str = "strata-insecure-development-key";

/// Deployment mode. Production hides diagnostic detail from error bodies.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// `production` (any case) is production; every other value is not.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub mode: Mode,
    pub port: u16,
    pub keys: Vec<String>,
    pub redis_url: Option<String>,
    pub rate_limit_max: u64,
    pub rate_limit_window: Duration,
    pub compress_threshold: usize,
    pub request_timeout: Option<Duration>,
    pub max_body_bytes: usize,
}

impl Settings {
    /// Loads `.env` (if any), then reads the process environment.
    pub fn from_env() -> Result<Self, Error> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(Error::Config { key: ".env".to_owned(), reason: e.to_string() });
            }
        }
        Self::from_vars(std::env::vars())
    }

    /// Builds settings from explicit key/value pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let mode = get("APP_ENV").map(Mode::parse).unwrap_or_default();

        let mut keys: Vec<String> = get("APP_KEYS")
            .map(|v| v.split(',').map(str::trim).filter(|k| !k.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default();
        if keys.is_empty() {
            if mode.is_production() {
                return Err(Error::Config {
                    key: "APP_KEYS".to_owned(),
                    reason: "at least one signing key is required in production".to_owned(),
                });
            }
            warn!("APP_KEYS not set, signing sessions with an insecure development key");
            keys.push(DEVELOPMENT_KEY.to_owned());
        }

        Ok(Self {
            mode,
            port: parse(get("PORT"), "PORT", 3000)?,
            keys,
            redis_url: get("REDIS_URL").map(str::to_owned),
            rate_limit_max: parse(get("RATE_LIMIT_MAX"), "RATE_LIMIT_MAX", 100)?,
            rate_limit_window: Duration::from_millis(
                parse(get("RATE_LIMIT_WINDOW_MS"), "RATE_LIMIT_WINDOW_MS", 60_000)?,
            ),
            compress_threshold: parse(get("COMPRESS_THRESHOLD"), "COMPRESS_THRESHOLD", 2048)?,
            request_timeout: get("REQUEST_TIMEOUT_MS")
                .map(|v| parse(Some(v), "REQUEST_TIMEOUT_MS", 0))
                .transpose()?
                .map(Duration::from_millis),
            max_body_bytes: parse(get("MAX_BODY_BYTES"), "MAX_BODY_BYTES", DEFAULT_MAX_BODY)?,
        })
    }
}

fn parse<T>(value: Option<&str>, key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| Error::Config {
            key: key.to_owned(),
            reason: format!("`{raw}`: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn defaults_in_development() {
        let s = Settings::from_vars(vars(&[])).unwrap();
        assert_eq!(s.mode, Mode::Development);
        assert_eq!(s.port, 3000);
        assert_eq!(s.keys, vec![DEVELOPMENT_KEY.to_owned()]);
        assert_eq!(s.rate_limit_max, 100);
        assert_eq!(s.rate_limit_window, Duration::from_secs(60));
        assert_eq!(s.compress_threshold, 2048);
        assert_eq!(s.request_timeout, None);
        assert_eq!(s.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn production_requires_keys() {
        let err = Settings::from_vars(vars(&[("APP_ENV", "production")])).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "APP_KEYS"));

        let s = Settings::from_vars(vars(&[("APP_ENV", "Production"), ("APP_KEYS", "new, old")]))
            .unwrap();
        assert!(s.mode.is_production());
        assert_eq!(s.keys, vec!["new".to_owned(), "old".to_owned()]);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Settings::from_vars(vars(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn body_limit_is_configurable() {
        let s = Settings::from_vars(vars(&[("MAX_BODY_BYTES", "4096")])).unwrap();
        assert_eq!(s.max_body_bytes, 4096);
        assert!(Settings::from_vars(vars(&[("MAX_BODY_BYTES", "-1")])).is_err());
    }

    #[test]
    fn optional_timeout() {
        let s = Settings::from_vars(vars(&[("REQUEST_TIMEOUT_MS", "250")])).unwrap();
        assert_eq!(s.request_timeout, Some(Duration::from_millis(250)));
    }
}
