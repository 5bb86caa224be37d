//! Process configuration read from `AGRICULT_*` environment variables.
//!
//! Every setting has a development default. Production mode refuses to start without
//! explicit token secrets and forces the refresh cookie's `Secure` attribute on.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use base64::Engine;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("production") || raw.eq_ignore_ascii_case("prod") {
            Environment::Production
        } else {
            Environment::Development
        }
    }
}

/// Token lifetimes and signing secrets.
#[derive(Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub otp_ttl: chrono::Duration,
    pub otp_max_attempts: u32,
    /// Phone numbers that receive the admin role when their identity is first created.
    pub admin_phones: Vec<String>,
    /// Echo OTP codes in the send-otp response. Development only.
    pub expose_dev_otp: bool,
    /// Mark the refresh cookie `Secure`.
    pub secure_cookies: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("otp_ttl", &self.otp_ttl)
            .field("otp_max_attempts", &self.otp_max_attempts)
            .field("admin_phones", &self.admin_phones)
            .field("expose_dev_otp", &self.expose_dev_otp)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

impl AuthConfig {
    /// Development defaults with the given secrets; used by tests and local runs.
    pub fn with_secrets(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: chrono::Duration::minutes(15),
            refresh_ttl: chrono::Duration::days(7),
            otp_ttl: chrono::Duration::seconds(300),
            otp_max_attempts: 5,
            admin_phones: Vec::new(),
            expose_dev_otp: false,
            secure_cookies: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub environment: Environment,
    pub auth: AuthConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let environment = Environment::parse(&std::env::var("AGRICULT_ENV").unwrap_or_else(|_| "development".to_string()));
        let production = environment == Environment::Production;

        let access_secret = load_secret("AGRICULT_ACCESS_TOKEN_SECRET", production)?;
        let refresh_secret = load_secret("AGRICULT_REFRESH_TOKEN_SECRET", production)?;
        if access_secret == refresh_secret {
            warn!(target: "startup", "access and refresh token secrets are identical; refresh tokens are still rejected as access tokens by type");
        }

        let mut auth = AuthConfig::with_secrets(access_secret, refresh_secret);
        auth.access_ttl = chrono::Duration::minutes(try_load("AGRICULT_ACCESS_TTL_MINUTES", 15i64));
        auth.refresh_ttl = chrono::Duration::days(try_load("AGRICULT_REFRESH_TTL_DAYS", 7i64));
        auth.otp_ttl = chrono::Duration::seconds(try_load("AGRICULT_OTP_TTL_SECS", 300i64));
        auth.admin_phones = std::env::var("AGRICULT_ADMIN_PHONES")
            .map(|raw| raw.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        auth.secure_cookies = production;
        auth.expose_dev_otp = try_load("AGRICULT_EXPOSE_DEV_OTP", false);
        if production && auth.expose_dev_otp {
            warn!(target: "startup", "AGRICULT_EXPOSE_DEV_OTP ignored in production");
            auth.expose_dev_otp = false;
        }

        Ok(Self {
            http_port: try_load("AGRICULT_HTTP_PORT", 5000u16),
            data_dir: PathBuf::from(std::env::var("AGRICULT_DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            environment,
            auth,
        })
    }
}

fn try_load<T: FromStr + Display + Copy>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!(target: "startup", "Invalid {key} value '{raw}': {e}; using default {default}");
            default
        }),
        Err(_) => default,
    }
}

fn load_secret(key: &str, production: bool) -> Result<String> {
    match std::env::var(key) {
        Ok(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ if production => Err(anyhow!("{key} must be set in production")),
        _ => {
            let mut buf = [0u8; 32];
            getrandom::getrandom(&mut buf).map_err(|e| anyhow!("secret generation failed: {e}"))?;
            info!(target: "startup", "{key} not set; generated an ephemeral development secret");
            Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse_defaults_to_development() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Development);
        assert_eq!(Environment::parse(""), Environment::Development);
    }

    #[test]
    fn with_secrets_uses_short_access_and_long_refresh_lifetimes() {
        let cfg = AuthConfig::with_secrets("a", "r");
        assert_eq!(cfg.access_ttl, chrono::Duration::minutes(15));
        assert_eq!(cfg.refresh_ttl, chrono::Duration::days(7));
        assert!(!cfg.secure_cookies);
        assert!(!format!("{cfg:?}").contains("\"a\""));
    }

    #[test]
    fn development_secret_is_generated_when_missing() {
        let s = load_secret("AGRICULT_TEST_SECRET_THAT_IS_NEVER_SET", false).unwrap();
        assert!(s.len() >= 40);
        assert!(load_secret("AGRICULT_TEST_SECRET_THAT_IS_NEVER_SET", true).is_err());
    }
}
