//! Typed configuration.
//!
//! Loaded from an optional `frontier` config file layered under
//! `FRONTIER__`-prefixed environment variables. Unknown keys fail
//! startup.

use config::{Config as Cfg, Environment, File};
use serde::Deserialize;

use crate::error::ServiceError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub passkey: PasskeyConfig,
    #[serde(default)]
    pub mailer: MailerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Session lifetime in seconds. Expired sessions are invalid
    /// immediately; the reaper removes the rows.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: i64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    #[serde(default = "default_otp_ttl")]
    pub otp_ttl_secs: i64,
    #[serde(default = "default_link_ttl")]
    pub link_ttl_secs: i64,
    /// Base URL embedded in magic-link mails.
    #[serde(default = "default_link_base_url")]
    pub link_base_url: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            otp_ttl_secs: default_otp_ttl(),
            link_ttl_secs: default_link_ttl(),
            link_base_url: default_link_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasskeyConfig {
    #[serde(default = "default_rp_id")]
    pub rp_id: String,
    /// Allowed WebAuthn origins; the first is the primary.
    #[serde(default = "default_origins")]
    pub origins: Vec<String>,
}

impl Default for PasskeyConfig {
    fn default() -> Self {
        Self {
            rp_id: default_rp_id(),
            origins: default_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailerConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: default_from_address(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    /// `memory://` selects the in-memory backends; relational urls are
    /// handled by the database adapter.
    #[serde(default = "default_db_url")]
    pub url: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Path to a schema document; the built-in base schema is used
    /// when unset.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Emails granted the platform superuser relation at startup.
    #[serde(default)]
    pub admins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            session: SessionConfig::default(),
            flow: FlowConfig::default(),
            passkey: PasskeyConfig::default(),
            mailer: MailerConfig::default(),
            db: DbConfig::default(),
            schema: SchemaConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("frontier").required(false))
            .add_source(Environment::with_prefix("FRONTIER").separator("__"))
            .build()
            .map_err(|e| ServiceError::InvalidArgument(format!("configuration error: {}", e)))?;

        config
            .try_deserialize()
            .map_err(|e| ServiceError::InvalidArgument(format!("configuration error: {}", e)))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session.ttl_secs)
    }

    pub fn domain_pending_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(default_domain_ttl())
    }
}

fn default_service_name() -> String {
    "frontier-core".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_ttl() -> i64 {
    60 * 60 * 24 * 30
}

fn default_reaper_interval() -> u64 {
    300
}

fn default_otp_ttl() -> i64 {
    600
}

fn default_link_ttl() -> i64 {
    900
}

fn default_link_base_url() -> String {
    "http://localhost:8080/v1beta1/auth/callback".to_string()
}

fn default_rp_id() -> String {
    "localhost".to_string()
}

fn default_origins() -> Vec<String> {
    vec!["http://localhost:8080".to_string()]
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "frontier@localhost".to_string()
}

fn default_db_url() -> String {
    "memory://".to_string()
}

fn default_domain_ttl() -> i64 {
    60 * 60 * 24 * 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.db.url, "memory://");
        assert_eq!(config.flow.otp_ttl_secs, 600);
        assert!(!config.passkey.origins.is_empty());
    }

    #[test]
    fn test_unknown_keys_fail() {
        let err = serde_json::from_value::<AppConfig>(serde_json::json!({
            "sesssion": { "ttl_secs": 10 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
