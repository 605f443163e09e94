//! Runtime configuration for the Pincer egress boundary.
//!
//! Configuration is loaded from an optional TOML file via the [`config`]
//! crate, then overridden by `KEY=VALUE` command-line options, the same
//! two-layer approach `crates/arti/src/app/config.rs` uses for `ArtiConfig`.
//! [`Global::try_into`] is the entry point a binary calls once at startup.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::convert::TryFrom;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use pincer_crypto::Secret;
use serde::Deserialize;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The `config` crate failed to read or merge a source.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// A required secret (`bootstrapToken`, `kek`) was never set.
    #[error("required configuration value {0:?} is missing")]
    MissingRequired(&'static str),
    /// `bindAddr` did not parse as a socket address.
    #[error("bindAddr {0:?} is not a valid socket address")]
    InvalidBindAddr(String),
}

/// Logging configuration, mirroring `arti_config::LoggingConfig`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// An `EnvFilter`-syntax directive string, e.g. `"info"` or
    /// `"pincer_server=debug,info"`.
    pub trace_filter: String,
}

/// Fully resolved, validated runtime configuration.
#[derive(Clone)]
pub struct PincerConfig {
    /// Directory the flat KV namespace is rooted at.
    pub kv_root: PathBuf,
    /// Address the HTTP router binds to.
    pub bind_addr: SocketAddr,
    /// The bootstrap token an operator must present to create the admin
    /// user.
    pub bootstrap_token: Secret<String>,
    /// Key-encrypting key the vault derives its AES-256-GCM key from.
    pub kek: Secret<Vec<u8>>,
    /// Default vault binding name for the HMAC signing secret, used when a
    /// runtime key record doesn't say otherwise.
    pub default_hmac_secret_binding: String,
    /// Default vault binding name for the runtime key secret itself.
    pub default_key_secret_binding: String,
    /// Allowed clock skew, in seconds, for signed-request timestamps.
    pub skew_seconds: i64,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl std::fmt::Debug for PincerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PincerConfig")
            .field("kv_root", &self.kv_root)
            .field("bind_addr", &self.bind_addr)
            .field("bootstrap_token", &self.bootstrap_token)
            .field("kek", &self.kek)
            .field("default_hmac_secret_binding", &self.default_hmac_secret_binding)
            .field("default_key_secret_binding", &self.default_key_secret_binding)
            .field("skew_seconds", &self.skew_seconds)
            .finish()
    }
}

/// The raw, partially-defaulted shape deserialized from TOML/CLI overrides,
/// before [`PincerConfig::try_from`] validates it.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    kv_root: Option<String>,
    bind_addr: Option<String>,
    bootstrap_token: Option<String>,
    kek: Option<String>,
    default_hmac_secret_binding: Option<String>,
    default_key_secret_binding: Option<String>,
    skew_seconds: Option<i64>,
    trace_filter: Option<String>,
}

fn default_kv_root() -> String {
    "./data".to_owned()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_owned()
}

fn default_trace_filter() -> String {
    "info".to_owned()
}

impl TryFrom<RawConfig> for PincerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let bind_addr = raw.bind_addr.unwrap_or_else(default_bind_addr);
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr.clone()))?;

        Ok(PincerConfig {
            kv_root: PathBuf::from(raw.kv_root.unwrap_or_else(default_kv_root)),
            bind_addr,
            bootstrap_token: Secret::new(
                raw.bootstrap_token.ok_or(ConfigError::MissingRequired("bootstrapToken"))?,
            ),
            kek: Secret::new(raw.kek.ok_or(ConfigError::MissingRequired("kek"))?.into_bytes()),
            default_hmac_secret_binding: raw
                .default_hmac_secret_binding
                .unwrap_or_else(|| pincer_auth_default_hmac_binding().to_owned()),
            default_key_secret_binding: raw
                .default_key_secret_binding
                .unwrap_or_else(|| pincer_auth_default_key_binding().to_owned()),
            skew_seconds: raw.skew_seconds.unwrap_or(60),
            logging: LoggingConfig { trace_filter: raw.trace_filter.unwrap_or_else(default_trace_filter) },
        })
    }
}

/// Mirrors `pincer_auth::DEFAULT_HMAC_SECRET_BINDING` without adding a
/// dependency edge from config loading onto the auth crate.
fn pincer_auth_default_hmac_binding() -> &'static str {
    "PINCER_HMAC_SECRET_ACTIVE"
}

/// Mirrors `pincer_auth::DEFAULT_KEY_SECRET_BINDING`.
fn pincer_auth_default_key_binding() -> &'static str {
    "PINCER_RUNTIME_KEY_SECRET_ACTIVE"
}

/// Command-line arguments, composed with an optional config file the way
/// `crates/arti/src/app/config.rs`'s `Global` is.
#[derive(Debug, Parser)]
pub struct Global {
    /// Path to a TOML config file. Defaults to `./pincer.toml` if present;
    /// silently skipped if absent and not explicitly named.
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Override config file parameters, `key=value` (e.g.
    /// `bindAddr=0.0.0.0:8080`).
    #[arg(short = 's', value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Override the log level (`EnvFilter` syntax, e.g. `debug` or
    /// `pincer_server=debug,info`).
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

impl TryFrom<Global> for PincerConfig {
    type Error = ConfigError;

    fn try_from(global: Global) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        let explicit_files = !global.files.is_empty();
        let files = if explicit_files {
            global.files
        } else {
            vec![default_config_file()]
        };
        for file in files {
            let required = explicit_files || file.exists();
            builder = builder.add_source(
                config::File::from(file).required(required).format(config::FileFormat::Toml),
            );
        }
        builder = builder.add_source(config::Environment::with_prefix("PINCER").separator("__"));
        for option in &global.options {
            let Some((key, value)) = option.split_once('=') else { continue };
            builder = builder.set_override(key, value)?;
        }
        if let Some(log_level) = &global.log_level {
            builder = builder.set_override("traceFilter", log_level.as_str())?;
        }

        let raw: RawConfig = builder.build()?.try_deserialize()?;
        PincerConfig::try_from(raw)
    }
}

fn default_config_file() -> PathBuf {
    PathBuf::from("./pincer.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_fills_in_documented_defaults() {
        let raw = RawConfig {
            bootstrap_token: Some("boot-token".to_owned()),
            kek: Some("a long kek value".to_owned()),
            ..Default::default()
        };
        let config = PincerConfig::try_from(raw).unwrap();
        assert_eq!(config.kv_root, PathBuf::from("./data"));
        assert_eq!(config.bind_addr, "127.0.0.1:8787".parse().unwrap());
        assert_eq!(config.default_hmac_secret_binding, "PINCER_HMAC_SECRET_ACTIVE");
        assert_eq!(config.skew_seconds, 60);
    }

    #[test]
    fn missing_bootstrap_token_is_rejected() {
        let raw = RawConfig { kek: Some("kek".to_owned()), ..Default::default() };
        let err = PincerConfig::try_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("bootstrapToken")));
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let raw = RawConfig {
            bootstrap_token: Some("t".to_owned()),
            kek: Some("k".to_owned()),
            bind_addr: Some("not-an-address".to_owned()),
            ..Default::default()
        };
        let err = PincerConfig::try_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddr(_)));
    }

    #[test]
    fn explicit_overrides_take_priority_over_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("pincer.toml");
        std::fs::write(
            &config_path,
            "bootstrapToken = \"file-token\"\nkek = \"file-kek\"\nbindAddr = \"0.0.0.0:9000\"\n",
        )
        .unwrap();

        let global = Global {
            files: vec![config_path],
            options: vec!["bindAddr=127.0.0.1:7000".to_owned()],
            log_level: None,
        };
        let config = PincerConfig::try_from(global).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.bootstrap_token.expose(), "file-token");
    }
}
