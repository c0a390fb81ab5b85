//! Server configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use voxlink_core::{GatewayError, GatewayResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub sessions: SessionsSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// `[auth]` section. An empty password disables authorization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub password: String,
}

/// `[access]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessSection {
    /// Source addresses rejected before the handshake.
    #[serde(default)]
    pub blocked: Vec<String>,
}

/// `[sessions]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsSection {
    /// Seconds between STATUS messages; 0 disables them.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    2333
}
fn default_status_interval() -> u64 {
    60
}

/// CLI values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub blocked: Vec<String>,
    pub status_interval_secs: Option<u64>,
}

/// Resolved server configuration (file parsed, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Shared password; empty disables authorization.
    pub password: String,
    pub blocked: HashSet<IpAddr>,
    /// Passed through to every client session.
    pub status_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::resolve(ConfigFile::default(), Overrides::default())
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> GatewayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Ok(Self::resolve(file_config, overrides))
    }

    fn resolve(file: ConfigFile, overrides: Overrides) -> Self {
        let mut blocked = HashSet::new();
        for raw in file.access.blocked.iter().chain(overrides.blocked.iter()) {
            match raw.trim().parse::<IpAddr>() {
                Ok(ip) => {
                    blocked.insert(ip);
                }
                Err(_) => warn!(address = %raw, "ignoring unparseable blocked address"),
            }
        }

        let status_secs = overrides
            .status_interval_secs
            .unwrap_or(file.sessions.status_interval_secs);

        Self {
            bind: overrides.bind.unwrap_or(file.server.bind),
            port: overrides.port.unwrap_or(file.server.port),
            password: overrides.password.unwrap_or(file.auth.password),
            blocked,
            status_interval: Duration::from_secs(status_secs),
        }
    }

    /// `bind:port` listen address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse(content: &str) -> GatewayResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| GatewayError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 2333);
        assert_eq!(cfg.bind, "0.0.0.0");
        assert!(cfg.password.is_empty());
        assert!(cfg.blocked.is_empty());
        assert_eq!(cfg.status_interval, Duration::from_secs(60));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
bind = "127.0.0.1"
port = 9000

[auth]
password = "hunter2"

[access]
blocked = ["10.0.0.1", "::1"]

[sessions]
status_interval_secs = 0
"#;
        let cfg = ServerConfig::resolve(parse(toml_str).unwrap(), Overrides::default());
        assert_eq!(cfg.listen_addr(), "127.0.0.1:9000");
        assert_eq!(cfg.password, "hunter2");
        assert!(cfg.blocked.contains(&"10.0.0.1".parse::<IpAddr>().unwrap()));
        assert!(cfg.blocked.contains(&"::1".parse::<IpAddr>().unwrap()));
        assert!(cfg.status_interval.is_zero());
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg = parse("[auth]\npassword = \"x\"\n").unwrap();
        assert_eq!(cfg.server.port, 2333);
        assert_eq!(cfg.sessions.status_interval_secs, 60);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(parse("[server\nport ="), Err(GatewayError::Config(_))));
    }

    #[test]
    fn cli_overrides_file() {
        let file = parse("[server]\nport = 9000\n[access]\nblocked = [\"10.0.0.1\"]\n").unwrap();
        let cfg = ServerConfig::resolve(
            file,
            Overrides {
                port: Some(7000),
                password: Some("pw".into()),
                blocked: vec!["10.0.0.2".into(), "not-an-ip".into()],
                ..Overrides::default()
            },
        );
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.password, "pw");
        assert_eq!(cfg.blocked.len(), 2);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = ServerConfig::load(
            Some(Path::new("/nonexistent/voxlink/config.toml")),
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.port, 2333);
    }
}
