use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   config.toml:     [server]
//                    keepalive_secs = 120
//
//   env var:         RELAY_SERVER__KEEPALIVE_SECS=120   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
    #[serde(default)]
    pub ai: AiFileConfig,
    #[serde(default)]
    pub stream: StreamFileConfig,
}

/// Server tuning knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Close a connection after this long without any inbound frame.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Capacity of each connection's outbound frame channel.
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_secs: default_keepalive_secs(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

/// Auth tunables (lives under `[auth]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthFileConfig {
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,
    /// Shared token accepted by the static validator. Empty means no
    /// connection can authenticate while auth is enabled.
    #[serde(default)]
    pub token: String,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            token: String::new(),
        }
    }
}

/// AI service boundary tunables (lives under `[ai]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiFileConfig {
    /// Endpoint the relay POSTs user messages to.
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Externally reachable base URL embedded in callback URLs,
    /// e.g. `http://relay.internal:8000`.
    #[serde(default)]
    pub public_base_url: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AiFileConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            api_key: String::new(),
            public_base_url: String::new(),
            request_timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// Stream store tunables (lives under `[stream]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamFileConfig {
    /// How long terminal messages stay fetchable for late clients.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Mark a message errored if no terminal callback arrives within this.
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StreamFileConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            pending_timeout_secs: default_pending_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_keepalive_secs() -> u64 {
    120
}
fn default_send_channel_capacity() -> usize {
    100
}
fn default_auth_enabled() -> bool {
    true
}
fn default_ai_timeout_secs() -> u64 {
    5
}
fn default_retention_secs() -> u64 {
    3600
}
fn default_pending_timeout_secs() -> u64 {
    600
}
fn default_sweep_interval_secs() -> u64 {
    60
}

/// Build a figment that layers: defaults → config.toml → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_AUTH__ENABLED=true`          →  `auth.enabled = true`
///   `RELAY_SERVER__KEEPALIVE_SECS=300`  →  `server.keepalive_secs = 300`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Server configuration for runtime behavior.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub keepalive: Duration,
    pub send_channel_capacity: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
            keepalive: Duration::from_secs(fc.keepalive_secs),
            send_channel_capacity: fc.send_channel_capacity,
        }
    }
}

/// Authentication configuration (runtime view).
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub enabled: bool,
    pub token: String,
}

impl AuthConfig {
    pub fn from_file(fc: &AuthFileConfig) -> Self {
        Self {
            enabled: fc.enabled,
            token: fc.token.clone(),
        }
    }
}

/// AI service boundary configuration (runtime view).
#[derive(Clone, Debug)]
pub struct AiConfig {
    pub service_url: String,
    pub api_key: String,
    pub public_base_url: String,
    pub request_timeout: Duration,
}

impl AiConfig {
    pub fn from_file(fc: &AiFileConfig) -> Self {
        Self {
            service_url: fc.service_url.clone(),
            api_key: fc.api_key.clone(),
            public_base_url: fc.public_base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(fc.request_timeout_secs),
        }
    }
}

/// Stream store configuration (runtime view).
#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub retention: Duration,
    pub pending_timeout: Duration,
    pub sweep_interval: Duration,
}

impl StreamConfig {
    pub fn from_file(fc: &StreamFileConfig) -> Self {
        Self {
            retention: Duration::from_secs(fc.retention_secs),
            pending_timeout: Duration::from_secs(fc.pending_timeout_secs),
            sweep_interval: Duration::from_secs(fc.sweep_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_server_file_config_defaults() {
        let d = ServerFileConfig::default();
        assert_eq!(d.host, "127.0.0.1");
        assert_eq!(d.port, 8000);
        assert_eq!(d.keepalive_secs, 120);
        assert_eq!(d.send_channel_capacity, 100);
    }

    #[test]
    fn test_auth_file_config_defaults() {
        let d = AuthFileConfig::default();
        assert!(d.enabled);
        assert!(d.token.is_empty());
    }

    #[test]
    fn test_stream_file_config_defaults() {
        let d = StreamFileConfig::default();
        assert_eq!(d.retention_secs, 3600);
        assert_eq!(d.pending_timeout_secs, 600);
        assert_eq!(d.sweep_interval_secs, 60);
    }

    // ── runtime views ───────────────────────────────────────────────────

    #[test]
    fn test_server_config_from_file() {
        let fc = ServerFileConfig {
            keepalive_secs: 45,
            send_channel_capacity: 10,
            ..Default::default()
        };
        let sc = ServerConfig::from_file(&fc);
        assert_eq!(sc.keepalive, Duration::from_secs(45));
        assert_eq!(sc.send_channel_capacity, 10);
    }

    #[test]
    fn test_ai_config_trims_trailing_slash() {
        let fc = AiFileConfig {
            public_base_url: "http://relay.internal:8000/".to_string(),
            ..Default::default()
        };
        let ac = AiConfig::from_file(&fc);
        assert_eq!(ac.public_base_url, "http://relay.internal:8000");
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert!(fc.auth.enabled);
        assert_eq!(fc.server.port, 8000);
        assert!(fc.ai.service_url.is_empty());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            concat!(
                "[server]\nhost = \"0.0.0.0\"\nport = 9000\n\n",
                "[ai]\nservice_url = \"http://ai.internal/generate\"\n\n",
                "[stream]\nretention_secs = 120\n",
            ),
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 9000);
        assert_eq!(fc.ai.service_url, "http://ai.internal/generate");
        assert_eq!(fc.stream.retention_secs, 120);
        // untouched sections keep their defaults
        assert_eq!(fc.stream.pending_timeout_secs, 600);
    }

    #[test]
    fn test_load_config_partial_section() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[auth]\nenabled = false\n").unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert!(!fc.auth.enabled);
        assert_eq!(fc.server.port, 8000);
    }
}
