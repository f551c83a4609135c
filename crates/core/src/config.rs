use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{NetscopeError, Result};

pub const DEFAULT_PORT: u16 = 5051;
pub const DEFAULT_MAX_BODY_LEN: usize = 3000;
pub const DEFAULT_ID_HEADER: &str = "X-Network-Inspector-ID";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relay: RelaySettings,
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl RelaySettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// WebSocket URL of the relay, e.g. `ws://192.168.1.100:5051`
    pub relay_url: String,
    pub enabled: bool,
    /// Upper bound on captured body snippets, in characters
    pub max_body_len: usize,
    /// Attach stack traces to `warn` and `error` logs
    pub capture_stack_trace: bool,
    /// Tag outgoing calls with `id_header` as a last-resort recovery channel
    pub inject_id_header: bool,
    pub id_header: String,
    /// Frames waiting for the socket writer; extra frames are dropped
    pub send_buffer: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://127.0.0.1:{DEFAULT_PORT}"),
            enabled: true,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            capture_stack_trace: true,
            inject_id_header: true,
            id_header: DEFAULT_ID_HEADER.to_string(),
            send_buffer: 256,
        }
    }
}

/// Default location of the settings file
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("netscope")
        .join("config.toml")
}

/// Load settings from `path`, or from the default location when `path` is `None`.
///
/// A missing file yields defaults. A file that exists but does not parse is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Settings::default());
        }
        Err(e) => return Err(e.into()),
    };

    parse_settings(&content).map_err(|reason| NetscopeError::ConfigFailed { path, reason })
}

fn parse_settings(content: &str) -> std::result::Result<Settings, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.relay.port, DEFAULT_PORT);
        assert_eq!(settings.relay.bind_addr(), "0.0.0.0:5051");
        assert_eq!(settings.agent.max_body_len, DEFAULT_MAX_BODY_LEN);
        assert!(settings.agent.inject_id_header);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = parse_settings(
            r#"
            [relay]
            port = 6000

            [agent]
            max_body_len = 10
            capture_stack_trace = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.relay.host, "0.0.0.0");
        assert_eq!(settings.relay.port, 6000);
        assert_eq!(settings.agent.max_body_len, 10);
        assert!(!settings.agent.capture_stack_trace);
        assert_eq!(settings.agent.id_header, DEFAULT_ID_HEADER);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(parse_settings("[relay\nport = ").is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("netscope-does-not-exist/config.toml");
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.relay.port, DEFAULT_PORT);
    }
}
