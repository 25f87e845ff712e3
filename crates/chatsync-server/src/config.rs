//! Server configuration from environment variables.
//!
//! - `CHATSYNC_DATA_DIR`: directory holding the per-domain database files
//!   (default: `./data`)
//! - `CHATSYNC_PORT`: listen port (default: `3000`)
//! - `CHATSYNC_BIND`: listen address (default: `0.0.0.0`)

use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Database file per domain, relative to the data directory.
pub const STORES_DB: &str = "stores.db";
pub const CHATS_DB: &str = "chats.db";
pub const LLMS_DB: &str = "llms.db";
pub const METRICS_DB: &str = "metrics.db";
pub const WORKSPACE_DB: &str = "workspace.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// fall back to the defaults; an unparsable port is logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ServerConfig::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = value("CHATSYNC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = value("CHATSYNC_PORT") {
            match port.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!(%port, "invalid CHATSYNC_PORT; using {}", DEFAULT_PORT),
            }
        }
        if let Some(bind) = value("CHATSYNC_BIND") {
            config.bind = bind.trim().to_string();
        }
        config
    }

    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    /// `bind:port`, ready for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn db_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.db_path(CHATS_DB), PathBuf::from("./data/chats.db"));
    }

    #[test]
    fn env_values_override_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CHATSYNC_DATA_DIR", "/var/lib/chatsync"),
            ("CHATSYNC_PORT", "8080"),
            ("CHATSYNC_BIND", "127.0.0.1"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/chatsync"));
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn bad_port_and_blank_values_are_ignored() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CHATSYNC_PORT", "eighty"),
            ("CHATSYNC_DATA_DIR", "  "),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }
}
