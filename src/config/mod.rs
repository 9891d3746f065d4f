// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Configuration store
//!
//! Rules and the listen port live in a single JSON document that is
//! rewritten atomically after every mutation. The pause flag is a
//! process-wide soft mute and is deliberately not persisted.

mod rules;

pub use rules::{host_matches, matching_rules, split_host_and_path, Rule};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Default listen port
pub const DEFAULT_PORT: u16 = 9507;

/// Persisted configuration shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            port: DEFAULT_PORT,
        }
    }
}

/// Thread-safe configuration store.
///
/// Readers take snapshots so request handling never holds the lock while
/// forwarding.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<ConfigData>,
    paused: AtomicBool,
}

impl ConfigStore {
    /// Load configuration from `path`, falling back to defaults when the
    /// file is missing or unreadable
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<ConfigData>(&text) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Invalid config file {}: {e}, using defaults", path.display());
                    ConfigData::default()
                }
            },
            Err(_) => ConfigData::default(),
        };

        Self {
            path,
            data: RwLock::new(data),
            paused: AtomicBool::new(false),
        }
    }

    /// Create an in-memory store for tests and embedding
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            data: RwLock::new(ConfigData::default()),
            paused: AtomicBool::new(false),
        }
    }

    /// Add a rule after trimming and validating every field.
    ///
    /// The rule is persisted atomically; on persistence failure the
    /// in-memory append is rolled back and the error surfaced.
    pub fn add_rule(&self, host: &str, path: &str, param_name: &str, param_value: &str) -> Result<()> {
        let host = host.trim();
        let path = path.trim();
        let param_name = param_name.trim();
        let param_value = param_value.trim();

        if host.is_empty() || path.is_empty() || param_name.is_empty() || param_value.is_empty() {
            return Err(Error::config("all fields must be filled in"));
        }

        {
            let mut data = self.data.write();
            data.rules.push(Rule::new(host, path, param_name, param_value));
        }

        if let Err(e) = self.persist() {
            self.data.write().rules.pop();
            return Err(e);
        }

        info!("Rule added: {host}{path} {param_name}={param_value}");
        Ok(())
    }

    /// Remove a rule by zero-based index
    pub fn remove_rule(&self, index: usize) -> Result<()> {
        let removed = {
            let mut data = self.data.write();
            if index >= data.rules.len() {
                return Err(Error::config(format!("no rule at index {index}")));
            }
            data.rules.remove(index)
        };

        if let Err(e) = self.persist() {
            self.data.write().rules.insert(index, removed);
            return Err(e);
        }
        Ok(())
    }

    /// Flip a rule's enabled flag, returning the new state
    pub fn toggle_rule(&self, index: usize) -> Result<bool> {
        let enabled = {
            let mut data = self.data.write();
            let rule = data
                .rules
                .get_mut(index)
                .ok_or_else(|| Error::config(format!("no rule at index {index}")))?;
            rule.enabled = !rule.enabled;
            rule.enabled
        };

        if let Err(e) = self.persist() {
            if let Some(rule) = self.data.write().rules.get_mut(index) {
                rule.enabled = !enabled;
            }
            return Err(e);
        }
        Ok(enabled)
    }

    /// Snapshot of the current rules
    pub fn rules(&self) -> Vec<Rule> {
        self.data.read().rules.clone()
    }

    /// Configured listen port
    pub fn port(&self) -> u16 {
        self.data.read().port
    }

    /// Set the listen port; valid range is 1-65535
    pub fn set_port(&self, port: u16) -> Result<()> {
        if port == 0 {
            return Err(Error::config("port must be between 1 and 65535"));
        }
        let previous = {
            let mut data = self.data.write();
            std::mem::replace(&mut data.port, port)
        };

        if let Err(e) = self.persist() {
            self.data.write().port = previous;
            return Err(e);
        }
        info!("Listen port set to {port}");
        Ok(())
    }

    /// Set the listen port from a numeric string
    pub fn set_port_str(&self, port: &str) -> Result<u16> {
        let port: u32 = port
            .trim()
            .parse()
            .map_err(|_| Error::config("port must be an integer"))?;
        if !(1..=65535).contains(&port) {
            return Err(Error::config("port must be between 1 and 65535"));
        }
        let port = port as u16;
        self.set_port(port)?;
        Ok(port)
    }

    /// Whether the proxy is soft-muted (forwarding without hooks or history)
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Flip the pause flag, returning the new state
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.paused.load(Ordering::Relaxed);
        self.paused.store(paused, Ordering::Relaxed);
        info!("Proxy {}", if paused { "paused" } else { "resumed" });
        paused
    }

    /// Write the configuration to disk: serialize to a temp file in the
    /// same directory, then rename over the target
    fn persist(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let json = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data)?
        };

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(|e| {
            error!("Failed to write config {}: {e}", tmp.display());
            Error::config(format!("failed to write configuration: {e}"))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            error!("Failed to replace config {}: {e}", self.path.display());
            Error::config(format!("failed to save configuration: {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_rule_validation() {
        let store = ConfigStore::in_memory();
        assert!(store.add_rule("", "/x", "a", "b").is_err());
        assert!(store.add_rule("example.com", "  ", "a", "b").is_err());
        assert!(store.add_rule("example.com", "/x", "a", "b").is_ok());
        assert_eq!(store.rules().len(), 1);
    }

    #[test]
    fn test_fields_trimmed() {
        let store = ConfigStore::in_memory();
        store.add_rule(" example.com ", " /x ", " a ", " b ").unwrap();
        let rule = &store.rules()[0];
        assert_eq!(rule.host, "example.com");
        assert_eq!(rule.param_value, "b");
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        let store = ConfigStore::in_memory();
        store.add_rule("example.com", "/", "a", "b").unwrap();
        assert!(!store.toggle_rule(0).unwrap());
        assert!(store.toggle_rule(0).unwrap());
        assert!(store.rules()[0].enabled);
    }

    #[test]
    fn test_remove_bounds_checked() {
        let store = ConfigStore::in_memory();
        assert!(store.remove_rule(0).is_err());
    }

    #[test]
    fn test_port_validation() {
        let store = ConfigStore::in_memory();
        assert!(store.set_port_str("0").is_err());
        assert!(store.set_port_str("65536").is_err());
        assert!(store.set_port_str("").is_err());
        assert!(store.set_port_str("abc").is_err());
        assert_eq!(store.set_port_str("1").unwrap(), 1);
        assert_eq!(store.set_port_str("65535").unwrap(), 65535);
        assert_eq!(store.port(), 65535);
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("intercept_config.json");

        let store = ConfigStore::load(&path);
        store.add_rule("example.com", "/search", "q", "hacked").unwrap();
        store.set_port(8123).unwrap();
        store.toggle_rule(0).unwrap();

        let reloaded = ConfigStore::load(&path);
        assert_eq!(reloaded.rules(), store.rules());
        assert_eq!(reloaded.port(), 8123);
        assert!(!reloaded.rules()[0].enabled);
    }

    #[test]
    fn test_failed_persist_rolls_back_every_mutation() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("cfg");
        std::fs::create_dir_all(&config_dir).unwrap();
        let store = ConfigStore::load(config_dir.join("intercept_config.json"));
        store.add_rule("example.com", "/a", "q", "x").unwrap();
        store.add_rule("example.com", "/b", "p", "y").unwrap();
        store.set_port(8123).unwrap();

        // Writing the temp file now fails with ENOENT
        std::fs::remove_dir_all(&config_dir).unwrap();
        let before = store.rules();

        assert!(store.add_rule("example.com", "/c", "n", "v").is_err());
        assert_eq!(store.rules(), before);

        assert!(store.remove_rule(0).is_err());
        assert_eq!(store.rules(), before);

        assert!(store.toggle_rule(1).is_err());
        assert_eq!(store.rules(), before);
        assert!(store.rules()[1].enabled);

        assert!(store.set_port(9000).is_err());
        assert_eq!(store.port(), 8123);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("intercept_config.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = ConfigStore::load(&path);
        assert!(store.rules().is_empty());
        assert_eq!(store.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_pause_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("intercept_config.json");

        let store = ConfigStore::load(&path);
        store.add_rule("example.com", "/", "a", "b").unwrap();
        assert!(store.toggle_pause());

        let reloaded = ConfigStore::load(&path);
        assert!(!reloaded.is_paused());
    }
}
