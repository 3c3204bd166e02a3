// Copyright (c) 2023 Contributors to the Eclipse Foundation
//
// See the NOTICE file(s) distributed with this work for additional
// information regarding copyright ownership.
//
// This program and the accompanying materials are made available under the
// terms of the Apache Software License 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0, or the MIT license
// which is available at https://opensource.org/licenses/MIT.
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Global and per-pattern default configuration, mirroring
//! `iceoryx2::config::Config`: a `[global]` section naming the root path and
//! domain prefix, and a `[defaults]` section per messaging pattern. Loaded
//! from TOML, either from a file or from a process-wide global singleton
//! bound once before the first node is created.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::unable_to_deliver_strategy::UnableToDeliverStrategy;
use zerospan_cal::AllocationStrategy;

fn default_root_path() -> PathBuf {
    PathBuf::from("/tmp/zerospan")
}

fn default_prefix() -> String {
    "zerospan".to_string()
}

fn default_creation_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Namespace prefix and directory layout shared by every persistent
/// resource (services, nodes, shared-memory segments) in one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub root_path: PathBuf,
    pub prefix: String,
    #[serde(with = "duration_as_millis")]
    pub creation_timeout: Duration,
    pub service_dir: String,
    pub node_dir: String,
    pub node_monitor_suffix: String,
    pub node_static_config_suffix: String,
    pub service_tag_suffix: String,
    pub static_config_suffix: String,
    pub dynamic_config_suffix: String,
    pub connection_suffix: String,
    pub event_connection_suffix: String,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            prefix: default_prefix(),
            creation_timeout: default_creation_timeout(),
            service_dir: "services".to_string(),
            node_dir: "nodes".to_string(),
            node_monitor_suffix: ".monitor".to_string(),
            node_static_config_suffix: ".node".to_string(),
            service_tag_suffix: ".service_tag".to_string(),
            static_config_suffix: ".static_config".to_string(),
            dynamic_config_suffix: ".dynamic_config".to_string(),
            connection_suffix: ".connection".to_string(),
            event_connection_suffix: ".event_connection".to_string(),
        }
    }
}

impl Global {
    pub fn domain_path(&self) -> PathBuf {
        self.root_path.join(&self.prefix)
    }

    pub fn services_path(&self) -> PathBuf {
        self.domain_path().join(&self.service_dir)
    }

    pub fn nodes_path(&self) -> PathBuf {
        self.domain_path().join(&self.node_dir)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSubscribeDefaults {
    pub max_publishers: usize,
    pub max_subscribers: usize,
    pub max_nodes: usize,
    pub publisher_history_size: usize,
    pub subscriber_max_buffer_size: usize,
    pub subscriber_max_borrowed_samples: usize,
    pub publisher_max_loaned_samples: usize,
    pub enable_safe_overflow: bool,
    pub unable_to_deliver_strategy: UnableToDeliverStrategy,
    pub allocation_strategy: AllocationStrategy,
}

impl Default for PublishSubscribeDefaults {
    fn default() -> Self {
        Self {
            max_publishers: 16,
            max_subscribers: 16,
            max_nodes: 32,
            publisher_history_size: 0,
            subscriber_max_buffer_size: 4,
            subscriber_max_borrowed_samples: 4,
            publisher_max_loaned_samples: 4,
            enable_safe_overflow: true,
            unable_to_deliver_strategy: UnableToDeliverStrategy::Block,
            allocation_strategy: AllocationStrategy::Static,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDefaults {
    pub max_notifiers: usize,
    pub max_listeners: usize,
    pub max_nodes: usize,
    pub event_id_max_value: usize,
}

impl Default for EventDefaults {
    fn default() -> Self {
        Self {
            max_notifiers: 16,
            max_listeners: 16,
            max_nodes: 32,
            event_id_max_value: 255,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestResponseDefaults {
    pub max_clients: usize,
    pub max_servers: usize,
    pub max_nodes: usize,
    pub max_active_requests_per_client: usize,
    pub max_borrowed_responses_per_pending_response: usize,
    pub max_response_buffer_size: usize,
    pub enable_safe_overflow_for_requests: bool,
    pub enable_safe_overflow_for_responses: bool,
    pub enable_fire_and_forget_requests: bool,
    pub client_unable_to_deliver_strategy: UnableToDeliverStrategy,
    pub server_unable_to_deliver_strategy: UnableToDeliverStrategy,
}

impl Default for RequestResponseDefaults {
    fn default() -> Self {
        Self {
            max_clients: 16,
            max_servers: 16,
            max_nodes: 32,
            max_active_requests_per_client: 4,
            max_borrowed_responses_per_pending_response: 4,
            max_response_buffer_size: 4,
            enable_safe_overflow_for_requests: true,
            enable_safe_overflow_for_responses: true,
            enable_fire_and_forget_requests: false,
            client_unable_to_deliver_strategy: UnableToDeliverStrategy::Block,
            server_unable_to_deliver_strategy: UnableToDeliverStrategy::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub publish_subscribe: PublishSubscribeDefaults,
    pub event: EventDefaults,
    pub request_response: RequestResponseDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub global: Global,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigCreationError {
    FailedToReadConfigFileFolder,
    UnableToOpenConfigFile,
    UnableToReadConfigFileContents,
    UnableToDeserializeContents,
}

impl std::fmt::Display for ConfigCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ConfigCreationError {}

static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigCreationError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigCreationError::UnableToOpenConfigFile)?;
        toml::from_str(&contents).map_err(|_| ConfigCreationError::UnableToDeserializeContents)
    }

    /// Binds the process-wide default config, loaded from `path`. Must be
    /// called before the first [`crate::node::Node`] is created; later
    /// calls are rejected since nodes may already have cached the prior
    /// value.
    pub fn setup_global_config_from_file(path: &Path) -> Result<(), ConfigCreationError> {
        let config = Self::from_file(path)?;
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| ConfigCreationError::UnableToDeserializeContents)
    }

    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }
}

mod duration_as_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_capacity_defaults() {
        let config = Config::default();
        assert!(config.defaults.publish_subscribe.max_publishers > 0);
        assert!(config.defaults.event.max_notifiers > 0);
    }

    #[test]
    fn from_file_round_trips_a_written_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zerospan.toml");
        let mut config = Config::default();
        config.global.prefix = "custom_domain".to_string();
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.global.prefix, "custom_domain");
    }

    #[test]
    fn from_file_on_missing_path_fails() {
        let err = Config::from_file(Path::new("/nonexistent/zerospan.toml")).unwrap_err();
        assert_eq!(err, ConfigCreationError::UnableToOpenConfigFile);
    }
}
