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

//! A node is a process-local membership handle: it owns every port created
//! through it, is monitored for liveness by other processes (§4.5), and
//! carries the [`Config`] new services are created or opened with.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::node_name::NodeName;
use crate::service::naming_scheme;
use crate::service::service_name::ServiceName;
use zerospan_cal::monitoring::{LivenessToken, MonitorCreateError};
use zerospan_support::unique_id::UniqueSystemId;

/// 128-bit identity of a node, total-ordered by (timestamp, counter) (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(UniqueSystemId);

impl NodeId {
    pub fn value(&self) -> u128 {
        self.0.value()
    }

    /// Reconstructs a `NodeId` from a fingerprint parsed back out of a node
    /// directory entry name, for [`crate::monitor::list`].
    pub(crate) fn from_raw_value(value: u128) -> Self {
        Self(UniqueSystemId::from_value(value))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_b64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCreationError {
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for NodeCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for NodeCreationError {}

impl From<MonitorCreateError> for NodeCreationError {
    fn from(value: MonitorCreateError) -> Self {
        match value {
            MonitorCreateError::InsufficientPermissions => Self::InsufficientPermissions,
            _ => Self::InternalError,
        }
    }
}

/// Record written alongside a node's liveness token, read by [`crate::monitor::list`]
/// to fill in the `details` of an `Alive` participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetails {
    pub pid: u32,
    pub creation_timestamp_nanos: u64,
    pub name: Option<String>,
}

pub(crate) struct NodeState {
    pub id: NodeId,
    pub name: Option<NodeName>,
    pub config: Config,
    pub signal_handling_enabled: bool,
    liveness: LivenessToken,
}

/// Live, process-local handle to {NodeId, liveness token, Config}. Owns
/// every service/port created through it; dropping it releases the
/// liveness token so monitors elsewhere observe [`zerospan_cal::monitoring::State::Dead`].
#[derive(Clone)]
pub struct Node(pub(crate) Arc<NodeState>);

impl Node {
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn name(&self) -> Option<&NodeName> {
        self.0.name.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn signal_handling_enabled(&self) -> bool {
        self.0.signal_handling_enabled
    }

    /// Entry point to create or open a service (§6 "four builders").
    pub fn service_builder(&self, name: &ServiceName) -> crate::service::builder::ServiceBuilder {
        crate::service::builder::ServiceBuilder::new(self.clone(), name.clone())
    }
}

#[derive(Default)]
pub struct NodeBuilder {
    name: Option<NodeName>,
    config: Option<Config>,
    enable_signal_handling: bool,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            config: None,
            enable_signal_handling: true,
        }
    }

    pub fn name(mut self, name: NodeName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Whether this node intercepts `SIGINT`/`SIGTERM` to turn a pending
    /// blocking wait into `Interrupted` (§4.8, §9 "wait-set cancellation").
    /// Enabled by default.
    pub fn enable_signal_handling(mut self, value: bool) -> Self {
        self.enable_signal_handling = value;
        self
    }

    pub fn create(self) -> Result<Node, NodeCreationError> {
        let config = self.config.unwrap_or_else(|| Config::global().clone());
        let id = NodeId(
            UniqueSystemId::new().map_err(|_| NodeCreationError::InternalError)?,
        );

        let named_concept_config = naming_scheme::node_named_concept_config(&config.global);

        let monitor_name = naming_scheme::node_monitor_name(&config.global, id.value());
        let liveness = LivenessToken::create(&named_concept_config, &monitor_name)?;

        if self.enable_signal_handling {
            zerospan_cal::signal::install();
        }

        let details = NodeDetails {
            pid: std::process::id(),
            creation_timestamp_nanos: id.0.creation_timestamp_nanos(),
            name: self.name.as_ref().map(|n| n.as_str().to_string()),
        };
        let _ = zerospan_cal::static_storage::create(
            &named_concept_config,
            &format!("{}{}", id.value(), config.global.node_static_config_suffix),
            &details,
        );

        zerospan_log::trace!(from "Node::create", "node {} created (pid {})", id, std::process::id());

        Ok(Node(Arc::new(NodeState {
            id,
            name: self.name,
            config,
            signal_handling_enabled: self.enable_signal_handling,
            liveness,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.global.root_path = dir.to_path_buf();
        config.global.prefix = format!("test_{}", std::process::id());
        config
    }

    #[test]
    fn create_mints_a_distinct_id_per_node() {
        let dir = tempfile::tempdir().unwrap();
        let a = NodeBuilder::new().config(test_config(dir.path())).create().unwrap();
        let b = NodeBuilder::new().config(test_config(dir.path())).create().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn signal_handling_defaults_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new().config(test_config(dir.path())).create().unwrap();
        assert!(node.signal_handling_enabled());
    }

    #[test]
    fn signal_handling_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path()))
            .enable_signal_handling(false)
            .create()
            .unwrap();
        assert!(!node.signal_handling_enabled());
    }
}
