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

//! Event pattern's receiving half (§4.3 "Listener"). Connects to every
//! notifier already alive for the service; `try_wait`/`timed_wait`/`wait`
//! drain the union of every connected channel's pending trigger ids.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zerospan_cal::event::EventChannel;

use crate::node::Node;
use crate::port::event_id::EventId;
use crate::port::port_id::UniqueListenerId;
use crate::port::request_response_registry::{self, NotifierPeer};
use crate::service::service_tag::{self, PortKind};
use crate::service::static_config::MessagingPatternStaticConfig;
use crate::service::{dynamic_config, ServiceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerCreateError {
    ExceedsMaxSupportedListeners,
    InternalFailure,
}

impl std::fmt::Display for ListenerCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ListenerCreateError {}

pub struct ListenerBuilder {
    node: Node,
    state: Arc<ServiceState>,
}

impl ListenerBuilder {
    pub(crate) fn new(node: Node, state: Arc<ServiceState>) -> Self {
        Self { node, state }
    }

    pub fn create(self) -> Result<Listener, ListenerCreateError> {
        let MessagingPatternStaticConfig::Event(pattern) = &self.state.static_config.messaging_pattern
        else {
            return Err(ListenerCreateError::InternalFailure);
        };
        let id = UniqueListenerId::new().map_err(|_| ListenerCreateError::InternalFailure)?;

        if let Some(details) = self.state.dynamic_config.as_event() {
            if !dynamic_config::try_increment(&details.listener_count, pattern.max_listeners) {
                return Err(ListenerCreateError::ExceedsMaxSupportedListeners);
            }
        }

        let mut channels = Vec::new();
        for notifier in request_response_registry::notifiers_for(self.state.static_config.service_id.as_str())
        {
            let channel = notifier.connect_listener(id);
            request_response_registry::register_listener_channel(
                self.state.static_config.service_id.as_str(),
                Arc::downgrade(&channel),
            );
            channels.push((notifier, channel));
        }

        zerospan_log::trace!(
            from "ListenerBuilder::create",
            "listener {} connected to {} notifier(s)",
            id,
            channels.len()
        );

        service_tag::write(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Listener,
            id.value(),
        );

        Ok(Listener {
            node: self.node,
            state: self.state,
            id,
            channels: Mutex::new(channels),
        })
    }
}

pub struct Listener {
    node: Node,
    state: Arc<ServiceState>,
    id: UniqueListenerId,
    channels: Mutex<Vec<(Arc<dyn NotifierPeer>, Arc<EventChannel>)>>,
}

impl Listener {
    pub fn id(&self) -> UniqueListenerId {
        self.id
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Non-destructive peek, for [`crate::waitset::WaitSet::attach`].
    pub fn has_events(&self) -> bool {
        self.channels.lock().unwrap().iter().any(|(_, channel)| channel.has_pending())
    }

    /// Drains every connected channel without blocking.
    pub fn try_wait(&self) -> Vec<EventId> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, channel)| channel.drain())
            .map(EventId::from)
            .collect()
    }

    /// Blocks on the first connected channel until it fires, then drains
    /// every connected channel. If no channel is connected yet, returns
    /// immediately with an empty result.
    pub fn wait(&self) -> Vec<EventId> {
        let channels = self.channels.lock().unwrap();
        if let Some((_, first)) = channels.first() {
            first.wait();
        }
        channels.iter().flat_map(|(_, channel)| channel.drain()).map(EventId::from).collect()
    }

    pub fn timed_wait(&self, timeout: Duration) -> Vec<EventId> {
        let channels = self.channels.lock().unwrap();
        if let Some((_, first)) = channels.first() {
            first.timed_wait(timeout);
        }
        channels.iter().flat_map(|(_, channel)| channel.drain()).map(EventId::from).collect()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(details) = self.state.dynamic_config.as_event() {
            details.listener_count.fetch_sub(1, Ordering::AcqRel);
        }
        service_tag::remove(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Listener,
            self.id.value(),
        );
        for (notifier, _) in self.channels.lock().unwrap().iter() {
            notifier.disconnect_listener(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::node::NodeBuilder;
    use crate::service::service_name::ServiceName;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.global.root_path = dir.to_path_buf();
        config.global.prefix = format!("test_{}_event", std::process::id());
        config
    }

    #[test]
    fn listener_receives_an_event_id_raised_after_it_connects() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new().config(test_config(dir.path())).create().unwrap();
        let name = ServiceName::new("button_pressed").unwrap();
        let service = node.service_builder(&name).event().create().unwrap();

        let notifier = service.notifier_builder().create().unwrap();
        let listener = service.listener_builder().create().unwrap();

        notifier.notify_with_custom_event_id(crate::port::event_id::EventId::new(7)).unwrap();
        let fired = listener.try_wait();
        assert_eq!(fired, vec![crate::port::event_id::EventId::new(7)]);
    }
}
