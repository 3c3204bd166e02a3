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

//! Event pattern's sending half (§4.3 "Notifier"). Connects lazily to
//! every listener already alive for the service and multicasts each
//! notification to all of them, clamped to `event_id_max_value`. If the
//! service was built with a deadline, a notify that arrives later than that
//! deadline since the previous one still delivers but reports the miss.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zerospan_cal::event::EventChannel;

use crate::node::Node;
use crate::port::event_id::EventId;
use crate::port::port_id::{UniqueListenerId, UniqueNotifierId};
use crate::port::request_response_registry::{self, NotifierPeer};
use crate::service::naming_scheme;
use crate::service::service_tag::{self, PortKind};
use crate::service::static_config::MessagingPatternStaticConfig;
use crate::service::{dynamic_config, ServiceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierCreateError {
    ExceedsMaxSupportedNotifiers,
    InternalFailure,
}

impl std::fmt::Display for NotifierCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for NotifierCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierNotifyError {
    EventIdOutOfBounds,
    MissedDeadline,
}

impl std::fmt::Display for NotifierNotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventIdOutOfBounds => write!(f, "event id exceeds this service's event_id_max_value"),
            Self::MissedDeadline => write!(f, "notification delivered past the configured deadline"),
        }
    }
}
impl std::error::Error for NotifierNotifyError {}

pub struct NotifierBuilder {
    node: Node,
    state: Arc<ServiceState>,
    default_event_id: EventId,
}

impl NotifierBuilder {
    pub(crate) fn new(node: Node, state: Arc<ServiceState>) -> Self {
        Self {
            node,
            state,
            default_event_id: EventId::new(0),
        }
    }

    /// Event id raised by a bare [`Notifier::notify`] call, as opposed to
    /// [`Notifier::notify_with_custom_event_id`].
    pub fn default_event_id(mut self, value: EventId) -> Self {
        self.default_event_id = value;
        self
    }

    pub fn create(self) -> Result<Notifier, NotifierCreateError> {
        let MessagingPatternStaticConfig::Event(pattern) = &self.state.static_config.messaging_pattern
        else {
            return Err(NotifierCreateError::InternalFailure);
        };
        let id = UniqueNotifierId::new().map_err(|_| NotifierCreateError::InternalFailure)?;
        let node_id = self.node.id();

        if let Some(details) = self.state.dynamic_config.as_event() {
            if !dynamic_config::try_increment(&details.notifier_count, pattern.max_notifiers) {
                return Err(NotifierCreateError::ExceedsMaxSupportedNotifiers);
            }
        }

        let inner = Arc::new(NotifierInner {
            node: self.node,
            state: self.state.clone(),
            id,
            listeners: Mutex::new(Vec::new()),
            default_event_id: self.default_event_id,
            deadline: pattern.deadline,
            last_notify: Mutex::new(Instant::now()),
        });
        request_response_registry::register_notifier(
            self.state.static_config.service_id.as_str(),
            Arc::downgrade(&inner) as std::sync::Weak<dyn NotifierPeer>,
        );
        service_tag::write(
            &self.state.global,
            node_id,
            &self.state.static_config.service_id,
            PortKind::Notifier,
            id.value(),
        );
        request_response_registry::emit_lifecycle_event(
            self.state.static_config.service_id.as_str(),
            pattern.notifier_created_event,
        );
        zerospan_log::trace!(from "NotifierBuilder::create", "notifier {} created", inner.id);
        Ok(Notifier(inner))
    }
}

struct NotifierInner {
    node: Node,
    state: Arc<ServiceState>,
    id: UniqueNotifierId,
    listeners: Mutex<Vec<(UniqueListenerId, Arc<EventChannel>)>>,
    default_event_id: EventId,
    deadline: Option<Duration>,
    last_notify: Mutex<Instant>,
}

impl NotifierPeer for NotifierInner {
    fn connect_listener(&self, listener_id: UniqueListenerId) -> Arc<EventChannel> {
        let name = naming_scheme::event_connection_name(
            &self.state.global,
            &self.state.static_config.service_id,
            self.id.value(),
            listener_id.value(),
        );
        let channel = Arc::new(
            EventChannel::create(&self.state.named_concept_config, &name)
                .or_else(|_| EventChannel::open(&self.state.named_concept_config, &name))
                .expect("event channel creatable or already created by the connecting listener"),
        );
        self.listeners.lock().unwrap().push((listener_id, channel.clone()));
        channel
    }

    fn disconnect_listener(&self, listener_id: UniqueListenerId) {
        self.listeners.lock().unwrap().retain(|(id, _)| *id != listener_id);
    }
}

impl Drop for NotifierInner {
    fn drop(&mut self) {
        if let Some(details) = self.state.dynamic_config.as_event() {
            details.notifier_count.fetch_sub(1, Ordering::AcqRel);
        }
        service_tag::remove(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Notifier,
            self.id.value(),
        );
        if let MessagingPatternStaticConfig::Event(pattern) = &self.state.static_config.messaging_pattern {
            request_response_registry::emit_lifecycle_event(
                self.state.static_config.service_id.as_str(),
                pattern.notifier_dropped_event,
            );
        }
    }
}

/// Handle to a created notifier port.
#[derive(Clone)]
pub struct Notifier(Arc<NotifierInner>);

impl Notifier {
    pub fn id(&self) -> UniqueNotifierId {
        self.0.id
    }

    pub fn node(&self) -> &Node {
        &self.0.node
    }

    /// Multicasts this notifier's default event id (§4.3). See
    /// [`NotifierBuilder::default_event_id`].
    pub fn notify(&self) -> Result<usize, NotifierNotifyError> {
        self.notify_with_custom_event_id(self.0.default_event_id)
    }

    /// Multicasts `event_id` to every listener connected so far. Delivery
    /// happens before the deadline is checked, so a late call still reaches
    /// every listener even though it reports [`NotifierNotifyError::MissedDeadline`].
    pub fn notify_with_custom_event_id(&self, event_id: EventId) -> Result<usize, NotifierNotifyError> {
        if event_id.as_value() > zerospan_cal::event::MAX_TRIGGER_ID {
            return Err(NotifierNotifyError::EventIdOutOfBounds);
        }
        let delivered = {
            let listeners = self.0.listeners.lock().unwrap();
            for (_, channel) in listeners.iter() {
                channel.notify(event_id.as_value());
            }
            listeners.len()
        };

        if let Some(deadline) = self.0.deadline {
            let mut last_notify = self.0.last_notify.lock().unwrap();
            let missed = last_notify.elapsed() > deadline;
            *last_notify = Instant::now();
            if missed {
                return Err(NotifierNotifyError::MissedDeadline);
            }
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::node::NodeBuilder;
    use crate::service::service_name::ServiceName;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path, tag: &str) -> Config {
        let mut config = Config::default();
        config.global.root_path = dir.to_path_buf();
        config.global.prefix = format!("test_{}_{}", std::process::id(), tag);
        config
    }

    #[test]
    fn creating_past_max_notifiers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "notifier_capacity"))
            .create()
            .unwrap();
        let name = ServiceName::new("alarms").unwrap();
        let service = node.service_builder(&name).event().max_notifiers(1).create().unwrap();

        let _first = service.notifier_builder().create().unwrap();
        assert_eq!(
            service.notifier_builder().create().unwrap_err(),
            super::NotifierCreateError::ExceedsMaxSupportedNotifiers
        );
    }

    #[test]
    fn a_late_notify_still_delivers_but_reports_a_missed_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "notifier_deadline"))
            .create()
            .unwrap();
        let name = ServiceName::new("heartbeat").unwrap();
        let service = node
            .service_builder(&name)
            .event()
            .deadline(Duration::from_millis(5))
            .create()
            .unwrap();

        let notifier = service.notifier_builder().create().unwrap();
        let listener = service.listener_builder().create().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(notifier.notify().unwrap_err(), super::NotifierNotifyError::MissedDeadline);
        assert_eq!(listener.try_wait(), vec![crate::port::event_id::EventId::new(0)]);
    }

    #[test]
    fn creating_a_notifier_raises_the_configured_created_event_to_an_existing_listener() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "notifier_lifecycle"))
            .create()
            .unwrap();
        let name = ServiceName::new("lifecycle").unwrap();
        let service = node
            .service_builder(&name)
            .event()
            .notifier_created_event(9)
            .create()
            .unwrap();

        // a listener only discovers notifiers that already exist when it is
        // created, so it needs one to connect to before a second one's
        // lifecycle event can reach it.
        let _first_notifier = service.notifier_builder().create().unwrap();
        let listener = service.listener_builder().create().unwrap();
        let _second_notifier = service.notifier_builder().create().unwrap();

        assert_eq!(listener.try_wait(), vec![crate::port::event_id::EventId::new(9)]);
    }
}
