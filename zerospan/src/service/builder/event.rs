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

use std::sync::Arc;
use std::time::Duration;

use crate::node::Node;
use crate::port::listener::ListenerBuilder;
use crate::port::notifier::NotifierBuilder;
use crate::service::attribute::{AttributeSpecifier, AttributeVerifier};
use crate::service::dynamic_config::DynamicConfig;
use crate::service::messaging_pattern::MessagingPattern;
use crate::service::naming_scheme;
use crate::service::service_id::ServiceId;
use crate::service::service_name::ServiceName;
use crate::service::static_config::{EventStaticConfig, MessagingPatternStaticConfig, StaticConfig};
use crate::service::{ServiceCreateError, ServiceOpenError, ServiceOpenOrCreateError, ServiceState};

pub struct ServiceBuilderEvent {
    node: Node,
    name: ServiceName,
    max_notifiers: usize,
    max_listeners: usize,
    max_nodes: usize,
    event_id_max_value: u64,
    deadline: Option<Duration>,
    notifier_created_event: Option<u64>,
    notifier_dropped_event: Option<u64>,
    notifier_dead_event: Option<u64>,
    attributes: AttributeSpecifier,
    verifier: AttributeVerifier,
}

impl ServiceBuilderEvent {
    pub(crate) fn new(node: Node, name: ServiceName) -> Self {
        let defaults = node.config().defaults.event;
        Self {
            node,
            name,
            max_notifiers: defaults.max_notifiers,
            max_listeners: defaults.max_listeners,
            max_nodes: defaults.max_nodes,
            event_id_max_value: defaults.event_id_max_value as u64,
            deadline: None,
            notifier_created_event: None,
            notifier_dropped_event: None,
            notifier_dead_event: None,
            attributes: AttributeSpecifier::new(),
            verifier: AttributeVerifier::new(),
        }
    }

    pub fn max_notifiers(mut self, value: usize) -> Self {
        self.max_notifiers = value.max(1);
        self
    }

    pub fn max_listeners(mut self, value: usize) -> Self {
        self.max_listeners = value.max(1);
        self
    }

    pub fn max_nodes(mut self, value: usize) -> Self {
        self.max_nodes = value.max(1);
        self
    }

    pub fn event_id_max_value(mut self, value: u64) -> Self {
        self.event_id_max_value = value.min(zerospan_cal::event::MAX_TRIGGER_ID as u64);
        self
    }

    /// If no [`crate::port::notifier::Notifier::notify`] call arrives within
    /// `value` of the previous one, the next call still delivers but reports
    /// a missed deadline (§4.7).
    pub fn deadline(mut self, value: Duration) -> Self {
        self.deadline = Some(value);
        self
    }

    /// Event id raised to every listener already connected when a notifier
    /// for this service is created.
    pub fn notifier_created_event(mut self, value: u64) -> Self {
        self.notifier_created_event = Some(value);
        self
    }

    /// Event id raised to every listener still connected when a notifier for
    /// this service is dropped.
    pub fn notifier_dropped_event(mut self, value: u64) -> Self {
        self.notifier_dropped_event = Some(value);
        self
    }

    /// Event id raised to every listener still connected when a notifier for
    /// this service is found dead by [`crate::monitor::reclaim`].
    pub fn notifier_dead_event(mut self, value: u64) -> Self {
        self.notifier_dead_event = Some(value);
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeSpecifier) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn require_attributes(mut self, verifier: AttributeVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    fn service_id(&self) -> ServiceId {
        ServiceId::new(&self.name, MessagingPattern::Event, &[])
    }

    fn expected_static_config(&self) -> StaticConfig {
        StaticConfig::new(
            self.name.clone(),
            self.max_nodes,
            self.attributes.attributes().clone(),
            MessagingPatternStaticConfig::Event(EventStaticConfig {
                max_notifiers: self.max_notifiers,
                max_listeners: self.max_listeners,
                event_id_max_value: self.event_id_max_value,
                deadline: self.deadline,
                notifier_created_event: self.notifier_created_event,
                notifier_dropped_event: self.notifier_dropped_event,
                notifier_dead_event: self.notifier_dead_event,
            }),
            &[],
        )
    }

    pub fn create(self) -> Result<PortFactoryEvent, ServiceCreateError> {
        let global = self.node.config().global.clone();
        let named_concept_config = naming_scheme::named_concept_config(&global);
        let static_config = self.expected_static_config();
        let static_name = naming_scheme::static_config_name(&global, &static_config.service_id);

        zerospan_cal::static_storage::create(&named_concept_config, &static_name, &static_config).map_err(
            |e| match e {
                zerospan_cal::static_storage::StaticStorageCreateError::AlreadyExists => {
                    ServiceCreateError::AlreadyExists
                }
                zerospan_cal::static_storage::StaticStorageCreateError::InsufficientPermissions => {
                    ServiceCreateError::InsufficientPermissions
                }
                _ => ServiceCreateError::InternalFailure,
            },
        )?;

        let dynamic_name = naming_scheme::dynamic_config_name(&global, &static_config.service_id);
        let dynamic_config = DynamicConfig::create_event(&named_concept_config, &dynamic_name)
            .map_err(|_| ServiceCreateError::InternalFailure)?;

        zerospan_log::trace!(from "ServiceBuilderEvent::create", "service \"{}\" created", self.name);

        Ok(PortFactoryEvent {
            node: self.node,
            state: Arc::new(ServiceState {
                static_config,
                dynamic_config,
                named_concept_config,
                global,
            }),
        })
    }

    pub fn open(self) -> Result<PortFactoryEvent, ServiceOpenError> {
        let global = self.node.config().global.clone();
        let named_concept_config = naming_scheme::named_concept_config(&global);
        let service_id = self.service_id();
        let static_name = naming_scheme::static_config_name(&global, &service_id);

        let static_config: StaticConfig =
            zerospan_cal::static_storage::open(&named_concept_config, &static_name).map_err(|e| {
                use zerospan_cal::static_storage::StaticStorageOpenError::*;
                match e {
                    DoesNotExist => ServiceOpenError::DoesNotExist,
                    Corrupted => ServiceOpenError::ServiceInCorruptedState,
                    InsufficientPermissions => ServiceOpenError::InsufficientPermissions,
                    InternalError => ServiceOpenError::ServiceInCorruptedState,
                }
            })?;

        if !matches!(static_config.messaging_pattern, MessagingPatternStaticConfig::Event(_)) {
            return Err(ServiceOpenError::IncompatibleMessagingPattern);
        }
        if !self.verifier.verify(&static_config.attributes) {
            return Err(ServiceOpenError::IncompatibleAttributes);
        }

        let dynamic_name = naming_scheme::dynamic_config_name(&global, &static_config.service_id);
        let dynamic_config = DynamicConfig::open(
            &named_concept_config,
            &dynamic_name,
            MessagingPattern::Event,
            global.creation_timeout,
        )
        .map_err(|_| ServiceOpenError::ServiceInCorruptedState)?;

        Ok(PortFactoryEvent {
            node: self.node,
            state: Arc::new(ServiceState {
                static_config,
                dynamic_config,
                named_concept_config,
                global,
            }),
        })
    }

    pub fn open_or_create(self) -> Result<PortFactoryEvent, ServiceOpenOrCreateError> {
        let node = self.node.clone();
        let name = self.name.clone();
        crate::service::retry_bounded(4, move || {
            let builder = Self::new(node.clone(), name.clone());
            match builder.open() {
                Ok(factory) => Ok(factory),
                Err(ServiceOpenError::DoesNotExist) => {
                    Self::new(node.clone(), name.clone()).create().map_err(Into::into)
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[derive(Clone)]
pub struct PortFactoryEvent {
    node: Node,
    state: Arc<ServiceState>,
}

impl PortFactoryEvent {
    pub fn static_config(&self) -> &StaticConfig {
        &self.state.static_config
    }

    pub fn notifier_builder(&self) -> NotifierBuilder {
        NotifierBuilder::new(self.node.clone(), self.state.clone())
    }

    pub fn listener_builder(&self) -> ListenerBuilder {
        ListenerBuilder::new(self.node.clone(), self.state.clone())
    }
}
