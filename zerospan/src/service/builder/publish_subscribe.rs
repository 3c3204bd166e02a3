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

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::node::Node;
use crate::port::publisher::PublisherBuilder;
use crate::port::subscriber::SubscriberBuilder;
use crate::service::attribute::{AttributeSet, AttributeSpecifier, AttributeVerifier};
use crate::service::dynamic_config::DynamicConfig;
use crate::service::messaging_pattern::MessagingPattern;
use crate::service::naming_scheme;
use crate::service::service_id::ServiceId;
use crate::service::service_name::ServiceName;
use crate::service::static_config::{
    MessagingPatternStaticConfig, PublishSubscribeStaticConfig, StaticConfig, TypeDetail,
};
use crate::service::{ServiceCreateError, ServiceOpenError, ServiceOpenOrCreateError, ServiceState};

fn logical_name<T>() -> &'static str {
    TypeDetail::canonical_name::<T>().unwrap_or_else(|| std::any::type_name::<T>())
}

pub struct ServiceBuilderPublishSubscribe<Payload, UserHeader = ()> {
    node: Node,
    name: ServiceName,
    max_publishers: usize,
    max_subscribers: usize,
    max_nodes: usize,
    history_size: usize,
    subscriber_max_buffer_size: usize,
    subscriber_max_borrowed_samples: usize,
    enable_safe_overflow: bool,
    deadline: Option<Duration>,
    attributes: AttributeSpecifier,
    verifier: AttributeVerifier,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> ServiceBuilderPublishSubscribe<Payload, UserHeader> {
    pub(crate) fn new(node: Node, name: ServiceName) -> Self {
        let defaults = node.config().defaults.publish_subscribe;
        Self {
            node,
            name,
            max_publishers: defaults.max_publishers,
            max_subscribers: defaults.max_subscribers,
            max_nodes: defaults.max_nodes,
            history_size: defaults.publisher_history_size,
            subscriber_max_buffer_size: defaults.subscriber_max_buffer_size,
            subscriber_max_borrowed_samples: defaults.subscriber_max_borrowed_samples,
            enable_safe_overflow: defaults.enable_safe_overflow,
            deadline: None,
            attributes: AttributeSpecifier::new(),
            verifier: AttributeVerifier::new(),
            _marker: PhantomData,
        }
    }

    pub fn max_publishers(mut self, value: usize) -> Self {
        self.max_publishers = value.max(1);
        self
    }

    pub fn max_subscribers(mut self, value: usize) -> Self {
        self.max_subscribers = value.max(1);
        self
    }

    pub fn max_nodes(mut self, value: usize) -> Self {
        self.max_nodes = value.max(1);
        self
    }

    pub fn history_size(mut self, value: usize) -> Self {
        self.history_size = value;
        self
    }

    pub fn subscriber_max_buffer_size(mut self, value: usize) -> Self {
        self.subscriber_max_buffer_size = value.max(1);
        self
    }

    pub fn subscriber_max_borrowed_samples(mut self, value: usize) -> Self {
        self.subscriber_max_borrowed_samples = value.max(1);
        self
    }

    pub fn enable_safe_overflow(mut self, value: bool) -> Self {
        self.enable_safe_overflow = value;
        self
    }

    pub fn deadline(mut self, value: Duration) -> Self {
        self.deadline = Some(value);
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

    fn type_signature(&self) -> Vec<&'static str> {
        vec![logical_name::<Payload>(), logical_name::<UserHeader>()]
    }

    fn service_id(&self) -> ServiceId {
        let signature = self.type_signature();
        ServiceId::new(&self.name, MessagingPattern::PublishSubscribe, &signature)
    }

    fn expected_static_config(&self) -> StaticConfig {
        StaticConfig::new(
            self.name.clone(),
            self.max_nodes,
            self.attributes.attributes().clone(),
            MessagingPatternStaticConfig::PublishSubscribe(PublishSubscribeStaticConfig {
                payload_type: TypeDetail::of::<Payload>(logical_name::<Payload>()),
                user_header_type: if std::mem::size_of::<UserHeader>() == 0 {
                    None
                } else {
                    Some(TypeDetail::of::<UserHeader>(logical_name::<UserHeader>()))
                },
                max_publishers: self.max_publishers,
                max_subscribers: self.max_subscribers,
                history_size: self.history_size,
                subscriber_max_buffer_size: self.subscriber_max_buffer_size,
                subscriber_max_borrowed_samples: self.subscriber_max_borrowed_samples,
                enable_safe_overflow: self.enable_safe_overflow,
                deadline: self.deadline,
            }),
            &self.type_signature(),
        )
    }

    pub fn create(
        self,
    ) -> Result<PortFactoryPublishSubscribe<Payload, UserHeader>, ServiceCreateError> {
        let global = self.node.config().global.clone();
        let named_concept_config = naming_scheme::named_concept_config(&global);
        let static_config = self.expected_static_config();
        let static_name = naming_scheme::static_config_name(&global, &static_config.service_id);

        zerospan_cal::static_storage::create(&named_concept_config, &static_name, &static_config)
            .map_err(|e| match e {
                zerospan_cal::static_storage::StaticStorageCreateError::AlreadyExists => {
                    ServiceCreateError::AlreadyExists
                }
                zerospan_cal::static_storage::StaticStorageCreateError::InsufficientPermissions => {
                    ServiceCreateError::InsufficientPermissions
                }
                _ => ServiceCreateError::InternalFailure,
            })?;

        let dynamic_name = naming_scheme::dynamic_config_name(&global, &static_config.service_id);
        let dynamic_config = DynamicConfig::create_publish_subscribe(&named_concept_config, &dynamic_name)
            .map_err(|_| ServiceCreateError::InternalFailure)?;

        zerospan_log::trace!(from "ServiceBuilderPublishSubscribe::create", "service \"{}\" created", self.name);

        Ok(PortFactoryPublishSubscribe {
            node: self.node,
            state: Arc::new(ServiceState {
                static_config,
                dynamic_config,
                named_concept_config,
                global,
            }),
            _marker: PhantomData,
        })
    }

    pub fn open(self) -> Result<PortFactoryPublishSubscribe<Payload, UserHeader>, ServiceOpenError> {
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

        let MessagingPatternStaticConfig::PublishSubscribe(pattern_config) =
            &static_config.messaging_pattern
        else {
            return Err(ServiceOpenError::IncompatibleMessagingPattern);
        };

        let expected_payload = TypeDetail::of::<Payload>(logical_name::<Payload>());
        if pattern_config.payload_type != expected_payload {
            return Err(ServiceOpenError::IncompatibleTypes);
        }

        if !self.verifier.verify(&static_config.attributes) {
            return Err(ServiceOpenError::IncompatibleAttributes);
        }

        let dynamic_name = naming_scheme::dynamic_config_name(&global, &static_config.service_id);
        let dynamic_config = DynamicConfig::open(
            &named_concept_config,
            &dynamic_name,
            MessagingPattern::PublishSubscribe,
            global.creation_timeout,
        )
        .map_err(|_| ServiceOpenError::ServiceInCorruptedState)?;

        Ok(PortFactoryPublishSubscribe {
            node: self.node,
            state: Arc::new(ServiceState {
                static_config,
                dynamic_config,
                named_concept_config,
                global,
            }),
            _marker: PhantomData,
        })
    }

    pub fn open_or_create(
        self,
    ) -> Result<PortFactoryPublishSubscribe<Payload, UserHeader>, ServiceOpenOrCreateError> {
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

/// Opened or newly created publish-subscribe service: the entry point for
/// constructing its publisher(s) and subscriber(s).
pub struct PortFactoryPublishSubscribe<Payload, UserHeader = ()> {
    pub(crate) node: Node,
    pub(crate) state: Arc<ServiceState>,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> PortFactoryPublishSubscribe<Payload, UserHeader> {
    pub fn static_config(&self) -> &StaticConfig {
        &self.state.static_config
    }

    pub fn publisher_builder(&self) -> PublisherBuilder<Payload, UserHeader> {
        PublisherBuilder::new(self.node.clone(), self.state.clone())
    }

    pub fn subscriber_builder(&self) -> SubscriberBuilder<Payload, UserHeader> {
        SubscriberBuilder::new(self.node.clone(), self.state.clone())
    }
}

impl<Payload, UserHeader> Clone for PortFactoryPublishSubscribe<Payload, UserHeader> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            state: self.state.clone(),
            _marker: PhantomData,
        }
    }
}

