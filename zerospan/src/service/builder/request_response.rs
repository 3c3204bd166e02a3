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

use crate::node::Node;
use crate::port::client::ClientBuilder;
use crate::port::server::ServerBuilder;
use crate::service::attribute::{AttributeSpecifier, AttributeVerifier};
use crate::service::dynamic_config::DynamicConfig;
use crate::service::messaging_pattern::MessagingPattern;
use crate::service::naming_scheme;
use crate::service::service_id::ServiceId;
use crate::service::service_name::ServiceName;
use crate::service::static_config::{
    MessagingPatternStaticConfig, RequestResponseStaticConfig, StaticConfig, TypeDetail,
};
use crate::service::{ServiceCreateError, ServiceOpenError, ServiceOpenOrCreateError, ServiceState};

fn logical_name<T>() -> &'static str {
    TypeDetail::canonical_name::<T>().unwrap_or_else(|| std::any::type_name::<T>())
}

pub struct ServiceBuilderRequestResponse<Request, Response, RequestHeader = (), ResponseHeader = ()> {
    node: Node,
    name: ServiceName,
    max_clients: usize,
    max_servers: usize,
    max_nodes: usize,
    max_active_requests_per_client: usize,
    max_borrowed_responses_per_pending_response: usize,
    max_response_buffer_size: usize,
    enable_safe_overflow_for_requests: bool,
    enable_safe_overflow_for_responses: bool,
    enable_fire_and_forget_requests: bool,
    attributes: AttributeSpecifier,
    verifier: AttributeVerifier,
    _marker: PhantomData<(Request, Response, RequestHeader, ResponseHeader)>,
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ServiceBuilderRequestResponse<Request, Response, RequestHeader, ResponseHeader>
{
    pub(crate) fn new(node: Node, name: ServiceName) -> Self {
        let defaults = node.config().defaults.request_response;
        Self {
            node,
            name,
            max_clients: defaults.max_clients,
            max_servers: defaults.max_servers,
            max_nodes: defaults.max_nodes,
            max_active_requests_per_client: defaults.max_active_requests_per_client,
            max_borrowed_responses_per_pending_response: defaults.max_borrowed_responses_per_pending_response,
            max_response_buffer_size: defaults.max_response_buffer_size,
            enable_safe_overflow_for_requests: defaults.enable_safe_overflow_for_requests,
            enable_safe_overflow_for_responses: defaults.enable_safe_overflow_for_responses,
            enable_fire_and_forget_requests: defaults.enable_fire_and_forget_requests,
            attributes: AttributeSpecifier::new(),
            verifier: AttributeVerifier::new(),
            _marker: PhantomData,
        }
    }

    pub fn max_clients(mut self, value: usize) -> Self {
        self.max_clients = value.max(1);
        self
    }

    pub fn max_servers(mut self, value: usize) -> Self {
        self.max_servers = value.max(1);
        self
    }

    pub fn max_nodes(mut self, value: usize) -> Self {
        self.max_nodes = value.max(1);
        self
    }

    pub fn max_active_requests_per_client(mut self, value: usize) -> Self {
        self.max_active_requests_per_client = value.max(1);
        self
    }

    pub fn max_borrowed_responses_per_pending_response(mut self, value: usize) -> Self {
        self.max_borrowed_responses_per_pending_response = value.max(1);
        self
    }

    pub fn max_response_buffer_size(mut self, value: usize) -> Self {
        self.max_response_buffer_size = value.max(1);
        self
    }

    pub fn enable_safe_overflow_for_requests(mut self, value: bool) -> Self {
        self.enable_safe_overflow_for_requests = value;
        self
    }

    pub fn enable_safe_overflow_for_responses(mut self, value: bool) -> Self {
        self.enable_safe_overflow_for_responses = value;
        self
    }

    pub fn enable_fire_and_forget_requests(mut self, value: bool) -> Self {
        self.enable_fire_and_forget_requests = value;
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
        vec![
            logical_name::<Request>(),
            logical_name::<Response>(),
            logical_name::<RequestHeader>(),
            logical_name::<ResponseHeader>(),
        ]
    }

    fn service_id(&self) -> ServiceId {
        let signature = self.type_signature();
        ServiceId::new(&self.name, MessagingPattern::RequestResponse, &signature)
    }

    fn expected_static_config(&self) -> StaticConfig {
        StaticConfig::new(
            self.name.clone(),
            self.max_nodes,
            self.attributes.attributes().clone(),
            MessagingPatternStaticConfig::RequestResponse(RequestResponseStaticConfig {
                request_type: TypeDetail::of::<Request>(logical_name::<Request>()),
                response_type: TypeDetail::of::<Response>(logical_name::<Response>()),
                request_user_header: if std::mem::size_of::<RequestHeader>() == 0 {
                    None
                } else {
                    Some(TypeDetail::of::<RequestHeader>(logical_name::<RequestHeader>()))
                },
                response_user_header: if std::mem::size_of::<ResponseHeader>() == 0 {
                    None
                } else {
                    Some(TypeDetail::of::<ResponseHeader>(logical_name::<ResponseHeader>()))
                },
                max_clients: self.max_clients,
                max_servers: self.max_servers,
                max_active_requests_per_client: self.max_active_requests_per_client,
                max_borrowed_responses_per_pending_response: self.max_borrowed_responses_per_pending_response,
                max_response_buffer_size: self.max_response_buffer_size,
                enable_safe_overflow_for_requests: self.enable_safe_overflow_for_requests,
                enable_safe_overflow_for_responses: self.enable_safe_overflow_for_responses,
                enable_fire_and_forget_requests: self.enable_fire_and_forget_requests,
            }),
            &self.type_signature(),
        )
    }

    pub fn create(
        self,
    ) -> Result<PortFactoryRequestResponse<Request, Response, RequestHeader, ResponseHeader>, ServiceCreateError>
    {
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
        let dynamic_config = DynamicConfig::create_request_response(&named_concept_config, &dynamic_name)
            .map_err(|_| ServiceCreateError::InternalFailure)?;

        zerospan_log::trace!(from "ServiceBuilderRequestResponse::create", "service \"{}\" created", self.name);

        Ok(PortFactoryRequestResponse {
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

    pub fn open(
        self,
    ) -> Result<PortFactoryRequestResponse<Request, Response, RequestHeader, ResponseHeader>, ServiceOpenError>
    {
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

        let MessagingPatternStaticConfig::RequestResponse(pattern_config) = &static_config.messaging_pattern
        else {
            return Err(ServiceOpenError::IncompatibleMessagingPattern);
        };

        let expected_request = TypeDetail::of::<Request>(logical_name::<Request>());
        let expected_response = TypeDetail::of::<Response>(logical_name::<Response>());
        if pattern_config.request_type != expected_request || pattern_config.response_type != expected_response {
            return Err(ServiceOpenError::IncompatibleTypes);
        }

        if !self.verifier.verify(&static_config.attributes) {
            return Err(ServiceOpenError::IncompatibleAttributes);
        }

        let dynamic_name = naming_scheme::dynamic_config_name(&global, &static_config.service_id);
        let dynamic_config = DynamicConfig::open(
            &named_concept_config,
            &dynamic_name,
            MessagingPattern::RequestResponse,
            global.creation_timeout,
        )
        .map_err(|_| ServiceOpenError::ServiceInCorruptedState)?;

        Ok(PortFactoryRequestResponse {
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
    ) -> Result<
        PortFactoryRequestResponse<Request, Response, RequestHeader, ResponseHeader>,
        ServiceOpenOrCreateError,
    > {
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

/// Opened or newly created request-response service: the entry point for
/// constructing its client(s) and server(s).
pub struct PortFactoryRequestResponse<Request, Response, RequestHeader = (), ResponseHeader = ()> {
    node: Node,
    state: Arc<ServiceState>,
    _marker: PhantomData<(Request, Response, RequestHeader, ResponseHeader)>,
}

impl<Request, Response, RequestHeader, ResponseHeader>
    PortFactoryRequestResponse<Request, Response, RequestHeader, ResponseHeader>
{
    pub fn static_config(&self) -> &StaticConfig {
        &self.state.static_config
    }

    pub fn client_builder(&self) -> ClientBuilder<Request, Response, RequestHeader, ResponseHeader> {
        ClientBuilder::new(self.node.clone(), self.state.clone())
    }

    pub fn server_builder(&self) -> ServerBuilder<Request, Response, RequestHeader, ResponseHeader> {
        ServerBuilder::new(self.node.clone(), self.state.clone())
    }
}

impl<Request, Response, RequestHeader, ResponseHeader> Clone
    for PortFactoryRequestResponse<Request, Response, RequestHeader, ResponseHeader>
{
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            state: self.state.clone(),
            _marker: PhantomData,
        }
    }
}
