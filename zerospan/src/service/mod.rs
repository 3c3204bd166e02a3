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

//! Named, typed communication endpoint families. A service is created or
//! opened through a [`builder`], identified by a [`service_id::ServiceId`]
//! derived from its [`service_name::ServiceName`], messaging pattern and
//! type signature, and backed by a [`static_config::StaticConfig`] (frozen
//! at creation) plus a [`dynamic_config::DynamicConfig`] (live port
//! counts).

pub mod attribute;
pub mod builder;
pub mod dynamic_config;
pub mod messaging_pattern;
pub mod naming_scheme;
pub mod service_id;
pub mod service_name;
pub(crate) mod service_tag;
pub mod static_config;

use std::sync::Arc;

use crate::config::Global;
use dynamic_config::DynamicConfig;
use static_config::StaticConfig;
use zerospan_cal::named_concept::NamedConceptConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCreateError {
    AlreadyExists,
    InsufficientPermissions,
    InternalFailure,
    IsBeingCreatedByAnotherInstance,
    HangsInCreation,
    ServiceInCorruptedState,
}

impl std::fmt::Display for ServiceCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ServiceCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOpenError {
    DoesNotExist,
    InsufficientPermissions,
    ServiceInCorruptedState,
    IncompatibleTypes,
    IncompatibleAttributes,
    IncompatibleMessagingPattern,
    ExceedsMaxNumberOfNodes,
    HangsInCreation,
    VersionMismatch,
}

impl std::fmt::Display for ServiceOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ServiceOpenError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOpenOrCreateError {
    Open(ServiceOpenError),
    Create(ServiceCreateError),
    SystemInFlux,
}

impl std::fmt::Display for ServiceOpenOrCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ServiceOpenOrCreateError {}

impl From<ServiceOpenError> for ServiceOpenOrCreateError {
    fn from(value: ServiceOpenError) -> Self {
        Self::Open(value)
    }
}
impl From<ServiceCreateError> for ServiceOpenOrCreateError {
    fn from(value: ServiceCreateError) -> Self {
        Self::Create(value)
    }
}

/// Everything every port created from a [`Service`] needs: the frozen
/// static config, the live dynamic config, and the naming context to
/// derive connection/data-segment names from. Shared via `Arc` so ports
/// outlive the `Service` handle that created them.
pub(crate) struct ServiceState {
    pub static_config: StaticConfig,
    pub dynamic_config: DynamicConfig,
    pub named_concept_config: NamedConceptConfiguration,
    pub global: Global,
}

/// A handle to an opened or newly created service. Construct one via
/// [`builder::publish_subscribe::ServiceBuilderPublishSubscribe`],
/// [`builder::event::ServiceBuilderEvent`] or
/// [`builder::request_response::ServiceBuilderRequestResponse`], reached
/// through [`crate::node::Node::service_builder`].
#[derive(Clone)]
pub struct Service(pub(crate) Arc<ServiceState>);

impl Service {
    pub fn static_config(&self) -> &StaticConfig {
        &self.0.static_config
    }

    pub fn dynamic_config(&self) -> &DynamicConfig {
        &self.0.dynamic_config
    }
}

/// Retries `open` until it stops racing a concurrent creator, bounded by
/// `attempts` (§4.6 "OpenOrCreate ... bounded retries").
pub(crate) fn retry_bounded<T, E>(
    attempts: usize,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut last_err = None;
    for _ in 0..attempts.max(1) {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.expect("attempts is at least 1"))
}
