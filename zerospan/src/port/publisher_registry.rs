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

//! Process-local directory of live publishers per service, keyed by
//! `ServiceId`. A dropped [`crate::service::dynamic_config`] port-membership
//! table means a subscriber has no shared-memory-resident way to discover
//! which publishers already exist; this registry is the in-process stand-in
//! a [`crate::port::subscriber::Subscriber`] consults on creation to connect
//! to every publisher already alive in this process and replay their
//! history. Cross-process discovery is out of scope of this simplification.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::sync::{Arc, Weak};

use crate::port::port_id::UniqueSubscriberId;
use zerospan_cal::zero_copy_connection::Connection;

pub(crate) trait PublisherPeer: Send + Sync {
    /// Connects a subscriber, returning its receive connection and a
    /// type-erased handle to the publisher's sample pool (downcast back to
    /// `Arc<SamplePool<Payload, UserHeader>>` by the caller, which knows the
    /// concrete types because they were matched by `ServiceId` already).
    fn connect_subscriber(
        &self,
        subscriber_id: UniqueSubscriberId,
    ) -> (Arc<Connection>, Arc<dyn std::any::Any + Send + Sync>);
    fn disconnect_subscriber(&self, subscriber_id: UniqueSubscriberId);
}

type Registry = Mutex<HashMap<String, Vec<Weak<dyn PublisherPeer>>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register(service_id: &str, peer: Weak<dyn PublisherPeer>) {
    let mut map = registry().lock().unwrap();
    map.entry(service_id.to_string()).or_default().push(peer);
}

pub(crate) fn peers_for(service_id: &str) -> Vec<Arc<dyn PublisherPeer>> {
    let mut map = registry().lock().unwrap();
    let entry = map.entry(service_id.to_string()).or_default();
    entry.retain(|weak| weak.strong_count() > 0);
    entry.iter().filter_map(Weak::upgrade).collect()
}
