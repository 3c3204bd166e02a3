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

//! Process-local directories mirroring [`crate::port::publisher_registry`]
//! for the event and request-response patterns: a notifier/server has no
//! shared-memory-resident port-membership table to advertise itself
//! through, so newly created listeners/clients consult these registries to
//! discover and connect to whichever peers are already alive in this
//! process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use zerospan_cal::event::EventChannel;

use crate::port::port_id::UniqueListenerId;

pub(crate) trait NotifierPeer: Send + Sync {
    fn connect_listener(&self, listener_id: UniqueListenerId) -> Arc<EventChannel>;
    fn disconnect_listener(&self, listener_id: UniqueListenerId);
}

type NotifierRegistry = Mutex<HashMap<String, Vec<Weak<dyn NotifierPeer>>>>;
static NOTIFIERS: OnceLock<NotifierRegistry> = OnceLock::new();

fn notifiers() -> &'static NotifierRegistry {
    NOTIFIERS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register_notifier(service_id: &str, peer: Weak<dyn NotifierPeer>) {
    notifiers().lock().unwrap().entry(service_id.to_string()).or_default().push(peer);
}

pub(crate) fn notifiers_for(service_id: &str) -> Vec<Arc<dyn NotifierPeer>> {
    let mut map = notifiers().lock().unwrap();
    let entry = map.entry(service_id.to_string()).or_default();
    entry.retain(|weak| weak.strong_count() > 0);
    entry.iter().filter_map(Weak::upgrade).collect()
}

/// Every listener channel connected for a service, independent of which
/// notifier paired with it. A service-wide lifecycle event (notifier
/// created/dropped/dead) has no single notifier to multicast it from, so
/// [`emit_lifecycle_event`] reaches every channel here directly instead of
/// going through [`NotifierPeer`].
type ListenerChannelRegistry = Mutex<HashMap<String, Vec<Weak<EventChannel>>>>;
static LISTENER_CHANNELS: OnceLock<ListenerChannelRegistry> = OnceLock::new();

fn listener_channels() -> &'static ListenerChannelRegistry {
    LISTENER_CHANNELS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register_listener_channel(service_id: &str, channel: Weak<EventChannel>) {
    listener_channels()
        .lock()
        .unwrap()
        .entry(service_id.to_string())
        .or_default()
        .push(channel);
}

/// Raises `event_id` on every listener channel still connected for
/// `service_id`. A `None` id means the service was not configured to emit
/// this lifecycle event, so it is a no-op.
pub(crate) fn emit_lifecycle_event(service_id: &str, event_id: Option<u64>) {
    let Some(event_id) = event_id else { return };
    let trigger_id = (event_id as u32).min(zerospan_cal::event::MAX_TRIGGER_ID);

    let mut map = listener_channels().lock().unwrap();
    let entry = map.entry(service_id.to_string()).or_default();
    entry.retain(|weak| weak.strong_count() > 0);
    for channel in entry.iter().filter_map(Weak::upgrade) {
        channel.notify(trigger_id);
    }
}

pub(crate) trait ServerPeer: Send + Sync {
    /// Connects a client, given a type-erased handle to the client's own
    /// request pool (downcast by the server, same reasoning as
    /// [`crate::port::publisher_registry::PublisherPeer::connect_subscriber`]).
    /// Returns the request connection (client writes, server reads), the
    /// response connection (server writes, client reads) and a type-erased
    /// handle to the server's response pool (downcast by the client).
    fn connect_client(
        &self,
        client_id: crate::port::port_id::UniqueClientId,
        request_pool: Arc<dyn std::any::Any + Send + Sync>,
    ) -> (
        Arc<zerospan_cal::Connection>,
        Arc<zerospan_cal::Connection>,
        Arc<dyn std::any::Any + Send + Sync>,
    );
    fn disconnect_client(&self, client_id: crate::port::port_id::UniqueClientId);
}

type ServerRegistry = Mutex<HashMap<String, Vec<Weak<dyn ServerPeer>>>>;
static SERVERS: OnceLock<ServerRegistry> = OnceLock::new();

fn servers() -> &'static ServerRegistry {
    SERVERS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register_server(service_id: &str, peer: Weak<dyn ServerPeer>) {
    servers().lock().unwrap().entry(service_id.to_string()).or_default().push(peer);
}

pub(crate) fn servers_for(service_id: &str) -> Vec<Arc<dyn ServerPeer>> {
    let mut map = servers().lock().unwrap();
    let entry = map.entry(service_id.to_string()).or_default();
    entry.retain(|weak| weak.strong_count() > 0);
    entry.iter().filter_map(Weak::upgrade).collect()
}
