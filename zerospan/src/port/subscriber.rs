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

//! Publish-subscribe's receiving half (§4.2 "Subscriber"). On creation it
//! connects to every publisher currently alive for the service and replays
//! their retained history; `receive` pops the oldest unread sample across
//! all connected publishers in round-robin order.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use zerospan_cal::zero_copy_connection::Connection;

use crate::node::Node;
use crate::port::port_id::UniqueSubscriberId;
use crate::port::publisher_registry::{self, PublisherPeer};
use crate::port::sample_pool::SamplePool;
use crate::sample::Sample;
use crate::service::service_tag::{self, PortKind};
use crate::service::static_config::MessagingPatternStaticConfig;
use crate::service::{dynamic_config, ServiceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberCreateError {
    ExceedsMaxSupportedSubscribers,
    InternalFailure,
}

impl std::fmt::Display for SubscriberCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for SubscriberCreateError {}

pub struct SubscriberBuilder<Payload, UserHeader = ()> {
    node: Node,
    state: Arc<ServiceState>,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> SubscriberBuilder<Payload, UserHeader> {
    pub(crate) fn new(node: Node, state: Arc<ServiceState>) -> Self {
        Self {
            node,
            state,
            _marker: PhantomData,
        }
    }
}

impl<Payload, UserHeader> SubscriberBuilder<Payload, UserHeader>
where
    Payload: Send + Sync + 'static,
    UserHeader: Send + Sync + 'static,
{
    pub fn create(self) -> Result<Subscriber<Payload, UserHeader>, SubscriberCreateError> {
        let MessagingPatternStaticConfig::PublishSubscribe(pattern) =
            &self.state.static_config.messaging_pattern
        else {
            return Err(SubscriberCreateError::InternalFailure);
        };

        let id = UniqueSubscriberId::new().map_err(|_| SubscriberCreateError::InternalFailure)?;
        let mut peers = Vec::new();
        for peer in publisher_registry::peers_for(self.state.static_config.service_id.as_str()) {
            let (connection, pool) = peer.connect_subscriber(id);
            let pool = pool
                .downcast::<SamplePool<Payload, UserHeader>>()
                .expect("publisher and subscriber payload/header types matched by ServiceId");
            peers.push((peer, connection, pool));
        }

        if let Some(details) = self.state.dynamic_config.as_publish_subscribe() {
            if !dynamic_config::try_increment(&details.subscriber_count, pattern.max_subscribers) {
                return Err(SubscriberCreateError::ExceedsMaxSupportedSubscribers);
            }
        }

        zerospan_log::trace!(
            from "SubscriberBuilder::create",
            "subscriber {} connected to {} publisher(s)",
            id,
            peers.len()
        );

        service_tag::write(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Subscriber,
            id.value(),
        );

        Ok(Subscriber {
            node: self.node,
            state: self.state,
            id,
            peers: Mutex::new(peers),
            next_peer: std::sync::atomic::AtomicUsize::new(0),
        })
    }
}

type Peer<Payload, UserHeader> = (
    Arc<dyn PublisherPeer>,
    Arc<Connection>,
    Arc<SamplePool<Payload, UserHeader>>,
);

pub struct Subscriber<Payload, UserHeader = ()> {
    node: Node,
    state: Arc<ServiceState>,
    id: UniqueSubscriberId,
    peers: Mutex<Vec<Peer<Payload, UserHeader>>>,
    next_peer: std::sync::atomic::AtomicUsize,
}

impl<Payload, UserHeader> Subscriber<Payload, UserHeader> {
    pub fn id(&self) -> UniqueSubscriberId {
        self.id
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn has_samples(&self) -> bool {
        self.peers.lock().unwrap().iter().any(|(_, connection, _)| !connection.is_empty())
    }

    /// Pops the oldest unread sample, scanning connected publishers in
    /// round-robin order starting after whichever was read from last.
    pub fn receive(&self) -> Option<Sample<Payload, UserHeader>> {
        let peers = self.peers.lock().unwrap();
        if peers.is_empty() {
            return None;
        }
        let start = self.next_peer.load(std::sync::atomic::Ordering::Relaxed) % peers.len();
        for offset in 0..peers.len() {
            let index = (start + offset) % peers.len();
            let (_, connection, pool) = &peers[index];
            if let Some(offset_value) = connection.try_pop() {
                self.next_peer.store((index + 1) % peers.len(), std::sync::atomic::Ordering::Relaxed);
                return Some(Sample::new(pool.clone(), offset_value));
            }
        }
        None
    }
}

impl<Payload, UserHeader> Drop for Subscriber<Payload, UserHeader> {
    fn drop(&mut self) {
        if let Some(details) = self.state.dynamic_config.as_publish_subscribe() {
            details.subscriber_count.fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
        }
        service_tag::remove(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Subscriber,
            self.id.value(),
        );
        for (peer, connection, _) in self.peers.lock().unwrap().iter() {
            connection.mark_consumer_disconnected();
            peer.disconnect_subscriber(self.id);
        }
    }
}
