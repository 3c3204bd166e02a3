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

//! Publish-subscribe's sending half (§4.2 "Publisher"). States:
//! `Uninitialized → Ready` once its sample pool exists; `loan`/`loan_uninit`
//! take a slot from the pool, `send` fans the populated slot out to every
//! currently connected subscriber and retains up to `history_size` of the
//! most recent sends for late-joining subscribers (§4.2 "history replay").

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zerospan_cal::shm_allocator::{PointerOffset, PoolAllocationError};
use zerospan_cal::zero_copy_connection::{Connection, OverflowPolicy};

use crate::node::Node;
use crate::port::connection_registry;
use crate::port::port_id::{UniquePublisherId, UniqueSubscriberId};
use crate::port::publisher_registry::{self, PublisherPeer};
use crate::port::sample_pool::SamplePool;
use crate::sample::{SampleMut, SampleMutUninit};
use crate::service::naming_scheme;
use crate::service::service_tag::{self, PortKind};
use crate::service::static_config::MessagingPatternStaticConfig;
use crate::service::{dynamic_config, ServiceState};
use crate::unable_to_deliver_strategy::UnableToDeliverStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublisherCreateError {
    ExceedsMaxSupportedPublishers,
    InternalFailure,
}

impl std::fmt::Display for PublisherCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for PublisherCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublisherSendError {
    UnableToDeliver,
}

impl std::fmt::Display for PublisherSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for PublisherSendError {}

pub struct PublisherBuilder<Payload, UserHeader = ()> {
    node: Node,
    state: Arc<ServiceState>,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> PublisherBuilder<Payload, UserHeader> {
    pub(crate) fn new(node: Node, state: Arc<ServiceState>) -> Self {
        Self {
            node,
            state,
            _marker: PhantomData,
        }
    }
}

impl<Payload, UserHeader> PublisherBuilder<Payload, UserHeader>
where
    Payload: Send + Sync + 'static,
    UserHeader: Send + Sync + 'static,
{
    pub fn create(self) -> Result<Publisher<Payload, UserHeader>, PublisherCreateError> {
        let MessagingPatternStaticConfig::PublishSubscribe(pattern) =
            &self.state.static_config.messaging_pattern
        else {
            return Err(PublisherCreateError::InternalFailure);
        };

        let id = UniquePublisherId::new().map_err(|_| PublisherCreateError::InternalFailure)?;
        let node_id = self.node.id();
        let data_segment_name = naming_scheme::data_segment_name(
            &self.state.global,
            &self.state.static_config.service_id,
            id.value(),
        );

        let capacity = pattern.subscriber_max_buffer_size.max(1) + pattern.history_size + 4;
        let pool: SamplePool<Payload, UserHeader> = SamplePool::new(
            &self.state.named_concept_config,
            &data_segment_name,
            capacity,
            self.node.config().defaults.publish_subscribe.allocation_strategy,
        )
        .map_err(|_| PublisherCreateError::InternalFailure)?;

        if let Some(details) = self.state.dynamic_config.as_publish_subscribe() {
            if !dynamic_config::try_increment(&details.publisher_count, pattern.max_publishers) {
                return Err(PublisherCreateError::ExceedsMaxSupportedPublishers);
            }
        }

        let inner = Arc::new(PublisherInner {
            node: self.node,
            state: self.state.clone(),
            id,
            pool: Arc::new(pool),
            connections: Mutex::new(Vec::new()),
            message_number: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
            history_capacity: pattern.history_size,
            enable_safe_overflow: pattern.enable_safe_overflow,
            subscriber_max_buffer_size: pattern.subscriber_max_buffer_size,
            unable_to_deliver_strategy: self
                .node
                .config()
                .defaults
                .publish_subscribe
                .unable_to_deliver_strategy,
        });

        publisher_registry::register(
            self.state.static_config.service_id.as_str(),
            Arc::downgrade(&inner) as std::sync::Weak<dyn PublisherPeer>,
        );
        service_tag::write(
            &self.state.global,
            node_id,
            &self.state.static_config.service_id,
            PortKind::Publisher,
            id.value(),
        );

        zerospan_log::trace!(from "PublisherBuilder::create", "publisher {} created", inner.id);

        Ok(Publisher(inner))
    }
}

/// A retained history entry: the offset plus the pool it was loaned from,
/// so it can be released independently of any subscriber's borrow count.
struct Retained {
    offset: PointerOffset,
}

struct PublisherInner<Payload, UserHeader> {
    node: Node,
    state: Arc<ServiceState>,
    id: UniquePublisherId,
    pool: Arc<SamplePool<Payload, UserHeader>>,
    connections: Mutex<Vec<(UniqueSubscriberId, Arc<Connection>)>>,
    message_number: AtomicU64,
    history: Mutex<VecDeque<Retained>>,
    history_capacity: usize,
    enable_safe_overflow: bool,
    subscriber_max_buffer_size: usize,
    unable_to_deliver_strategy: UnableToDeliverStrategy,
}

impl<Payload, UserHeader> PublisherPeer for PublisherInner<Payload, UserHeader>
where
    Payload: Send + Sync + 'static,
    UserHeader: Send + Sync + 'static,
{
    fn connect_subscriber(
        &self,
        subscriber_id: UniqueSubscriberId,
    ) -> (Arc<Connection>, Arc<dyn std::any::Any + Send + Sync>) {
        let connection_name = naming_scheme::connection_name(
            &self.state.global,
            &self.state.static_config.service_id,
            self.id.value(),
            subscriber_id.value(),
        );
        let policy = if self.enable_safe_overflow {
            OverflowPolicy::SafeOverflow
        } else {
            OverflowPolicy::RejectOnFull
        };
        let connection =
            connection_registry::get_or_create(&connection_name, self.subscriber_max_buffer_size, policy);

        {
            let history = self.history.lock().unwrap();
            for retained in history.iter() {
                let slot = unsafe { self.pool.slot(retained.offset) };
                slot.refcount.fetch_add(1, Ordering::AcqRel);
                let _ = connection.try_push(retained.offset);
            }
        }

        self.connections.lock().unwrap().push((subscriber_id, connection.clone()));
        (connection, self.pool.clone())
    }

    fn disconnect_subscriber(&self, subscriber_id: UniqueSubscriberId) {
        self.connections.lock().unwrap().retain(|(id, _)| *id != subscriber_id);
    }
}

impl<Payload, UserHeader> PublisherInner<Payload, UserHeader> {
    fn push_with_strategy(&self, connection: &Connection, offset: PointerOffset) -> bool {
        match connection.try_push(offset) {
            Ok(overwritten) => {
                if let Some(overwritten) = overwritten {
                    let slot = unsafe { self.pool.slot(overwritten) };
                    if slot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                        self.pool.release(overwritten);
                    }
                }
                true
            }
            Err(_) => match self.unable_to_deliver_strategy {
                UnableToDeliverStrategy::DiscardSample => {
                    zerospan_log::warn!(from "Publisher::send", "subscriber queue full, discarding sample");
                    false
                }
                UnableToDeliverStrategy::Block => {
                    let deadline = Instant::now() + Duration::from_millis(50);
                    loop {
                        if connection.try_push(offset).is_ok() {
                            return true;
                        }
                        if Instant::now() >= deadline {
                            zerospan_log::warn!(
                                from "Publisher::send",
                                "subscriber queue stayed full past the blocking deadline"
                            );
                            return false;
                        }
                        std::thread::sleep(Duration::from_micros(100));
                    }
                }
            },
        }
    }
}

impl<Payload, UserHeader> Drop for PublisherInner<Payload, UserHeader> {
    fn drop(&mut self) {
        if let Some(details) = self.state.dynamic_config.as_publish_subscribe() {
            details.publisher_count.fetch_sub(1, Ordering::AcqRel);
        }
        service_tag::remove(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Publisher,
            self.id.value(),
        );
        for (_, connection) in self.connections.lock().unwrap().iter() {
            connection.mark_producer_disconnected();
        }
    }
}

/// Handle to a created publisher port. Cheaply `Clone`-able; the underlying
/// pool and connections are released once the last clone is dropped.
pub struct Publisher<Payload, UserHeader = ()>(Arc<PublisherInner<Payload, UserHeader>>);

impl<Payload, UserHeader> Clone for Publisher<Payload, UserHeader> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Payload, UserHeader> Publisher<Payload, UserHeader> {
    pub fn id(&self) -> UniquePublisherId {
        self.0.id
    }

    pub fn node(&self) -> &Node {
        &self.0.node
    }

    pub fn unable_to_deliver_strategy(&self) -> UnableToDeliverStrategy {
        self.0.unable_to_deliver_strategy
    }

    pub fn loan_uninit(&self) -> Result<SampleMutUninit<Payload, UserHeader>, PoolAllocationError> {
        let offset = self.0.pool.loan()?;
        let message_number = self.0.message_number.fetch_add(1, Ordering::Relaxed);
        Ok(SampleMutUninit::new(self.0.pool.clone(), offset, self.0.id.value(), message_number))
    }

    pub fn loan(&self) -> Result<SampleMutUninit<Payload, UserHeader>, PoolAllocationError> {
        self.loan_uninit()
    }

    pub fn send_copy(&self, value: Payload) -> Result<usize, PublisherSendError> {
        let sample = self
            .loan_uninit()
            .map_err(|_| PublisherSendError::UnableToDeliver)?
            .write_payload(value);
        self.send(sample)
    }

    /// Fans `sample` out to every connected subscriber, honoring
    /// `unable_to_deliver_strategy` when a connection's queue is full
    /// without safe overflow, and retains it in history if configured.
    pub fn send(&self, sample: SampleMut<Payload, UserHeader>) -> Result<usize, PublisherSendError> {
        let offset = sample.offset();
        let pool = sample.pool().clone();
        std::mem::forget(sample);

        let connections = self.0.connections.lock().unwrap();
        let slot = unsafe { pool.slot(offset) };
        slot.refcount.store(connections.len(), Ordering::Release);

        let mut delivered = 0;
        for (_, connection) in connections.iter() {
            if self.0.push_with_strategy(connection, offset) {
                delivered += 1;
            } else {
                slot.refcount.fetch_sub(1, Ordering::AcqRel);
            }
        }
        drop(connections);

        if self.0.history_capacity > 0 {
            slot.refcount.fetch_add(1, Ordering::AcqRel);
            let mut history = self.0.history.lock().unwrap();
            history.push_back(Retained { offset });
            if history.len() > self.0.history_capacity {
                if let Some(evicted) = history.pop_front() {
                    let evicted_slot = unsafe { pool.slot(evicted.offset) };
                    if evicted_slot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                        pool.release(evicted.offset);
                    }
                }
            }
        }

        if slot.refcount.load(Ordering::Acquire) == 0 {
            pool.release(offset);
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::node::NodeBuilder;
    use crate::service::service_name::ServiceName;

    fn test_config(dir: &std::path::Path, tag: &str) -> Config {
        let mut config = Config::default();
        config.global.root_path = dir.to_path_buf();
        config.global.prefix = format!("test_{}_{}", std::process::id(), tag);
        config
    }

    #[test]
    fn subscriber_created_after_publisher_still_receives_a_send() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "pubsub_basic"))
            .create()
            .unwrap();
        let name = ServiceName::new("temperature").unwrap();
        let service = node.service_builder(&name).publish_subscribe::<u64>().create().unwrap();

        let publisher = service.publisher_builder().create().unwrap();
        let subscriber = service.subscriber_builder().create().unwrap();

        publisher.send_copy(42).unwrap();
        let sample = subscriber.receive().unwrap();
        assert_eq!(*sample.payload(), 42);
    }

    #[test]
    fn late_joining_subscriber_replays_retained_history() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "pubsub_history"))
            .create()
            .unwrap();
        let name = ServiceName::new("history_topic").unwrap();
        let service = node
            .service_builder(&name)
            .publish_subscribe::<u64>()
            .history_size(2)
            .create()
            .unwrap();

        let publisher = service.publisher_builder().create().unwrap();
        publisher.send_copy(1).unwrap();
        publisher.send_copy(2).unwrap();
        publisher.send_copy(3).unwrap();

        let late_subscriber = service.subscriber_builder().create().unwrap();
        let first = late_subscriber.receive().unwrap();
        let second = late_subscriber.receive().unwrap();
        assert_eq!((*first.payload(), *second.payload()), (2, 3));
        assert!(late_subscriber.receive().is_none());
    }
}
