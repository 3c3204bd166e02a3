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

//! Request-response's sending half (§4.3 "Client"). Connects to every
//! server already alive for the service, fans each request out to all of
//! them the way a [`crate::port::publisher::Publisher`] fans out a sample,
//! and returns a [`PendingResponse`] that streams back whatever each
//! connected server answers with.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zerospan_cal::shm_allocator::PointerOffset;
use zerospan_cal::zero_copy_connection::{Connection, OverflowPolicy};

use crate::node::Node;
use crate::port::port_id::UniqueClientId;
use crate::port::request_response_registry::{self, ServerPeer};
use crate::port::sample_pool::SamplePool;
use crate::sample::{Sample, SampleMut, SampleMutUninit};
use crate::service::naming_scheme;
use crate::service::service_tag::{self, PortKind};
use crate::service::static_config::MessagingPatternStaticConfig;
use crate::service::{dynamic_config, ServiceState};
use crate::unable_to_deliver_strategy::UnableToDeliverStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientCreateError {
    ExceedsMaxSupportedClients,
    InternalFailure,
}

impl std::fmt::Display for ClientCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ClientCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientSendError {
    UnableToDeliver,
}

impl std::fmt::Display for ClientSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ClientSendError {}

pub struct ClientBuilder<Request, Response, RequestHeader = (), ResponseHeader = ()> {
    node: Node,
    state: Arc<ServiceState>,
    _marker: PhantomData<(Request, Response, RequestHeader, ResponseHeader)>,
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ClientBuilder<Request, Response, RequestHeader, ResponseHeader>
{
    pub(crate) fn new(node: Node, state: Arc<ServiceState>) -> Self {
        Self {
            node,
            state,
            _marker: PhantomData,
        }
    }
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ClientBuilder<Request, Response, RequestHeader, ResponseHeader>
where
    Request: Send + Sync + 'static,
    Response: Send + Sync + 'static,
    RequestHeader: Send + Sync + 'static,
    ResponseHeader: Send + Sync + 'static,
{
    pub fn create(
        self,
    ) -> Result<Client<Request, Response, RequestHeader, ResponseHeader>, ClientCreateError> {
        let MessagingPatternStaticConfig::RequestResponse(pattern) =
            &self.state.static_config.messaging_pattern
        else {
            return Err(ClientCreateError::InternalFailure);
        };

        let id = UniqueClientId::new().map_err(|_| ClientCreateError::InternalFailure)?;
        let node_id = self.node.id();
        let data_segment_name = naming_scheme::data_segment_name(
            &self.state.global,
            &self.state.static_config.service_id,
            id.value(),
        );

        let capacity = pattern.max_active_requests_per_client.max(1) + 4;
        let request_pool: Arc<SamplePool<Request, RequestHeader>> = Arc::new(
            SamplePool::new(
                &self.state.named_concept_config,
                &data_segment_name,
                capacity,
                self.node.config().defaults.publish_subscribe.allocation_strategy,
            )
            .map_err(|_| ClientCreateError::InternalFailure)?,
        );

        let mut peers = Vec::new();
        for server in request_response_registry::servers_for(self.state.static_config.service_id.as_str()) {
            let (request_connection, response_connection, response_pool) =
                server.connect_client(id, request_pool.clone());
            let response_pool = response_pool
                .downcast::<SamplePool<Response, ResponseHeader>>()
                .expect("client and server response types matched by ServiceId");
            peers.push(ConnectedServer {
                peer: server,
                request_connection,
                response_connection,
                response_pool,
            });
        }

        if let Some(details) = self.state.dynamic_config.as_request_response() {
            if !dynamic_config::try_increment(&details.client_count, pattern.max_clients) {
                return Err(ClientCreateError::ExceedsMaxSupportedClients);
            }
        }

        zerospan_log::trace!(
            from "ClientBuilder::create",
            "client {} connected to {} server(s)",
            id,
            peers.len()
        );

        service_tag::write(
            &self.state.global,
            node_id,
            &self.state.static_config.service_id,
            PortKind::Client,
            id.value(),
        );

        Ok(Client(Arc::new(ClientInner {
            node: self.node,
            state: self.state.clone(),
            id,
            request_pool,
            peers: Mutex::new(peers),
            message_number: AtomicU64::new(0),
            enable_safe_overflow_for_requests: pattern.enable_safe_overflow_for_requests,
            unable_to_deliver_strategy: self
                .node
                .config()
                .defaults
                .request_response
                .client_unable_to_deliver_strategy,
        })))
    }
}

struct ConnectedServer<Request, Response, RequestHeader, ResponseHeader> {
    peer: Arc<dyn ServerPeer>,
    request_connection: Arc<Connection>,
    response_connection: Arc<Connection>,
    response_pool: Arc<SamplePool<Response, ResponseHeader>>,
    _marker: PhantomData<(Request, RequestHeader)>,
}

struct ClientInner<Request, Response, RequestHeader, ResponseHeader> {
    node: Node,
    state: Arc<ServiceState>,
    id: UniqueClientId,
    request_pool: Arc<SamplePool<Request, RequestHeader>>,
    peers: Mutex<Vec<ConnectedServer<Request, Response, RequestHeader, ResponseHeader>>>,
    message_number: AtomicU64,
    enable_safe_overflow_for_requests: bool,
    unable_to_deliver_strategy: UnableToDeliverStrategy,
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ClientInner<Request, Response, RequestHeader, ResponseHeader>
{
    fn push_with_strategy(&self, connection: &Connection, offset: PointerOffset) -> bool {
        match connection.try_push(offset) {
            Ok(overwritten) => {
                if let Some(overwritten) = overwritten {
                    let slot = unsafe { self.request_pool.slot(overwritten) };
                    if slot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                        self.request_pool.release(overwritten);
                    }
                }
                true
            }
            Err(_) => match self.unable_to_deliver_strategy {
                UnableToDeliverStrategy::DiscardSample => false,
                UnableToDeliverStrategy::Block => {
                    let deadline = Instant::now() + Duration::from_millis(50);
                    loop {
                        if connection.try_push(offset).is_ok() {
                            return true;
                        }
                        if Instant::now() >= deadline {
                            return false;
                        }
                        std::thread::sleep(Duration::from_micros(100));
                    }
                }
            },
        }
    }
}

impl<Request, Response, RequestHeader, ResponseHeader> Drop
    for ClientInner<Request, Response, RequestHeader, ResponseHeader>
{
    fn drop(&mut self) {
        if let Some(details) = self.state.dynamic_config.as_request_response() {
            details.client_count.fetch_sub(1, Ordering::AcqRel);
        }
        service_tag::remove(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Client,
            self.id.value(),
        );
        for server in self.peers.lock().unwrap().iter() {
            server.request_connection.mark_producer_disconnected();
            server.response_connection.mark_consumer_disconnected();
            server.peer.disconnect_client(self.id);
        }
    }
}

/// Handle to a created client port. Cheaply `Clone`-able.
pub struct Client<Request, Response, RequestHeader = (), ResponseHeader = ()>(
    Arc<ClientInner<Request, Response, RequestHeader, ResponseHeader>>,
);

impl<Request, Response, RequestHeader, ResponseHeader> Clone
    for Client<Request, Response, RequestHeader, ResponseHeader>
{
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Request, Response, RequestHeader, ResponseHeader>
    Client<Request, Response, RequestHeader, ResponseHeader>
{
    pub fn id(&self) -> UniqueClientId {
        self.0.id
    }

    pub fn node(&self) -> &Node {
        &self.0.node
    }

    pub fn loan_request_uninit(&self) -> Result<SampleMutUninit<Request, RequestHeader>, ClientSendError> {
        let offset = self.0.request_pool.loan().map_err(|_| ClientSendError::UnableToDeliver)?;
        let message_number = self.0.message_number.fetch_add(1, Ordering::Relaxed);
        Ok(SampleMutUninit::new(
            self.0.request_pool.clone(),
            offset,
            self.0.id.value(),
            message_number,
        ))
    }

    pub fn send_copy(
        &self,
        value: Request,
    ) -> Result<PendingResponse<Response, ResponseHeader>, ClientSendError>
    where
        Request: 'static,
    {
        let sample = self.loan_request_uninit()?.write_payload(value);
        self.send(sample)
    }

    /// Fans `request` out to every connected server and returns a handle
    /// that streams back whatever each of them responds with.
    pub fn send(
        &self,
        request: SampleMut<Request, RequestHeader>,
    ) -> Result<PendingResponse<Response, ResponseHeader>, ClientSendError> {
        let offset = request.offset();
        let pool = request.pool().clone();
        std::mem::forget(request);

        let peers = self.0.peers.lock().unwrap();
        let slot = unsafe { pool.slot(offset) };
        slot.refcount.store(peers.len(), Ordering::Release);

        let mut channels = Vec::with_capacity(peers.len());
        for server in peers.iter() {
            if self.0.push_with_strategy(&server.request_connection, offset) {
                channels.push((server.response_connection.clone(), server.response_pool.clone()));
            } else {
                slot.refcount.fetch_sub(1, Ordering::AcqRel);
            }
        }
        drop(peers);

        if slot.refcount.load(Ordering::Acquire) == 0 {
            pool.release(offset);
        }

        Ok(PendingResponse {
            channels,
            next: AtomicUsize::new(0),
        })
    }
}

/// A sent request's response stream, fed by every server it was delivered
/// to. `receive` pops the oldest unread response across all of them,
/// round-robin, mirroring how [`crate::port::subscriber::Subscriber`]
/// drains multiple connected publishers.
pub struct PendingResponse<Response, ResponseHeader = ()> {
    channels: Vec<(Arc<Connection>, Arc<SamplePool<Response, ResponseHeader>>)>,
    next: AtomicUsize,
}

impl<Response, ResponseHeader> PendingResponse<Response, ResponseHeader> {
    pub fn has_responses(&self) -> bool {
        self.channels.iter().any(|(connection, _)| !connection.is_empty())
    }

    pub fn receive(&self) -> Option<Sample<Response, ResponseHeader>> {
        if self.channels.is_empty() {
            return None;
        }
        let len = self.channels.len();
        let start = self.next.load(Ordering::Relaxed) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let (connection, pool) = &self.channels[index];
            if let Some(response_offset) = connection.try_pop() {
                self.next.store((index + 1) % len, Ordering::Relaxed);
                return Some(Sample::new(pool.clone(), response_offset));
            }
        }
        None
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
    fn client_created_before_any_server_gets_no_peers() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "reqres_no_server"))
            .create()
            .unwrap();
        let name = ServiceName::new("lonely").unwrap();
        let service = node.service_builder(&name).request_response::<u64, u64>().create().unwrap();

        let client = service.client_builder().create().unwrap();
        let pending = client.send_copy(1).unwrap();
        assert!(pending.receive().is_none());
    }
}
