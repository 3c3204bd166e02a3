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

//! Request-response's receiving half (§4.3 "Server"). Self-registers so
//! clients created afterward can discover and connect to it; `receive`
//! round-robins pending requests across every connected client and hands
//! back an [`ActiveRequest`] that can stream zero or more responses back to
//! that one client.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zerospan_cal::shm_allocator::PointerOffset;
use zerospan_cal::zero_copy_connection::{Connection, OverflowPolicy};

use crate::node::Node;
use crate::port::connection_registry;
use crate::port::port_id::{UniqueClientId, UniqueServerId};
use crate::port::request_response_registry::{self, ServerPeer};
use crate::port::sample_pool::SamplePool;
use crate::sample::{Sample, SampleMut, SampleMutUninit};
use crate::service::naming_scheme;
use crate::service::service_tag::{self, PortKind};
use crate::service::static_config::MessagingPatternStaticConfig;
use crate::service::{dynamic_config, ServiceState};
use crate::unable_to_deliver_strategy::UnableToDeliverStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerCreateError {
    ExceedsMaxSupportedServers,
    InternalFailure,
}

impl std::fmt::Display for ServerCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ServerCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerSendError {
    UnableToDeliver,
}

impl std::fmt::Display for ServerSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ServerSendError {}

pub struct ServerBuilder<Request, Response, RequestHeader = (), ResponseHeader = ()> {
    node: Node,
    state: Arc<ServiceState>,
    _marker: PhantomData<(Request, Response, RequestHeader, ResponseHeader)>,
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ServerBuilder<Request, Response, RequestHeader, ResponseHeader>
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
    ServerBuilder<Request, Response, RequestHeader, ResponseHeader>
where
    Request: Send + Sync + 'static,
    Response: Send + Sync + 'static,
    RequestHeader: Send + Sync + 'static,
    ResponseHeader: Send + Sync + 'static,
{
    pub fn create(
        self,
    ) -> Result<Server<Request, Response, RequestHeader, ResponseHeader>, ServerCreateError> {
        let MessagingPatternStaticConfig::RequestResponse(pattern) =
            &self.state.static_config.messaging_pattern
        else {
            return Err(ServerCreateError::InternalFailure);
        };

        let id = UniqueServerId::new().map_err(|_| ServerCreateError::InternalFailure)?;
        let node_id = self.node.id();
        let data_segment_name = naming_scheme::data_segment_name(
            &self.state.global,
            &self.state.static_config.service_id,
            id.value(),
        );

        let capacity = pattern.max_response_buffer_size.max(1) + 4;
        let response_pool: SamplePool<Response, ResponseHeader> = SamplePool::new(
            &self.state.named_concept_config,
            &data_segment_name,
            capacity,
            self.node.config().defaults.publish_subscribe.allocation_strategy,
        )
        .map_err(|_| ServerCreateError::InternalFailure)?;

        if let Some(details) = self.state.dynamic_config.as_request_response() {
            if !dynamic_config::try_increment(&details.server_count, pattern.max_servers) {
                return Err(ServerCreateError::ExceedsMaxSupportedServers);
            }
        }

        let inner = Arc::new(ServerInner {
            node: self.node,
            state: self.state.clone(),
            id,
            response_pool: Arc::new(response_pool),
            clients: Mutex::new(Vec::new()),
            message_number: AtomicU64::new(0),
            next_client: std::sync::atomic::AtomicUsize::new(0),
            enable_safe_overflow_for_responses: pattern.enable_safe_overflow_for_responses,
            response_buffer_size: pattern.max_response_buffer_size,
            unable_to_deliver_strategy: self
                .node
                .config()
                .defaults
                .request_response
                .server_unable_to_deliver_strategy,
        });

        request_response_registry::register_server(
            self.state.static_config.service_id.as_str(),
            Arc::downgrade(&inner) as std::sync::Weak<dyn ServerPeer>,
        );
        service_tag::write(
            &self.state.global,
            node_id,
            &self.state.static_config.service_id,
            PortKind::Server,
            id.value(),
        );

        zerospan_log::trace!(from "ServerBuilder::create", "server {} created", inner.id);

        Ok(Server(inner))
    }
}

struct ConnectedClient<Request, RequestHeader> {
    id: UniqueClientId,
    request_connection: Arc<Connection>,
    response_connection: Arc<Connection>,
    request_pool: Arc<SamplePool<Request, RequestHeader>>,
}

struct ServerInner<Request, Response, RequestHeader, ResponseHeader> {
    node: Node,
    state: Arc<ServiceState>,
    id: UniqueServerId,
    response_pool: Arc<SamplePool<Response, ResponseHeader>>,
    clients: Mutex<Vec<ConnectedClient<Request, RequestHeader>>>,
    message_number: AtomicU64,
    next_client: std::sync::atomic::AtomicUsize,
    enable_safe_overflow_for_responses: bool,
    response_buffer_size: usize,
    unable_to_deliver_strategy: UnableToDeliverStrategy,
}

impl<Request, Response, RequestHeader, ResponseHeader> ServerPeer
    for ServerInner<Request, Response, RequestHeader, ResponseHeader>
where
    Request: Send + Sync + 'static,
    Response: Send + Sync + 'static,
    RequestHeader: Send + Sync + 'static,
    ResponseHeader: Send + Sync + 'static,
{
    fn connect_client(
        &self,
        client_id: UniqueClientId,
        request_pool: Arc<dyn std::any::Any + Send + Sync>,
    ) -> (Arc<Connection>, Arc<Connection>, Arc<dyn std::any::Any + Send + Sync>) {
        let request_name = naming_scheme::connection_name(
            &self.state.global,
            &self.state.static_config.service_id,
            client_id.value(),
            self.id.value(),
        );
        let response_name = naming_scheme::connection_name(
            &self.state.global,
            &self.state.static_config.service_id,
            self.id.value(),
            client_id.value(),
        );

        let request_connection = connection_registry::get_or_create(
            &request_name,
            self.response_buffer_size.max(1),
            OverflowPolicy::RejectOnFull,
        );
        let response_policy = if self.enable_safe_overflow_for_responses {
            OverflowPolicy::SafeOverflow
        } else {
            OverflowPolicy::RejectOnFull
        };
        let response_connection =
            connection_registry::get_or_create(&response_name, self.response_buffer_size.max(1), response_policy);

        let request_pool = request_pool
            .downcast::<SamplePool<Request, RequestHeader>>()
            .expect("client and server request types matched by ServiceId");

        self.clients.lock().unwrap().push(ConnectedClient {
            id: client_id,
            request_connection: request_connection.clone(),
            response_connection: response_connection.clone(),
            request_pool,
        });

        (request_connection, response_connection, self.response_pool.clone())
    }

    fn disconnect_client(&self, client_id: UniqueClientId) {
        self.clients.lock().unwrap().retain(|client| client.id != client_id);
    }
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ServerInner<Request, Response, RequestHeader, ResponseHeader>
{
    fn push_with_strategy(&self, connection: &Connection, offset: PointerOffset) -> bool {
        match connection.try_push(offset) {
            Ok(overwritten) => {
                if let Some(overwritten) = overwritten {
                    let slot = unsafe { self.response_pool.slot(overwritten) };
                    if slot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                        self.response_pool.release(overwritten);
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
    for ServerInner<Request, Response, RequestHeader, ResponseHeader>
{
    fn drop(&mut self) {
        if let Some(details) = self.state.dynamic_config.as_request_response() {
            details.server_count.fetch_sub(1, Ordering::AcqRel);
        }
        service_tag::remove(
            &self.state.global,
            self.node.id(),
            &self.state.static_config.service_id,
            PortKind::Server,
            self.id.value(),
        );
        for client in self.clients.lock().unwrap().iter() {
            client.response_connection.mark_producer_disconnected();
            client.request_connection.mark_consumer_disconnected();
        }
    }
}

/// Handle to a created server port. Cheaply `Clone`-able.
pub struct Server<Request, Response, RequestHeader = (), ResponseHeader = ()>(
    Arc<ServerInner<Request, Response, RequestHeader, ResponseHeader>>,
);

impl<Request, Response, RequestHeader, ResponseHeader> Clone
    for Server<Request, Response, RequestHeader, ResponseHeader>
{
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Request, Response, RequestHeader, ResponseHeader>
    Server<Request, Response, RequestHeader, ResponseHeader>
{
    pub fn id(&self) -> UniqueServerId {
        self.0.id
    }

    pub fn node(&self) -> &Node {
        &self.0.node
    }

    pub fn has_requests(&self) -> bool {
        self.0
            .clients
            .lock()
            .unwrap()
            .iter()
            .any(|client| !client.request_connection.is_empty())
    }

    /// Pops the oldest pending request, round-robining across connected
    /// clients, and hands back an [`ActiveRequest`] bound to that client's
    /// response channel.
    pub fn receive(&self) -> Option<ActiveRequest<Request, Response, RequestHeader, ResponseHeader>> {
        let clients = self.0.clients.lock().unwrap();
        if clients.is_empty() {
            return None;
        }
        let start = self.0.next_client.load(Ordering::Relaxed) % clients.len();
        for offset in 0..clients.len() {
            let index = (start + offset) % clients.len();
            let client = &clients[index];
            if let Some(request_offset) = client.request_connection.try_pop() {
                self.0.next_client.store((index + 1) % clients.len(), Ordering::Relaxed);
                return Some(ActiveRequest {
                    server: self.0.clone(),
                    request: Sample::new(client.request_pool.clone(), request_offset),
                    response_connection: client.response_connection.clone(),
                });
            }
        }
        None
    }
}

/// A received request, bound to the one client's response channel it can be
/// answered on. Dropping this without sending any response is a valid
/// fire-and-forget completion.
pub struct ActiveRequest<Request, Response, RequestHeader, ResponseHeader> {
    server: Arc<ServerInner<Request, Response, RequestHeader, ResponseHeader>>,
    request: Sample<Request, RequestHeader>,
    response_connection: Arc<Connection>,
}

impl<Request, Response, RequestHeader, ResponseHeader>
    ActiveRequest<Request, Response, RequestHeader, ResponseHeader>
{
    pub fn payload(&self) -> &Request {
        self.request.payload()
    }

    pub fn loan_response_uninit(&self) -> Result<SampleMutUninit<Response, ResponseHeader>, ServerSendError> {
        let offset = self.server.response_pool.loan().map_err(|_| ServerSendError::UnableToDeliver)?;
        let message_number = self.server.message_number.fetch_add(1, Ordering::Relaxed);
        Ok(SampleMutUninit::new(
            self.server.response_pool.clone(),
            offset,
            self.server.id.value(),
            message_number,
        ))
    }

    pub fn send_copy(&self, value: Response) -> Result<(), ServerSendError>
    where
        Response: 'static,
    {
        let sample = self.loan_response_uninit()?.write_payload(value);
        self.send(sample)
    }

    /// Streams one response back on this request's response channel. May be
    /// called more than once for a streaming response sequence.
    pub fn send(&self, response: SampleMut<Response, ResponseHeader>) -> Result<(), ServerSendError> {
        let offset = response.offset();
        let pool = response.pool().clone();
        std::mem::forget(response);

        let slot = unsafe { pool.slot(offset) };
        slot.refcount.store(1, Ordering::Release);

        if self.server.push_with_strategy(&self.response_connection, offset) {
            Ok(())
        } else {
            if slot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                pool.release(offset);
            }
            Err(ServerSendError::UnableToDeliver)
        }
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
    fn server_receives_request_and_streams_two_responses() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new()
            .config(test_config(dir.path(), "reqres_stream"))
            .create()
            .unwrap();
        let name = ServiceName::new("divide").unwrap();
        let service = node.service_builder(&name).request_response::<u64, u64>().create().unwrap();

        let server = service.server_builder().create().unwrap();
        let client = service.client_builder().create().unwrap();

        let pending = client.send_copy(10).unwrap();
        let active = server.receive().unwrap();
        assert_eq!(*active.payload(), 10);

        active.send_copy(5).unwrap();
        active.send_copy(0).unwrap();

        let first = pending.receive().unwrap();
        let second = pending.receive().unwrap();
        assert_eq!((*first, *second), (5, 0));
    }
}
