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

//! Waits on several ports at once (§4.8 "WaitSet"). Every `zerospan-cal`
//! primitive here is either a named semaphore or a lock-free ring buffer,
//! neither of which exposes a file descriptor to hand to `epoll`, so unlike
//! a reactor-backed wait-set this one polls each attachment's non-blocking
//! peek in a tight loop with a short sleep between rounds. `SIGINT`/`SIGTERM`
//! are checked every round so a pending wait can be cancelled (§4.8).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zerospan_cal::signal::FetchableSignal;

const POLL_INTERVAL: Duration = Duration::from_micros(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    TerminationRequest,
    Interrupt,
    Tick,
    Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitSetAttachmentError {
    InsufficientCapacity,
}

impl std::fmt::Display for WaitSetAttachmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for WaitSetAttachmentError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitSetCreateError {
    InternalError,
}

impl std::fmt::Display for WaitSetCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for WaitSetCreateError {}

/// Identifies which attachment triggered a wait call, returned to the
/// caller's callback. Stable for the attachment's lifetime, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentId(usize);

/// Anything a [`WaitSet`] can poll: a non-blocking, non-destructive check
/// for whether it has something ready. Implemented for
/// [`crate::port::listener::Listener`], [`crate::port::subscriber::Subscriber`],
/// [`crate::port::server::Server`] and [`crate::port::client::PendingResponse`].
pub trait Attachable: Send + Sync {
    fn has_pending(&self) -> bool;
}

impl Attachable for crate::port::listener::Listener {
    fn has_pending(&self) -> bool {
        self.has_events()
    }
}

impl<Payload, UserHeader> Attachable for crate::port::subscriber::Subscriber<Payload, UserHeader>
where
    Payload: Send + Sync,
    UserHeader: Send + Sync,
{
    fn has_pending(&self) -> bool {
        self.has_samples()
    }
}

impl<Request, Response, RequestHeader, ResponseHeader> Attachable
    for crate::port::server::Server<Request, Response, RequestHeader, ResponseHeader>
where
    Request: Send + Sync,
    Response: Send + Sync,
    RequestHeader: Send + Sync,
    ResponseHeader: Send + Sync,
{
    fn has_pending(&self) -> bool {
        self.has_requests()
    }
}

impl<Response, ResponseHeader> Attachable for crate::port::client::PendingResponse<Response, ResponseHeader>
where
    Response: Send + Sync,
    ResponseHeader: Send + Sync,
{
    fn has_pending(&self) -> bool {
        self.has_responses()
    }
}

/// A tick source that fires once per `period`, independent of any port;
/// attach one to build a deadline-monitoring loop out of a `WaitSet`.
struct IntervalAttachment {
    period: Duration,
    next: Mutex<Instant>,
}

impl Attachable for IntervalAttachment {
    fn has_pending(&self) -> bool {
        let mut next = self.next.lock().unwrap();
        if Instant::now() < *next {
            return false;
        }
        *next += self.period;
        true
    }
}

#[derive(Default)]
pub struct WaitSetBuilder {
    capacity: usize,
}

impl WaitSetBuilder {
    pub fn new() -> Self {
        Self { capacity: 32 }
    }

    pub fn capacity(mut self, value: usize) -> Self {
        self.capacity = value.max(1);
        self
    }

    pub fn create(self) -> Result<WaitSet, WaitSetCreateError> {
        Ok(WaitSet(Arc::new(WaitSetState {
            capacity: self.capacity.max(1),
            next_id: AtomicUsize::new(0),
            attachments: Mutex::new(Vec::new()),
        })))
    }
}

struct WaitSetState {
    capacity: usize,
    next_id: AtomicUsize,
    attachments: Mutex<Vec<(AttachmentId, Arc<dyn Attachable>)>>,
}

/// Polls a set of attached ports in round-robin order, invoking a callback
/// for each one found to have something pending.
#[derive(Clone)]
pub struct WaitSet(Arc<WaitSetState>);

/// Detaches its attachment when dropped.
pub struct Guard<'waitset> {
    waitset: &'waitset WaitSetState,
    id: AttachmentId,
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.waitset.attachments.lock().unwrap().retain(|(id, _)| *id != self.id);
    }
}

impl WaitSet {
    fn attach_dyn(&self, attachment: Arc<dyn Attachable>) -> Result<Guard<'_>, WaitSetAttachmentError> {
        let mut attachments = self.0.attachments.lock().unwrap();
        if attachments.len() >= self.0.capacity {
            return Err(WaitSetAttachmentError::InsufficientCapacity);
        }
        let id = AttachmentId(self.0.next_id.fetch_add(1, Ordering::Relaxed));
        attachments.push((id, attachment));
        Ok(Guard { waitset: &self.0, id })
    }

    /// Attaches a port. The returned [`Guard`] detaches it when dropped.
    pub fn attach<T: Attachable + 'static>(&self, attachment: Arc<T>) -> Result<Guard<'_>, WaitSetAttachmentError> {
        self.attach_dyn(attachment as Arc<dyn Attachable>)
    }

    /// Attaches a periodic tick source, useful for driving deadline checks
    /// (§4.4 "deadline miss") alongside port readiness in the same wait loop.
    pub fn attach_interval(&self, period: Duration) -> Result<Guard<'_>, WaitSetAttachmentError> {
        self.attach_dyn(Arc::new(IntervalAttachment {
            period,
            next: Mutex::new(Instant::now() + period),
        }))
    }

    fn poll_once(&self, mut fn_call: impl FnMut(AttachmentId)) -> WaitEvent {
        if let Some(signal) = zerospan_cal::signal::last_signal() {
            return match signal {
                FetchableSignal::TerminationRequest => WaitEvent::TerminationRequest,
                FetchableSignal::Interrupt => WaitEvent::Interrupt,
            };
        }

        let attachments = self.0.attachments.lock().unwrap();
        let mut triggered = 0;
        for (id, attachment) in attachments.iter() {
            if attachment.has_pending() {
                fn_call(*id);
                triggered += 1;
            }
        }
        if triggered > 0 {
            WaitEvent::Notification
        } else {
            WaitEvent::Tick
        }
    }

    /// Returns immediately after one polling round.
    pub fn try_wait(&self, fn_call: impl FnMut(AttachmentId)) -> WaitEvent {
        self.poll_once(fn_call)
    }

    /// Polls until something is observed or `timeout` elapses.
    pub fn timed_wait(&self, mut fn_call: impl FnMut(AttachmentId), timeout: Duration) -> WaitEvent {
        let deadline = Instant::now() + timeout;
        loop {
            let event = self.poll_once(&mut fn_call);
            if event != WaitEvent::Tick || Instant::now() >= deadline {
                return event;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Polls until something is observed. Never returns `Tick`.
    pub fn blocking_wait(&self, mut fn_call: impl FnMut(AttachmentId)) -> WaitEvent {
        loop {
            let event = self.poll_once(&mut fn_call);
            if event != WaitEvent::Tick {
                return event;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    pub fn len(&self) -> usize {
        self.0.attachments.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::node::NodeBuilder;
    use crate::service::service_name::ServiceName;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.global.root_path = dir.to_path_buf();
        config.global.prefix = format!("test_{}_waitset", std::process::id());
        config
    }

    #[test]
    fn attaching_beyond_capacity_is_rejected() {
        let waitset = WaitSetBuilder::new().capacity(1).create().unwrap();
        let _first = waitset.attach_interval(Duration::from_secs(1)).unwrap();
        assert_eq!(
            waitset.attach_interval(Duration::from_secs(1)).unwrap_err(),
            WaitSetAttachmentError::InsufficientCapacity
        );
    }

    #[test]
    fn dropping_a_guard_frees_its_slot() {
        let waitset = WaitSetBuilder::new().capacity(1).create().unwrap();
        let guard = waitset.attach_interval(Duration::from_secs(1)).unwrap();
        drop(guard);
        assert!(waitset.attach_interval(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn try_wait_reports_notification_once_a_listener_fires() {
        let dir = tempfile::tempdir().unwrap();
        let node = NodeBuilder::new().config(test_config(dir.path())).create().unwrap();
        let name = ServiceName::new("waitset_event").unwrap();
        let service = node.service_builder(&name).event().create().unwrap();
        let notifier = service.notifier_builder().create().unwrap();
        let listener = Arc::new(service.listener_builder().create().unwrap());

        let waitset = WaitSetBuilder::new().create().unwrap();
        let _guard = waitset.attach(listener.clone()).unwrap();

        assert_eq!(waitset.try_wait(|_| {}), WaitEvent::Tick);

        notifier.notify_with_custom_event_id(crate::port::event_id::EventId::new(1)).unwrap();
        let mut fired = Vec::new();
        assert_eq!(waitset.try_wait(|id| fired.push(id)), WaitEvent::Notification);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn interval_attachment_fires_after_its_period_elapses() {
        let waitset = WaitSetBuilder::new().create().unwrap();
        let _guard = waitset.attach_interval(Duration::from_millis(5)).unwrap();
        assert_eq!(
            waitset.timed_wait(|_| {}, Duration::from_millis(200)),
            WaitEvent::Notification
        );
    }
}
