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

//! A lock-free single-producer/single-consumer ring buffer of
//! [`PointerOffset`] values, used as the connection between exactly one
//! producer port and one consumer port (publisher→subscriber,
//! server→client, notifier→listener wakeup bookkeeping). Fan-out/fan-in
//! across multiple peers is realized by holding one [`Connection`] per peer
//! pair rather than a single shared multi-producer queue — this keeps the
//! per-pair FIFO ordering guarantee in §5 trivial to uphold.
//!
//! `head ≤ tail`, `tail - head ≤ capacity` and slot visibility at index `i`
//! precedes publication of `tail = i+1` (release on push, acquire on pop).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::shm_allocator::PointerOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Overwrite the oldest unread slot instead of failing (`enable_safe_overflow`).
    SafeOverflow,
    /// Reject the push; the caller decides whether to block or discard.
    RejectOnFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionFull;

impl std::fmt::Display for ConnectionFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", stringify!(ConnectionFull))
    }
}
impl std::error::Error for ConnectionFull {}

/// One producer → one consumer bounded queue of [`PointerOffset`]s.
pub struct Connection {
    mask: usize,
    slots: Box<[UnsafeCell<PointerOffset>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    policy: OverflowPolicy,
    producer_connected: std::sync::atomic::AtomicBool,
    consumer_connected: std::sync::atomic::AtomicBool,
}

unsafe impl Send for Connection {}
unsafe impl Sync for Connection {}

const NULL_OFFSET: PointerOffset = PointerOffset {
    generation: 0,
    index: u64::MAX,
};

impl Connection {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.next_power_of_two().max(1);
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(NULL_OFFSET))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            mask: capacity - 1,
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            policy,
            producer_connected: std::sync::atomic::AtomicBool::new(true),
            consumer_connected: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn len(&self) -> usize {
        self.tail.load(Ordering::Acquire) - self.head.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publishes `value`. Under [`OverflowPolicy::SafeOverflow`] this never
    /// fails and returns the overwritten slot (the caller must release it
    /// back to its pool). Under [`OverflowPolicy::RejectOnFull`] it returns
    /// [`ConnectionFull`] when the queue is at capacity.
    pub fn try_push(&self, value: PointerOffset) -> Result<Option<PointerOffset>, ConnectionFull> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail - head >= self.capacity() {
            match self.policy {
                OverflowPolicy::RejectOnFull => return Err(ConnectionFull),
                OverflowPolicy::SafeOverflow => {
                    let overwritten = unsafe { *self.slots[head & self.mask].get() };
                    self.head.store(head + 1, Ordering::Release);
                    unsafe { *self.slots[tail & self.mask].get() = value };
                    self.tail.store(tail + 1, Ordering::Release);
                    return Ok(Some(overwritten));
                }
            }
        }

        unsafe { *self.slots[tail & self.mask].get() = value };
        self.tail.store(tail + 1, Ordering::Release);
        Ok(None)
    }

    /// Pops the oldest unread slot, or `None` if empty.
    pub fn try_pop(&self) -> Option<PointerOffset> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let value = unsafe { *self.slots[head & self.mask].get() };
        self.head.store(head + 1, Ordering::Release);
        Some(value)
    }

    /// Drains all remaining slots, invoking `f` with each — used during
    /// stale-participant reclamation to release in-flight samples (§4.5).
    pub fn drain(&self, mut f: impl FnMut(PointerOffset)) {
        while let Some(value) = self.try_pop() {
            f(value);
        }
    }

    pub fn mark_producer_disconnected(&self) {
        self.producer_connected.store(false, Ordering::Release);
    }

    pub fn mark_consumer_disconnected(&self) {
        self.consumer_connected.store(false, Ordering::Release);
    }

    pub fn is_producer_connected(&self) -> bool {
        self.producer_connected.load(Ordering::Acquire)
    }

    pub fn is_consumer_connected(&self) -> bool {
        self.consumer_connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offs(i: u64) -> PointerOffset {
        PointerOffset {
            generation: 0,
            index: i,
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let c = Connection::new(4, OverflowPolicy::RejectOnFull);
        c.try_push(offs(1)).unwrap();
        c.try_push(offs(2)).unwrap();
        assert_eq!(c.try_pop(), Some(offs(1)));
        assert_eq!(c.try_pop(), Some(offs(2)));
        assert_eq!(c.try_pop(), None);
    }

    #[test]
    fn reject_on_full_rejects_instead_of_overwriting() {
        let c = Connection::new(2, OverflowPolicy::RejectOnFull);
        c.try_push(offs(1)).unwrap();
        c.try_push(offs(2)).unwrap();
        assert_eq!(c.try_push(offs(3)), Err(ConnectionFull));
    }

    #[test]
    fn safe_overflow_overwrites_oldest_and_reports_it() {
        let c = Connection::new(2, OverflowPolicy::SafeOverflow);
        c.try_push(offs(1)).unwrap();
        c.try_push(offs(2)).unwrap();
        let overwritten = c.try_push(offs(3)).unwrap();
        assert_eq!(overwritten, Some(offs(1)));
        assert_eq!(c.try_pop(), Some(offs(2)));
        assert_eq!(c.try_pop(), Some(offs(3)));
    }

    #[test]
    fn head_never_exceeds_tail_invariant_holds_under_interleaving() {
        let c = Connection::new(8, OverflowPolicy::RejectOnFull);
        for i in 0..5 {
            c.try_push(offs(i)).unwrap();
        }
        for _ in 0..3 {
            c.try_pop().unwrap();
        }
        assert!(c.len() <= c.capacity());
    }
}
