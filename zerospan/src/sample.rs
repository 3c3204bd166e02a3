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

//! Fixed-layout shared-memory sample slots: `[system header | refcount |
//! user header | payload]` (§3 "sample slot"). A slot is loaned from a
//! [`crate::port::sample_pool::SamplePool`], optionally filled in through
//! [`SampleMutUninit`]/[`SampleMut`] by a publisher, and observed through
//! [`Sample`] by every subscriber it was fanned out to; it returns to the
//! pool only once the last reader has dropped its handle (§4.4 "refcount ==
//! 0 iff slot is in the free pool").

use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use zerospan_cal::shm_allocator::PointerOffset;

use crate::port::sample_pool::SamplePool;

/// Carried in every slot regardless of payload type.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SystemHeader {
    pub origin_port_id: u128,
    pub message_number: u64,
    pub element_count: u32,
}

/// The full in-memory layout of one slot. `refcount` starts at zero while
/// the publisher still holds the loan and is bumped to the fan-out count
/// right before `send` enqueues the slot's offset on each subscriber's
/// connection.
#[repr(C)]
pub struct SampleSlot<UserHeader, Payload> {
    pub system_header: SystemHeader,
    pub refcount: AtomicUsize,
    pub user_header: MaybeUninit<UserHeader>,
    pub payload: MaybeUninit<Payload>,
}

/// A slot loaned from the pool but not yet populated.
pub struct SampleMutUninit<Payload, UserHeader = ()> {
    pub(crate) pool: Arc<SamplePool<Payload, UserHeader>>,
    pub(crate) offset: PointerOffset,
    pub(crate) origin_port_id: u128,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> SampleMutUninit<Payload, UserHeader> {
    pub(crate) fn new(
        pool: Arc<SamplePool<Payload, UserHeader>>,
        offset: PointerOffset,
        origin_port_id: u128,
        message_number: u64,
    ) -> Self {
        let slot = unsafe { pool.slot_mut(offset) };
        slot.system_header = SystemHeader {
            origin_port_id,
            message_number,
            element_count: 1,
        };
        slot.refcount = AtomicUsize::new(0);
        Self {
            pool,
            offset,
            origin_port_id,
            _marker: PhantomData,
        }
    }

    pub fn user_header_mut(&mut self) -> &mut MaybeUninit<UserHeader> {
        &mut unsafe { self.pool.slot_mut(self.offset) }.user_header
    }

    pub fn write_payload(self, value: Payload) -> SampleMut<Payload, UserHeader> {
        let slot = unsafe { self.pool.slot_mut(self.offset) };
        slot.payload.write(value);
        let sample = SampleMut {
            pool: self.pool.clone(),
            offset: self.offset,
            origin_port_id: self.origin_port_id,
            _marker: PhantomData,
        };
        std::mem::forget(self);
        sample
    }

    /// # Safety
    /// The caller must have fully initialized the payload through
    /// [`SampleMutUninit::payload_mut`] before this is called.
    pub unsafe fn assume_init(self) -> SampleMut<Payload, UserHeader> {
        let sample = SampleMut {
            pool: self.pool.clone(),
            offset: self.offset,
            origin_port_id: self.origin_port_id,
            _marker: PhantomData,
        };
        std::mem::forget(self);
        sample
    }

    pub fn payload_mut(&mut self) -> &mut MaybeUninit<Payload> {
        &mut unsafe { self.pool.slot_mut(self.offset) }.payload
    }
}

impl<Payload, UserHeader> Drop for SampleMutUninit<Payload, UserHeader> {
    fn drop(&mut self) {
        self.pool.release(self.offset);
    }
}

/// A slot loaned and fully populated, ready to be handed to `send`.
pub struct SampleMut<Payload, UserHeader = ()> {
    pub(crate) pool: Arc<SamplePool<Payload, UserHeader>>,
    pub(crate) offset: PointerOffset,
    pub(crate) origin_port_id: u128,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> SampleMut<Payload, UserHeader> {
    pub fn payload(&self) -> &Payload {
        unsafe { self.pool.slot(self.offset).payload.assume_init_ref() }
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        unsafe { self.pool.slot_mut(self.offset).payload.assume_init_mut() }
    }

    pub fn user_header(&self) -> &MaybeUninit<UserHeader> {
        &unsafe { self.pool.slot(self.offset) }.user_header
    }

    pub(crate) fn into_offset(self) -> PointerOffset {
        let offset = self.offset;
        std::mem::forget(self);
        offset
    }

    pub(crate) fn offset(&self) -> PointerOffset {
        self.offset
    }

    pub(crate) fn pool(&self) -> &Arc<SamplePool<Payload, UserHeader>> {
        &self.pool
    }
}

impl<Payload, UserHeader> Drop for SampleMut<Payload, UserHeader> {
    fn drop(&mut self) {
        self.pool.release(self.offset);
    }
}

/// A received, borrowed reference to a slot. Dropping it decrements the
/// slot's refcount; the slot returns to its pool once the refcount reaches
/// zero (§4.4).
pub struct Sample<Payload, UserHeader = ()> {
    pub(crate) pool: Arc<SamplePool<Payload, UserHeader>>,
    pub(crate) offset: PointerOffset,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> Sample<Payload, UserHeader> {
    pub(crate) fn new(pool: Arc<SamplePool<Payload, UserHeader>>, offset: PointerOffset) -> Self {
        Self {
            pool,
            offset,
            _marker: PhantomData,
        }
    }

    pub fn payload(&self) -> &Payload {
        unsafe { self.pool.slot(self.offset).payload.assume_init_ref() }
    }

    pub fn user_header(&self) -> &MaybeUninit<UserHeader> {
        &unsafe { self.pool.slot(self.offset) }.user_header
    }

    pub fn origin_port_id(&self) -> u128 {
        unsafe { self.pool.slot(self.offset) }.system_header.origin_port_id
    }

    pub fn message_number(&self) -> u64 {
        unsafe { self.pool.slot(self.offset) }.system_header.message_number
    }
}

impl<Payload, UserHeader> std::ops::Deref for Sample<Payload, UserHeader> {
    type Target = Payload;

    fn deref(&self) -> &Self::Target {
        self.payload()
    }
}

impl<Payload, UserHeader> Drop for Sample<Payload, UserHeader> {
    fn drop(&mut self) {
        let slot = unsafe { self.pool.slot(self.offset) };
        if slot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.pool.release(self.offset);
        }
    }
}
