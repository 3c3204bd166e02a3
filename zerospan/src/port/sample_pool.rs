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

//! A [`crate::sample::SampleSlot`]-shaped [`PoolAllocator`], owned by exactly
//! one publisher/client/server port and shared with every peer it fans out
//! to through `Arc`. This is the part of the system that is actually backed
//! by POSIX shared memory end to end (§4.1, §4.4 "zero-copy").

use std::marker::PhantomData;

use zerospan_cal::named_concept::NamedConceptConfiguration;
use zerospan_cal::shm_allocator::{AllocationStrategy, PointerOffset, PoolAllocationError, PoolAllocator};

use crate::sample::SampleSlot;

pub struct SamplePool<Payload, UserHeader> {
    allocator: PoolAllocator,
    _marker: PhantomData<(Payload, UserHeader)>,
}

impl<Payload, UserHeader> SamplePool<Payload, UserHeader> {
    pub fn new(
        config: &NamedConceptConfiguration,
        name: &str,
        initial_capacity: usize,
        strategy: AllocationStrategy,
    ) -> Result<Self, PoolAllocationError> {
        let bucket_size = std::mem::size_of::<SampleSlot<UserHeader, Payload>>();
        let allocator = PoolAllocator::new(
            config.clone(),
            name,
            bucket_size.max(1),
            initial_capacity.max(1),
            strategy,
        )?;
        Ok(Self {
            allocator,
            _marker: PhantomData,
        })
    }

    pub fn loan(&self) -> Result<PointerOffset, PoolAllocationError> {
        self.allocator.loan()
    }

    pub fn release(&self, offset: PointerOffset) {
        self.allocator.release(offset);
    }

    pub fn outstanding(&self) -> u64 {
        self.allocator.outstanding()
    }

    /// # Safety
    /// `offset` must currently be on loan from this pool.
    pub unsafe fn slot(&self, offset: PointerOffset) -> &SampleSlot<UserHeader, Payload> {
        let ptr = self
            .allocator
            .bucket_mut(offset, std::mem::size_of::<SampleSlot<UserHeader, Payload>>());
        &*(ptr as *const SampleSlot<UserHeader, Payload>)
    }

    /// # Safety
    /// Same contract as [`SamplePool::slot`], with exclusive access required.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, offset: PointerOffset) -> &mut SampleSlot<UserHeader, Payload> {
        let ptr = self
            .allocator
            .bucket_mut(offset, std::mem::size_of::<SampleSlot<UserHeader, Payload>>());
        &mut *(ptr as *mut SampleSlot<UserHeader, Payload>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NamedConceptConfiguration {
        NamedConceptConfiguration::default().prefix("zerospan_test_samplepool_")
    }

    #[test]
    fn loan_then_write_then_read_round_trips_a_payload() {
        let pool: SamplePool<u64, ()> = SamplePool::new(
            &cfg(),
            &format!("sp{}", std::process::id()),
            2,
            AllocationStrategy::Static,
        )
        .unwrap();
        let offset = pool.loan().unwrap();
        unsafe {
            pool.slot_mut(offset).payload.write(42u64);
        }
        let value = unsafe { *pool.slot(offset).payload.assume_init_ref() };
        assert_eq!(value, 42);
        pool.release(offset);
    }
}
