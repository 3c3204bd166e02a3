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

//! A fixed-bucket-size pool allocator over a [`SharedMemory`] segment. The
//! free list is a lock-free Treiber stack: each bucket's first 8 bytes
//! double as the "next free bucket" link, with a 32-bit generation tag
//! packed into the high bits of the stack head to avoid ABA (§4.2, §8 "64-bit
//! indices to make ABA impossible").

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::named_concept::NamedConceptConfiguration;
use crate::shared_memory::SharedMemory;

/// Growth strategy for a pool that has exceeded its static capacity (§4.1, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationStrategy {
    BestFit,
    PowerOfTwo,
    #[default]
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAllocationError {
    OutOfMemory,
    ExceedsMaxLoanSize,
}

impl std::fmt::Display for PoolAllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for PoolAllocationError {}

const NIL: u64 = u64::MAX;

/// One fixed-bucket-size generation of the pool.
struct Segment {
    shm: SharedMemory,
    bucket_size: usize,
    bucket_count: usize,
    free_head: AtomicU64,
}

impl Segment {
    fn new(
        config: &NamedConceptConfiguration,
        name: &str,
        bucket_size: usize,
        bucket_count: usize,
    ) -> Result<Self, PoolAllocationError> {
        let shm = SharedMemory::create(config, name, bucket_size * bucket_count)
            .map_err(|_| PoolAllocationError::OutOfMemory)?;

        // initialize the intrusive free list: bucket i links to bucket i+1
        for i in 0..bucket_count {
            let next = if i + 1 == bucket_count {
                NIL
            } else {
                (i + 1) as u64
            };
            unsafe {
                shm.payload_slice_mut(i * bucket_size, 8)
                    .copy_from_slice(&next.to_ne_bytes());
            }
        }

        Ok(Self {
            shm,
            bucket_size,
            bucket_count,
            free_head: AtomicU64::new(Self::pack(0, 0)),
        })
    }

    fn pack(index: u64, tag: u32) -> u64 {
        (index & 0xFFFF_FFFF) | ((tag as u64) << 32)
    }
    fn unpack(value: u64) -> (u64, u32) {
        (value & 0xFFFF_FFFF, (value >> 32) as u32)
    }

    fn next_of(&self, index: u64) -> u64 {
        let bytes = unsafe { self.shm.payload_slice(index as usize * self.bucket_size, 8) };
        u64::from_ne_bytes(bytes.try_into().unwrap())
    }

    fn set_next_of(&self, index: u64, next: u64) {
        unsafe {
            self.shm
                .payload_slice_mut(index as usize * self.bucket_size, 8)
                .copy_from_slice(&next.to_ne_bytes());
        }
    }

    /// Pops a free bucket index, or `None` if the segment is exhausted.
    fn loan(&self) -> Option<u64> {
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            let (index, tag) = Self::unpack(head);
            if index == NIL {
                return None;
            }
            let next = self.next_of(index);
            let new_head = Self::pack(next, tag.wrapping_add(1));
            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(index);
            }
        }
    }

    /// Pushes `index` back onto the free list.
    fn release(&self, index: u64) {
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            let (head_index, tag) = Self::unpack(head);
            self.set_next_of(index, head_index);
            let new_head = Self::pack(index, tag.wrapping_add(1));
            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    fn bucket_offset(&self, index: u64) -> usize {
        index as usize * self.bucket_size
    }
}

/// A bucket loaned from the pool: a byte offset into its owning segment's
/// generation, paired with the generation number so the holder can find the
/// right segment again (§9 "Growable shared memory").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerOffset {
    pub generation: u32,
    pub index: u64,
}

/// Fixed-or-growable pool of same-sized payload buckets (C4). `Static`
/// strategy never grows; `BestFit`/`PowerOfTwo` add a new, larger
/// generation when a loan cannot be satisfied and keep prior generations
/// mapped as long as any of their buckets are still on loan.
pub struct PoolAllocator {
    config: NamedConceptConfiguration,
    base_name: String,
    bucket_size: usize,
    strategy: AllocationStrategy,
    outstanding: AtomicU64,
    generations: std::sync::Mutex<Vec<Segment>>,
}

impl PoolAllocator {
    pub fn new(
        config: NamedConceptConfiguration,
        base_name: &str,
        bucket_size: usize,
        initial_bucket_count: usize,
        strategy: AllocationStrategy,
    ) -> Result<Self, PoolAllocationError> {
        let first = Segment::new(&config, &format!("{base_name}_g0"), bucket_size, initial_bucket_count)?;
        Ok(Self {
            config,
            base_name: base_name.to_string(),
            bucket_size,
            strategy,
            outstanding: AtomicU64::new(0),
            generations: std::sync::Mutex::new(vec![first]),
        })
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Loans one bucket, growing the pool per [`AllocationStrategy`] if the
    /// newest generation is exhausted.
    pub fn loan(&self) -> Result<PointerOffset, PoolAllocationError> {
        let mut generations = self.generations.lock().unwrap();
        let latest = generations.len() as u32 - 1;
        if let Some(index) = generations[latest as usize].loan() {
            self.outstanding.fetch_add(1, Ordering::Relaxed);
            return Ok(PointerOffset {
                generation: latest,
                index,
            });
        }

        if self.strategy == AllocationStrategy::Static {
            return Err(PoolAllocationError::OutOfMemory);
        }

        let old_count = generations[latest as usize].bucket_count;
        let new_count = match self.strategy {
            AllocationStrategy::PowerOfTwo => (old_count * 2).next_power_of_two(),
            AllocationStrategy::BestFit => old_count + old_count / 2 + 1,
            AllocationStrategy::Static => unreachable!(),
        };
        let next_generation = Segment::new(
            &self.config,
            &format!("{}_g{}", self.base_name, latest + 1),
            self.bucket_size,
            new_count,
        )?;
        generations.push(next_generation);
        let new_latest = generations.len() as u32 - 1;
        let index = generations[new_latest as usize]
            .loan()
            .expect("freshly created generation has free capacity");
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(PointerOffset {
            generation: new_latest,
            index,
        })
    }

    pub fn release(&self, offset: PointerOffset) {
        let generations = self.generations.lock().unwrap();
        generations[offset.generation as usize].release(offset.index);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    /// # Safety
    /// `offset` must be currently on loan (not released) from this pool.
    pub unsafe fn bucket_mut(&self, offset: PointerOffset, len: usize) -> *mut u8 {
        let generations = self.generations.lock().unwrap();
        let segment = &generations[offset.generation as usize];
        let byte_offset = segment.bucket_offset(offset.index);
        segment.shm.payload_slice_mut(byte_offset, len).as_mut_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NamedConceptConfiguration {
        NamedConceptConfiguration::default().prefix("zerospan_test_pool_")
    }

    #[test]
    fn loan_and_release_round_trips_through_free_list() {
        let pool = PoolAllocator::new(
            cfg(),
            &format!("rt{}", std::process::id()),
            64,
            4,
            AllocationStrategy::Static,
        )
        .unwrap();
        let a = pool.loan().unwrap();
        let b = pool.loan().unwrap();
        assert_ne!(a.index, b.index);
        pool.release(a);
        let c = pool.loan().unwrap();
        assert_eq!(c.index, a.index);
    }

    #[test]
    fn static_strategy_fails_when_exhausted() {
        let pool = PoolAllocator::new(
            cfg(),
            &format!("static_full{}", std::process::id()),
            32,
            1,
            AllocationStrategy::Static,
        )
        .unwrap();
        pool.loan().unwrap();
        assert_eq!(pool.loan().unwrap_err(), PoolAllocationError::OutOfMemory);
    }

    #[test]
    fn power_of_two_strategy_grows_instead_of_failing() {
        let pool = PoolAllocator::new(
            cfg(),
            &format!("grow{}", std::process::id()),
            32,
            1,
            AllocationStrategy::PowerOfTwo,
        )
        .unwrap();
        let first = pool.loan().unwrap();
        let second = pool.loan().unwrap();
        assert_ne!(first.generation, second.generation);
    }
}
