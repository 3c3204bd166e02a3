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

//! Communication abstraction layer: the POSIX-backed primitives every
//! service messaging pattern is built from — named shared memory, a pool
//! allocator over it, single-producer/single-consumer connections, an
//! event doorbell, dynamic and static storage for service configuration,
//! liveness monitoring and name fingerprinting.
//!
//! Everything here is a concrete Linux/POSIX implementation rather than a
//! trait generic over backend: one platform is in scope, so the extra
//! indirection buys nothing.

pub mod dynamic_storage;
pub mod event;
pub mod hash;
pub mod monitoring;
pub mod named_concept;
pub mod shared_memory;
pub mod shm_allocator;
pub mod signal;
pub mod static_storage;
pub mod zero_copy_connection;

pub use dynamic_storage::DynamicStorage;
pub use event::{EventChannel, TriggerId};
pub use named_concept::{NamedConcept, NamedConceptConfiguration};
pub use shared_memory::SharedMemory;
pub use shm_allocator::{AllocationStrategy, PointerOffset, PoolAllocator};
pub use zero_copy_connection::{Connection, OverflowPolicy};
