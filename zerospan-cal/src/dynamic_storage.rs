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

//! Shared-memory storage for one value of type `T`, used to publish a
//! service's dynamic configuration (connected-port counts, liveness
//! generation) to every process that opens the service by name. Readiness
//! piggy-backs on [`SharedMemory`]'s own `initialized` handshake: by the
//! time `open` returns, `T` has already been written by the creator. `T` is
//! typically a `#[repr(C)]` struct of atomics so that every opener can read
//! and update counters through a shared `&T` without further locking.

use std::marker::PhantomData;
use std::time::Duration;

use crate::named_concept::NamedConceptConfiguration;
use crate::shared_memory::{SharedMemory, SharedMemoryCreateError, SharedMemoryOpenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicStorageCreateError {
    AlreadyExists,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for DynamicStorageCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for DynamicStorageCreateError {}

impl From<SharedMemoryCreateError> for DynamicStorageCreateError {
    fn from(value: SharedMemoryCreateError) -> Self {
        match value {
            SharedMemoryCreateError::AlreadyExists => Self::AlreadyExists,
            SharedMemoryCreateError::InsufficientPermissions => Self::InsufficientPermissions,
            _ => Self::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicStorageOpenError {
    DoesNotExist,
    InitializationNotYetComplete,
    InternalError,
}

impl std::fmt::Display for DynamicStorageOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for DynamicStorageOpenError {}

impl From<SharedMemoryOpenError> for DynamicStorageOpenError {
    fn from(value: SharedMemoryOpenError) -> Self {
        match value {
            SharedMemoryOpenError::DoesNotExist => Self::DoesNotExist,
            SharedMemoryOpenError::ServiceInCorruptedState => Self::InitializationNotYetComplete,
            _ => Self::InternalError,
        }
    }
}

/// A single `T` published under a name, visible to every process that opens it.
pub struct DynamicStorage<T> {
    shm: SharedMemory,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for DynamicStorage<T> {}
unsafe impl<T: Sync> Sync for DynamicStorage<T> {}

impl<T> DynamicStorage<T> {
    pub fn create(
        config: &NamedConceptConfiguration,
        name: &str,
        initial_value: T,
    ) -> Result<Self, DynamicStorageCreateError> {
        let shm = SharedMemory::create(config, name, std::mem::size_of::<T>())?;
        unsafe {
            let slice = shm.payload_slice_mut(0, std::mem::size_of::<T>());
            std::ptr::write(slice.as_mut_ptr() as *mut T, initial_value);
        }
        Ok(Self {
            shm,
            _marker: PhantomData,
        })
    }

    pub fn open(
        config: &NamedConceptConfiguration,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, DynamicStorageOpenError> {
        let shm = SharedMemory::open(config, name, timeout)?;
        Ok(Self {
            shm,
            _marker: PhantomData,
        })
    }

    pub fn get(&self) -> &T {
        unsafe { &*(self.shm.payload_slice(0, std::mem::size_of::<T>()).as_ptr() as *const T) }
    }

    /// # Safety
    /// The caller must ensure no other thread or process observes a
    /// partially-written `T` through a concurrent [`DynamicStorage::get`].
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        &mut *(self
            .shm
            .payload_slice_mut(0, std::mem::size_of::<T>())
            .as_mut_ptr() as *mut T)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NamedConceptConfiguration {
        NamedConceptConfiguration::default().prefix("zerospan_test_dynstor_")
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Counters {
        publishers: u32,
        subscribers: u32,
    }

    #[test]
    fn create_then_open_observes_initial_value() {
        let name = format!("dyn{}", std::process::id());
        let cfg = cfg();
        let _creator = DynamicStorage::create(
            &cfg,
            &name,
            Counters {
                publishers: 1,
                subscribers: 0,
            },
        )
        .unwrap();

        let opener: DynamicStorage<Counters> =
            DynamicStorage::open(&cfg, &name, Duration::from_millis(100)).unwrap();
        assert_eq!(
            *opener.get(),
            Counters {
                publishers: 1,
                subscribers: 0
            }
        );
    }

    #[test]
    fn mutation_through_creator_is_visible_to_opener() {
        let name = format!("dyn_mut{}", std::process::id());
        let cfg = cfg();
        let creator = DynamicStorage::create(
            &cfg,
            &name,
            Counters {
                publishers: 0,
                subscribers: 0,
            },
        )
        .unwrap();
        let opener: DynamicStorage<Counters> =
            DynamicStorage::open(&cfg, &name, Duration::from_millis(100)).unwrap();

        unsafe { creator.get_mut().subscribers += 1 };
        assert_eq!(opener.get().subscribers, 1);
    }

    #[test]
    fn open_missing_storage_fails() {
        let cfg = cfg();
        let err: DynamicStorageOpenError =
            DynamicStorage::<u32>::open(&cfg, "never_created", Duration::from_millis(10))
                .unwrap_err();
        assert_eq!(err, DynamicStorageOpenError::DoesNotExist);
    }
}
