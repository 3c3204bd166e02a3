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

//! Wakeup primitive for listeners: a shared-memory bitset of pending
//! [`TriggerId`]s plus a named POSIX semaphore used purely as a doorbell.
//! `notify` sets a bit then posts the semaphore; `try_wait`/`timed_wait`
//! block on the semaphore and drain whichever bits are set, so a listener
//! woken once always observes every trigger raised up to that point (§4.3).

use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::named_concept::NamedConceptConfiguration;
use crate::shared_memory::SharedMemory;

/// Identifies one wakeup source attached to a listener (port readiness,
/// user-defined event, deadline miss, ...).
pub type TriggerId = u32;

pub const MAX_TRIGGER_ID: TriggerId = 255;
const WORDS: usize = (MAX_TRIGGER_ID as usize + 1).div_ceil(64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCreateError {
    AlreadyExists,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for EventCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for EventCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOpenError {
    DoesNotExist,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for EventOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for EventOpenError {}

struct Semaphore {
    name: CString,
    handle: *mut libc::sem_t,
    has_ownership: bool,
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    fn create(name: &str) -> Result<Self, EventCreateError> {
        let c_name = CString::new(name).unwrap();
        let handle = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600u32,
                0u32,
            )
        };
        if handle == libc::SEM_FAILED {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(match errno {
                libc::EEXIST => EventCreateError::AlreadyExists,
                libc::EACCES => EventCreateError::InsufficientPermissions,
                _ => EventCreateError::InternalError,
            });
        }
        Ok(Self {
            name: c_name,
            handle,
            has_ownership: true,
        })
    }

    fn open(name: &str) -> Result<Self, EventOpenError> {
        let c_name = CString::new(name).unwrap();
        let handle = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if handle == libc::SEM_FAILED {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(match errno {
                libc::ENOENT => EventOpenError::DoesNotExist,
                libc::EACCES => EventOpenError::InsufficientPermissions,
                _ => EventOpenError::InternalError,
            });
        }
        Ok(Self {
            name: c_name,
            handle,
            has_ownership: false,
        })
    }

    fn post(&self) {
        unsafe {
            libc::sem_post(self.handle);
        }
    }

    fn wait(&self) {
        unsafe {
            while libc::sem_wait(self.handle) != 0 {
                if std::io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
                    break;
                }
            }
        }
    }

    fn timed_wait(&self, timeout: Duration) -> bool {
        let deadline = unsafe {
            let mut ts: libc::timespec = std::mem::zeroed();
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
            ts.tv_sec += timeout.as_secs() as libc::time_t;
            ts.tv_nsec += timeout.subsec_nanos() as i64;
            if ts.tv_nsec >= 1_000_000_000 {
                ts.tv_sec += 1;
                ts.tv_nsec -= 1_000_000_000;
            }
            ts
        };
        loop {
            let result = unsafe { libc::sem_timedwait(self.handle, &deadline) };
            if result == 0 {
                return true;
            }
            let errno = std::io::Error::last_os_error().raw_os_error();
            if errno == Some(libc::EINTR) {
                continue;
            }
            return false;
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.handle);
            if self.has_ownership {
                libc::sem_unlink(self.name.as_ptr());
            }
        }
    }
}

/// Shared-memory bitset plus doorbell semaphore. Created by whichever side
/// (notifier or listener) constructs the port first.
pub struct EventChannel {
    shm: SharedMemory,
    semaphore: Semaphore,
}

impl EventChannel {
    fn bits(&self) -> &[AtomicU64; WORDS] {
        unsafe { &*(self.shm.payload_slice(0, WORDS * 8).as_ptr() as *const [AtomicU64; WORDS]) }
    }

    pub fn create(config: &NamedConceptConfiguration, name: &str) -> Result<Self, EventCreateError> {
        let shm = SharedMemory::create(config, name, WORDS * 8)
            .map_err(|_| EventCreateError::AlreadyExists)?;
        let semaphore = Semaphore::create(&config.shm_name_for(&format!("{name}_sem")))?;
        Ok(Self { shm, semaphore })
    }

    pub fn open(config: &NamedConceptConfiguration, name: &str) -> Result<Self, EventOpenError> {
        let shm = SharedMemory::open(config, name, Duration::from_secs(1))
            .map_err(|_| EventOpenError::DoesNotExist)?;
        let semaphore = Semaphore::open(&config.shm_name_for(&format!("{name}_sem")))?;
        Ok(Self { shm, semaphore })
    }

    /// Sets `id`'s bit and wakes exactly one blocked listener.
    pub fn notify(&self, id: TriggerId) {
        assert!(id <= MAX_TRIGGER_ID, "trigger id out of range");
        let (word, bit) = (id as usize / 64, id as usize % 64);
        self.bits()[word].fetch_or(1u64 << bit, Ordering::AcqRel);
        self.semaphore.post();
    }

    /// Non-destructively checks whether any trigger id is currently set,
    /// for a [`crate::signal`]-style poll that does not want to consume
    /// what it observes (used by a wait-set's `try_wait`).
    pub fn has_pending(&self) -> bool {
        self.bits().iter().any(|word| word.load(Ordering::Acquire) != 0)
    }

    /// Drains and returns every currently-set trigger id without blocking.
    pub fn drain(&self) -> Vec<TriggerId> {
        let mut out = Vec::new();
        for (word_index, word) in self.bits().iter().enumerate() {
            let value = word.swap(0, Ordering::AcqRel);
            if value == 0 {
                continue;
            }
            for bit in 0..64 {
                if value & (1 << bit) != 0 {
                    out.push((word_index * 64 + bit) as TriggerId);
                }
            }
        }
        out
    }

    /// Blocks until at least one trigger has fired, then returns all pending ones.
    pub fn wait(&self) -> Vec<TriggerId> {
        self.semaphore.wait();
        self.drain()
    }

    /// Like [`EventChannel::wait`] but gives up after `timeout`, returning an
    /// empty `Vec` on expiry.
    pub fn timed_wait(&self, timeout: Duration) -> Vec<TriggerId> {
        if self.semaphore.timed_wait(timeout) {
            self.drain()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NamedConceptConfiguration {
        NamedConceptConfiguration::default().prefix("zerospan_test_event_")
    }

    #[test]
    fn notify_then_drain_observes_trigger_id() {
        let name = format!("ev{}", std::process::id());
        let channel = EventChannel::create(&cfg(), &name).unwrap();
        channel.notify(3);
        channel.notify(17);
        let mut fired = channel.drain();
        fired.sort();
        assert_eq!(fired, vec![3, 17]);
    }

    #[test]
    fn drain_without_notify_is_empty() {
        let name = format!("ev_empty{}", std::process::id());
        let channel = EventChannel::create(&cfg(), &name).unwrap();
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn timed_wait_expires_when_nothing_fires() {
        let name = format!("ev_timeout{}", std::process::id());
        let channel = EventChannel::create(&cfg(), &name).unwrap();
        let fired = channel.timed_wait(Duration::from_millis(20));
        assert!(fired.is_empty());
    }

    #[test]
    fn open_shares_the_same_bitset_as_the_creator() {
        let name = format!("ev_shared{}", std::process::id());
        let cfg = cfg();
        let creator = EventChannel::create(&cfg, &name).unwrap();
        let opener = EventChannel::open(&cfg, &name).unwrap();
        creator.notify(5);
        assert_eq!(opener.drain(), vec![5]);
    }
}
