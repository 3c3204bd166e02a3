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

//! Named POSIX shared-memory segments (`shm_open`/`mmap`). The first creator
//! writes a header `{ version: u32, initialized: AtomicU32, generation: AtomicU32, size: u64 }`;
//! late openers spin-poll `initialized` with a bounded timeout.
//!
//! `allocate_in` is a bump allocator over the remainder of the segment —
//! there is no free(), the whole segment is dropped together when the last
//! owner unmaps it (§4.1).

use std::ffi::CString;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::named_concept::NamedConceptConfiguration;

pub const WIRE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedMemoryCreateError {
    AlreadyExists,
    SizeIsZero,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for SharedMemoryCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for SharedMemoryCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedMemoryOpenError {
    DoesNotExist,
    InsufficientPermissions,
    ServiceInCorruptedState,
    VersionMismatch,
    InternalError,
}

impl std::fmt::Display for SharedMemoryOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for SharedMemoryOpenError {}

#[repr(C)]
struct Header {
    version: u32,
    initialized: AtomicU32,
    generation: AtomicU32,
    size: u64,
}

/// A mapped, named shared-memory segment. `payload_start()` points past the
/// [`Header`]; `allocate_in` bump-allocates from there.
#[derive(Debug)]
pub struct SharedMemory {
    name: String,
    fd: i32,
    base: *mut u8,
    total_size: usize,
    has_ownership: bool,
    bump_offset: AtomicU32,
}

unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn payload_start(&self) -> usize {
        std::mem::size_of::<Header>()
    }

    pub fn create(
        config: &NamedConceptConfiguration,
        name: &str,
        size: usize,
    ) -> Result<Self, SharedMemoryCreateError> {
        if size == 0 {
            return Err(SharedMemoryCreateError::SizeIsZero);
        }
        let shm_name = config.shm_name_for(name);
        let total_size = std::mem::size_of::<Header>() + size;
        let c_name = CString::new(shm_name.clone()).unwrap();

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(match errno {
                libc::EEXIST => SharedMemoryCreateError::AlreadyExists,
                libc::EACCES => SharedMemoryCreateError::InsufficientPermissions,
                _ => SharedMemoryCreateError::InternalError,
            });
        }

        if unsafe { libc::ftruncate(fd, total_size as libc::off_t) } != 0 {
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(SharedMemoryCreateError::InternalError);
        }

        let base = Self::map(fd, total_size)?;
        unsafe {
            let header = base as *mut Header;
            (*header).version = WIRE_FORMAT_VERSION;
            (*header).generation = AtomicU32::new(0);
            (*header).size = total_size as u64;
            (*header).initialized = AtomicU32::new(1);
        }

        Ok(Self {
            name: shm_name,
            fd,
            base,
            total_size,
            has_ownership: true,
            bump_offset: AtomicU32::new(0),
        })
    }

    pub fn open(
        config: &NamedConceptConfiguration,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, SharedMemoryOpenError> {
        let shm_name = config.shm_name_for(name);
        let c_name = CString::new(shm_name.clone()).unwrap();

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(match errno {
                libc::ENOENT => SharedMemoryOpenError::DoesNotExist,
                libc::EACCES => SharedMemoryOpenError::InsufficientPermissions,
                _ => SharedMemoryOpenError::InternalError,
            });
        }

        let total_size = std::mem::size_of::<Header>();
        let header_map = Self::map(fd, total_size).map_err(|_| SharedMemoryOpenError::InternalError)?;

        let deadline = Instant::now() + timeout;
        loop {
            let initialized =
                unsafe { &*(header_map as *const Header) }.initialized.load(Ordering::Acquire);
            if initialized != 0 {
                break;
            }
            if Instant::now() >= deadline {
                unsafe { libc::munmap(header_map as *mut libc::c_void, total_size) };
                unsafe { libc::close(fd) };
                return Err(SharedMemoryOpenError::ServiceInCorruptedState);
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let full_size = unsafe { &*(header_map as *const Header) }.size as usize;
        unsafe { libc::munmap(header_map as *mut libc::c_void, total_size) };

        let base = Self::map(fd, full_size).map_err(|_| SharedMemoryOpenError::InternalError)?;
        let version = unsafe { &*(base as *const Header) }.version;
        if version != WIRE_FORMAT_VERSION {
            unsafe { libc::munmap(base as *mut libc::c_void, full_size) };
            unsafe { libc::close(fd) };
            return Err(SharedMemoryOpenError::VersionMismatch);
        }

        let bump_used = full_size - std::mem::size_of::<Header>();
        Ok(Self {
            name: shm_name,
            fd,
            base,
            total_size: full_size,
            has_ownership: false,
            bump_offset: AtomicU32::new(bump_used as u32),
        })
    }

    fn map(fd: i32, size: usize) -> Result<*mut u8, ()> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            Err(())
        } else {
            Ok(ptr as *mut u8)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.total_size - self.payload_start()
    }

    pub fn generation(&self) -> u32 {
        self.header().generation.load(Ordering::Acquire)
    }

    /// Bump-allocate `layout.size()` bytes with `layout.align()`, returning
    /// the byte offset from `payload_start()`. No deallocation (§4.1).
    pub fn allocate_in(&self, layout: std::alloc::Layout) -> Result<usize, ()> {
        loop {
            let current = self.bump_offset.load(Ordering::Relaxed) as usize;
            let aligned = current.div_ceil(layout.align()) * layout.align();
            let next = aligned + layout.size();
            if next > self.size() {
                return Err(());
            }
            if self
                .bump_offset
                .compare_exchange_weak(
                    current as u32,
                    next as u32,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return Ok(aligned);
            }
        }
    }

    /// # Safety
    /// `offset` must have come from [`SharedMemory::allocate_in`] on this segment and `len` must
    /// not exceed what was allocated there.
    pub unsafe fn payload_slice(&self, offset: usize, len: usize) -> &[u8] {
        let start = self.base.add(self.payload_start() + offset);
        std::slice::from_raw_parts(start, len)
    }

    /// # Safety
    /// Same contract as [`SharedMemory::payload_slice`], with exclusive access required of the
    /// caller.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn payload_slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        let start = self.base.add(self.payload_start() + offset);
        std::slice::from_raw_parts_mut(start, len)
    }

    pub fn has_ownership(&self) -> bool {
        self.has_ownership
    }

    pub fn acquire_ownership(&mut self) {
        self.has_ownership = true;
    }

    pub fn release_ownership(&mut self) {
        self.has_ownership = false;
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.total_size);
            libc::close(self.fd);
            if self.has_ownership {
                if let Ok(c_name) = CString::new(self.name.clone()) {
                    libc::shm_unlink(c_name.as_ptr());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NamedConceptConfiguration {
        NamedConceptConfiguration::default().prefix("zerospan_test_shm_")
    }

    #[test]
    fn create_then_open_succeeds_and_shares_bytes() {
        let name = format!("t{}", std::process::id());
        let cfg = cfg();
        let shm = SharedMemory::create(&cfg, &name, 4096).unwrap();
        let offset = shm
            .allocate_in(std::alloc::Layout::new::<u64>())
            .unwrap();
        unsafe {
            shm.payload_slice_mut(offset, 8).copy_from_slice(&42u64.to_ne_bytes());
        }

        let opened = SharedMemory::open(&cfg, &name, Duration::from_millis(100)).unwrap();
        let bytes = unsafe { opened.payload_slice(offset, 8) };
        assert_eq!(u64::from_ne_bytes(bytes.try_into().unwrap()), 42);
    }

    #[test]
    fn create_twice_fails_with_already_exists() {
        let name = format!("dup{}", std::process::id());
        let cfg = cfg();
        let _first = SharedMemory::create(&cfg, &name, 1024).unwrap();
        let err = SharedMemory::create(&cfg, &name, 1024).unwrap_err();
        assert_eq!(err, SharedMemoryCreateError::AlreadyExists);
    }

    #[test]
    fn open_missing_segment_fails_with_does_not_exist() {
        let cfg = cfg();
        let err = SharedMemory::open(&cfg, "never_created", Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, SharedMemoryOpenError::DoesNotExist);
    }

    #[test]
    fn bump_allocation_past_capacity_fails() {
        let name = format!("full{}", std::process::id());
        let cfg = cfg();
        let shm = SharedMemory::create(&cfg, &name, 16).unwrap();
        assert!(shm.allocate_in(std::alloc::Layout::new::<[u8; 8]>()).is_ok());
        assert!(shm.allocate_in(std::alloc::Layout::new::<[u8; 32]>()).is_err());
    }
}
