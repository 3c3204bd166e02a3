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

//! Liveness tracking for participants (nodes, ports): a zero-length file
//! holding an exclusive, non-blocking `flock` for as long as the owning
//! process is alive. The kernel releases the lock automatically on process
//! exit or crash, so a third party can always tell the difference between
//! "still running", "crashed without cleanup" and "never existed" without
//! relying on the owner cooperating (§4.5 "stale resource reclamation").

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use crate::named_concept::NamedConceptConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Alive,
    Dead,
    DoesNotExist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorCreateError {
    AlreadyExists,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for MonitorCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for MonitorCreateError {}

/// Holds the lock on a liveness file for as long as it lives. Dropping it
/// releases the lock but leaves the (now stale) file in place for
/// [`state_of`] to report as [`State::Dead`] until someone reclaims it.
pub struct LivenessToken {
    _file: File,
    path: PathBuf,
}

impl LivenessToken {
    pub fn create(
        config: &NamedConceptConfiguration,
        name: &str,
    ) -> Result<Self, MonitorCreateError> {
        let path = config.path_for(name);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|_| MonitorCreateError::InternalError)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => MonitorCreateError::InsufficientPermissions,
                _ => MonitorCreateError::InternalError,
            })?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            return Err(MonitorCreateError::AlreadyExists);
        }

        Ok(Self { _file: file, path })
    }

    pub fn reclaim(self) -> std::io::Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path)
    }
}

/// Probes whether the liveness token named `name` is currently held,
/// abandoned, or was never created, without taking ownership of it.
pub fn state_of(config: &NamedConceptConfiguration, name: &str) -> State {
    let path = config.path_for(name);
    let file = match OpenOptions::new().read(true).write(true).open(&path) {
        Ok(file) => file,
        Err(_) => return State::DoesNotExist,
    };

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        // we just took the lock ourselves; release it immediately, the
        // owner clearly isn't holding it anymore.
        unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        State::Dead
    } else {
        State::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NamedConceptConfiguration {
        let dir = tempfile::tempdir().unwrap().into_path();
        NamedConceptConfiguration::default().path_hint(&dir)
    }

    #[test]
    fn token_reports_alive_while_held() {
        let cfg = cfg();
        let token = LivenessToken::create(&cfg, "node_a").unwrap();
        assert_eq!(state_of(&cfg, "node_a"), State::Alive);
        drop(token);
    }

    #[test]
    fn state_is_dead_after_token_is_dropped() {
        let cfg = cfg();
        let token = LivenessToken::create(&cfg, "node_b").unwrap();
        drop(token);
        assert_eq!(state_of(&cfg, "node_b"), State::Dead);
    }

    #[test]
    fn state_is_does_not_exist_for_unknown_name() {
        let cfg = cfg();
        assert_eq!(state_of(&cfg, "never_created"), State::DoesNotExist);
    }

    #[test]
    fn creating_twice_for_the_same_name_fails_while_first_is_alive() {
        let cfg = cfg();
        let _first = LivenessToken::create(&cfg, "node_c").unwrap();
        assert_eq!(
            LivenessToken::create(&cfg, "node_c").unwrap_err(),
            MonitorCreateError::AlreadyExists
        );
    }

    #[test]
    fn reclaim_removes_the_backing_file() {
        let cfg = cfg();
        let token = LivenessToken::create(&cfg, "node_d").unwrap();
        token.reclaim().unwrap();
        assert_eq!(state_of(&cfg, "node_d"), State::DoesNotExist);
    }
}
