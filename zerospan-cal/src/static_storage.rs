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

//! File-based storage for a service's static configuration: the immutable,
//! TOML-encoded record written once by whichever process creates the
//! service first and read by everybody who later opens it by name. The
//! creator lock is `O_EXCL` on the file itself, not `flock` — once the
//! content is written the file is complete and read-only for the rest of
//! its life (§4.6 "static config never changes after creation").

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;

use serde::{de::DeserializeOwned, Serialize};

use crate::named_concept::NamedConceptConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticStorageCreateError {
    AlreadyExists,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for StaticStorageCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for StaticStorageCreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticStorageOpenError {
    DoesNotExist,
    Corrupted,
    InsufficientPermissions,
    InternalError,
}

impl std::fmt::Display for StaticStorageOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for StaticStorageOpenError {}

/// Writes `value` as TOML to a freshly created file at `name`. Fails if the
/// file already exists — static configuration is create-once.
pub fn create<T: Serialize>(
    config: &NamedConceptConfiguration,
    name: &str,
    value: &T,
) -> Result<(), StaticStorageCreateError> {
    let path = config.path_for(name);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|_| StaticStorageCreateError::InternalError)?;
    }

    let content = toml::to_string_pretty(value).map_err(|_| StaticStorageCreateError::InternalError)?;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => StaticStorageCreateError::AlreadyExists,
            std::io::ErrorKind::PermissionDenied => StaticStorageCreateError::InsufficientPermissions,
            _ => StaticStorageCreateError::InternalError,
        })?;

    file.write_all(content.as_bytes())
        .map_err(|_| StaticStorageCreateError::InternalError)?;
    file.sync_all().map_err(|_| StaticStorageCreateError::InternalError)
}

/// Reads and parses a previously [`create`]d file.
pub fn open<T: DeserializeOwned>(
    config: &NamedConceptConfiguration,
    name: &str,
) -> Result<T, StaticStorageOpenError> {
    let path = config.path_for(name);
    let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StaticStorageOpenError::DoesNotExist,
        std::io::ErrorKind::PermissionDenied => StaticStorageOpenError::InsufficientPermissions,
        _ => StaticStorageOpenError::InternalError,
    })?;
    toml::from_str(&content).map_err(|_| StaticStorageOpenError::Corrupted)
}

/// Removes a static storage file. Used when the last owning port/node
/// reclaims a service whose creator has died (§4.5).
pub fn remove(config: &NamedConceptConfiguration, name: &str) -> std::io::Result<()> {
    fs::remove_file(config.path_for(name))
}

pub fn exists(config: &NamedConceptConfiguration, name: &str) -> bool {
    config.path_for(name).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct ServiceRecord {
        name: String,
        max_publishers: usize,
    }

    fn cfg() -> NamedConceptConfiguration {
        let dir = tempfile::tempdir().unwrap().into_path();
        NamedConceptConfiguration::default().path_hint(&dir)
    }

    #[test]
    fn create_then_open_round_trips() {
        let cfg = cfg();
        let record = ServiceRecord {
            name: "telemetry".to_string(),
            max_publishers: 4,
        };
        create(&cfg, "svc_a", &record).unwrap();
        let reopened: ServiceRecord = open(&cfg, "svc_a").unwrap();
        assert_eq!(reopened, record);
    }

    #[test]
    fn create_twice_fails_with_already_exists() {
        let cfg = cfg();
        let record = ServiceRecord {
            name: "x".to_string(),
            max_publishers: 1,
        };
        create(&cfg, "svc_dup", &record).unwrap();
        assert_eq!(
            create(&cfg, "svc_dup", &record).unwrap_err(),
            StaticStorageCreateError::AlreadyExists
        );
    }

    #[test]
    fn open_missing_fails_with_does_not_exist() {
        let cfg = cfg();
        let err = open::<ServiceRecord>(&cfg, "never_existed").unwrap_err();
        assert_eq!(err, StaticStorageOpenError::DoesNotExist);
    }

    #[test]
    fn remove_deletes_the_backing_file() {
        let cfg = cfg();
        let record = ServiceRecord {
            name: "y".to_string(),
            max_publishers: 1,
        };
        create(&cfg, "svc_rm", &record).unwrap();
        assert!(exists(&cfg, "svc_rm"));
        remove(&cfg, "svc_rm").unwrap();
        assert!(!exists(&cfg, "svc_rm"));
    }
}
