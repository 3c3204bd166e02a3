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

//! Process-wide registry of named [`Connection`]s, keyed by the name
//! [`crate::service::naming_scheme::connection_name`] derives for a
//! producer/consumer pair. [`zerospan_cal::zero_copy_connection::Connection`]
//! itself is a plain heap structure rather than something mapped onto a
//! named shared-memory segment, so this registry is what lets two port
//! handles created independently (in this process) end up sharing the same
//! queue under the same name, mirroring how a named shared-memory mapping
//! would behave across processes.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::sync::Arc;

use zerospan_cal::zero_copy_connection::{Connection, OverflowPolicy};

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<Connection>>>> = OnceLock::new();

pub fn get_or_create(name: &str, capacity: usize, policy: OverflowPolicy) -> Arc<Connection> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap();
    map.entry(name.to_string())
        .or_insert_with(|| Arc::new(Connection::new(capacity, policy)))
        .clone()
}

pub fn remove(name: &str) {
    if let Some(registry) = REGISTRY.get() {
        registry.lock().unwrap().remove(name);
    }
}

/// Looks up a connection without creating one, for [`crate::monitor::reclaim`]
/// signaling a dead port's still-named peer connection.
pub fn get(name: &str) -> Option<Arc<Connection>> {
    REGISTRY.get()?.lock().unwrap().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_lookups_of_the_same_name_share_one_connection() {
        let name = format!("conn_reg_{}", std::process::id());
        let a = get_or_create(&name, 4, OverflowPolicy::RejectOnFull);
        let b = get_or_create(&name, 4, OverflowPolicy::RejectOnFull);
        assert!(Arc::ptr_eq(&a, &b));
        remove(&name);
    }

    #[test]
    fn get_finds_an_existing_connection_without_creating_one() {
        let name = format!("conn_reg_get_{}", std::process::id());
        assert!(get(&name).is_none());
        let created = get_or_create(&name, 4, OverflowPolicy::RejectOnFull);
        assert!(Arc::ptr_eq(&get(&name).unwrap(), &created));
        remove(&name);
    }
}
