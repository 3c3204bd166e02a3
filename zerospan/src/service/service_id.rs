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

//! Deterministic service fingerprint: a SHA-1 digest over the fully
//! qualified name, the messaging pattern discriminant and the payload/
//! header type identity, rendered as a hex string. Two services are the
//! same service iff their [`ServiceId`]s match (§3, §8).

use serde::{Deserialize, Serialize};

use crate::service::messaging_pattern::MessagingPattern;
use crate::service::service_name::ServiceName;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    /// `type_signature` is the payload/header identity parts folded into
    /// the fingerprint, e.g. `["u64"]` for a plain pub/sub payload or
    /// `["Command", "Status"]` for a request/response pair.
    pub fn new(name: &ServiceName, pattern: MessagingPattern, type_signature: &[&str]) -> Self {
        let mut parts = vec![name.as_str(), pattern.discriminant()];
        parts.extend_from_slice(type_signature);
        Self(zerospan_cal::hash::fingerprint(&parts))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstructs a `ServiceId` from a fingerprint parsed back out of a
    /// service tag file name, for [`crate::service::service_tag`].
    pub(crate) fn from_raw(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_pattern_and_types_produce_the_same_id() {
        let name = ServiceName::new("telemetry").unwrap();
        let a = ServiceId::new(&name, MessagingPattern::PublishSubscribe, &["u64"]);
        let b = ServiceId::new(&name, MessagingPattern::PublishSubscribe, &["u64"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_produce_different_ids() {
        let a = ServiceId::new(
            &ServiceName::new("a").unwrap(),
            MessagingPattern::PublishSubscribe,
            &["u64"],
        );
        let b = ServiceId::new(
            &ServiceName::new("b").unwrap(),
            MessagingPattern::PublishSubscribe,
            &["u64"],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn different_patterns_on_the_same_name_produce_different_ids() {
        let name = ServiceName::new("shared_name").unwrap();
        let a = ServiceId::new(&name, MessagingPattern::PublishSubscribe, &["u64"]);
        let b = ServiceId::new(&name, MessagingPattern::Event, &["u64"]);
        assert_ne!(a, b);
    }
}
