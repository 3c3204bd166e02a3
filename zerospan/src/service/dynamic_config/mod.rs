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

//! Mutable service registry, readable by every process that has opened the
//! service: live port counts per kind, updated by the owning port on
//! creation and drop. Backed by a single [`zerospan_cal::DynamicStorage`]
//! region so every opener observes the same counters without copying.
//!
//! Unlike the upstream project this does not additionally track a
//! per-node port membership table; reclaiming a dead participant's ports
//! (§4.5) is done by scanning the node directory directly (see
//! [`crate::monitor`]) rather than by consulting a list embedded here.

pub mod event;
pub mod publish_subscribe;
pub mod request_response;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use event::EventDynamicDetails;
pub use publish_subscribe::PublishSubscribeDynamicDetails;
pub use request_response::RequestResponseDynamicDetails;

use zerospan_cal::named_concept::NamedConceptConfiguration;
use zerospan_cal::DynamicStorage;

pub enum DynamicConfig {
    PublishSubscribe(DynamicStorage<PublishSubscribeDynamicDetails>),
    Event(DynamicStorage<EventDynamicDetails>),
    RequestResponse(DynamicStorage<RequestResponseDynamicDetails>),
}

impl DynamicConfig {
    pub fn create_publish_subscribe(
        config: &NamedConceptConfiguration,
        name: &str,
    ) -> Result<Self, zerospan_cal::dynamic_storage::DynamicStorageCreateError> {
        Ok(Self::PublishSubscribe(DynamicStorage::create(
            config,
            name,
            PublishSubscribeDynamicDetails::default(),
        )?))
    }

    pub fn create_event(
        config: &NamedConceptConfiguration,
        name: &str,
    ) -> Result<Self, zerospan_cal::dynamic_storage::DynamicStorageCreateError> {
        Ok(Self::Event(DynamicStorage::create(
            config,
            name,
            EventDynamicDetails::default(),
        )?))
    }

    pub fn create_request_response(
        config: &NamedConceptConfiguration,
        name: &str,
    ) -> Result<Self, zerospan_cal::dynamic_storage::DynamicStorageCreateError> {
        Ok(Self::RequestResponse(DynamicStorage::create(
            config,
            name,
            RequestResponseDynamicDetails::default(),
        )?))
    }

    pub fn open(
        config: &NamedConceptConfiguration,
        name: &str,
        pattern: crate::service::messaging_pattern::MessagingPattern,
        timeout: Duration,
    ) -> Result<Self, zerospan_cal::dynamic_storage::DynamicStorageOpenError> {
        use crate::service::messaging_pattern::MessagingPattern::*;
        Ok(match pattern {
            PublishSubscribe => Self::PublishSubscribe(DynamicStorage::open(config, name, timeout)?),
            Event => Self::Event(DynamicStorage::open(config, name, timeout)?),
            RequestResponse => Self::RequestResponse(DynamicStorage::open(config, name, timeout)?),
        })
    }

    pub fn as_publish_subscribe(&self) -> Option<&PublishSubscribeDynamicDetails> {
        match self {
            Self::PublishSubscribe(storage) => Some(storage.get()),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventDynamicDetails> {
        match self {
            Self::Event(storage) => Some(storage.get()),
            _ => None,
        }
    }

    pub fn as_request_response(&self) -> Option<&RequestResponseDynamicDetails> {
        match self {
            Self::RequestResponse(storage) => Some(storage.get()),
            _ => None,
        }
    }
}

/// Atomically increments `counter` unless it is already at `max`, enforcing
/// `count(live ports of kind K) <= max_K` (§4.7) without the race a plain
/// load-then-`fetch_add` would have between two concurrent creators.
pub(crate) fn try_increment(counter: &AtomicUsize, max: usize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            if current >= max {
                None
            } else {
                Some(current + 1)
            }
        })
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn cfg() -> NamedConceptConfiguration {
        NamedConceptConfiguration::default().prefix("zerospan_test_dyncfg_")
    }

    #[test]
    fn publisher_count_starts_at_zero_and_is_shared_across_openers() {
        let name = format!("pubsub{}", std::process::id());
        let cfg = cfg();
        let creator = DynamicConfig::create_publish_subscribe(&cfg, &name).unwrap();
        let details = creator.as_publish_subscribe().unwrap();
        assert_eq!(details.publisher_count(), 0);

        details.publisher_count.fetch_add(1, Ordering::AcqRel);

        let opener = DynamicConfig::open(
            &cfg,
            &name,
            crate::service::messaging_pattern::MessagingPattern::PublishSubscribe,
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(opener.as_publish_subscribe().unwrap().publisher_count(), 1);
    }

    #[test]
    fn try_increment_refuses_once_the_counter_reaches_max() {
        let counter = AtomicUsize::new(0);
        assert!(try_increment(&counter, 2));
        assert!(try_increment(&counter, 2));
        assert!(!try_increment(&counter, 2));
        assert_eq!(counter.load(Ordering::Acquire), 2);
    }
}
