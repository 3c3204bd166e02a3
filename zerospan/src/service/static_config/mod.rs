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

//! Immutable, persisted per-service metadata: messaging pattern, type
//! identity, capacity bounds, and attributes. Written once at service
//! creation (§4.6); every later `open` validates against it.

pub mod event;
pub mod publish_subscribe;
pub mod request_response;

use serde::{Deserialize, Serialize};

use crate::service::attribute::AttributeSet;
use crate::service::messaging_pattern::MessagingPattern;
use crate::service::service_id::ServiceId;
use crate::service::service_name::ServiceName;

pub use event::EventStaticConfig;
pub use publish_subscribe::PublishSubscribeStaticConfig;
pub use request_response::RequestResponseStaticConfig;

/// Logical type identity: name plus size and alignment. Two types match
/// iff all three are equal (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDetail {
    pub name: String,
    pub size: usize,
    pub alignment: usize,
}

impl TypeDetail {
    pub fn of<T>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: std::mem::size_of::<T>(),
            alignment: std::mem::align_of::<T>(),
        }
    }

    /// Canonical logical name for the primitive types the spec calls out
    /// by name (§4.6); anything else must supply its own.
    pub fn canonical_name<T: 'static>() -> Option<&'static str> {
        use std::any::TypeId;
        let id = TypeId::of::<T>();
        macro_rules! check {
            ($($ty:ty => $name:literal),* $(,)?) => {
                $(if id == TypeId::of::<$ty>() { return Some($name); })*
            };
        }
        check!(
            u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64", u128 => "u128",
            i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", i128 => "i128",
            f32 => "f32", f64 => "f64", bool => "bool",
        );
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagingPatternStaticConfig {
    PublishSubscribe(PublishSubscribeStaticConfig),
    Event(EventStaticConfig),
    RequestResponse(RequestResponseStaticConfig),
}

impl MessagingPatternStaticConfig {
    pub fn pattern(&self) -> MessagingPattern {
        match self {
            MessagingPatternStaticConfig::PublishSubscribe(_) => MessagingPattern::PublishSubscribe,
            MessagingPatternStaticConfig::Event(_) => MessagingPattern::Event,
            MessagingPatternStaticConfig::RequestResponse(_) => MessagingPattern::RequestResponse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub service_id: ServiceId,
    pub service_name: ServiceName,
    pub max_nodes: usize,
    pub attributes: AttributeSet,
    pub messaging_pattern: MessagingPatternStaticConfig,
}

impl StaticConfig {
    pub fn new(
        service_name: ServiceName,
        max_nodes: usize,
        attributes: AttributeSet,
        messaging_pattern: MessagingPatternStaticConfig,
        type_signature: &[&str],
    ) -> Self {
        let max_nodes = max_nodes.max(1);
        let service_id = ServiceId::new(&service_name, messaging_pattern.pattern(), type_signature);
        Self {
            service_id,
            service_name,
            max_nodes,
            attributes,
            messaging_pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_nodes_of_zero_is_adjusted_up_to_one() {
        let config = StaticConfig::new(
            ServiceName::new("s").unwrap(),
            0,
            AttributeSet::new(),
            MessagingPatternStaticConfig::Event(EventStaticConfig {
                max_notifiers: 1,
                max_listeners: 1,
                event_id_max_value: 8,
                deadline: None,
                notifier_created_event: None,
                notifier_dropped_event: None,
                notifier_dead_event: None,
            }),
            &[],
        );
        assert_eq!(config.max_nodes, 1);
    }

    #[test]
    fn canonical_name_recognizes_primitive_types() {
        assert_eq!(TypeDetail::canonical_name::<u64>(), Some("u64"));
        assert_eq!(TypeDetail::canonical_name::<f32>(), Some("f32"));
    }

    #[test]
    fn static_config_round_trips_through_toml() {
        let config = StaticConfig::new(
            ServiceName::new("telemetry").unwrap(),
            4,
            AttributeSet::new(),
            MessagingPatternStaticConfig::PublishSubscribe(PublishSubscribeStaticConfig {
                payload_type: TypeDetail::of::<u64>("u64"),
                user_header_type: None,
                max_publishers: 1,
                max_subscribers: 4,
                history_size: 0,
                subscriber_max_buffer_size: 4,
                subscriber_max_borrowed_samples: 4,
                enable_safe_overflow: true,
                deadline: None,
            }),
            &["u64"],
        );
        let encoded = toml::to_string(&config).unwrap();
        let decoded: StaticConfig = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }
}
