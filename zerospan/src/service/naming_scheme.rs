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

//! Derives every persistent resource name for a service from its
//! [`ServiceId`] and the configured suffixes (§6 "persistent filesystem
//! layout"), and builds the [`NamedConceptConfiguration`] each
//! `zerospan-cal` primitive is opened/created under.

use crate::config::Global;
use crate::service::service_id::ServiceId;
use zerospan_cal::named_concept::NamedConceptConfiguration;

pub fn named_concept_config(global: &Global) -> NamedConceptConfiguration {
    NamedConceptConfiguration::default()
        .prefix(&format!("{}_", global.prefix))
        .path_hint(&global.services_path())
}

/// Same shape as [`named_concept_config`], rooted under the node directory
/// instead of the service directory, shared by [`crate::node`] and
/// [`crate::monitor`].
pub fn node_named_concept_config(global: &Global) -> NamedConceptConfiguration {
    NamedConceptConfiguration::default()
        .prefix(&format!("{}_", global.prefix))
        .path_hint(&global.nodes_path())
}

pub fn static_config_name(global: &Global, id: &ServiceId) -> String {
    format!("{}{}", id.as_str(), global.static_config_suffix)
}

pub fn dynamic_config_name(global: &Global, id: &ServiceId) -> String {
    format!("{}{}", id.as_str(), global.dynamic_config_suffix)
}

pub fn data_segment_name(_global: &Global, id: &ServiceId, port_id: u128) -> String {
    format!("{}_{:x}", id.as_str(), port_id)
}

pub fn connection_name(global: &Global, id: &ServiceId, producer_port_id: u128, consumer_port_id: u128) -> String {
    format!(
        "{}_{:x}_{:x}{}",
        id.as_str(),
        producer_port_id,
        consumer_port_id,
        global.connection_suffix
    )
}

pub fn event_connection_name(
    global: &Global,
    id: &ServiceId,
    notifier_port_id: u128,
    listener_port_id: u128,
) -> String {
    format!(
        "{}_{:x}_{:x}{}",
        id.as_str(),
        notifier_port_id,
        listener_port_id,
        global.event_connection_suffix
    )
}

pub fn node_monitor_name(global: &Global, node_id: u128) -> String {
    format!("{:x}{}", node_id, global.node_monitor_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::service_name::ServiceName;
    use crate::service::messaging_pattern::MessagingPattern;

    #[test]
    fn static_and_dynamic_config_names_differ_only_by_suffix() {
        let global = Global::default();
        let id = ServiceId::new(
            &ServiceName::new("svc").unwrap(),
            MessagingPattern::PublishSubscribe,
            &["u64"],
        );
        let static_name = static_config_name(&global, &id);
        let dynamic_name = dynamic_config_name(&global, &id);
        assert_ne!(static_name, dynamic_name);
        assert!(static_name.starts_with(id.as_str()));
    }

    #[test]
    fn connection_name_differs_per_peer_pair() {
        let global = Global::default();
        let id = ServiceId::new(
            &ServiceName::new("svc").unwrap(),
            MessagingPattern::PublishSubscribe,
            &["u64"],
        );
        let a = connection_name(&global, &id, 1, 2);
        let b = connection_name(&global, &id, 1, 3);
        assert_ne!(a, b);
    }
}
