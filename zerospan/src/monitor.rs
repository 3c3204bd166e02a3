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

//! Dead-participant detection (§4.5 "stale resource reclamation"). A node
//! never gets a chance to run its own cleanup when the owning process is
//! killed, so every other process that cares scans the node directory,
//! classifies each entry by whether its liveness token is still held, and
//! may reclaim the ones that are not.

use std::fs;
use std::sync::atomic::Ordering;

use zerospan_support::CallbackProgression;

use crate::config::{Config, Global};
use crate::node::{NodeDetails, NodeId};
use crate::port::{connection_registry, request_response_registry};
use crate::service::dynamic_config::DynamicConfig;
use crate::service::naming_scheme;
use crate::service::service_tag::{self, PortKind, Tag};
use crate::service::static_config::{MessagingPatternStaticConfig, StaticConfig};

/// Classification of one node directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantState {
    /// The liveness token is held by a running process.
    Alive,
    /// The liveness token exists but nothing holds its lock anymore; its
    /// resources are reclaimable.
    Dead,
    /// The static config file exists but the liveness token is missing or
    /// could not be read.
    Inaccessible,
    /// The static config file could not be parsed; the node directory entry
    /// outlived a format it no longer matches.
    Undefined,
}

fn node_ids(global: &Global) -> std::io::Result<Vec<NodeId>> {
    let dir = global.nodes_path();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let prefix = format!("{}_", global.prefix);
    let suffix = &global.node_static_config_suffix;
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Some(id_str) = rest.strip_suffix(suffix.as_str()) else {
            continue;
        };
        if let Ok(value) = id_str.parse::<u128>() {
            ids.push(NodeId::from_raw_value(value));
        }
    }
    Ok(ids)
}

/// Visits every node that has ever registered itself in `config`'s domain,
/// calling `callback` with its id, liveness classification and, when
/// readable, the details it was created with. Stops early if `callback`
/// returns [`CallbackProgression::Stop`].
pub fn list(
    config: &Config,
    mut callback: impl FnMut(NodeId, ParticipantState, Option<NodeDetails>) -> CallbackProgression,
) -> std::io::Result<()> {
    let named_concept_config = naming_scheme::node_named_concept_config(&config.global);

    for id in node_ids(&config.global)? {
        let details_name = format!("{}{}", id.value(), config.global.node_static_config_suffix);
        let details = zerospan_cal::static_storage::open::<NodeDetails>(&named_concept_config, &details_name).ok();

        let monitor_name = naming_scheme::node_monitor_name(&config.global, id.value());
        let state = match zerospan_cal::monitoring::state_of(&named_concept_config, &monitor_name) {
            zerospan_cal::monitoring::State::Alive => ParticipantState::Alive,
            zerospan_cal::monitoring::State::Dead => ParticipantState::Dead,
            zerospan_cal::monitoring::State::DoesNotExist if details.is_some() => ParticipantState::Inaccessible,
            zerospan_cal::monitoring::State::DoesNotExist => ParticipantState::Undefined,
        };

        if callback(id, state, details) == CallbackProgression::Stop {
            break;
        }
    }
    Ok(())
}

/// Removes the static config and liveness token of a [`ParticipantState::Dead`]
/// or [`ParticipantState::Inaccessible`] node, after reclaiming every port it
/// left a [`service_tag`] behind for (§4.5 steps 1-2): the per-kind port
/// count of each port's service is decremented, a dead notifier raises its
/// service's `notifier_dead_event`, and a dead publisher/subscriber marks its
/// still-named peer connections disconnected so the other side observes
/// end-of-stream instead of waiting on a queue nobody will ever push to or
/// drain again.
///
/// Calling this on a node that is actually alive just fails to remove the
/// still-locked liveness file; it does not corrupt a live node's state.
/// Reclaiming the same dead node twice is a no-op the second time: each
/// tag's own removal is the compare-and-swap that lets only one of two
/// racing reclaimers process it (§4.5 "idempotent").
pub fn reclaim(config: &Config, id: NodeId) -> std::io::Result<()> {
    for (path, tag) in service_tag::tags_for(&config.global, id)? {
        if fs::remove_file(&path).is_ok() {
            reclaim_tag(config, &tag);
        }
    }

    let named_concept_config = naming_scheme::node_named_concept_config(&config.global);
    let details_name = format!("{}{}", id.value(), config.global.node_static_config_suffix);
    let monitor_name = naming_scheme::node_monitor_name(&config.global, id.value());
    let _ = fs::remove_file(named_concept_config.path_for(&monitor_name));
    fs::remove_file(named_concept_config.path_for(&details_name))
}

fn reclaim_tag(config: &Config, tag: &Tag) {
    decrement_port_count(config, tag);
    match tag.kind {
        PortKind::Notifier => emit_notifier_dead_event(config, tag),
        PortKind::Publisher => disconnect_publisher_peers(config, tag),
        PortKind::Subscriber => disconnect_subscriber_peers(config, tag),
        PortKind::Listener | PortKind::Client | PortKind::Server => {}
    }
}

fn decrement_port_count(config: &Config, tag: &Tag) {
    let named_concept_config = naming_scheme::named_concept_config(&config.global);
    let dynamic_name = naming_scheme::dynamic_config_name(&config.global, &tag.service_id);
    let Ok(dynamic_config) = DynamicConfig::open(
        &named_concept_config,
        &dynamic_name,
        tag.kind.messaging_pattern(),
        config.global.creation_timeout,
    ) else {
        return;
    };

    match tag.kind {
        PortKind::Publisher => {
            if let Some(details) = dynamic_config.as_publish_subscribe() {
                details.publisher_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        PortKind::Subscriber => {
            if let Some(details) = dynamic_config.as_publish_subscribe() {
                details.subscriber_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        PortKind::Notifier => {
            if let Some(details) = dynamic_config.as_event() {
                details.notifier_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        PortKind::Listener => {
            if let Some(details) = dynamic_config.as_event() {
                details.listener_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        PortKind::Client => {
            if let Some(details) = dynamic_config.as_request_response() {
                details.client_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        PortKind::Server => {
            if let Some(details) = dynamic_config.as_request_response() {
                details.server_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}

fn emit_notifier_dead_event(config: &Config, tag: &Tag) {
    let named_concept_config = naming_scheme::named_concept_config(&config.global);
    let static_name = naming_scheme::static_config_name(&config.global, &tag.service_id);
    let Ok(static_config) =
        zerospan_cal::static_storage::open::<StaticConfig>(&named_concept_config, &static_name)
    else {
        return;
    };
    if let MessagingPatternStaticConfig::Event(pattern) = &static_config.messaging_pattern {
        request_response_registry::emit_lifecycle_event(tag.service_id.as_str(), pattern.notifier_dead_event);
    }
}

/// Marks every still-named connection from the dead publisher to a
/// currently-tagged subscriber of the same service as producer-disconnected,
/// so a subscriber that already holds that connection observes end-of-stream
/// on its next `receive` instead of waiting on a queue nobody will push to
/// again.
fn disconnect_publisher_peers(config: &Config, tag: &Tag) {
    let Ok(subscriber_ids) = service_tag::port_ids_for_service(&config.global, &tag.service_id, PortKind::Subscriber)
    else {
        return;
    };
    for subscriber_id in subscriber_ids {
        let name = naming_scheme::connection_name(&config.global, &tag.service_id, tag.port_id, subscriber_id);
        if let Some(connection) = connection_registry::get(&name) {
            connection.mark_producer_disconnected();
        }
    }
}

/// Symmetric counterpart of [`disconnect_publisher_peers`]: marks every
/// still-named connection from a currently-tagged publisher to the dead
/// subscriber as consumer-disconnected.
fn disconnect_subscriber_peers(config: &Config, tag: &Tag) {
    let Ok(publisher_ids) = service_tag::port_ids_for_service(&config.global, &tag.service_id, PortKind::Publisher)
    else {
        return;
    };
    for publisher_id in publisher_ids {
        let name = naming_scheme::connection_name(&config.global, &tag.service_id, publisher_id, tag.port_id);
        if let Some(connection) = connection_registry::get(&name) {
            connection.mark_consumer_disconnected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.global.root_path = dir.to_path_buf();
        config.global.prefix = format!("test_{}_monitor", std::process::id());
        config
    }

    #[test]
    fn a_live_node_is_reported_alive() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let node = NodeBuilder::new().config(config.clone()).create().unwrap();

        let mut seen = Vec::new();
        list(&config, |id, state, _| {
            seen.push((id, state));
            CallbackProgression::Continue
        })
        .unwrap();

        assert_eq!(seen, vec![(node.id(), ParticipantState::Alive)]);
    }

    #[test]
    fn a_node_whose_process_exited_is_reported_dead() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let id = node.id();
        drop(node);

        let mut seen = Vec::new();
        list(&config, |id, state, _| {
            seen.push((id, state));
            CallbackProgression::Continue
        })
        .unwrap();

        assert_eq!(seen, vec![(id, ParticipantState::Dead)]);
    }

    #[test]
    fn reclaim_removes_a_dead_nodes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let id = node.id();
        drop(node);

        reclaim(&config, id).unwrap();

        let mut seen = Vec::new();
        list(&config, |id, state, _| {
            seen.push((id, state));
            CallbackProgression::Continue
        })
        .unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn an_empty_domain_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let mut calls = 0;
        list(&config, |_, _, _| {
            calls += 1;
            CallbackProgression::Continue
        })
        .unwrap();
        assert_eq!(calls, 0);
    }

    fn open_dynamic_config(config: &Config, service_id: &crate::service::service_id::ServiceId, pattern: crate::service::messaging_pattern::MessagingPattern) -> DynamicConfig {
        DynamicConfig::open(
            &naming_scheme::named_concept_config(&config.global),
            &naming_scheme::dynamic_config_name(&config.global, service_id),
            pattern,
            config.global.creation_timeout,
        )
        .unwrap()
    }

    /// Reclaiming a node that still holds a live publisher (testing `reclaim`
    /// directly, as its own `NodeId` parameter lets this cover the mid-flight
    /// case without actually killing the process) must decrement the
    /// service's publisher count and mark the subscriber's connection as
    /// producer-disconnected, even though the subscriber lives on a
    /// different, still-alive node.
    #[test]
    fn reclaim_decrements_publisher_count_and_disconnects_its_subscribers() {
        use crate::service::messaging_pattern::MessagingPattern;
        use crate::service::service_name::ServiceName;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let publisher_node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let subscriber_node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let name = ServiceName::new("reclaim_pubsub_publisher").unwrap();

        let publisher_service = publisher_node.service_builder(&name).publish_subscribe::<u64>().create().unwrap();
        let subscriber_service = subscriber_node
            .service_builder(&name)
            .publish_subscribe::<u64>()
            .open_or_create()
            .unwrap();
        let service_id = publisher_service.static_config().service_id.clone();

        let publisher = publisher_service.publisher_builder().create().unwrap();
        let subscriber = subscriber_service.subscriber_builder().create().unwrap();
        let connection_name =
            naming_scheme::connection_name(&config.global, &service_id, publisher.id().value(), subscriber.id().value());

        reclaim(&config, publisher_node.id()).unwrap();

        let dynamic_config = open_dynamic_config(&config, &service_id, MessagingPattern::PublishSubscribe);
        assert_eq!(dynamic_config.as_publish_subscribe().unwrap().publisher_count(), 0);
        assert_eq!(dynamic_config.as_publish_subscribe().unwrap().subscriber_count(), 1);

        let connection = connection_registry::get(&connection_name).unwrap();
        assert!(!connection.is_producer_connected());
        assert!(connection.is_consumer_connected());

        // the tag was consumed as its own removal's side effect; a second
        // reclaim of the same node has nothing left to process.
        assert!(service_tag::tags_for(&config.global, publisher_node.id()).unwrap().is_empty());
    }

    /// Symmetric counterpart: reclaiming a node holding a live subscriber
    /// decrements the subscriber count and marks the still-alive publisher's
    /// connection as consumer-disconnected.
    #[test]
    fn reclaim_decrements_subscriber_count_and_disconnects_from_its_publishers() {
        use crate::service::messaging_pattern::MessagingPattern;
        use crate::service::service_name::ServiceName;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let publisher_node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let subscriber_node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let name = ServiceName::new("reclaim_pubsub_subscriber").unwrap();

        let publisher_service = publisher_node.service_builder(&name).publish_subscribe::<u64>().create().unwrap();
        let subscriber_service = subscriber_node
            .service_builder(&name)
            .publish_subscribe::<u64>()
            .open_or_create()
            .unwrap();
        let service_id = publisher_service.static_config().service_id.clone();

        let publisher = publisher_service.publisher_builder().create().unwrap();
        let subscriber = subscriber_service.subscriber_builder().create().unwrap();
        let connection_name =
            naming_scheme::connection_name(&config.global, &service_id, publisher.id().value(), subscriber.id().value());

        reclaim(&config, subscriber_node.id()).unwrap();

        let dynamic_config = open_dynamic_config(&config, &service_id, MessagingPattern::PublishSubscribe);
        assert_eq!(dynamic_config.as_publish_subscribe().unwrap().subscriber_count(), 0);
        assert_eq!(dynamic_config.as_publish_subscribe().unwrap().publisher_count(), 1);

        let connection = connection_registry::get(&connection_name).unwrap();
        assert!(!connection.is_consumer_connected());
        assert!(connection.is_producer_connected());
    }

    /// Mirrors the "listener observes the configured dead-notifier event
    /// exactly once, then sees the counter drop" scenario: a node dies while
    /// holding a notifier; a survivor reclaiming it raises
    /// `notifier_dead_event` to every still-connected listener.
    #[test]
    fn reclaim_raises_notifier_dead_event_to_a_connected_listener() {
        use crate::port::event_id::EventId;
        use crate::service::service_name::ServiceName;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let node = NodeBuilder::new().config(config.clone()).create().unwrap();
        let name = ServiceName::new("reclaim_notifier_dead").unwrap();
        let service = node.service_builder(&name).event().notifier_dead_event(7).create().unwrap();

        let notifier = service.notifier_builder().create().unwrap();
        let listener = service.listener_builder().create().unwrap();

        reclaim(&config, node.id()).unwrap();

        assert_eq!(listener.try_wait(), vec![EventId::new(7)]);
        drop(notifier);
    }
}
