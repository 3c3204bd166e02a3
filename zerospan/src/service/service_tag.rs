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

//! A marker file a port leaves behind in its node's directory, naming the
//! service and port it belongs to. A node's own registries (§"process-local
//! peer discovery") die with its process, so when [`crate::monitor::reclaim`]
//! finds a node dead it has no other way to learn what that node's ports
//! were; it scans this node's surviving tags instead, exactly the way it
//! reads the node's own static details off disk.
//!
//! One tag is written by each port's `create()` and removed by its own
//! `Drop`, so a node that exits cleanly leaves none behind; `reclaim` only
//! ever finds tags for a node that was killed mid-flight.

use std::fs;
use std::path::PathBuf;

use crate::config::Global;
use crate::node::NodeId;
use crate::service::messaging_pattern::MessagingPattern;
use crate::service::naming_scheme;
use crate::service::service_id::ServiceId;
use zerospan_cal::named_concept::NamedConceptConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PortKind {
    Publisher,
    Subscriber,
    Notifier,
    Listener,
    Client,
    Server,
}

impl PortKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
            Self::Notifier => "notifier",
            Self::Listener => "listener",
            Self::Client => "client",
            Self::Server => "server",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "publisher" => Self::Publisher,
            "subscriber" => Self::Subscriber,
            "notifier" => Self::Notifier,
            "listener" => Self::Listener,
            "client" => Self::Client,
            "server" => Self::Server,
            _ => return None,
        })
    }

    pub(crate) fn messaging_pattern(&self) -> MessagingPattern {
        match self {
            Self::Publisher | Self::Subscriber => MessagingPattern::PublishSubscribe,
            Self::Notifier | Self::Listener => MessagingPattern::Event,
            Self::Client | Self::Server => MessagingPattern::RequestResponse,
        }
    }
}

pub(crate) struct Tag {
    pub service_id: ServiceId,
    pub kind: PortKind,
    pub port_id: u128,
}

fn config(global: &Global) -> NamedConceptConfiguration {
    naming_scheme::node_named_concept_config(global).suffix(&global.service_tag_suffix)
}

fn tag_name(node_id: NodeId, service_id: &ServiceId, kind: PortKind, port_id: u128) -> String {
    format!("{:x}_{}_{}_{:x}", node_id.value(), service_id.as_str(), kind.as_str(), port_id)
}

/// Leaves a tag behind for a live port. Best-effort: a port that cannot
/// write its tag still works, it is just invisible to a future reclaim.
pub(crate) fn write(global: &Global, node_id: NodeId, service_id: &ServiceId, kind: PortKind, port_id: u128) {
    let name = tag_name(node_id, service_id, kind, port_id);
    let _ = fs::write(config(global).path_for(&name), []);
}

pub(crate) fn remove(global: &Global, node_id: NodeId, service_id: &ServiceId, kind: PortKind, port_id: u128) {
    let name = tag_name(node_id, service_id, kind, port_id);
    let _ = fs::remove_file(config(global).path_for(&name));
}

/// Parses `{service_id}_{kind}_{port_id:x}` (the part of a tag name left
/// after stripping the named-concept prefix/suffix and, for [`tags_for`],
/// the node id). `rsplitn` peels `kind` and `port_id` off the right so a
/// `service_id` (a hex digest, but this makes no assumption either way)
/// cannot be mistaken for part of them.
fn parse_tag(rest: &str) -> Option<Tag> {
    let mut parts = rest.rsplitn(3, '_');
    let (Some(port_id_hex), Some(kind_str), Some(service_id_str)) = (parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let kind = PortKind::parse(kind_str)?;
    let port_id = u128::from_str_radix(port_id_hex, 16).ok()?;
    Some(Tag {
        service_id: ServiceId::from_raw(service_id_str.to_string()),
        kind,
        port_id,
    })
}

/// Every surviving tag for `node_id`, along with the path it lives at so the
/// caller can remove it once handled.
pub(crate) fn tags_for(global: &Global, node_id: NodeId) -> std::io::Result<Vec<(PathBuf, Tag)>> {
    let cfg = config(global);
    let dir = global.nodes_path();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let prefix = format!("{}{:x}_", cfg.get_prefix(), node_id.value());
    let suffix = cfg.get_suffix();
    let mut tags = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Some(rest) = rest.strip_suffix(suffix) else {
            continue;
        };
        if let Some(tag) = parse_tag(rest) {
            tags.push((entry.path(), tag));
        }
    }
    Ok(tags)
}

/// Every live port id of `kind` tagged for `service_id`, across every node.
/// [`crate::monitor::reclaim`] uses this to find a dead port's surviving
/// peers (e.g. the subscribers a dead publisher's connections are named
/// after) without needing the dead node's own id.
pub(crate) fn port_ids_for_service(global: &Global, service_id: &ServiceId, kind: PortKind) -> std::io::Result<Vec<u128>> {
    let cfg = config(global);
    let dir = global.nodes_path();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let prefix = cfg.get_prefix();
    let suffix = cfg.get_suffix();
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let Some(rest) = rest.strip_suffix(suffix) else {
            continue;
        };
        // rest is "{node_id:x}_{service_id}_{kind}_{port_id:x}"; drop the
        // node id, it is irrelevant to this lookup.
        let Some(after_node_id) = rest.split_once('_').map(|(_, r)| r) else {
            continue;
        };
        if let Some(tag) = parse_tag(after_node_id) {
            if tag.kind == kind && tag.service_id == *service_id {
                ids.push(tag.port_id);
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::service_name::ServiceName;

    fn test_global(dir: &std::path::Path) -> Global {
        let mut global = Global::default();
        global.root_path = dir.to_path_buf();
        global.prefix = format!("test_{}_service_tag", std::process::id());
        global
    }

    fn node_id() -> NodeId {
        NodeId::from_raw_value(0x1234)
    }

    #[test]
    fn a_written_tag_is_found_by_tags_for_and_matches_its_kind() {
        let dir = tempfile::tempdir().unwrap();
        let global = test_global(dir.path());
        let service_id = ServiceId::new(&ServiceName::new("svc").unwrap(), MessagingPattern::Event, &[]);

        write(&global, node_id(), &service_id, PortKind::Notifier, 7);

        let tags = tags_for(&global, node_id()).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].1.service_id, service_id);
        assert_eq!(tags[0].1.kind, PortKind::Notifier);
    }

    #[test]
    fn removing_a_tag_makes_it_disappear_from_tags_for() {
        let dir = tempfile::tempdir().unwrap();
        let global = test_global(dir.path());
        let service_id = ServiceId::new(&ServiceName::new("svc").unwrap(), MessagingPattern::PublishSubscribe, &["u64"]);

        write(&global, node_id(), &service_id, PortKind::Publisher, 3);
        remove(&global, node_id(), &service_id, PortKind::Publisher, 3);

        assert!(tags_for(&global, node_id()).unwrap().is_empty());
    }

    #[test]
    fn tags_for_a_different_node_are_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let global = test_global(dir.path());
        let service_id = ServiceId::new(&ServiceName::new("svc").unwrap(), MessagingPattern::RequestResponse, &["u64", "u64"]);
        let other = NodeId::from_raw_value(0x5678);

        write(&global, node_id(), &service_id, PortKind::Client, 1);

        assert!(tags_for(&global, other).unwrap().is_empty());
    }

    #[test]
    fn port_ids_for_service_finds_matching_tags_across_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let global = test_global(dir.path());
        let service_id = ServiceId::new(&ServiceName::new("svc").unwrap(), MessagingPattern::PublishSubscribe, &["u64"]);
        let other_service = ServiceId::new(&ServiceName::new("other").unwrap(), MessagingPattern::PublishSubscribe, &["u64"]);
        let other = NodeId::from_raw_value(0x5678);

        write(&global, node_id(), &service_id, PortKind::Subscriber, 1);
        write(&global, other, &service_id, PortKind::Subscriber, 2);
        write(&global, node_id(), &service_id, PortKind::Publisher, 3);
        write(&global, node_id(), &other_service, PortKind::Subscriber, 4);

        let mut ids = port_ids_for_service(&global, &service_id, PortKind::Subscriber).unwrap();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }
}
