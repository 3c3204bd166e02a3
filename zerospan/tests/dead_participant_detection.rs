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

use zerospan::prelude::*;

fn test_config(dir: &std::path::Path, tag: &str) -> Config {
    let mut config = Config::default();
    config.global.root_path = dir.to_path_buf();
    config.global.prefix = format!("test_{}_{}", std::process::id(), tag);
    config
}

#[test]
fn a_domain_with_live_and_dead_nodes_reports_each_correctly() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "mixed_liveness");

    let alive = NodeBuilder::new().config(config.clone()).create().unwrap();
    let dying = NodeBuilder::new().config(config.clone()).create().unwrap();
    let dying_id = dying.id();
    drop(dying);

    let mut seen = std::collections::HashMap::new();
    monitor::list(&config, |id, state, _| {
        seen.insert(id, state);
        CallbackProgression::Continue
    })
    .unwrap();

    assert_eq!(seen.get(&alive.id()), Some(&ParticipantState::Alive));
    assert_eq!(seen.get(&dying_id), Some(&ParticipantState::Dead));
}

#[test]
fn reclaiming_a_dead_node_leaves_the_live_one_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "reclaim_selective");

    let alive = NodeBuilder::new().config(config.clone()).create().unwrap();
    let dying = NodeBuilder::new().config(config.clone()).create().unwrap();
    let dying_id = dying.id();
    drop(dying);

    monitor::reclaim(&config, dying_id).unwrap();

    let mut seen = std::collections::HashMap::new();
    monitor::list(&config, |id, state, _| {
        seen.insert(id, state);
        CallbackProgression::Continue
    })
    .unwrap();

    assert_eq!(seen.len(), 1);
    assert_eq!(seen.get(&alive.id()), Some(&ParticipantState::Alive));
    assert!(!seen.contains_key(&dying_id));
}

#[test]
fn listing_can_be_stopped_early_by_the_callback() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "stop_early");

    let _a = NodeBuilder::new().config(config.clone()).create().unwrap();
    let _b = NodeBuilder::new().config(config.clone()).create().unwrap();
    let _c = NodeBuilder::new().config(config.clone()).create().unwrap();

    let mut calls = 0;
    monitor::list(&config, |_, _, _| {
        calls += 1;
        CallbackProgression::Stop
    })
    .unwrap();

    assert_eq!(calls, 1);
}
