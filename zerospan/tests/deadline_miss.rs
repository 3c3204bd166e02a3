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

//! A deadline is published as part of a publish-subscribe service's static
//! config (§4.4); nothing enforces it automatically, an application builds
//! its own miss detector out of the last-received timestamp plus a
//! [`WaitSet`] interval tick.

use std::time::{Duration, Instant};

use zerospan::prelude::*;

fn test_config(dir: &std::path::Path, tag: &str) -> Config {
    let mut config = Config::default();
    config.global.root_path = dir.to_path_buf();
    config.global.prefix = format!("test_{}_{}", std::process::id(), tag);
    config
}

#[test]
fn static_config_carries_the_deadline_a_service_was_created_with() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "deadline_config"))
        .create()
        .unwrap();
    let name = ServiceName::new("heartbeat").unwrap();

    let service = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .deadline(Duration::from_millis(50))
        .create()
        .unwrap();

    match &service.static_config().messaging_pattern {
        zerospan::service::static_config::MessagingPatternStaticConfig::PublishSubscribe(pattern) => {
            assert_eq!(pattern.deadline, Some(Duration::from_millis(50)));
        }
        _ => panic!("expected a publish-subscribe static config"),
    }
}

#[test]
fn an_interval_attachment_reports_a_deadline_miss_when_nothing_arrives_in_time() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "deadline_miss"))
        .create()
        .unwrap();
    let name = ServiceName::new("heartbeat").unwrap();

    let deadline = Duration::from_millis(20);
    let service = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .deadline(deadline)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();

    // The interval attachment paces the loop at the deadline's own period;
    // nothing about it detects a miss by itself, that's the elapsed-time
    // check below.
    let waitset = WaitSetBuilder::new().create().unwrap();
    let _tick = waitset.attach_interval(deadline).unwrap();

    let mut last_sample_at = Instant::now();
    let mut missed = false;
    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(200) && !missed {
        waitset.timed_wait(|_| {}, Duration::from_millis(5));
        if subscriber.receive().is_some() {
            last_sample_at = Instant::now();
        }
        if last_sample_at.elapsed() > deadline {
            missed = true;
        }
    }

    assert!(missed, "no publisher ever sent, so the deadline must be observed as missed");
}

#[test]
fn a_deadline_is_not_reported_missed_while_samples_keep_arriving() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "deadline_met"))
        .create()
        .unwrap();
    let name = ServiceName::new("heartbeat").unwrap();

    let deadline = Duration::from_millis(200);
    let service = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .deadline(deadline)
        .create()
        .unwrap();
    let publisher = service.publisher_builder().create().unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();

    let mut last_sample_at = Instant::now();
    for _ in 0..5 {
        publisher.send_copy(1).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        if subscriber.receive().is_some() {
            last_sample_at = Instant::now();
        }
        assert!(last_sample_at.elapsed() < deadline);
    }
}
