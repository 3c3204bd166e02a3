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
fn opening_a_service_with_a_mismatched_payload_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "incompat_type"))
        .create()
        .unwrap();
    let name = ServiceName::new("sensor_reading").unwrap();

    let _service = node.service_builder(&name).publish_subscribe::<u64>().create().unwrap();

    let err = node
        .service_builder(&name)
        .publish_subscribe::<f64>()
        .open()
        .unwrap_err();
    assert_eq!(err, zerospan::service::ServiceOpenError::IncompatibleTypes);
}

#[test]
fn opening_a_service_under_the_wrong_messaging_pattern_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "incompat_pattern"))
        .create()
        .unwrap();
    let name = ServiceName::new("door_opened").unwrap();

    let _service = node.service_builder(&name).event().create().unwrap();

    let err = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .open()
        .unwrap_err();
    assert_eq!(err, zerospan::service::ServiceOpenError::IncompatibleMessagingPattern);
}

#[test]
fn opening_a_service_that_was_never_created_reports_does_not_exist() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "never_created"))
        .create()
        .unwrap();
    let name = ServiceName::new("nonexistent").unwrap();

    let err = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .open()
        .unwrap_err();
    assert_eq!(err, zerospan::service::ServiceOpenError::DoesNotExist);
}

#[test]
fn opening_a_service_with_a_stricter_attribute_requirement_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let node = NodeBuilder::new()
        .config(test_config(dir.path(), "incompat_attr"))
        .create()
        .unwrap();
    let name = ServiceName::new("telemetry").unwrap();

    let attributes = AttributeSpecifier::new().define("unit", "celsius");
    let _service = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .with_attributes(attributes)
        .create()
        .unwrap();

    let verifier = AttributeVerifier::new().require("unit", "fahrenheit");
    let err = node
        .service_builder(&name)
        .publish_subscribe::<u64>()
        .require_attributes(verifier)
        .open()
        .unwrap_err();
    assert_eq!(err, zerospan::service::ServiceOpenError::IncompatibleAttributes);
}
