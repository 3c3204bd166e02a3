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

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStaticConfig {
    pub max_notifiers: usize,
    pub max_listeners: usize,
    pub event_id_max_value: usize,
    pub deadline: Option<Duration>,
    pub notifier_created_event: Option<u64>,
    pub notifier_dropped_event: Option<u64>,
    pub notifier_dead_event: Option<u64>,
}
