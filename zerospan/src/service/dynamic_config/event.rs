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

use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C)]
pub struct EventDynamicDetails {
    pub notifier_count: AtomicUsize,
    pub listener_count: AtomicUsize,
}

impl Default for EventDynamicDetails {
    fn default() -> Self {
        Self {
            notifier_count: AtomicUsize::new(0),
            listener_count: AtomicUsize::new(0),
        }
    }
}

impl EventDynamicDetails {
    pub fn notifier_count(&self) -> usize {
        self.notifier_count.load(Ordering::Acquire)
    }

    pub fn listener_count(&self) -> usize {
        self.listener_count.load(Ordering::Acquire)
    }
}
