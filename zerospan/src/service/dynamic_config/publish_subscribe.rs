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

/// Live port counts for a publish-subscribe service, readable by every
/// process that has opened it.
#[repr(C)]
pub struct PublishSubscribeDynamicDetails {
    pub publisher_count: AtomicUsize,
    pub subscriber_count: AtomicUsize,
}

impl Default for PublishSubscribeDynamicDetails {
    fn default() -> Self {
        Self {
            publisher_count: AtomicUsize::new(0),
            subscriber_count: AtomicUsize::new(0),
        }
    }
}

impl PublishSubscribeDynamicDetails {
    pub fn publisher_count(&self) -> usize {
        self.publisher_count.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Acquire)
    }
}
