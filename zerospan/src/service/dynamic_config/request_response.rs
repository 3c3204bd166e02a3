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
pub struct RequestResponseDynamicDetails {
    pub client_count: AtomicUsize,
    pub server_count: AtomicUsize,
}

impl Default for RequestResponseDynamicDetails {
    fn default() -> Self {
        Self {
            client_count: AtomicUsize::new(0),
            server_count: AtomicUsize::new(0),
        }
    }
}

impl RequestResponseDynamicDetails {
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Acquire)
    }

    pub fn server_count(&self) -> usize {
        self.server_count.load(Ordering::Acquire)
    }
}
