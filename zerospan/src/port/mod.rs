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

//! Port types: the endpoints a service's ports factories hand out. Each
//! messaging pattern contributes a sending and a receiving port built on
//! the same [`sample_pool::SamplePool`] / [`zerospan_cal::Connection`]
//! machinery, specialized per pattern.

pub mod client;
pub mod connection_registry;
pub mod event_id;
pub mod listener;
pub mod notifier;
pub mod port_id;
pub mod publisher;
pub mod publisher_registry;
pub mod request_response_registry;
pub mod sample_pool;
pub mod server;
pub mod subscriber;
