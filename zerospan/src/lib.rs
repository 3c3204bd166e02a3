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

//! Zero-copy, lock-free inter-process communication middleware.
//!
//! A [`node::Node`] creates or opens [`service::Service`]s over one of three
//! messaging patterns — publish-subscribe, event, request-response — and
//! hands out ports (`Publisher`/`Subscriber`, `Notifier`/`Listener`,
//! `Client`/`Server`) that exchange data through shared memory without a
//! copy on the wire. A [`waitset::WaitSet`] waits on several ports at once;
//! [`monitor::list`] finds and reclaims the ports of a process that died
//! without cleaning up after itself.
//!
//! See [`prelude`] for the common set of imports most applications need.

pub mod config;
pub mod monitor;
pub mod node;
pub mod node_name;
pub mod port;
pub mod prelude;
pub mod sample;
pub mod service;
pub mod unable_to_deliver_strategy;
pub mod waitset;
