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

pub use crate::config::Config;
pub use crate::monitor::{self, ParticipantState};
pub use crate::node::{Node, NodeBuilder, NodeId};
pub use crate::node_name::NodeName;
pub use crate::port::client::{Client, PendingResponse};
pub use crate::port::event_id::EventId;
pub use crate::port::listener::Listener;
pub use crate::port::notifier::Notifier;
pub use crate::port::publisher::Publisher;
pub use crate::port::server::{ActiveRequest, Server};
pub use crate::port::subscriber::Subscriber;
pub use crate::sample::{Sample, SampleMut};
pub use crate::service::attribute::{AttributeSet, AttributeSpecifier, AttributeVerifier};
pub use crate::service::messaging_pattern::MessagingPattern;
pub use crate::service::service_name::ServiceName;
pub use crate::service::Service;
pub use crate::unable_to_deliver_strategy::UnableToDeliverStrategy;
pub use crate::waitset::{AttachmentId, WaitEvent, WaitSet, WaitSetBuilder};
pub use zerospan_support::CallbackProgression;
