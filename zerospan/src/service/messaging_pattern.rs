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

//! The messaging pattern a service was created with. Part of a service's
//! [`crate::service::service_id::ServiceId`] fingerprint and checked for
//! compatibility on open (`IncompatibleMessagingPattern`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessagingPattern {
    PublishSubscribe,
    Event,
    RequestResponse,
}

impl MessagingPattern {
    /// Stable discriminant folded into the service's fingerprint input.
    pub fn discriminant(&self) -> &'static str {
        match self {
            MessagingPattern::PublishSubscribe => "publish_subscribe",
            MessagingPattern::Event => "event",
            MessagingPattern::RequestResponse => "request_response",
        }
    }
}

impl std::fmt::Display for MessagingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.discriminant())
    }
}
