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

//! Entry point for creating or opening a service: pick a messaging
//! pattern, then use the returned pattern-specific builder to fill in
//! type-dependent and capacity settings before `create`/`open`/
//! `open_or_create`.

pub mod event;
pub mod publish_subscribe;
pub mod request_response;

use crate::node::Node;
use crate::service::service_name::ServiceName;

pub use event::ServiceBuilderEvent;
pub use publish_subscribe::ServiceBuilderPublishSubscribe;
pub use request_response::ServiceBuilderRequestResponse;

pub struct ServiceBuilder {
    node: Node,
    name: ServiceName,
}

impl ServiceBuilder {
    pub(crate) fn new(node: Node, name: ServiceName) -> Self {
        Self { node, name }
    }

    pub fn publish_subscribe<Payload>(self) -> ServiceBuilderPublishSubscribe<Payload> {
        ServiceBuilderPublishSubscribe::new(self.node, self.name)
    }

    pub fn event(self) -> ServiceBuilderEvent {
        ServiceBuilderEvent::new(self.node, self.name)
    }

    pub fn request_response<Request, Response>(
        self,
    ) -> ServiceBuilderRequestResponse<Request, Response> {
        ServiceBuilderRequestResponse::new(self.node, self.name)
    }
}
