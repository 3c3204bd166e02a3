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

use serde::{Deserialize, Serialize};

use super::TypeDetail;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResponseStaticConfig {
    pub request_type: TypeDetail,
    pub response_type: TypeDetail,
    pub request_user_header: Option<TypeDetail>,
    pub response_user_header: Option<TypeDetail>,
    pub max_clients: usize,
    pub max_servers: usize,
    pub max_active_requests_per_client: usize,
    pub max_borrowed_responses_per_pending_response: usize,
    pub max_response_buffer_size: usize,
    pub enable_safe_overflow_for_requests: bool,
    pub enable_safe_overflow_for_responses: bool,
    pub enable_fire_and_forget_requests: bool,
}
