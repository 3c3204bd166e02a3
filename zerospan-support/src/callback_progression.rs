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

/// Returned by every per-element callback (service listing, attribute
/// iteration, wait-set dispatch) to let the caller stop enumeration early
/// without an out-of-band control-flow mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackProgression {
    Continue,
    Stop,
}
