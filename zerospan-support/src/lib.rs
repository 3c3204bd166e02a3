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

//! Support primitives assumed available to the core: a fixed-capacity byte
//! string safe to embed in shared memory, and 128-bit unique id minting
//! (process id + monotonic counter + creation timestamp).

pub mod byte_string;
pub mod callback_progression;
pub mod unique_id;

pub use byte_string::FixedSizeByteString;
pub use callback_progression::CallbackProgression;
pub use unique_id::UniqueSystemId;
