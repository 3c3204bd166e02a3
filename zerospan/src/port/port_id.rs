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

//! 128-bit identity minted once per port; never reused even after the port
//! is dropped (§3, §4.3 "a port never mints a second id for itself").

use zerospan_support::unique_id::UniqueSystemId;

macro_rules! unique_port_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(UniqueSystemId);

        impl $name {
            pub fn new() -> Result<Self, zerospan_support::unique_id::UniqueSystemIdCreationError> {
                Ok(Self(UniqueSystemId::new()?))
            }

            pub fn value(&self) -> u128 {
                self.0.value()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.to_b64())
            }
        }
    };
}

unique_port_id!(UniquePublisherId);
unique_port_id!(UniqueSubscriberId);
unique_port_id!(UniqueNotifierId);
unique_port_id!(UniqueListenerId);
unique_port_id!(UniqueClientId);
unique_port_id!(UniqueServerId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_ids_minted_in_succession_differ() {
        let a = UniquePublisherId::new().unwrap();
        let b = UniquePublisherId::new().unwrap();
        assert_ne!(a, b);
    }
}
