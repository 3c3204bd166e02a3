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

//! A human-readable, optional name a node can be created with, surfaced to
//! other processes via [`crate::monitor`] for diagnostics.

use zerospan_support::byte_string::FixedSizeByteString;

pub const NODE_NAME_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeNameCreationError {
    InvalidContent,
    ExceedsMaximumLength,
}

impl std::fmt::Display for NodeNameCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for NodeNameCreationError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeName(FixedSizeByteString<NODE_NAME_LENGTH>);

impl NodeName {
    pub fn new(value: &str) -> Result<Self, NodeNameCreationError> {
        if value.len() > NODE_NAME_LENGTH {
            return Err(NodeNameCreationError::ExceedsMaximumLength);
        }
        if value.contains('\0') {
            return Err(NodeNameCreationError::InvalidContent);
        }
        Ok(Self(FixedSizeByteString::try_from(value).map_err(|_| {
            NodeNameCreationError::ExceedsMaximumLength
        })?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for NodeName {
    type Error = NodeNameCreationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert!(NodeName::new("sensor_fusion_node").is_ok());
    }

    #[test]
    fn rejects_embedded_nul_bytes() {
        assert_eq!(
            NodeName::new("bad\0name").unwrap_err(),
            NodeNameCreationError::InvalidContent
        );
    }

    #[test]
    fn rejects_names_over_the_length_limit() {
        let too_long = "a".repeat(NODE_NAME_LENGTH + 1);
        assert_eq!(
            NodeName::new(&too_long).unwrap_err(),
            NodeNameCreationError::ExceedsMaximumLength
        );
    }
}
