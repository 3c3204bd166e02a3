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

//! The fully qualified name a service is discovered by. Two services with
//! the same name, messaging pattern and payload identity are the same
//! service (§3 "two services are the same service iff their ServiceIds
//! match").

use serde::{Deserialize, Serialize};
use zerospan_support::byte_string::FixedSizeByteString;

pub const SERVICE_NAME_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceNameCreationError {
    Empty,
    ExceedsMaximumLength,
}

impl std::fmt::Display for ServiceNameCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}
impl std::error::Error for ServiceNameCreationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(FixedSizeByteString<SERVICE_NAME_LENGTH>);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, ServiceNameCreationError> {
        if value.is_empty() {
            return Err(ServiceNameCreationError::Empty);
        }
        let inner = FixedSizeByteString::try_from(value)
            .map_err(|_| ServiceNameCreationError::ExceedsMaximumLength)?;
        Ok(Self(inner))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ServiceName {
    type Error = ServiceNameCreationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_names() {
        assert_eq!(ServiceName::new("").unwrap_err(), ServiceNameCreationError::Empty);
    }

    #[test]
    fn accepts_fully_qualified_slash_separated_names() {
        assert!(ServiceName::new("robot/sensors/lidar").is_ok());
    }

    #[test]
    fn equal_strings_produce_equal_names() {
        assert_eq!(ServiceName::new("a").unwrap(), ServiceName::new("a").unwrap());
    }
}
