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

//! A relocatable string with a compile-time fixed capacity, safe to embed in
//! shared memory (no heap pointers).

use std::fmt::{Debug, Display};

/// Error returned when a [`FixedSizeByteString`] modification would exceed
/// its capacity.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FixedSizeByteStringModificationError {
    InsertWouldExceedCapacity,
}

impl Display for FixedSizeByteStringModificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{:?}", stringify!(Self), self)
    }
}

impl std::error::Error for FixedSizeByteStringModificationError {}

/// Fixed-capacity, `Copy`-able byte string. Used for names (service,
/// participant, domain) that must live inside shared-memory headers.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct FixedSizeByteString<const CAPACITY: usize> {
    len: usize,
    data: [u8; CAPACITY],
}

impl<const CAPACITY: usize> FixedSizeByteString<CAPACITY> {
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0u8; CAPACITY],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FixedSizeByteStringModificationError> {
        let mut s = Self::new();
        s.push_bytes(bytes)?;
        Ok(s)
    }

    pub fn push_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<(), FixedSizeByteStringModificationError> {
        if self.len + bytes.len() > CAPACITY {
            return Err(FixedSizeByteStringModificationError::InsertWouldExceedCapacity);
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl<const CAPACITY: usize> Default for FixedSizeByteString<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> Debug for FixedSizeByteString<CAPACITY> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedSizeByteString({:?})", self.as_str())
    }
}

impl<const CAPACITY: usize> Display for FixedSizeByteString<CAPACITY> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<const CAPACITY: usize> PartialEq for FixedSizeByteString<CAPACITY> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl<const CAPACITY: usize> Eq for FixedSizeByteString<CAPACITY> {}

impl<const CAPACITY: usize> std::hash::Hash for FixedSizeByteString<CAPACITY> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl<const CAPACITY: usize> TryFrom<&str> for FixedSizeByteString<CAPACITY> {
    type Error = FixedSizeByteStringModificationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_bytes(value.as_bytes())
    }
}

impl<const CAPACITY: usize> serde::Serialize for FixedSizeByteString<CAPACITY> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, const CAPACITY: usize> serde::Deserialize<'de> for FixedSizeByteString<CAPACITY> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_bytes(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_within_capacity_succeeds() {
        let mut s = FixedSizeByteString::<8>::new();
        s.push_bytes(b"abc").unwrap();
        assert_eq!(s.as_str(), "abc");
    }

    #[test]
    fn push_beyond_capacity_fails() {
        let mut s = FixedSizeByteString::<4>::new();
        assert_eq!(
            s.push_bytes(b"12345"),
            Err(FixedSizeByteStringModificationError::InsertWouldExceedCapacity)
        );
    }

    #[test]
    fn round_trips_through_serde_json_like_string() {
        let s: FixedSizeByteString<16> = "domain_one".try_into().unwrap();
        let toml_value = toml_edit_equivalent(&s);
        let back: FixedSizeByteString<16> = FixedSizeByteString::from_bytes(toml_value.as_bytes()).unwrap();
        assert_eq!(s, back);
    }

    fn toml_edit_equivalent<const N: usize>(s: &FixedSizeByteString<N>) -> String {
        s.as_str().to_string()
    }
}
