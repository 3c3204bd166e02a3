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

//! Free-form key/value metadata attached to a service at creation and
//! matched against a requesting builder's requirements on open (§4.6
//! "attribute compatibility").

use serde::{Deserialize, Serialize};

/// Ordered (key, value) pairs; a key may repeat, insertion order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet(Vec<(String, String)>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.push((key.to_string(), value.to_string()));
    }

    /// All values recorded for `key`, in insertion order.
    pub fn get(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fluent builder side: the attributes a service should be created with.
#[derive(Debug, Clone, Default)]
pub struct AttributeSpecifier(AttributeSet);

impl AttributeSpecifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.0
    }
}

enum Requirement {
    Key(String),
    KeyValue(String, String),
}

/// Fluent builder side: the attributes a service must already define for an
/// `open` to succeed.
#[derive(Default)]
pub struct AttributeVerifier(Vec<Requirement>);

impl AttributeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_key(mut self, key: &str) -> Self {
        self.0.push(Requirement::Key(key.to_string()));
        self
    }

    pub fn require(mut self, key: &str, value: &str) -> Self {
        self.0
            .push(Requirement::KeyValue(key.to_string(), value.to_string()));
        self
    }

    /// `true` iff every requirement is satisfied by `attributes`. Adding a
    /// requirement can only ever turn a passing verification into a failing
    /// one, never the reverse (§8 "monotonic in attribute requirements").
    pub fn verify(&self, attributes: &AttributeSet) -> bool {
        self.0.iter().all(|requirement| match requirement {
            Requirement::Key(key) => !attributes.get(key).is_empty(),
            Requirement::KeyValue(key, value) => {
                attributes.get(key).iter().any(|v| *v == value)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_values_in_insertion_order() {
        let mut attributes = AttributeSet::new();
        attributes.insert("rate", "10hz");
        attributes.insert("rate", "20hz");
        assert_eq!(attributes.get("rate"), vec!["10hz", "20hz"]);
    }

    #[test]
    fn empty_verifier_accepts_everything() {
        let attributes = AttributeSet::new();
        assert!(AttributeVerifier::new().verify(&attributes));
    }

    #[test]
    fn require_key_fails_when_key_is_absent() {
        let attributes = AttributeSet::new();
        let verifier = AttributeVerifier::new().require_key("unit");
        assert!(!verifier.verify(&attributes));
    }

    #[test]
    fn adding_a_requirement_never_turns_failure_into_success() {
        let mut attributes = AttributeSet::new();
        attributes.insert("unit", "meters");
        let passes = AttributeVerifier::new().require("unit", "meters");
        assert!(passes.verify(&attributes));

        let fails = AttributeVerifier::new()
            .require("unit", "meters")
            .require("rate", "10hz");
        assert!(!fails.verify(&attributes));
    }

    #[test]
    fn attribute_set_round_trips_through_toml() {
        let mut attributes = AttributeSet::new();
        attributes.insert("unit", "meters");
        attributes.insert("precision", "f32");
        let encoded = toml::to_string(&attributes).unwrap();
        let decoded: AttributeSet = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded, attributes);
    }
}
