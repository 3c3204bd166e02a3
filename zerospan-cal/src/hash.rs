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

//! SHA-1 fingerprinting used to derive a service's filesystem-safe identity
//! from its fully qualified name and type signature, so two processes that
//! agree on those inputs always agree on the same underlying resource names
//! without needing a central registry.

/// The 20-byte digest of `parts` joined with `\0` separators, hex-encoded.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = sha1_smol::Sha1::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(&[0u8]);
        }
        hasher.update(part.as_bytes());
    }
    hasher.digest().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_the_same_fingerprint() {
        assert_eq!(
            fingerprint(&["telemetry", "pub_sub", "u64"]),
            fingerprint(&["telemetry", "pub_sub", "u64"])
        );
    }

    #[test]
    fn different_inputs_produce_different_fingerprints() {
        assert_ne!(
            fingerprint(&["telemetry", "pub_sub", "u64"]),
            fingerprint(&["telemetry", "pub_sub", "u32"])
        );
    }

    #[test]
    fn fingerprint_is_a_40_character_hex_string() {
        let digest = fingerprint(&["anything"]);
        assert_eq!(digest.len(), 40);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn separator_prevents_concatenation_collisions() {
        assert_ne!(fingerprint(&["ab", "c"]), fingerprint(&["a", "bc"]));
    }
}
