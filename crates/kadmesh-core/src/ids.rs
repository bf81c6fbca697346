// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::fmt;

/// 160-bit opaque identifier used for node ids, info-hashes and lookup
/// targets. The all-zero hash means "unset" (e.g. a message whose sender
/// omitted its id).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub const LEN: usize = 20;

    /// Build from a raw 20-byte buffer. Any other length yields `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut id = [0u8; Self::LEN];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        hex::decode(raw).ok().as_deref().and_then(Self::from_bytes)
    }

    /// True for the all-zero "unset" hash.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    pub fn xor_distance(&self, other: &Self) -> [u8; 20] {
        let mut out = [0u8; 20];
        for (idx, byte) in out.iter_mut().enumerate() {
            *byte = self.0[idx] ^ other.0[idx];
        }
        out
    }

    /// Order `self` and `other` by XOR distance to `target`.
    pub fn distance_cmp(&self, target: &Self, other: &Self) -> std::cmp::Ordering {
        let a = self.xor_distance(target);
        let b = other.xor_distance(target);
        a.cmp(&b)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_rejects_wrong_lengths() {
        assert!(InfoHash::from_bytes(&[0u8; 19]).is_none());
        assert!(InfoHash::from_bytes(&[0u8; 21]).is_none());
        assert!(InfoHash::from_bytes(&[7u8; 20]).is_some());
    }

    #[test]
    fn default_is_unset() {
        assert!(InfoHash::default().is_zero());
        assert!(!InfoHash([1u8; 20]).is_zero());
    }

    #[test]
    fn distance_compare_orders_closest() {
        let target = InfoHash([0u8; 20]);
        let a = InfoHash([1u8; 20]);
        let b = InfoHash([2u8; 20]);
        assert!(a.distance_cmp(&target, &b).is_lt());
    }

    #[test]
    fn hex_roundtrip() {
        let id = InfoHash([0xab; 20]);
        assert_eq!(InfoHash::from_hex(&id.to_string()), Some(id));
        assert!(InfoHash::from_hex("abcd").is_none());
    }
}
