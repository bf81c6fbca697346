// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::net::{IpAddr, SocketAddr};

use crate::ids::InfoHash;
use crate::sockaddr::SockAddr;

/// One packed IPv4 node entry: 20-byte id + 4-byte address + 2-byte port.
pub const NODE4_LEN: usize = 26;
/// One packed IPv6 node entry: 20-byte id + 16-byte address + 2-byte port.
pub const NODE6_LEN: usize = 38;

/// A routing-table entry as carried on the wire. Liveness bookkeeping
/// belongs to the routing layer; the codec only ships id + endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: InfoHash,
    pub addr: SockAddr,
}

/// Pack IPv4 nodes into the compact table carried in the `n4` argument.
/// Entries without an IPv4 endpoint are left out.
pub fn pack_nodes4(nodes: &[Node]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * NODE4_LEN);
    for node in nodes {
        let Some(SocketAddr::V4(addr)) = node.addr.as_socket_addr() else {
            continue;
        };
        out.extend_from_slice(&node.id.0);
        out.extend_from_slice(&addr.ip().octets());
        out.extend_from_slice(&addr.port().to_be_bytes());
    }
    out
}

/// Pack IPv6 nodes into the compact table carried in the `n6` argument.
pub fn pack_nodes6(nodes: &[Node]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * NODE6_LEN);
    for node in nodes {
        let Some(SocketAddr::V6(addr)) = node.addr.as_socket_addr() else {
            continue;
        };
        out.extend_from_slice(&node.id.0);
        out.extend_from_slice(&addr.ip().octets());
        out.extend_from_slice(&addr.port().to_be_bytes());
    }
    out
}

/// Decode a packed IPv4 node table. A trailing partial entry is ignored.
pub fn unpack_nodes4(blob: &[u8]) -> Vec<Node> {
    blob.chunks_exact(NODE4_LEN)
        .filter_map(|chunk| {
            let id = InfoHash::from_bytes(&chunk[..InfoHash::LEN])?;
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&chunk[20..24]);
            let port = u16::from_be_bytes([chunk[24], chunk[25]]);
            Some(Node {
                id,
                addr: SocketAddr::new(IpAddr::V4(octets.into()), port).into(),
            })
        })
        .collect()
}

/// Decode a packed IPv6 node table. A trailing partial entry is ignored.
pub fn unpack_nodes6(blob: &[u8]) -> Vec<Node> {
    blob.chunks_exact(NODE6_LEN)
        .filter_map(|chunk| {
            let id = InfoHash::from_bytes(&chunk[..InfoHash::LEN])?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&chunk[20..36]);
            let port = u16::from_be_bytes([chunk[36], chunk[37]]);
            Some(Node {
                id,
                addr: SocketAddr::new(IpAddr::V6(octets.into()), port).into(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node4(byte: u8, port: u16) -> Node {
        Node {
            id: InfoHash([byte; 20]),
            addr: SocketAddr::new(IpAddr::V4([10, 0, 0, byte].into()), port).into(),
        }
    }

    #[test]
    fn nodes4_roundtrip() {
        let nodes = vec![node4(1, 7000), node4(2, 7001)];
        let packed = pack_nodes4(&nodes);
        assert_eq!(packed.len(), 2 * NODE4_LEN);
        assert_eq!(unpack_nodes4(&packed), nodes);
    }

    #[test]
    fn nodes6_roundtrip() {
        let nodes = vec![Node {
            id: InfoHash([9u8; 20]),
            addr: SocketAddr::new("fe80::1".parse::<IpAddr>().expect("valid ip"), 4222).into(),
        }];
        let packed = pack_nodes6(&nodes);
        assert_eq!(packed.len(), NODE6_LEN);
        assert_eq!(unpack_nodes6(&packed), nodes);
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let mut packed = pack_nodes4(&[node4(1, 7000)]);
        packed.extend_from_slice(&[0xFF; 5]);
        assert_eq!(unpack_nodes4(&packed).len(), 1);
    }

    #[test]
    fn mixed_families_are_filtered_on_pack() {
        let nodes = vec![
            node4(1, 7000),
            Node {
                id: InfoHash([2u8; 20]),
                addr: SocketAddr::new("::1".parse::<IpAddr>().expect("valid ip"), 7001).into(),
            },
            Node { id: InfoHash([3u8; 20]), addr: SockAddr::UNSET },
        ];
        assert_eq!(pack_nodes4(&nodes).len(), NODE4_LEN);
        assert_eq!(pack_nodes6(&nodes).len(), NODE6_LEN);
    }
}
