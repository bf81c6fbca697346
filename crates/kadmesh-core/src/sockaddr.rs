// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Address family of a [`SockAddr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Ipv4,
    Ipv6,
}

/// A peer endpoint that may be unset (no family). Messages embed peer
/// addresses as raw address bytes without a port, so an address built from
/// the wire always carries port 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SockAddr {
    addr: Option<SocketAddr>,
}

impl SockAddr {
    pub const UNSET: SockAddr = SockAddr { addr: None };

    /// Build from raw address bytes as found on the wire: 4 bytes for an
    /// IPv4 `in_addr`, 16 for an IPv6 `in6_addr`, port set to 0. Any other
    /// length yields the unset address.
    pub fn from_ip_bytes(bytes: &[u8]) -> Self {
        match bytes.len() {
            4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(bytes);
                SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), 0).into()
            }
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), 0).into()
            }
            _ => Self::UNSET,
        }
    }

    pub fn is_set(&self) -> bool {
        self.addr.is_some()
    }

    pub fn family(&self) -> Option<Family> {
        match self.addr? {
            SocketAddr::V4(_) => Some(Family::Ipv4),
            SocketAddr::V6(_) => Some(Family::Ipv6),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.map(|addr| addr.port()).unwrap_or(0)
    }

    pub fn set_port(&mut self, port: u16) {
        if let Some(addr) = &mut self.addr {
            addr.set_port(port);
        }
    }

    /// Raw address bytes in wire form (4 or 16 bytes), `None` when unset.
    pub fn ip_bytes(&self) -> Option<Vec<u8>> {
        match self.addr?.ip() {
            IpAddr::V4(ip) => Some(ip.octets().to_vec()),
            IpAddr::V6(ip) => Some(ip.octets().to_vec()),
        }
    }

    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

impl From<SocketAddr> for SockAddr {
    fn from(addr: SocketAddr) -> Self {
        Self { addr: Some(addr) }
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            Some(addr) => addr.fmt(f),
            None => f.write_str("<unset>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_bytes_make_a_v4_address_with_port_zero() {
        let addr = SockAddr::from_ip_bytes(&[10, 0, 0, 1]);
        assert_eq!(addr.family(), Some(Family::Ipv4));
        assert_eq!(addr.port(), 0);
        assert_eq!(addr.ip_bytes().as_deref(), Some(&[10, 0, 0, 1][..]));
    }

    #[test]
    fn sixteen_bytes_make_a_v6_address() {
        let mut raw = [0u8; 16];
        raw[15] = 1;
        let addr = SockAddr::from_ip_bytes(&raw);
        assert_eq!(addr.family(), Some(Family::Ipv6));
        assert_eq!(addr.as_socket_addr().map(|a| a.ip()), Some("::1".parse().expect("valid ip")));
    }

    #[test]
    fn other_lengths_stay_unset() {
        assert!(!SockAddr::from_ip_bytes(&[1, 2, 3]).is_set());
        assert!(!SockAddr::from_ip_bytes(&[0u8; 7]).is_set());
        assert_eq!(SockAddr::from_ip_bytes(&[]).family(), None);
    }

    #[test]
    fn port_mutation() {
        let mut addr = SockAddr::from_ip_bytes(&[127, 0, 0, 1]);
        addr.set_port(4222);
        assert_eq!(addr.port(), 4222);

        let mut unset = SockAddr::UNSET;
        unset.set_port(4222);
        assert_eq!(unset.port(), 0);
    }
}
