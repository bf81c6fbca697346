// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;

    use crate::discovery::build_announcement;
    use crate::ids::InfoHash;
    use crate::message::{MessageType, ParsedMessage};
    use crate::node::{pack_nodes4, Node};

    const PROBE_HEX: &str = "a171";

    // map{ a: map{ id: bin20 }, q: "ping", t: 42, y: "q" }
    const PING_HEX: &str = concat!(
        "84",
        "a161",
        "81",
        "a26964",
        "c414",
        "1111111111111111111111111111111111111111",
        "a171",
        "a470696e67",
        "a174",
        "2a",
        "a179",
        "a171",
    );

    // 20-byte id + 10.0.0.1 + port 4222
    const NODE4_HEX: &str =
        concat!("1111111111111111111111111111111111111111", "0a000001", "107e");

    // map{ "svc": 7 }
    const ANNOUNCEMENT_HEX: &str = "81a373766307";

    #[test]
    fn probe_atom_vector() {
        let mut buf = Vec::new();
        rmp::encode::write_str(&mut buf, "q").expect("encode probe");
        assert_eq!(hex::encode(buf), PROBE_HEX);
    }

    #[test]
    fn ping_wire_vector() {
        let mut msg = ParsedMessage::new(MessageType::Ping);
        msg.sender_id = InfoHash([0x11; 20]);
        msg.tid = 42;

        let bytes = msg.to_bytes().expect("encode ping");
        assert_eq!(hex::encode(&bytes), PING_HEX);

        let back = ParsedMessage::from_bytes(&bytes).expect("decode ping");
        assert_eq!(back, msg);
    }

    #[test]
    fn packed_node_entry_vector() {
        let nodes = vec![Node {
            id: InfoHash([0x11; 20]),
            addr: "10.0.0.1:4222".parse::<SocketAddr>().expect("valid addr").into(),
        }];
        assert_eq!(hex::encode(pack_nodes4(&nodes)), NODE4_HEX);
    }

    #[test]
    fn announcement_vector() {
        let mut registry = BTreeMap::new();
        registry.insert("svc".to_owned(), vec![0x07]);
        assert_eq!(hex::encode(build_announcement(&registry)), ANNOUNCEMENT_HEX);
    }
}
