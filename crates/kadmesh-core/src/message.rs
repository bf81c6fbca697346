// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DHT RPC codec: decode and serialize the Kademlia-style messages shared
//! with deployed nodes, including fragmented value transport. Field names
//! and shapes are a wire contract; nothing here may change without
//! breaking interop.

use std::collections::BTreeMap;

use log::warn;

use crate::ids::InfoHash;
use crate::msgpack as mp;
use crate::node::{unpack_nodes4, unpack_nodes6, Node};
use crate::sockaddr::SockAddr;
use crate::value::{FieldValueIndex, QueryFilter, Value, ValueField, MAX_VALUE_SIZE};

// Envelope keys.
const KEY_Y: &str = "y";
const KEY_REPLY: &str = "r";
const KEY_UPDATE: &str = "u";
const KEY_ERROR: &str = "e";
const KEY_PARTS: &str = "p";
const KEY_TID: &str = "t";
const KEY_UA: &str = "v";
const KEY_NETID: &str = "n";
const KEY_IS_CLIENT: &str = "s";
const KEY_QUERY: &str = "q";
const KEY_ARGS: &str = "a";

// Argument keys.
const KEY_REQ_SID: &str = "sid";
const KEY_REQ_ID: &str = "id";
const KEY_REQ_HASH: &str = "h";
const KEY_REQ_TARGET: &str = "target";
const KEY_REQ_QUERY: &str = "q";
const KEY_REQ_TOKEN: &str = "token";
const KEY_REQ_VALUE_ID: &str = "vid";
const KEY_REQ_NODES4: &str = "n4";
const KEY_REQ_NODES6: &str = "n6";
const KEY_REQ_CREATION: &str = "c";
const KEY_REQ_ADDRESS: &str = "sa";
const KEY_REQ_VALUES: &str = "values";
const KEY_REQ_EXPIRED: &str = "exp";
const KEY_REQ_REFRESHED: &str = "re";
/// Misspelled on the wire since the first deployment; emitted and accepted
/// verbatim.
const KEY_REQ_FIELDS: &str = "fileds";
const KEY_REQ_WANT: &str = "w";
const KEY_VERSION: &str = "ve";

// Fragment entry keys inside a value-data map.
const KEY_PART_OFFSET: &str = "o";
const KEY_PART_DATA: &str = "d";

// Query verbs.
const QUERY_PING: &str = "ping";
const QUERY_FIND: &str = "find";
const QUERY_GET: &str = "get";
const QUERY_PUT: &str = "put";
const QUERY_LISTEN: &str = "listen";
const QUERY_REFRESH: &str = "refresh";
const QUERY_UPDATE: &str = "update";

/// Address families as they appear in the `w` argument.
pub const AF_INET: u64 = 2;
pub const AF_INET6: u64 = 10;

/// Request IPv4 node results.
pub const WANT4: u8 = 1;
/// Request IPv6 node results.
pub const WANT6: u8 = 2;

/// Sentinel for a creation time the sender did not report (seconds since
/// the epoch, saturated to the far future).
pub const CREATED_UNSET: i64 = i64::MAX;

/// Fatal parse failures: the datagram is dropped. Per-entry value decode
/// problems are logged and skipped instead; the message still parses.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(&'static str),
}

use MessageError::Malformed;

/// The message kinds sharing the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Error,
    Reply,
    Ping,
    FindNode,
    GetValues,
    AnnounceValue,
    Refresh,
    Listen,
    UpdateValue,
    ValueData,
    ValueUpdate,
}

impl MessageType {
    /// Wire verb for query kinds, `None` for the others.
    pub fn query_verb(self) -> Option<&'static str> {
        match self {
            MessageType::Ping => Some(QUERY_PING),
            MessageType::FindNode => Some(QUERY_FIND),
            MessageType::GetValues => Some(QUERY_GET),
            MessageType::AnnounceValue => Some(QUERY_PUT),
            MessageType::Listen => Some(QUERY_LISTEN),
            MessageType::Refresh => Some(QUERY_REFRESH),
            MessageType::UpdateValue => Some(QUERY_UPDATE),
            _ => None,
        }
    }
}

/// A transaction id arrives either as a non-negative integer or as exactly
/// four bytes in network order.
fn unpack_tid(obj: &mp::Value) -> Result<u32, MessageError> {
    if let Some(n) = obj.as_u64() {
        u32::try_from(n).map_err(|_| Malformed("transaction id out of range"))
    } else if let Some(raw) = mp::as_blob(obj) {
        let bytes: [u8; 4] = raw
            .as_slice()
            .try_into()
            .map_err(|_| Malformed("transaction id must be 4 bytes"))?;
        Ok(u32::from_be_bytes(bytes))
    } else {
        Err(Malformed("bad transaction id"))
    }
}

fn unpack_hash(obj: &mp::Value) -> Result<InfoHash, MessageError> {
    mp::as_blob(obj)
        .as_deref()
        .and_then(InfoHash::from_bytes)
        .ok_or(Malformed("bad hash"))
}

fn unpack_id_list(obj: &mp::Value) -> Result<Vec<u64>, MessageError> {
    let mp::Value::Array(items) = obj else {
        return Err(Malformed("id list must be an array"));
    };
    items
        .iter()
        .map(|item| item.as_u64().ok_or(Malformed("bad id list entry")))
        .collect()
}

/// A decoded DHT datagram.
///
/// Exactly one kind is selected per message. For a `ValueData` message
/// `value_parts` carries the raw `(offset, chunk)` pairs off the wire;
/// for every other kind it carries reassembly slots
/// `(declared total, buffer)` registered by integer entries in the
/// `values` argument. A message is not mutated further once
/// [`ParsedMessage::complete`] has returned true.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub kind: MessageType,
    /// Node id of the sender (zero when omitted).
    pub sender_id: InfoHash,
    /// Network id; 0 is the default network.
    pub network: u32,
    /// Sender identifies itself as a client-only node.
    pub is_client: bool,
    /// Hash for which values are requested or announced.
    pub info_hash: InfoHash,
    /// Target id around which to find nodes.
    pub target: InfoHash,
    pub tid: u32,
    /// Sub-identifier for packets flowing through a streaming socket.
    pub socket_id: u32,
    pub token: Vec<u8>,
    pub value_id: u64,
    /// Seconds since the epoch; [`CREATED_UNSET`] when the sender did not
    /// say.
    pub created: i64,
    /// Packed node tables, opaque at this layer; see
    /// [`ParsedMessage::nodes4`].
    pub nodes4_raw: Vec<u8>,
    pub nodes6_raw: Vec<u8>,
    pub values: Vec<Value>,
    pub refreshed_values: Vec<u64>,
    pub expired_values: Vec<u64>,
    pub fields: Vec<FieldValueIndex>,
    pub value_parts: BTreeMap<u32, (u32, Vec<u8>)>,
    pub query: QueryFilter,
    /// Requested families; `None` is the wire's "unset" sentinel.
    pub want: Option<u8>,
    pub error_code: u16,
    /// Sender's user-agent string.
    pub ua: String,
    pub version: i32,
    /// Address the sender reported; unset when absent or bogus.
    pub addr: SockAddr,
}

impl Default for ParsedMessage {
    fn default() -> Self {
        Self {
            kind: MessageType::Ping,
            sender_id: InfoHash::default(),
            network: 0,
            is_client: false,
            info_hash: InfoHash::default(),
            target: InfoHash::default(),
            tid: 0,
            socket_id: 0,
            token: Vec::new(),
            value_id: 0,
            created: CREATED_UNSET,
            nodes4_raw: Vec::new(),
            nodes6_raw: Vec::new(),
            values: Vec::new(),
            refreshed_values: Vec::new(),
            expired_values: Vec::new(),
            fields: Vec::new(),
            value_parts: BTreeMap::new(),
            query: QueryFilter::default(),
            want: None,
            error_code: 0,
            ua: String::new(),
            version: 0,
            addr: SockAddr::UNSET,
        }
    }
}

impl ParsedMessage {
    pub fn new(kind: MessageType) -> Self {
        Self { kind, ..Default::default() }
    }

    /// Decode a datagram.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let obj = mp::read_value(bytes).map_err(|_| Malformed("not a msgpack value"))?;
        Self::from_msgpack(&obj)
    }

    pub fn from_msgpack(obj: &mp::Value) -> Result<Self, MessageError> {
        let mp::Value::Map(entries) = obj else {
            return Err(Malformed("top level is not a map"));
        };

        let mut msg = Self::default();
        let mut y = None;
        let mut reply = None;
        let mut update = None;
        let mut error = None;
        let mut parts = None;
        let mut args = None;
        let mut verb = None;

        for (key, val) in entries {
            let Some(key) = key.as_str() else { continue };
            match key {
                KEY_Y => y = Some(val),
                KEY_REPLY => reply = Some(val),
                KEY_UPDATE => update = Some(val),
                KEY_ERROR => error = Some(val),
                KEY_PARTS => parts = Some(val),
                KEY_TID => msg.tid = unpack_tid(val)?,
                KEY_UA => msg.ua = val.as_str().ok_or(Malformed("v must be a string"))?.to_owned(),
                KEY_NETID => {
                    msg.network = val
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or(Malformed("n must be a u32"))?
                }
                KEY_IS_CLIENT => {
                    msg.is_client = val.as_bool().ok_or(Malformed("s must be a bool"))?
                }
                KEY_QUERY => verb = Some(val.as_str().ok_or(Malformed("q must be a string"))?),
                KEY_ARGS => args = Some(val),
                _ => {}
            }
        }

        // Kind discrimination, first match wins.
        msg.kind = if error.is_some() {
            MessageType::Error
        } else if reply.is_some() {
            MessageType::Reply
        } else if parts.is_some() {
            MessageType::ValueData
        } else if update.is_some() {
            MessageType::ValueUpdate
        } else {
            if let Some(y) = y {
                if y.as_str() != Some("q") {
                    return Err(Malformed("y must be \"q\" on queries"));
                }
            }
            match verb {
                Some(QUERY_PING) => MessageType::Ping,
                Some(QUERY_FIND) => MessageType::FindNode,
                Some(QUERY_GET) => MessageType::GetValues,
                Some(QUERY_LISTEN) => MessageType::Listen,
                Some(QUERY_PUT) => MessageType::AnnounceValue,
                Some(QUERY_REFRESH) => MessageType::Refresh,
                Some(QUERY_UPDATE) => MessageType::UpdateValue,
                _ => return Err(Malformed("no message kind")),
            }
        };

        if msg.kind == MessageType::ValueData {
            let Some(mp::Value::Map(part_entries)) = parts else {
                return Err(Malformed("p must be a map"));
            };
            for (key, val) in part_entries {
                let index = key
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or(Malformed("bad fragment index"))?;
                let (Some(off), Some(dat)) = (
                    mp::find_map_value(val, KEY_PART_OFFSET),
                    mp::find_map_value(val, KEY_PART_DATA),
                ) else {
                    continue;
                };
                let offset = off
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or(Malformed("bad fragment offset"))?;
                let chunk = mp::as_blob(dat).ok_or(Malformed("bad fragment data"))?;
                msg.value_parts.entry(index).or_insert((offset, chunk));
            }
            return Ok(msg);
        }

        // Arguments live under the first of a/r/u; an error-only message
        // has nothing else to read.
        let req = args
            .or(reply)
            .or(update)
            .or(error)
            .ok_or(Malformed("no argument map"))?;

        if let Some(err) = error {
            let mp::Value::Array(items) = err else {
                return Err(Malformed("e must be an array"));
            };
            msg.error_code = items
                .first()
                .and_then(|item| item.as_u64())
                .and_then(|code| u16::try_from(code).ok())
                .ok_or(Malformed("bad error code"))?;
        }

        let mut values_obj = None;
        let mut fields_obj = None;
        let mut sa_obj = None;
        let mut want_obj = None;

        if let mp::Value::Map(req_entries) = req {
            for (key, val) in req_entries {
                let Some(key) = key.as_str() else { continue };
                match key {
                    KEY_REQ_SID => msg.socket_id = unpack_tid(val)?,
                    KEY_REQ_ID => msg.sender_id = unpack_hash(val)?,
                    KEY_REQ_HASH => msg.info_hash = unpack_hash(val)?,
                    KEY_REQ_TARGET => msg.target = unpack_hash(val)?,
                    KEY_REQ_QUERY => {
                        msg.query = QueryFilter::from_msgpack(val)
                            .map_err(|_| Malformed("bad query filter"))?
                    }
                    KEY_REQ_TOKEN => {
                        msg.token = mp::as_blob(val).ok_or(Malformed("token must be bytes"))?
                    }
                    KEY_REQ_VALUE_ID => {
                        msg.value_id = val.as_u64().ok_or(Malformed("bad value id"))?
                    }
                    KEY_REQ_NODES4 => {
                        msg.nodes4_raw = mp::as_blob(val).ok_or(Malformed("n4 must be bytes"))?
                    }
                    KEY_REQ_NODES6 => {
                        msg.nodes6_raw = mp::as_blob(val).ok_or(Malformed("n6 must be bytes"))?
                    }
                    KEY_REQ_CREATION => {
                        msg.created = val.as_i64().ok_or(Malformed("bad creation time"))?
                    }
                    KEY_REQ_ADDRESS => sa_obj = Some(val),
                    KEY_REQ_VALUES => values_obj = Some(val),
                    KEY_REQ_EXPIRED => msg.expired_values = unpack_id_list(val)?,
                    KEY_REQ_REFRESHED => msg.refreshed_values = unpack_id_list(val)?,
                    KEY_REQ_FIELDS => fields_obj = Some(val),
                    KEY_REQ_WANT => want_obj = Some(val),
                    KEY_VERSION => {
                        msg.version = val
                            .as_i64()
                            .and_then(|n| i32::try_from(n).ok())
                            .ok_or(Malformed("bad version"))?
                    }
                    _ => {}
                }
            }
        }

        if let Some(sa) = sa_obj {
            let mp::Value::Binary(raw) = sa else {
                return Err(Malformed("sa must be binary"));
            };
            // Lengths other than 4 and 16 leave the address unset.
            msg.addr = SockAddr::from_ip_bytes(raw);
        }

        if let Some(values) = values_obj {
            let mp::Value::Array(items) = values else {
                return Err(Malformed("values must be an array"));
            };
            for (position, item) in items.iter().enumerate() {
                if let Some(declared) = item.as_u64() {
                    // An integer entry declares a fragmented value's total
                    // size; a small margin covers header overhead.
                    if declared > (MAX_VALUE_SIZE + 32) as u64 {
                        continue;
                    }
                    msg.value_parts
                        .entry(position as u32)
                        .or_insert((declared as u32, Vec::new()));
                } else {
                    match Value::from_msgpack(item) {
                        Ok(value) => msg.values.push(value),
                        Err(err) => warn!("skipping unreadable value: {err}"),
                    }
                }
            }
        } else if let Some(fields) = fields_obj {
            let Some(raw_fields) = mp::find_map_value(fields, "f") else {
                return Err(Malformed("fileds lacks f"));
            };
            let mp::Value::Array(raw_fields) = raw_fields else {
                return Err(Malformed("f must be an array"));
            };
            let mut selected = Vec::new();
            for field in raw_fields {
                let raw = field.as_u64().ok_or(Malformed("bad field id"))?;
                if let Some(field) = ValueField::from_wire(raw) {
                    selected.push(field);
                }
            }
            if !selected.is_empty() {
                if let Some(raw_values) = mp::find_map_value(fields, "v") {
                    let mp::Value::Array(raw_values) = raw_values else {
                        return Err(Malformed("v must be an array"));
                    };
                    let strides = raw_values.len() / selected.len();
                    for stride in 0..strides {
                        match FieldValueIndex::from_stride(
                            &selected,
                            raw_values,
                            stride * selected.len(),
                        ) {
                            Ok(projection) => msg.fields.push(projection),
                            Err(err) => warn!("skipping unreadable field projection: {err}"),
                        }
                    }
                }
            }
        }

        if let Some(want) = want_obj {
            let mp::Value::Array(families) = want else {
                return Err(Malformed("w must be an array"));
            };
            let mut mask = 0u8;
            for family in families {
                match family.as_u64() {
                    Some(AF_INET) => mask |= WANT4,
                    Some(AF_INET6) => mask |= WANT6,
                    // Unknown families are ignored.
                    _ => {}
                }
            }
            msg.want = Some(mask);
        }

        Ok(msg)
    }

    /// Decode the packed IPv4 node table carried in `n4`.
    pub fn nodes4(&self) -> Vec<Node> {
        unpack_nodes4(&self.nodes4_raw)
    }

    /// Decode the packed IPv6 node table carried in `n6`.
    pub fn nodes6(&self) -> Vec<Node> {
        unpack_nodes6(&self.nodes6_raw)
    }

    /// Fold the fragments of a `ValueData` block into this message's
    /// reassembly slots.
    ///
    /// A chunk lands only when its offset equals the slot's current length
    /// and the slot is not yet full; anything else is dropped. Returns true
    /// iff at least one byte of any slot advanced.
    pub fn append(&mut self, block: &ParsedMessage) -> bool {
        let mut advanced = false;
        for (index, (offset, chunk)) in &block.value_parts {
            let Some((total, buffer)) = self.value_parts.get_mut(index) else {
                continue;
            };
            if buffer.len() >= *total as usize {
                continue;
            }
            // TODO: keep a gap map so late-but-valid fragments survive
            // reordering instead of forcing a retransmit
            if *offset as usize != buffer.len() {
                continue;
            }
            let remaining = *total as usize - buffer.len();
            let take = chunk.len().min(remaining);
            if take == 0 {
                continue;
            }
            buffer.extend_from_slice(&chunk[..take]);
            advanced = true;
        }
        advanced
    }

    /// True once every slot's buffer reached its declared total. On
    /// completion each buffer is decoded as a self-contained value,
    /// appended to [`values`](Self::values), and its slot consumed;
    /// polling again stays true without re-appending. Undecodable buffers
    /// are logged and skipped.
    pub fn complete(&mut self) -> bool {
        for (total, buffer) in self.value_parts.values() {
            if *total as usize > buffer.len() {
                return false;
            }
        }
        for (index, (_, buffer)) in std::mem::take(&mut self.value_parts) {
            match Value::from_bytes(&buffer) {
                Ok(value) => self.values.push(value),
                Err(err) => warn!("skipping unreadable reassembled value {index}: {err}"),
            }
        }
        true
    }

    /// Serialize the message: the inverse of [`ParsedMessage::from_bytes`]
    /// for every field the codec recognizes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(mp::write_value(&self.to_msgpack())?)
    }

    pub fn to_msgpack(&self) -> mp::Value {
        let mut envelope: Vec<(mp::Value, mp::Value)> = Vec::new();
        match self.kind {
            MessageType::Error => envelope.push((
                mp::Value::from(KEY_ERROR),
                mp::Value::Array(vec![mp::Value::from(self.error_code)]),
            )),
            MessageType::Reply => {
                envelope.push((mp::Value::from(KEY_REPLY), self.args_to_msgpack()))
            }
            MessageType::ValueUpdate => {
                envelope.push((mp::Value::from(KEY_UPDATE), self.args_to_msgpack()))
            }
            MessageType::ValueData => {
                envelope.push((mp::Value::from(KEY_PARTS), self.parts_to_msgpack()))
            }
            _ => {
                envelope.push((mp::Value::from(KEY_ARGS), self.args_to_msgpack()));
                if let Some(verb) = self.kind.query_verb() {
                    envelope.push((mp::Value::from(KEY_QUERY), mp::Value::from(verb)));
                }
            }
        }
        envelope.push((mp::Value::from(KEY_TID), mp::Value::from(self.tid)));
        if self.kind.query_verb().is_some() {
            envelope.push((mp::Value::from(KEY_Y), mp::Value::from("q")));
        }
        if !self.ua.is_empty() {
            envelope.push((mp::Value::from(KEY_UA), mp::Value::from(self.ua.as_str())));
        }
        if self.network != 0 {
            envelope.push((mp::Value::from(KEY_NETID), mp::Value::from(self.network)));
        }
        if self.is_client {
            envelope.push((mp::Value::from(KEY_IS_CLIENT), mp::Value::from(true)));
        }
        mp::Value::Map(envelope)
    }

    fn args_to_msgpack(&self) -> mp::Value {
        let mut args: Vec<(mp::Value, mp::Value)> = Vec::new();
        if self.socket_id != 0 {
            args.push((mp::Value::from(KEY_REQ_SID), mp::Value::from(self.socket_id)));
        }
        if !self.sender_id.is_zero() {
            args.push((
                mp::Value::from(KEY_REQ_ID),
                mp::Value::Binary(self.sender_id.0.to_vec()),
            ));
        }
        if !self.info_hash.is_zero() {
            args.push((
                mp::Value::from(KEY_REQ_HASH),
                mp::Value::Binary(self.info_hash.0.to_vec()),
            ));
        }
        if !self.target.is_zero() {
            args.push((
                mp::Value::from(KEY_REQ_TARGET),
                mp::Value::Binary(self.target.0.to_vec()),
            ));
        }
        if !self.query.is_empty() {
            args.push((mp::Value::from(KEY_REQ_QUERY), self.query.to_msgpack()));
        }
        if !self.token.is_empty() {
            args.push((
                mp::Value::from(KEY_REQ_TOKEN),
                mp::Value::Binary(self.token.clone()),
            ));
        }
        if self.value_id != 0 {
            args.push((mp::Value::from(KEY_REQ_VALUE_ID), mp::Value::from(self.value_id)));
        }
        if !self.nodes4_raw.is_empty() {
            args.push((
                mp::Value::from(KEY_REQ_NODES4),
                mp::Value::Binary(self.nodes4_raw.clone()),
            ));
        }
        if !self.nodes6_raw.is_empty() {
            args.push((
                mp::Value::from(KEY_REQ_NODES6),
                mp::Value::Binary(self.nodes6_raw.clone()),
            ));
        }
        if self.created != CREATED_UNSET {
            args.push((mp::Value::from(KEY_REQ_CREATION), mp::Value::from(self.created)));
        }
        if let Some(raw) = self.addr.ip_bytes() {
            args.push((mp::Value::from(KEY_REQ_ADDRESS), mp::Value::Binary(raw)));
        }
        if !self.values.is_empty() || !self.value_parts.is_empty() {
            args.push((mp::Value::from(KEY_REQ_VALUES), self.values_to_msgpack()));
        }
        if !self.expired_values.is_empty() {
            args.push((
                mp::Value::from(KEY_REQ_EXPIRED),
                mp::Value::Array(self.expired_values.iter().map(|id| mp::Value::from(*id)).collect()),
            ));
        }
        if !self.refreshed_values.is_empty() {
            args.push((
                mp::Value::from(KEY_REQ_REFRESHED),
                mp::Value::Array(
                    self.refreshed_values.iter().map(|id| mp::Value::from(*id)).collect(),
                ),
            ));
        }
        if !self.fields.is_empty() {
            args.push((mp::Value::from(KEY_REQ_FIELDS), self.fields_to_msgpack()));
        }
        if let Some(mask) = self.want {
            let mut families = Vec::new();
            if mask & WANT4 != 0 {
                families.push(mp::Value::from(AF_INET));
            }
            if mask & WANT6 != 0 {
                families.push(mp::Value::from(AF_INET6));
            }
            args.push((mp::Value::from(KEY_REQ_WANT), mp::Value::Array(families)));
        }
        if self.version != 0 {
            args.push((mp::Value::from(KEY_VERSION), mp::Value::from(self.version)));
        }
        mp::Value::Map(args)
    }

    /// Declared fragment totals keep their slot index; decoded values fill
    /// the remaining positions.
    fn values_to_msgpack(&self) -> mp::Value {
        let count = self.values.len() + self.value_parts.len();
        let mut out = Vec::with_capacity(count);
        let mut values = self.values.iter();
        for position in 0..count as u32 {
            if let Some((declared, _)) = self.value_parts.get(&position) {
                out.push(mp::Value::from(*declared));
            } else if let Some(value) = values.next() {
                out.push(value.to_msgpack());
            }
        }
        mp::Value::Array(out)
    }

    fn parts_to_msgpack(&self) -> mp::Value {
        mp::Value::Map(
            self.value_parts
                .iter()
                .map(|(index, (offset, chunk))| {
                    (
                        mp::Value::from(*index),
                        mp::Value::Map(vec![
                            (mp::Value::from(KEY_PART_OFFSET), mp::Value::from(*offset)),
                            (mp::Value::from(KEY_PART_DATA), mp::Value::Binary(chunk.clone())),
                        ]),
                    )
                })
                .collect(),
        )
    }

    fn fields_to_msgpack(&self) -> mp::Value {
        let selected: Vec<ValueField> = self
            .fields
            .first()
            .map(|projection| projection.index.keys().copied().collect())
            .unwrap_or_default();
        let mut flat = Vec::new();
        for projection in &self.fields {
            projection.push_stride(&selected, &mut flat);
        }
        mp::Value::Map(vec![
            (
                mp::Value::from("f"),
                mp::Value::Array(selected.iter().map(|f| mp::Value::from(f.to_wire())).collect()),
            ),
            (mp::Value::from("v"), mp::Value::Array(flat)),
        ])
    }
}
