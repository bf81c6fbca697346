// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::collections::BTreeMap;

use crate::ids::InfoHash;
use crate::msgpack as mp;

/// Largest payload a single value may carry.
pub const MAX_VALUE_SIZE: usize = 56 * 1024;

const KEY_ID: &str = "id";
const KEY_OWNER: &str = "own";
const KEY_USER_TYPE: &str = "ut";
const KEY_DATA: &str = "dat";

const KEY_SELECT: &str = "s";
const KEY_WHERE: &str = "w";

/// Failure decoding a value, field projection or query filter. These are
/// per-entry problems: the codec logs and skips the entry, the enclosing
/// message still parses.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("value is not a map")]
    NotAMap,
    #[error("value bytes are not a valid encoding")]
    Undecodable,
    #[error("value is missing required field {0:?}")]
    MissingField(&'static str),
    #[error("value field {0:?} has the wrong shape")]
    BadField(&'static str),
    #[error("value data exceeds {} bytes", MAX_VALUE_SIZE)]
    Oversize,
}

/// An opaque typed payload addressed by `(owner, id)`.
///
/// The routing layer owns the full value model (signatures, types,
/// policies); the codec only needs to carry values across the wire and
/// reassemble fragmented ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    pub id: u64,
    pub owner: Option<InfoHash>,
    pub user_type: String,
    pub data: Vec<u8>,
}

impl Value {
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        Self { id, data, ..Default::default() }
    }

    pub fn from_msgpack(obj: &mp::Value) -> Result<Self, ValueError> {
        if !matches!(obj, mp::Value::Map(_)) {
            return Err(ValueError::NotAMap);
        }
        let data = mp::find_map_value(obj, KEY_DATA)
            .and_then(mp::as_blob)
            .ok_or(ValueError::MissingField(KEY_DATA))?;
        if data.len() > MAX_VALUE_SIZE {
            return Err(ValueError::Oversize);
        }
        let id = match mp::find_map_value(obj, KEY_ID) {
            Some(raw) => raw.as_u64().ok_or(ValueError::BadField(KEY_ID))?,
            None => 0,
        };
        let owner = match mp::find_map_value(obj, KEY_OWNER) {
            Some(raw) => Some(
                mp::as_blob(raw)
                    .as_deref()
                    .and_then(InfoHash::from_bytes)
                    .ok_or(ValueError::BadField(KEY_OWNER))?,
            ),
            None => None,
        };
        let user_type = match mp::find_map_value(obj, KEY_USER_TYPE) {
            Some(raw) => raw
                .as_str()
                .ok_or(ValueError::BadField(KEY_USER_TYPE))?
                .to_owned(),
            None => String::new(),
        };
        Ok(Self { id, owner, user_type, data })
    }

    pub fn to_msgpack(&self) -> mp::Value {
        let mut entries = vec![(mp::Value::from(KEY_ID), mp::Value::from(self.id))];
        if let Some(owner) = self.owner {
            entries.push((mp::Value::from(KEY_OWNER), mp::Value::Binary(owner.0.to_vec())));
        }
        if !self.user_type.is_empty() {
            entries.push((mp::Value::from(KEY_USER_TYPE), mp::Value::from(self.user_type.as_str())));
        }
        entries.push((mp::Value::from(KEY_DATA), mp::Value::Binary(self.data.clone())));
        mp::Value::Map(entries)
    }

    /// Decode a self-contained value from its wire bytes (used when a
    /// reassembled fragment buffer completes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValueError> {
        let obj = mp::read_value(bytes).map_err(|_| ValueError::Undecodable)?;
        Self::from_msgpack(&obj)
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(mp::write_value(&self.to_msgpack())?)
    }
}

/// Standard value fields addressable by a query or field projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueField {
    Id = 1,
    ValueType = 2,
    OwnerPk = 3,
    SeqNum = 4,
    UserType = 5,
}

impl ValueField {
    pub fn from_wire(raw: u64) -> Option<Self> {
        match raw {
            1 => Some(Self::Id),
            2 => Some(Self::ValueType),
            3 => Some(Self::OwnerPk),
            4 => Some(Self::SeqNum),
            5 => Some(Self::UserType),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u64 {
        self as u64
    }
}

/// One decoded field value inside a [`FieldValueIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Id(u64),
    ValueType(u64),
    OwnerPk(InfoHash),
    SeqNum(u64),
    UserType(String),
}

impl FieldValue {
    pub fn to_msgpack(&self) -> mp::Value {
        match self {
            FieldValue::Id(v) | FieldValue::ValueType(v) | FieldValue::SeqNum(v) => {
                mp::Value::from(*v)
            }
            FieldValue::OwnerPk(hash) => mp::Value::Binary(hash.0.to_vec()),
            FieldValue::UserType(s) => mp::Value::from(s.as_str()),
        }
    }
}

/// Sparse projection of one value: the requested fields and their values
/// for a single stride of the field-projection argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValueIndex {
    pub index: BTreeMap<ValueField, FieldValue>,
}

impl FieldValueIndex {
    /// Decode one stride: `fields[k]` pairs with `values[offset + k]`.
    pub fn from_stride(
        fields: &[ValueField],
        values: &[mp::Value],
        offset: usize,
    ) -> Result<Self, ValueError> {
        let mut index = BTreeMap::new();
        for (k, field) in fields.iter().enumerate() {
            let obj = values.get(offset + k).ok_or(ValueError::BadField("v"))?;
            let decoded = match field {
                ValueField::Id => FieldValue::Id(obj.as_u64().ok_or(ValueError::BadField("id"))?),
                ValueField::ValueType => {
                    FieldValue::ValueType(obj.as_u64().ok_or(ValueError::BadField("type"))?)
                }
                ValueField::OwnerPk => FieldValue::OwnerPk(
                    mp::as_blob(obj)
                        .as_deref()
                        .and_then(InfoHash::from_bytes)
                        .ok_or(ValueError::BadField("owner"))?,
                ),
                ValueField::SeqNum => {
                    FieldValue::SeqNum(obj.as_u64().ok_or(ValueError::BadField("seq"))?)
                }
                ValueField::UserType => FieldValue::UserType(
                    obj.as_str().ok_or(ValueError::BadField("utype"))?.to_owned(),
                ),
            };
            index.insert(*field, decoded);
        }
        Ok(Self { index })
    }

    /// Append this projection's values for `fields`, in order. A field the
    /// projection lacks is emitted as nil; the receiving side then drops
    /// the whole stride.
    pub fn push_stride(&self, fields: &[ValueField], out: &mut Vec<mp::Value>) {
        for field in fields {
            match self.index.get(field) {
                Some(value) => out.push(value.to_msgpack()),
                None => out.push(mp::Value::Nil),
            }
        }
    }
}

/// A nested filter a peer applies before returning values: which fields to
/// project and which field/value pairs must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub select: Vec<ValueField>,
    pub filters: Vec<(ValueField, Vec<u8>)>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self.select.is_empty() && self.filters.is_empty()
    }

    pub fn from_msgpack(obj: &mp::Value) -> Result<Self, ValueError> {
        if !matches!(obj, mp::Value::Map(_)) {
            return Err(ValueError::NotAMap);
        }
        let mut filter = Self::default();
        if let Some(raw) = mp::find_map_value(obj, KEY_SELECT) {
            let mp::Value::Array(items) = raw else {
                return Err(ValueError::BadField(KEY_SELECT));
            };
            for item in items {
                let raw_field = item.as_u64().ok_or(ValueError::BadField(KEY_SELECT))?;
                // Unknown field numbers are skipped for forward compatibility.
                if let Some(field) = ValueField::from_wire(raw_field) {
                    filter.select.push(field);
                }
            }
        }
        if let Some(raw) = mp::find_map_value(obj, KEY_WHERE) {
            let mp::Value::Array(items) = raw else {
                return Err(ValueError::BadField(KEY_WHERE));
            };
            for item in items {
                let mp::Value::Array(pair) = item else {
                    return Err(ValueError::BadField(KEY_WHERE));
                };
                let (Some(field), Some(operand)) = (pair.first(), pair.get(1)) else {
                    return Err(ValueError::BadField(KEY_WHERE));
                };
                let raw_field = field.as_u64().ok_or(ValueError::BadField(KEY_WHERE))?;
                let operand = mp::as_blob(operand).ok_or(ValueError::BadField(KEY_WHERE))?;
                if let Some(field) = ValueField::from_wire(raw_field) {
                    filter.filters.push((field, operand));
                }
            }
        }
        Ok(filter)
    }

    pub fn to_msgpack(&self) -> mp::Value {
        let mut entries = Vec::new();
        if !self.select.is_empty() {
            entries.push((
                mp::Value::from(KEY_SELECT),
                mp::Value::Array(
                    self.select.iter().map(|f| mp::Value::from(f.to_wire())).collect(),
                ),
            ));
        }
        if !self.filters.is_empty() {
            entries.push((
                mp::Value::from(KEY_WHERE),
                mp::Value::Array(
                    self.filters
                        .iter()
                        .map(|(field, operand)| {
                            mp::Value::Array(vec![
                                mp::Value::from(field.to_wire()),
                                mp::Value::Binary(operand.clone()),
                            ])
                        })
                        .collect(),
                ),
            ));
        }
        mp::Value::Map(entries)
    }
}
