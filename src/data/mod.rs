// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Structured data attached to outputs
//!
//! A [`Schema`] describes the shape of the data a contract expects. It converts in-memory
//! [`Data`] values to and from their canonical binary form, and can validate either side on
//! its own:
//!
//! ```
//! use utxo_forge::data::{Data, Fields, Schema};
//!
//! let order = Schema::constructor(
//!     0,
//!     Fields::new()
//!         .field("owner", Schema::Bytes)
//!         .field("amounts", Schema::list(Schema::Integer)),
//! );
//!
//! let value = Data::record(vec![
//!     ("owner", Data::bytes(vec![0xab; 28])),
//!     ("amounts", Data::list(vec![Data::int(1), Data::int(2)])),
//! ]);
//! assert!(order.validate(&value));
//!
//! let binary = order.serialize(&value)?;
//! assert!(order.validate_binary(&binary));
//! assert_eq!(order.deserialize(&binary)?, value);
//! # Ok::<(), utxo_forge::data::Error>(())
//! ```
//!
//! Alternatives of [`Schema::AnyOf`] are resolved first-match: the first alternative that accepts
//! a value (or a binary shape) is the one used. Alternatives are expected to be mutually
//! exclusive, overlapping ones are not detected.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use malachite::Integer;

pub mod plutus;

pub use plutus::PlutusData;

/// Errors raised while converting data against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The in-memory value does not match the schema
    Serialization(String),
    /// The binary does not match the schema, or is not valid data at all
    Deserialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(err) => write!(f, "Serialization error: {}", err),
            Self::Deserialization(err) => write!(f, "Deserialization error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

/// In-memory structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Byte string
    Bytes(Vec<u8>),
    /// Arbitrary precision integer
    Integer(Integer),
    /// List of values
    List(Vec<Data>),
    /// Named fields of a constructor
    Record(BTreeMap<String, Data>),
}

impl Data {
    /// Integer value
    pub fn int<I: Into<Integer>>(value: I) -> Self {
        Data::Integer(value.into())
    }

    /// Byte string value
    pub fn bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Data::Bytes(bytes.into())
    }

    /// List value
    pub fn list(items: Vec<Data>) -> Self {
        Data::List(items)
    }

    /// Record value from `(name, value)` pairs
    pub fn record<'a, I: IntoIterator<Item = (&'a str, Data)>>(fields: I) -> Self {
        Data::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Convert a JSON value
    ///
    /// Strings must be hex and become bytes, numbers must be integers, arrays become lists and
    /// objects become records.
    pub fn from_json(json: &serde_json::Value) -> Result<Data, Error> {
        use serde_json::Value as Json;

        match json {
            Json::String(s) => hex::decode(s).map(Data::Bytes).map_err(|_| {
                Error::Serialization(format!("`{}` is not a hex byte string", s))
            }),
            Json::Number(n) => {
                if let Some(n) = n.as_u64() {
                    Ok(Data::int(n))
                } else if let Some(n) = n.as_i64() {
                    Ok(Data::int(n))
                } else {
                    Err(Error::Serialization(format!("`{}` is not an integer", n)))
                }
            }
            Json::Array(items) => items
                .iter()
                .map(Data::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Data::List),
            Json::Object(fields) => fields
                .iter()
                .map(|(name, value)| Ok((name.clone(), Data::from_json(value)?)))
                .collect::<Result<BTreeMap<_, _>, Error>>()
                .map(Data::Record),
            other => Err(Error::Serialization(format!(
                "`{}` cannot be represented as data",
                other
            ))),
        }
    }

    /// Inverse of [`Data::from_json`]
    ///
    /// Integers that do not fit 64 bits have no JSON number representation and are rejected.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        use serde_json::Value as Json;

        Ok(match self {
            Data::Bytes(bytes) => Json::String(hex::encode(bytes)),
            Data::Integer(int) => {
                if let Ok(n) = u64::try_from(int) {
                    Json::from(n)
                } else if let Ok(n) = i64::try_from(int) {
                    Json::from(n)
                } else {
                    return Err(Error::Serialization(format!(
                        "{} does not fit a JSON number",
                        int
                    )));
                }
            }
            Data::List(items) => Json::Array(
                items
                    .iter()
                    .map(Data::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Data::Record(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), value.to_json()?)))
                    .collect::<Result<serde_json::Map<_, _>, Error>>()?,
            ),
        })
    }
}

/// Ordered field layout of a constructor
///
/// The declaration order is the order fields are written on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields(Vec<(String, Schema)>);

impl Fields {
    /// Layout without fields
    pub fn new() -> Self {
        Fields::default()
    }

    /// Append a field
    pub fn field(mut self, name: &str, schema: Schema) -> Self {
        self.0.push((name.to_string(), schema));
        self
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the layout has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.0.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    fn validate(&self, value: &Data) -> bool {
        match value {
            Data::Record(record) => {
                record.len() == self.len()
                    && self.iter().all(|(name, schema)| {
                        record.get(name).map_or(false, |value| schema.validate(value))
                    })
            }
            _ => false,
        }
    }

    fn matches(&self, fields: &[PlutusData]) -> bool {
        fields.len() == self.len()
            && self
                .iter()
                .zip(fields)
                .all(|((_, schema), field)| schema.matches(field))
    }

    fn to_plutus(&self, tag: u64, value: &Data) -> Result<PlutusData, Error> {
        let record = match value {
            Data::Record(record) => record,
            _ => return Err(Error::Serialization("expected a record".into())),
        };
        if let Some(extra) = record
            .keys()
            .find(|name| self.iter().all(|(field, _)| field != name.as_str()))
        {
            return Err(Error::Serialization(format!("unexpected field `{}`", extra)));
        }

        let fields = self
            .iter()
            .map(|(name, schema)| match record.get(name) {
                Some(value) => schema.to_plutus(value),
                None => Err(Error::Serialization(format!("missing field `{}`", name))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PlutusData::Constr { tag, fields })
    }

    fn from_plutus(&self, fields: &[PlutusData]) -> Result<Data, Error> {
        if fields.len() != self.len() {
            return Err(Error::Deserialization(format!(
                "expected {} fields, found {}",
                self.len(),
                fields.len()
            )));
        }

        let record = self
            .iter()
            .zip(fields)
            .map(|((name, schema), field)| Ok((name.to_string(), schema.from_plutus(field)?)))
            .collect::<Result<BTreeMap<_, _>, Error>>()?;

        Ok(Data::Record(record))
    }
}

/// Shape of structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// Byte string
    Bytes,
    /// Arbitrary precision integer
    Integer,
    /// List whose elements all follow the inner schema
    List(Box<Schema>),
    /// Constructor with a fixed tag and field layout
    Constructor {
        /// Constructor index written on the wire
        tag: u64,
        /// Field layout
        fields: Fields,
    },
    /// First alternative that accepts the value
    AnyOf(Vec<Schema>),
    /// Constructor with a fixed tag and several possible field layouts
    TaggedAnyOf {
        /// Constructor index written on the wire
        tag: u64,
        /// Candidate layouts, in precedence order
        alternatives: Vec<Fields>,
    },
}

impl Schema {
    /// [`Schema::List`] of `item`
    pub fn list(item: Schema) -> Self {
        Schema::List(Box::new(item))
    }

    /// [`Schema::Constructor`]
    pub fn constructor(tag: u64, fields: Fields) -> Self {
        Schema::Constructor { tag, fields }
    }

    /// [`Schema::TaggedAnyOf`]
    pub fn tagged_any_of(tag: u64, alternatives: Vec<Fields>) -> Self {
        Schema::TaggedAnyOf { tag, alternatives }
    }

    /// Whether `value` has the shape of this schema
    pub fn validate(&self, value: &Data) -> bool {
        match (self, value) {
            (Schema::Bytes, Data::Bytes(_)) => true,
            (Schema::Integer, Data::Integer(_)) => true,
            (Schema::List(item), Data::List(items)) => items.iter().all(|v| item.validate(v)),
            (Schema::Constructor { fields, .. }, value) => fields.validate(value),
            (Schema::AnyOf(alternatives), value) => alternatives.iter().any(|s| s.validate(value)),
            (Schema::TaggedAnyOf { alternatives, .. }, value) => {
                alternatives.iter().any(|fields| fields.validate(value))
            }
            _ => false,
        }
    }

    /// Encode `value` into its canonical binary form
    pub fn serialize(&self, value: &Data) -> Result<Vec<u8>, Error> {
        Ok(self.to_plutus(value)?.to_cbor())
    }

    /// Decode a binary produced by [`Schema::serialize`]
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Data, Error> {
        self.from_plutus(&PlutusData::from_cbor(bytes)?)
    }

    /// Whether `bytes` is well-formed data with the shape of this schema
    pub fn validate_binary(&self, bytes: &[u8]) -> bool {
        PlutusData::from_cbor(bytes).map_or(false, |data| self.matches(&data))
    }

    /// Lower `value` into the untyped tree
    pub fn to_plutus(&self, value: &Data) -> Result<PlutusData, Error> {
        match (self, value) {
            (Schema::Bytes, Data::Bytes(bytes)) => Ok(PlutusData::Bytes(bytes.clone())),
            (Schema::Integer, Data::Integer(int)) => Ok(PlutusData::Integer(int.clone())),
            (Schema::List(item), Data::List(items)) => items
                .iter()
                .map(|v| item.to_plutus(v))
                .collect::<Result<Vec<_>, _>>()
                .map(PlutusData::List),
            (Schema::Constructor { tag, fields }, value) => fields.to_plutus(*tag, value),
            (Schema::AnyOf(alternatives), value) => alternatives
                .iter()
                .find(|s| s.validate(value))
                .ok_or_else(|| Error::Serialization("no alternative accepts the value".into()))?
                .to_plutus(value),
            (Schema::TaggedAnyOf { tag, alternatives }, value) => alternatives
                .iter()
                .find(|fields| fields.validate(value))
                .ok_or_else(|| Error::Serialization("no layout accepts the record".into()))?
                .to_plutus(*tag, value),
            (schema, value) => Err(Error::Serialization(format!(
                "expected {}, found {}",
                schema.kind(),
                value_kind(value)
            ))),
        }
    }

    /// Lift an untyped tree into a value of this schema
    pub fn from_plutus(&self, data: &PlutusData) -> Result<Data, Error> {
        match (self, data) {
            (Schema::Bytes, PlutusData::Bytes(bytes)) => Ok(Data::Bytes(bytes.clone())),
            (Schema::Integer, PlutusData::Integer(int)) => Ok(Data::Integer(int.clone())),
            (Schema::List(item), PlutusData::List(items)) => items
                .iter()
                .map(|d| item.from_plutus(d))
                .collect::<Result<Vec<_>, _>>()
                .map(Data::List),
            (
                Schema::Constructor { tag, fields },
                PlutusData::Constr {
                    tag: found,
                    fields: values,
                },
            ) => {
                check_tag(*tag, *found)?;
                fields.from_plutus(values)
            }
            (Schema::AnyOf(alternatives), data) => alternatives
                .iter()
                .find(|s| s.matches(data))
                .ok_or_else(|| {
                    Error::Deserialization("no alternative matches the binary".into())
                })?
                .from_plutus(data),
            (
                Schema::TaggedAnyOf { tag, alternatives },
                PlutusData::Constr {
                    tag: found,
                    fields: values,
                },
            ) => {
                check_tag(*tag, *found)?;
                alternatives
                    .iter()
                    .find(|fields| fields.matches(values))
                    .ok_or_else(|| {
                        Error::Deserialization("no layout matches the fields".into())
                    })?
                    .from_plutus(values)
            }
            (schema, data) => Err(Error::Deserialization(format!(
                "expected {}, found {}",
                schema.kind(),
                plutus_kind(data)
            ))),
        }
    }

    /// Whether the untyped tree has the shape of this schema
    pub fn matches(&self, data: &PlutusData) -> bool {
        match (self, data) {
            (Schema::Bytes, PlutusData::Bytes(_)) => true,
            (Schema::Integer, PlutusData::Integer(_)) => true,
            (Schema::List(item), PlutusData::List(items)) => items.iter().all(|d| item.matches(d)),
            (
                Schema::Constructor { tag, fields },
                PlutusData::Constr {
                    tag: found,
                    fields: values,
                },
            ) => tag == found && fields.matches(values),
            (Schema::AnyOf(alternatives), data) => alternatives.iter().any(|s| s.matches(data)),
            (
                Schema::TaggedAnyOf { tag, alternatives },
                PlutusData::Constr {
                    tag: found,
                    fields: values,
                },
            ) => tag == found && alternatives.iter().any(|fields| fields.matches(values)),
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Schema::Bytes => "bytes",
            Schema::Integer => "integer",
            Schema::List(_) => "list",
            Schema::Constructor { .. } | Schema::TaggedAnyOf { .. } => "constructor",
            Schema::AnyOf(_) => "any of",
        }
    }
}

fn check_tag(expected: u64, found: u64) -> Result<(), Error> {
    if expected != found {
        return Err(Error::Deserialization(format!(
            "expected constructor {}, found {}",
            expected, found
        )));
    }

    Ok(())
}

fn value_kind(value: &Data) -> &'static str {
    match value {
        Data::Bytes(_) => "bytes",
        Data::Integer(_) => "integer",
        Data::List(_) => "list",
        Data::Record(_) => "record",
    }
}

fn plutus_kind(data: &PlutusData) -> &'static str {
    match data {
        PlutusData::Constr { .. } => "constructor",
        PlutusData::Map(_) => "map",
        PlutusData::List(_) => "list",
        PlutusData::Integer(_) => "integer",
        PlutusData::Bytes(_) => "bytes",
    }
}
