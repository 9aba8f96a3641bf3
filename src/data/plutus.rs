// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Canonical binary form of structured data
//!
//! [`PlutusData`] is the untyped tree every schema value lowers to. It maps one to one onto the
//! CBOR encoding contracts read on chain:
//!
//! | tree                  | encoding                                                   |
//! |-----------------------|------------------------------------------------------------|
//! | `Integer`             | major type 0/1, or tag 2/3 over big-endian bytes           |
//! | `Bytes`               | byte string, chunked in 64-byte pieces when longer         |
//! | `List`                | definite array                                             |
//! | `Map`                 | definite map                                               |
//! | `Constr { tag, .. }`  | tag 121+i (i < 7), 1280+i-7 (i < 128), else tag 102 [i, ..] |

use std::convert::{Infallible, TryFrom};

use malachite::base::num::arithmetic::traits::{DivRem, UnsignedAbs};
use malachite::{Integer, Natural};
use minicbor::data::{Int, Tag, Type};
use minicbor::{Decoder, Encoder};

use super::Error;

const CHUNK_SIZE: usize = 64;
/// Deepest nesting of lists, maps and constructors accepted when decoding
pub const MAX_DEPTH: usize = 256;

const TAG_POSITIVE_BIGNUM: u64 = 2;
const TAG_NEGATIVE_BIGNUM: u64 = 3;
const TAG_GENERAL_CONSTR: u64 = 102;
const TAG_COMPACT_CONSTR: u64 = 121;
const TAG_EXTENDED_CONSTR: u64 = 1280;

/// Untyped structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    /// Constructor application
    Constr {
        /// Constructor index
        tag: u64,
        /// Arguments in declaration order
        fields: Vec<PlutusData>,
    },
    /// Key/value pairs in encoding order
    Map(Vec<(PlutusData, PlutusData)>),
    /// Homogeneous or heterogeneous list
    List(Vec<PlutusData>),
    /// Arbitrary precision integer
    Integer(Integer),
    /// Byte string
    Bytes(Vec<u8>),
}

type Enc = Encoder<Vec<u8>>;
type EncodeResult = Result<(), minicbor::encode::Error<Infallible>>;

impl PlutusData {
    /// Encode into the canonical binary form
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut e = Encoder::new(Vec::new());
        // writing into a `Vec` cannot fail
        let _ = self.encode(&mut e);
        e.into_writer()
    }

    /// Decode from binary, requiring the whole input to be consumed
    pub fn from_cbor(bytes: &[u8]) -> Result<PlutusData, Error> {
        let mut d = Decoder::new(bytes);
        let data = decode(&mut d, 0)?;
        if d.position() != bytes.len() {
            return Err(Error::Deserialization(format!(
                "{} trailing bytes after data",
                bytes.len() - d.position()
            )));
        }

        Ok(data)
    }

    pub(crate) fn encode(&self, e: &mut Enc) -> EncodeResult {
        match self {
            PlutusData::Constr { tag, fields } => {
                if *tag < 7 {
                    e.tag(Tag::new(TAG_COMPACT_CONSTR + tag))?;
                } else if *tag < 128 {
                    e.tag(Tag::new(TAG_EXTENDED_CONSTR + tag - 7))?;
                } else {
                    e.tag(Tag::new(TAG_GENERAL_CONSTR))?;
                    e.array(2)?;
                    e.u64(*tag)?;
                }
                encode_list(e, fields)
            }
            PlutusData::Map(entries) => {
                e.map(entries.len() as u64)?;
                for (key, value) in entries {
                    key.encode(e)?;
                    value.encode(e)?;
                }
                Ok(())
            }
            PlutusData::List(items) => encode_list(e, items),
            PlutusData::Integer(int) => encode_integer(e, int),
            PlutusData::Bytes(bytes) => encode_bytes(e, bytes),
        }
    }
}

fn encode_list(e: &mut Enc, items: &[PlutusData]) -> EncodeResult {
    e.array(items.len() as u64)?;
    for item in items {
        item.encode(e)?;
    }
    Ok(())
}

fn encode_bytes(e: &mut Enc, bytes: &[u8]) -> EncodeResult {
    if bytes.len() <= CHUNK_SIZE {
        e.bytes(bytes)?;
        return Ok(());
    }

    e.begin_bytes()?;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        e.bytes(chunk)?;
    }
    e.end()?;
    Ok(())
}

fn encode_integer(e: &mut Enc, int: &Integer) -> EncodeResult {
    if let Ok(n) = u64::try_from(int) {
        e.u64(n)?;
        return Ok(());
    }

    // major type 1 reaches down to -2^64
    if let Some(n) = i128::try_from(int).ok().and_then(|n| Int::try_from(n).ok()) {
        e.int(n)?;
        return Ok(());
    }

    let (tag, magnitude) = if *int > Integer::from(0u32) {
        (TAG_POSITIVE_BIGNUM, int.clone().unsigned_abs())
    } else {
        (
            TAG_NEGATIVE_BIGNUM,
            int.clone().unsigned_abs() - Natural::from(1u32),
        )
    };
    e.tag(Tag::new(tag))?;
    encode_bytes(e, &natural_to_be_bytes(&magnitude))
}

pub(crate) fn natural_to_be_bytes(value: &Natural) -> Vec<u8> {
    let base = Natural::from(256u32);
    let zero = Natural::from(0u32);
    let mut digits = Vec::new();
    let mut current = value.clone();
    while current > zero {
        let (quotient, remainder) = current.div_rem(&base);
        digits.push(u64::try_from(&remainder).unwrap_or_default() as u8);
        current = quotient;
    }
    digits.reverse();
    digits
}

pub(crate) fn natural_from_be_bytes(bytes: &[u8]) -> Natural {
    let mut value = Natural::from(0u32);
    for byte in bytes {
        value *= Natural::from(256u32);
        value += Natural::from(*byte);
    }
    value
}

fn decode(d: &mut Decoder<'_>, depth: usize) -> Result<PlutusData, Error> {
    if depth >= MAX_DEPTH {
        return Err(Error::Deserialization(format!(
            "data nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    match d.datatype()? {
        Type::Tag => {
            let tag = d.tag()?.as_u64();
            match tag {
                TAG_POSITIVE_BIGNUM => {
                    let magnitude = natural_from_be_bytes(&decode_bytes(d)?);
                    Ok(PlutusData::Integer(Integer::from(magnitude)))
                }
                TAG_NEGATIVE_BIGNUM => {
                    let magnitude = natural_from_be_bytes(&decode_bytes(d)?);
                    Ok(PlutusData::Integer(
                        -Integer::from(magnitude + Natural::from(1u32)),
                    ))
                }
                121..=127 => Ok(PlutusData::Constr {
                    tag: tag - TAG_COMPACT_CONSTR,
                    fields: decode_list(d, depth)?,
                }),
                1280..=1400 => Ok(PlutusData::Constr {
                    tag: tag - TAG_EXTENDED_CONSTR + 7,
                    fields: decode_list(d, depth)?,
                }),
                TAG_GENERAL_CONSTR => {
                    if d.array()? != Some(2) {
                        return Err(Error::Deserialization(
                            "general constructor must be a pair".into(),
                        ));
                    }
                    let tag = d.u64()?;
                    Ok(PlutusData::Constr {
                        tag,
                        fields: decode_list(d, depth)?,
                    })
                }
                other => Err(Error::Deserialization(format!(
                    "unexpected tag {}",
                    other
                ))),
            }
        }
        Type::Map | Type::MapIndef => {
            let mut entries = Vec::new();
            match d.map()? {
                Some(len) => {
                    for _ in 0..len {
                        let key = decode(d, depth + 1)?;
                        entries.push((key, decode(d, depth + 1)?));
                    }
                }
                None => {
                    while !at_break(d)? {
                        let key = decode(d, depth + 1)?;
                        entries.push((key, decode(d, depth + 1)?));
                    }
                    skip_break(d);
                }
            }
            Ok(PlutusData::Map(entries))
        }
        Type::Array | Type::ArrayIndef => Ok(PlutusData::List(decode_list(d, depth)?)),
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => {
            Ok(PlutusData::Integer(Integer::from(d.u64()?)))
        }
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
            Ok(PlutusData::Integer(Integer::from(d.i64()?)))
        }
        Type::Int => {
            let int = d.int()?;
            Ok(PlutusData::Integer(Integer::from(i128::from(int))))
        }
        Type::Bytes | Type::BytesIndef => Ok(PlutusData::Bytes(decode_bytes(d)?)),
        other => Err(Error::Deserialization(format!(
            "unexpected {:?} in data",
            other
        ))),
    }
}

fn decode_list(d: &mut Decoder<'_>, depth: usize) -> Result<Vec<PlutusData>, Error> {
    let mut items = Vec::new();
    match d.array()? {
        Some(len) => {
            for _ in 0..len {
                items.push(decode(d, depth + 1)?);
            }
        }
        None => {
            while !at_break(d)? {
                items.push(decode(d, depth + 1)?);
            }
            skip_break(d);
        }
    }
    Ok(items)
}

fn decode_bytes(d: &mut Decoder<'_>) -> Result<Vec<u8>, Error> {
    match d.datatype()? {
        Type::BytesIndef => {
            let mut bytes = Vec::new();
            for chunk in d.bytes_iter()? {
                bytes.extend_from_slice(chunk?);
            }
            Ok(bytes)
        }
        Type::Bytes => Ok(d.bytes()?.to_vec()),
        other => Err(Error::Deserialization(format!(
            "expected bytes, found {:?}",
            other
        ))),
    }
}

fn at_break(d: &Decoder<'_>) -> Result<bool, Error> {
    Ok(matches!(d.datatype()?, Type::Break))
}

fn skip_break(d: &mut Decoder<'_>) {
    let position = d.position();
    d.set_position(position + 1);
}

impl From<minicbor::decode::Error> for Error {
    fn from(err: minicbor::decode::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
