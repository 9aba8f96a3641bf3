// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::convert::TryFrom;
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::value::Value;

macro_rules! impl_hash_newtype {
    ( $name:ident, $len:expr, $doc:expr ) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of the hash in bytes
            pub const LEN: usize = $len;

            /// Return the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = Error;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                <[u8; $len]>::try_from(bytes).map($name).map_err(|_| {
                    Error::Generic(format!(
                        "Expected {} bytes for {}, found {}",
                        $len,
                        stringify!($name),
                        bytes.len()
                    ))
                })
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s)?;
                $name::try_from(bytes.as_slice())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $name::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hash_newtype!(TxHash, 32, "Hash of a transaction body");
impl_hash_newtype!(KeyHash, 28, "Hash of a verification key");
impl_hash_newtype!(PolicyId, 28, "Hash of a minting policy script");
impl_hash_newtype!(DatumHash, 32, "Hash of a datum");
impl_hash_newtype!(
    ScriptDataHash,
    32,
    "Hash binding the redeemers and cost models of a transaction to its body"
);

/// Network discriminant carried in the address header
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkId {
    /// Any test network
    Testnet = 0,
    /// The main network
    Mainnet = 1,
}

impl NetworkId {
    /// Return [`NetworkId`] as the nibble stored in address headers
    pub fn as_nibble(&self) -> u8 {
        match self {
            NetworkId::Testnet => 0,
            NetworkId::Mainnet => 1,
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Testnet => write!(f, "testnet"),
            NetworkId::Mainnet => write!(f, "mainnet"),
        }
    }
}

// header type nibbles with a key payment credential: base, base with script stake, pointer,
// enterprise
const KEY_PAYMENT_HEADERS: [u8; 4] = [0b0000, 0b0010, 0b0100, 0b0110];
const SCRIPT_PAYMENT_HEADERS: [u8; 4] = [0b0001, 0b0011, 0b0101, 0b0111];

/// A shelley-era address in its raw ledger encoding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(Vec<u8>);

impl Address {
    /// Wrap the raw bytes of an address
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::Generic("Empty address".into()));
        }

        Ok(Address(bytes))
    }

    /// Parse an address from its hex encoding
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        Address::from_bytes(hex::decode(s)?)
    }

    /// Enterprise address locked by a verification key
    pub fn enterprise(network: NetworkId, key_hash: &KeyHash) -> Self {
        let mut bytes = Vec::with_capacity(1 + KeyHash::LEN);
        bytes.push(0b0110_0000 | network.as_nibble());
        bytes.extend_from_slice(key_hash.as_bytes());
        Address(bytes)
    }

    /// Enterprise address locked by a script
    pub fn script(network: NetworkId, script_hash: &PolicyId) -> Self {
        let mut bytes = Vec::with_capacity(1 + PolicyId::LEN);
        bytes.push(0b0111_0000 | network.as_nibble());
        bytes.extend_from_slice(script_hash.as_bytes());
        Address(bytes)
    }

    /// Raw bytes of the address
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn header_type(&self) -> u8 {
        self.0[0] >> 4
    }

    /// Network the address belongs to
    pub fn network(&self) -> NetworkId {
        match self.0[0] & 0x0f {
            1 => NetworkId::Mainnet,
            _ => NetworkId::Testnet,
        }
    }

    /// Hash of the key that must sign to spend from this address, if it is key-locked
    pub fn payment_key_hash(&self) -> Option<KeyHash> {
        if !KEY_PAYMENT_HEADERS.contains(&self.header_type()) {
            return None;
        }

        self.0
            .get(1..1 + KeyHash::LEN)
            .and_then(|bytes| KeyHash::try_from(bytes).ok())
    }

    /// Whether spending from this address runs a script
    pub fn is_script(&self) -> bool {
        SCRIPT_PAYMENT_HEADERS.contains(&self.header_type())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Human readable part of a native asset identifier, at most 32 bytes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    /// Maximum length of an asset name in bytes
    pub const MAX_LEN: usize = 32;

    /// Create a new [`AssetName`], failing if it is longer than [`AssetName::MAX_LEN`]
    pub fn new(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() > Self::MAX_LEN {
            return Err(Error::Generic(format!(
                "Asset name too long: {} bytes",
                bytes.len()
            )));
        }

        Ok(AssetName(bytes))
    }

    /// Raw bytes of the name
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Serialize for AssetName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        AssetName::new(bytes).map_err(serde::de::Error::custom)
    }
}

/// Identifier of an asset: either the chain's base asset or a native asset
///
/// The base asset sorts before every native asset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetId {
    /// The base asset fees and deposits are paid in
    Base,
    /// A native asset minted under a policy
    Native {
        /// Minting policy
        policy: PolicyId,
        /// Name under the policy
        name: AssetName,
    },
}

impl AssetId {
    /// Shorthand for [`AssetId::Native`]
    pub fn native(policy: PolicyId, name: AssetName) -> Self {
        AssetId::Native { policy, name }
    }

    /// Whether this is the base asset
    pub fn is_base(&self) -> bool {
        matches!(self, AssetId::Base)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Base => write!(f, "base"),
            AssetId::Native { policy, name } => write!(f, "{}.{}", policy, name),
        }
    }
}

/// Reference to a transaction output
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutRef {
    /// Hash of the transaction that created the output
    pub tx_hash: TxHash,
    /// Position of the output in that transaction
    pub index: u32,
}

impl OutRef {
    /// Create a new [`OutRef`]
    pub fn new(tx_hash: TxHash, index: u32) -> Self {
        OutRef { tx_hash, index }
    }
}

impl fmt::Display for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

/// Data attached to an output
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DatumOption {
    /// Only the hash of the datum is stored on chain
    Hash(DatumHash),
    /// The encoded datum itself is stored on chain
    Inline(#[serde(with = "hex_bytes")] Vec<u8>),
}

/// An unspent transaction output.
///
/// Created by an external data source and consumed at most once as a transaction input. The
/// `spent` flag is informational, it is set by the source and never touched by this crate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Reference to the transaction output
    pub out_ref: OutRef,
    /// Owner of the output
    pub address: Address,
    /// Value held by the output
    pub value: Value,
    /// Attached data
    pub datum: Option<DatumOption>,
    /// Whether the source already saw the output spent
    #[serde(default)]
    pub spent: bool,
}

impl Utxo {
    /// Create an unspent output without datum
    pub fn new(out_ref: OutRef, address: Address, value: Value) -> Self {
        Utxo {
            out_ref,
            address,
            value,
            datum: None,
            spent: false,
        }
    }

    /// Attach a datum
    pub fn with_datum(mut self, datum: DatumOption) -> Self {
        self.datum = Some(datum);
        self
    }
}

/// Execution budget of a script
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExUnits {
    /// Memory units
    pub mem: u64,
    /// CPU steps
    pub steps: u64,
}

impl ExUnits {
    /// Create a new [`ExUnits`]
    pub const fn new(mem: u64, steps: u64) -> Self {
        ExUnits { mem, steps }
    }

    /// Whether both dimensions fit within `limit`
    pub fn fits(&self, limit: &ExUnits) -> bool {
        self.mem <= limit.mem && self.steps <= limit.steps
    }
}

impl Add for ExUnits {
    type Output = ExUnits;

    fn add(self, other: ExUnits) -> ExUnits {
        ExUnits {
            mem: self.mem.saturating_add(other.mem),
            steps: self.steps.saturating_add(other.steps),
        }
    }
}

/// Version of the script language
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// First version
    PlutusV1,
    /// Second version
    PlutusV2,
    /// Third version
    PlutusV3,
}

impl Default for Language {
    fn default() -> Self {
        Language::PlutusV2
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::PlutusV1 => write!(f, "PlutusV1"),
            Language::PlutusV2 => write!(f, "PlutusV2"),
            Language::PlutusV3 => write!(f, "PlutusV3"),
        }
    }
}

/// Argument handed to a script together with its execution budget
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    /// Structured data already encoded in its canonical binary form
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Budget granted to the script
    pub ex_units: ExUnits,
    /// Language of the script the redeemer is handed to
    #[serde(default)]
    pub language: Language,
}

impl Redeemer {
    /// Create a new [`Redeemer`] from encoded data, for a [`Language::PlutusV2`] script
    pub fn new(data: Vec<u8>, ex_units: ExUnits) -> Self {
        Redeemer {
            data,
            ex_units,
            language: Language::default(),
        }
    }

    /// Change the language of the script the redeemer is handed to
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
