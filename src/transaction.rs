// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Ledger transactions and their binary encoding
//!
//! Only the subset of the ledger format the builder produces is modelled: key and script
//! inputs, outputs with optional datum, minting, collateral, required signers, validity bounds
//! and spend/mint redeemers. The transaction hash is the Blake2b-256 digest of the encoded body.
//!
//! A body spending script inputs or running minting policies carries a [`ScriptDataHash`]: the
//! digest of its redeemers followed by the views of the cost models of every language involved.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;

use minicbor::data::Tag;
use minicbor::Encoder;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::params::CostModels;
use crate::types::{
    hex_bytes, Address, AssetId, AssetName, DatumOption, ExUnits, KeyHash, Language, OutRef,
    PolicyId, ScriptDataHash, TxHash,
};
use crate::value::Value;
use crate::wallet::utils::blake2b_256;

type Enc = Encoder<Vec<u8>>;

const TAG_ENCODED_DATA: u64 = 24;

/// Length of a verification key
pub const VKEY_LEN: usize = 32;
/// Length of a signature
pub const SIGNATURE_LEN: usize = 64;

/// Output of a transaction, as written on chain
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Owner of the output
    pub address: Address,
    /// Value locked in the output
    pub value: Value,
    /// Attached datum
    pub datum: Option<DatumOption>,
}

impl TxOut {
    /// Encode the output alone
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut e = Encoder::new(Vec::new());
        encode_output(&mut e, self)?;
        Ok(e.into_writer())
    }

    /// Size of the encoded output
    pub fn encoded_size(&self) -> Result<usize, Error> {
        Ok(self.to_bytes()?.len())
    }
}

/// Assets minted (positive) or burned (negative) by a transaction
pub type Mint = BTreeMap<PolicyId, BTreeMap<AssetName, i64>>;

/// Body of a transaction, the part covered by signatures
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionBody {
    /// Spent outputs, kept sorted
    pub inputs: Vec<OutRef>,
    /// Created outputs
    pub outputs: Vec<TxOut>,
    /// Fee paid to the chain
    pub fee: u64,
    /// First slot the transaction is no longer valid in
    pub ttl: Option<u64>,
    /// First slot the transaction is valid in
    pub validity_start: Option<u64>,
    /// Minted and burned assets
    pub mint: Mint,
    /// Hash of the redeemers and cost models, present when scripts run
    pub script_data_hash: Option<ScriptDataHash>,
    /// Outputs forfeited if a script fails
    pub collateral: Vec<OutRef>,
    /// Keys that must sign the transaction
    pub required_signers: Vec<KeyHash>,
}

impl TransactionBody {
    /// Encode the body
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut e = Encoder::new(Vec::new());
        encode_body(&mut e, self)?;
        Ok(e.into_writer())
    }

    /// Hash identifying the transaction
    pub fn hash(&self) -> Result<TxHash, Error> {
        Ok(TxHash::from(blake2b_256(&self.to_bytes()?)))
    }

    /// Position of `out_ref` among the sorted inputs
    pub fn input_index(&self, out_ref: &OutRef) -> Option<u32> {
        let mut sorted = self.inputs.clone();
        sorted.sort();
        sorted
            .iter()
            .position(|input| input == out_ref)
            .and_then(|i| u32::try_from(i).ok())
    }
}

/// What a redeemer is attached to
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RedeemerTag {
    /// Spending a script-locked input
    Spend,
    /// Running a minting policy
    Mint,
}

impl RedeemerTag {
    fn as_u64(&self) -> u64 {
        match self {
            RedeemerTag::Spend => 0,
            RedeemerTag::Mint => 1,
        }
    }
}

/// Redeemer placed in the witness set
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RedeemerEntry {
    /// What the redeemer is attached to
    pub tag: RedeemerTag,
    /// Position of the input (sorted) or policy (sorted) it is attached to
    pub index: u32,
    /// Encoded structured data
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Execution budget
    pub ex_units: ExUnits,
}

/// Signature by a verification key
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VKeyWitness {
    /// Verification key
    #[serde(with = "hex_bytes")]
    pub vkey: Vec<u8>,
    /// Signature of the transaction hash
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl VKeyWitness {
    /// Witness of the right size, used to size drafts before they are signed
    pub fn placeholder() -> Self {
        VKeyWitness {
            vkey: vec![0; VKEY_LEN],
            signature: vec![0; SIGNATURE_LEN],
        }
    }
}

/// Witnesses attached to a transaction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct WitnessSet {
    /// Key signatures
    pub vkeys: Vec<VKeyWitness>,
    /// Script redeemers
    pub redeemers: Vec<RedeemerEntry>,
}

impl WitnessSet {
    /// Total execution budget requested by the redeemers
    pub fn ex_units(&self) -> ExUnits {
        self.redeemers
            .iter()
            .fold(ExUnits::default(), |acc, r| acc + r.ex_units)
    }
}

/// A complete transaction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Signed part
    pub body: TransactionBody,
    /// Witnesses
    pub witness_set: WitnessSet,
    /// Whether scripts are expected to succeed
    pub is_valid: bool,
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(body: TransactionBody, witness_set: WitnessSet) -> Self {
        Transaction {
            body,
            witness_set,
            is_valid: true,
        }
    }

    /// Canonical binary encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut e = Encoder::new(Vec::new());
        e.array(4)?;
        encode_body(&mut e, &self.body)?;
        encode_witness_set(&mut e, &self.witness_set)?;
        e.bool(self.is_valid)?;
        e.null()?;
        Ok(e.into_writer())
    }

    /// Hash of the body
    pub fn hash(&self) -> Result<TxHash, Error> {
        self.body.hash()
    }

    /// Size of the encoded transaction
    pub fn size(&self) -> Result<usize, Error> {
        Ok(self.to_bytes()?.len())
    }

    /// Hex of the encoded transaction
    pub fn to_hex(&self) -> Result<String, Error> {
        Ok(hex::encode(self.to_bytes()?))
    }
}

/// Size of a single encoded input reference
pub fn input_size(out_ref: &OutRef) -> Result<usize, Error> {
    let mut e = Encoder::new(Vec::new());
    encode_input(&mut e, out_ref)?;
    Ok(e.into_writer().len())
}

/// Size of a single encoded key witness
pub fn vkey_witness_size() -> Result<usize, Error> {
    let mut e = Encoder::new(Vec::new());
    encode_vkey_witness(&mut e, &VKeyWitness::placeholder())?;
    Ok(e.into_writer().len())
}

fn encode_input(e: &mut Enc, out_ref: &OutRef) -> Result<(), Error> {
    e.array(2)?;
    e.bytes(out_ref.tx_hash.as_bytes())?;
    e.u32(out_ref.index)?;
    Ok(())
}

fn encode_inputs(e: &mut Enc, inputs: &[OutRef]) -> Result<(), Error> {
    let mut sorted = inputs.to_vec();
    sorted.sort();
    e.array(sorted.len() as u64)?;
    for input in &sorted {
        encode_input(e, input)?;
    }
    Ok(())
}

fn amount_u64(value: &malachite::Natural) -> Result<u64, Error> {
    u64::try_from(value).map_err(|_| Error::Encode(format!("amount {} exceeds 64 bits", value)))
}

fn encode_value(e: &mut Enc, value: &Value) -> Result<(), Error> {
    let coin = amount_u64(&value.base_amount())?;
    if !value.has_native_assets() {
        e.u64(coin)?;
        return Ok(());
    }

    let mut policies: BTreeMap<&PolicyId, Vec<(&AssetName, u64)>> = BTreeMap::new();
    for (asset, amount) in value.native_assets() {
        if let AssetId::Native { policy, name } = asset {
            policies
                .entry(policy)
                .or_default()
                .push((name, amount_u64(amount)?));
        }
    }

    e.array(2)?;
    e.u64(coin)?;
    e.map(policies.len() as u64)?;
    for (policy, assets) in policies {
        e.bytes(policy.as_bytes())?;
        e.map(assets.len() as u64)?;
        for (name, amount) in assets {
            e.bytes(name.as_bytes())?;
            e.u64(amount)?;
        }
    }
    Ok(())
}

fn encode_datum(e: &mut Enc, datum: &DatumOption) -> Result<(), Error> {
    e.array(2)?;
    match datum {
        DatumOption::Hash(hash) => {
            e.u8(0)?;
            e.bytes(hash.as_bytes())?;
        }
        DatumOption::Inline(data) => {
            e.u8(1)?;
            e.tag(Tag::new(TAG_ENCODED_DATA))?;
            e.bytes(data)?;
        }
    }
    Ok(())
}

fn encode_output(e: &mut Enc, output: &TxOut) -> Result<(), Error> {
    e.map(if output.datum.is_some() { 3 } else { 2 })?;
    e.u8(0)?;
    e.bytes(output.address.as_bytes())?;
    e.u8(1)?;
    encode_value(e, &output.value)?;
    if let Some(datum) = &output.datum {
        e.u8(2)?;
        encode_datum(e, datum)?;
    }
    Ok(())
}

fn encode_mint(e: &mut Enc, mint: &Mint) -> Result<(), Error> {
    e.map(mint.len() as u64)?;
    for (policy, assets) in mint {
        e.bytes(policy.as_bytes())?;
        e.map(assets.len() as u64)?;
        for (name, amount) in assets {
            e.bytes(name.as_bytes())?;
            e.i64(*amount)?;
        }
    }
    Ok(())
}

fn encode_body(e: &mut Enc, body: &TransactionBody) -> Result<(), Error> {
    let optional = [
        body.ttl.is_some(),
        body.validity_start.is_some(),
        !body.mint.is_empty(),
        body.script_data_hash.is_some(),
        !body.collateral.is_empty(),
        !body.required_signers.is_empty(),
    ];
    e.map(3 + optional.iter().filter(|present| **present).count() as u64)?;

    e.u8(0)?;
    encode_inputs(e, &body.inputs)?;

    e.u8(1)?;
    e.array(body.outputs.len() as u64)?;
    for output in &body.outputs {
        encode_output(e, output)?;
    }

    e.u8(2)?;
    e.u64(body.fee)?;

    if let Some(ttl) = body.ttl {
        e.u8(3)?;
        e.u64(ttl)?;
    }
    if let Some(start) = body.validity_start {
        e.u8(8)?;
        e.u64(start)?;
    }
    if !body.mint.is_empty() {
        e.u8(9)?;
        encode_mint(e, &body.mint)?;
    }
    if let Some(hash) = &body.script_data_hash {
        e.u8(11)?;
        e.bytes(hash.as_bytes())?;
    }
    if !body.collateral.is_empty() {
        e.u8(13)?;
        encode_inputs(e, &body.collateral)?;
    }
    if !body.required_signers.is_empty() {
        e.u8(14)?;
        e.array(body.required_signers.len() as u64)?;
        for signer in &body.required_signers {
            e.bytes(signer.as_bytes())?;
        }
    }
    Ok(())
}

fn encode_vkey_witness(e: &mut Enc, witness: &VKeyWitness) -> Result<(), Error> {
    e.array(2)?;
    e.bytes(&witness.vkey)?;
    e.bytes(&witness.signature)?;
    Ok(())
}

fn encode_witness_set(e: &mut Enc, witness_set: &WitnessSet) -> Result<(), Error> {
    let entries = [
        !witness_set.vkeys.is_empty(),
        !witness_set.redeemers.is_empty(),
    ];
    e.map(entries.iter().filter(|present| **present).count() as u64)?;

    if !witness_set.vkeys.is_empty() {
        e.u8(0)?;
        e.array(witness_set.vkeys.len() as u64)?;
        for witness in &witness_set.vkeys {
            encode_vkey_witness(e, witness)?;
        }
    }
    if !witness_set.redeemers.is_empty() {
        e.u8(5)?;
        encode_redeemers(e, &witness_set.redeemers)?;
    }
    Ok(())
}

fn encode_redeemers(e: &mut Enc, redeemers: &[RedeemerEntry]) -> Result<(), Error> {
    e.array(redeemers.len() as u64)?;
    for redeemer in redeemers {
        e.array(4)?;
        e.u64(redeemer.tag.as_u64())?;
        e.u32(redeemer.index)?;
        // already canonical
        e.writer_mut().extend_from_slice(&redeemer.data);
        e.array(2)?;
        e.u64(redeemer.ex_units.mem)?;
        e.u64(redeemer.ex_units.steps)?;
    }
    Ok(())
}

fn encode_language_views(
    e: &mut Enc,
    languages: &BTreeSet<Language>,
    cost_models: &CostModels,
) -> Result<(), Error> {
    let mut views = Vec::with_capacity(languages.len());
    for language in languages {
        let model = cost_models
            .get(*language)
            .ok_or(Error::MissingCostModel(*language))?;

        let mut key = Encoder::new(Vec::new());
        let mut value = Encoder::new(Vec::new());
        match language {
            // the first version wraps both key and model in byte strings, the model as an
            // indefinite array
            Language::PlutusV1 => {
                key.bytes(&[0])?;
                let mut inner = Encoder::new(Vec::new());
                inner.begin_array()?;
                for parameter in model {
                    inner.i64(*parameter)?;
                }
                inner.end()?;
                value.bytes(&inner.into_writer())?;
            }
            Language::PlutusV2 | Language::PlutusV3 => {
                key.u8(if *language == Language::PlutusV2 { 1 } else { 2 })?;
                value.array(model.len() as u64)?;
                for parameter in model {
                    value.i64(*parameter)?;
                }
            }
        }
        views.push((key.into_writer(), value.into_writer()));
    }

    // canonical map order: shorter keys first, then bytewise
    views.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    e.map(views.len() as u64)?;
    for (key, value) in views {
        e.writer_mut().extend_from_slice(&key);
        e.writer_mut().extend_from_slice(&value);
    }
    Ok(())
}

/// Hash binding `redeemers` and the cost models of `languages` to a body
///
/// Fails with [`Error::MissingCostModel`] when `cost_models` lacks one of `languages`.
pub fn script_data_hash(
    redeemers: &[RedeemerEntry],
    languages: &BTreeSet<Language>,
    cost_models: &CostModels,
) -> Result<ScriptDataHash, Error> {
    let mut e = Encoder::new(Vec::new());
    encode_redeemers(&mut e, redeemers)?;
    encode_language_views(&mut e, languages, cost_models)?;
    Ok(ScriptDataHash::from(blake2b_256(&e.into_writer())))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{DatumHash, NetworkId};

    fn address() -> Address {
        Address::enterprise(NetworkId::Testnet, &KeyHash::from([1; 28]))
    }

    fn out_ref(n: u8, index: u32) -> OutRef {
        OutRef::new(TxHash::from([n; 32]), index)
    }

    #[test]
    fn test_output_coin_only() {
        let output = TxOut {
            address: address(),
            value: Value::from_base(1_000_000),
            datum: None,
        };
        let bytes = output.to_bytes().unwrap();

        // map(2), key 0, 29 address bytes
        assert_eq!(&bytes[..3], &[0xa2, 0x00, 0x58]);
        assert_eq!(bytes[3], 29);
        // key 1, u32 coin
        assert_eq!(&bytes[33..], &[0x01, 0x1a, 0x00, 0x0f, 0x42, 0x40]);
    }

    #[test]
    fn test_output_with_assets_and_datum() {
        let token = AssetId::native(
            PolicyId::from([2; 28]),
            AssetName::new(b"tok".to_vec()).unwrap(),
        );
        let plain = TxOut {
            address: address(),
            value: Value::from_base(1_000_000),
            datum: None,
        };
        let rich = TxOut {
            address: address(),
            value: Value::from_base(1_000_000).with(token, 5),
            datum: Some(DatumOption::Hash(DatumHash::from([3; 32]))),
        };

        let bytes = rich.to_bytes().unwrap();
        assert_eq!(bytes[0], 0xa3);
        assert!(rich.encoded_size().unwrap() > plain.encoded_size().unwrap());
    }

    #[test]
    fn test_amount_overflow() {
        let mut value = Value::new();
        value.insert(
            AssetId::Base,
            malachite::Natural::from(u64::MAX) + malachite::Natural::from(1u32),
        );
        let output = TxOut {
            address: address(),
            value,
            datum: None,
        };
        assert!(matches!(output.to_bytes(), Err(Error::Encode(_))));
    }

    #[test]
    fn test_inputs_are_sorted() {
        let a = TransactionBody {
            inputs: vec![out_ref(2, 0), out_ref(1, 1), out_ref(1, 0)],
            ..Default::default()
        };
        let b = TransactionBody {
            inputs: vec![out_ref(1, 0), out_ref(1, 1), out_ref(2, 0)],
            ..Default::default()
        };

        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        assert_eq!(a.input_index(&out_ref(2, 0)), Some(2));
        assert_eq!(a.input_index(&out_ref(3, 0)), None);
    }

    #[test]
    fn test_body_optional_fields() {
        let mut body = TransactionBody {
            inputs: vec![out_ref(1, 0)],
            fee: 200_000,
            ..Default::default()
        };
        assert_eq!(body.to_bytes().unwrap()[0], 0xa3);

        body.ttl = Some(100);
        body.required_signers.push(KeyHash::from([4; 28]));
        assert_eq!(body.to_bytes().unwrap()[0], 0xa5);
    }

    #[test]
    fn test_transaction_layout() {
        let body = TransactionBody {
            inputs: vec![out_ref(1, 0)],
            fee: 170_000,
            ..Default::default()
        };
        let unsigned = Transaction::new(body.clone(), WitnessSet::default());
        let bytes = unsigned.to_bytes().unwrap();

        assert_eq!(bytes[0], 0x84);
        // empty witness set, true, null
        assert_eq!(&bytes[bytes.len() - 3..], &[0xa0, 0xf5, 0xf6]);
        assert_eq!(unsigned.hash().unwrap(), body.hash().unwrap());

        let signed = Transaction::new(
            body,
            WitnessSet {
                vkeys: vec![VKeyWitness::placeholder()],
                redeemers: vec![],
            },
        );
        assert_eq!(
            signed.size().unwrap(),
            unsigned.size().unwrap() + vkey_witness_size().unwrap() + 2
        );
        // signatures do not change the hash
        assert_eq!(signed.hash().unwrap(), unsigned.hash().unwrap());
    }

    #[test]
    fn test_redeemer_encoding() {
        let witness_set = WitnessSet {
            vkeys: vec![],
            redeemers: vec![RedeemerEntry {
                tag: RedeemerTag::Mint,
                index: 0,
                data: vec![0xd8, 0x79, 0x80],
                ex_units: ExUnits::new(10, 20),
            }],
        };
        let tx = Transaction::new(TransactionBody::default(), witness_set);
        let hex = tx.to_hex().unwrap();

        // {5: [[1, 0, data, [10, 20]]]}
        assert!(hex.contains("a10581840100d87980820a14"));
        assert_eq!(tx.witness_set.ex_units(), ExUnits::new(10, 20));
    }

    fn redeemer_entry() -> RedeemerEntry {
        RedeemerEntry {
            tag: RedeemerTag::Spend,
            index: 0,
            data: vec![0xd8, 0x79, 0x80],
            ex_units: ExUnits::new(10, 20),
        }
    }

    fn cost_models() -> CostModels {
        CostModels {
            plutus_v1: Some(vec![1, 2]),
            plutus_v2: Some(vec![3, -4]),
            plutus_v3: None,
        }
    }

    #[test]
    fn test_script_data_hash_preimage() {
        let languages = vec![Language::PlutusV1, Language::PlutusV2]
            .into_iter()
            .collect::<BTreeSet<_>>();
        let hash = script_data_hash(&[redeemer_entry()], &languages, &cost_models()).unwrap();

        // redeemers, then {1: [3, -4], h'00': h'9f0102ff'}
        let preimage = hex::decode("81840000d87980820a14a2018203234100449f0102ff").unwrap();
        assert_eq!(hash, ScriptDataHash::from(blake2b_256(&preimage)));
    }

    #[test]
    fn test_script_data_hash_binds_inputs() {
        let v2 = vec![Language::PlutusV2].into_iter().collect::<BTreeSet<_>>();
        let hash = script_data_hash(&[redeemer_entry()], &v2, &cost_models()).unwrap();

        let mut other = redeemer_entry();
        other.ex_units = ExUnits::new(11, 20);
        assert_ne!(script_data_hash(&[other], &v2, &cost_models()).unwrap(), hash);

        let mut models = cost_models();
        models.plutus_v2 = Some(vec![3, -5]);
        assert_ne!(script_data_hash(&[redeemer_entry()], &v2, &models).unwrap(), hash);

        let v3 = vec![Language::PlutusV3].into_iter().collect::<BTreeSet<_>>();
        assert!(matches!(
            script_data_hash(&[redeemer_entry()], &v3, &cost_models()),
            Err(Error::MissingCostModel(Language::PlutusV3))
        ));
    }

    #[test]
    fn test_body_script_data_hash() {
        let mut body = TransactionBody {
            inputs: vec![out_ref(1, 0)],
            fee: 200_000,
            ..Default::default()
        };
        let without = body.to_bytes().unwrap();

        body.script_data_hash = Some(ScriptDataHash::from([7; 32]));
        let with = body.to_bytes().unwrap();
        assert_eq!(with[0], 0xa4);
        // key 11, 32 bytes
        assert_eq!(with.len(), without.len() + 1 + 2 + 32);
        assert!(hex::encode(&with).contains(&format!("0b5820{}", "07".repeat(32))));
    }

    #[test]
    fn test_input_size() {
        // array(2), bytes(32) with 2-byte header, small index
        assert_eq!(input_size(&out_ref(1, 0)).unwrap(), 1 + 2 + 32 + 1);
        assert_eq!(input_size(&out_ref(1, 1_000)).unwrap(), 1 + 2 + 32 + 3);
        assert_eq!(vkey_witness_size().unwrap(), 1 + 2 + 32 + 2 + 64);
    }
}
