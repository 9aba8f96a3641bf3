// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Transaction candidate
//!
//! A [`TxCandidate`] accumulates what a build plans to do before any coin is selected. It is
//! owned by a single build and only ever changes by folding in a [`TxDelta`] returned by an
//! [`Operation`](super::tx_builder::Operation).

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;

use malachite::Natural;

use crate::error::Error;
use crate::params::CostModels;
use crate::transaction::{
    script_data_hash, Mint, RedeemerEntry, RedeemerTag, Transaction, TransactionBody,
    VKeyWitness, WitnessSet,
};
use crate::types::{Address, AssetId, AssetName, ExUnits, KeyHash, OutRef, PolicyId, Redeemer, Utxo};
use crate::value::Value;
use crate::wallet::output::Output;

/// An output the candidate spends explicitly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    /// The spent output
    pub utxo: Utxo,
    /// Redeemer, when the output is locked by a script
    pub redeemer: Option<Redeemer>,
}

/// Assets minted or burned under one policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintDescriptor {
    /// Minting policy
    pub policy: PolicyId,
    /// Amount per asset name, negative to burn
    pub assets: BTreeMap<AssetName, i64>,
    /// Redeemer handed to the policy
    pub redeemer: Option<Redeemer>,
}

/// Slots the transaction is valid in, `from` included and `to` excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidityInterval {
    /// First valid slot
    pub from: Option<u64>,
    /// First invalid slot
    pub to: Option<u64>,
}

/// Changes an operation wants to make to the candidate
#[derive(Debug, Clone, Default)]
pub struct TxDelta {
    /// Outputs to create
    pub outputs: Vec<Output>,
    /// Outputs to spend
    pub inputs: Vec<InputDescriptor>,
    /// Assets to mint or burn
    pub mints: Vec<MintDescriptor>,
    /// Keys that must sign
    pub required_signers: Vec<KeyHash>,
    /// Lower validity bound
    pub valid_from: Option<u64>,
    /// Upper validity bound
    pub valid_to: Option<u64>,
    /// Side-channel entries returned with the completed transaction
    pub metadata: Vec<(String, serde_json::Value)>,
}

impl TxDelta {
    /// Delta creating a single output
    pub fn output(output: Output) -> Self {
        TxDelta {
            outputs: vec![output],
            ..Default::default()
        }
    }

    /// Delta spending a single output
    pub fn input(input: InputDescriptor) -> Self {
        TxDelta {
            inputs: vec![input],
            ..Default::default()
        }
    }
}

/// Accumulator of everything a build plans to do
#[derive(Debug, Clone, Default)]
pub struct TxCandidate {
    outputs: Vec<Output>,
    inputs: Vec<InputDescriptor>,
    mints: Vec<MintDescriptor>,
    required_signers: Vec<KeyHash>,
    validity: ValidityInterval,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl TxCandidate {
    /// Empty candidate
    pub fn new() -> Self {
        TxCandidate::default()
    }

    /// Planned outputs, in creation order
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Explicitly spent outputs
    pub fn inputs(&self) -> &[InputDescriptor] {
        &self.inputs
    }

    /// Planned mints and burns, one entry per policy
    pub fn mints(&self) -> &[MintDescriptor] {
        &self.mints
    }

    /// Keys that must sign
    pub fn required_signers(&self) -> &[KeyHash] {
        &self.required_signers
    }

    /// Validity bounds
    pub fn validity(&self) -> ValidityInterval {
        self.validity
    }

    /// Side-channel entries
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Whether `out_ref` is already spent by the candidate
    pub fn spends(&self, out_ref: &OutRef) -> bool {
        self.inputs.iter().any(|input| &input.utxo.out_ref == out_ref)
    }

    /// Fold `delta` into the candidate
    ///
    /// Validity bounds narrow the interval, mints under a policy already present are added up.
    pub fn apply(&mut self, delta: TxDelta) -> Result<(), Error> {
        for input in &delta.inputs {
            let twice = delta
                .inputs
                .iter()
                .filter(|other| other.utxo.out_ref == input.utxo.out_ref)
                .count()
                > 1;
            if twice || self.spends(&input.utxo.out_ref) {
                return Err(Error::DuplicateInput(input.utxo.out_ref));
            }
        }

        let mut validity = self.validity;
        if let Some(from) = delta.valid_from {
            validity.from = Some(validity.from.map_or(from, |current| current.max(from)));
        }
        if let Some(to) = delta.valid_to {
            validity.to = Some(validity.to.map_or(to, |current| current.min(to)));
        }
        if let ValidityInterval {
            from: Some(from),
            to: Some(to),
        } = validity
        {
            if from >= to {
                return Err(Error::InvalidValidityInterval { from, to });
            }
        }

        self.validity = validity;
        self.outputs.extend(delta.outputs);
        self.inputs.extend(delta.inputs);
        for mint in delta.mints {
            self.add_mint(mint);
        }
        for signer in delta.required_signers {
            if !self.required_signers.contains(&signer) {
                self.required_signers.push(signer);
            }
        }
        self.metadata.extend(delta.metadata);

        Ok(())
    }

    fn add_mint(&mut self, mint: MintDescriptor) {
        match self.mints.iter_mut().find(|m| m.policy == mint.policy) {
            Some(existing) => {
                for (name, amount) in mint.assets {
                    let entry = existing.assets.entry(name).or_insert(0);
                    *entry = entry.saturating_add(amount);
                }
                existing.assets.retain(|_, amount| *amount != 0);
                if existing.redeemer.is_none() {
                    existing.redeemer = mint.redeemer;
                }
            }
            None => self.mints.push(mint),
        }
    }

    fn mint_value(&self, positive: bool) -> Value {
        let mut value = Value::new();
        for mint in &self.mints {
            for (name, amount) in &mint.assets {
                if (*amount > 0) == positive {
                    value.insert(
                        AssetId::native(mint.policy, name.clone()),
                        Natural::from(amount.unsigned_abs()),
                    );
                }
            }
        }
        value
    }

    /// Assets created out of thin air
    pub fn minted(&self) -> Value {
        self.mint_value(true)
    }

    /// Assets destroyed
    pub fn burned(&self) -> Value {
        self.mint_value(false)
    }

    /// Value that has to leave through outputs or burns
    pub fn required_value(&self) -> Value {
        self.outputs
            .iter()
            .fold(self.burned(), |acc, output| acc.add(&output.total_value()))
    }

    /// Value brought in by explicit inputs and mints
    pub fn provided_value(&self) -> Value {
        Value::sum(self.inputs.iter().map(|i| &i.utxo.value)).add(&self.minted())
    }

    /// Value coin selection has to cover, before fees
    pub fn target(&self) -> Value {
        self.required_value().saturating_sub(&self.provided_value())
    }

    /// Value provided beyond what is required, returned as change
    pub fn surplus(&self) -> Value {
        self.provided_value().saturating_sub(&self.required_value())
    }

    /// Whether the candidate runs scripts and therefore has to pledge collateral
    pub fn needs_collateral(&self) -> bool {
        self.inputs.iter().any(|i| i.redeemer.is_some())
            || self.mints.iter().any(|m| m.redeemer.is_some())
    }

    /// Execution budget requested by all redeemers
    pub fn ex_units(&self) -> ExUnits {
        self.inputs
            .iter()
            .filter_map(|i| i.redeemer.as_ref())
            .chain(self.mints.iter().filter_map(|m| m.redeemer.as_ref()))
            .fold(ExUnits::default(), |acc, r| acc + r.ex_units)
    }

    /// Assemble a transaction from the candidate plus what the builder added
    ///
    /// When `placeholders` is set, one dummy key witness is added for every key expected to
    /// sign, so that the size of the draft matches the size of the signed transaction. When
    /// redeemers are present the body carries their script data hash, computed against
    /// `cost_models`.
    pub fn to_transaction(
        &self,
        selected: &[Utxo],
        change: Option<&Output>,
        fee: u64,
        collateral: &[(OutRef, Address)],
        placeholders: bool,
        cost_models: &CostModels,
    ) -> Result<Transaction, Error> {
        let mut inputs = self
            .inputs
            .iter()
            .map(|i| i.utxo.out_ref)
            .chain(selected.iter().map(|u| u.out_ref))
            .collect::<Vec<_>>();
        inputs.sort();

        let mut mint = Mint::new();
        for descriptor in &self.mints {
            if !descriptor.assets.is_empty() {
                mint.insert(descriptor.policy, descriptor.assets.clone());
            }
        }

        let mut body = TransactionBody {
            inputs,
            outputs: self
                .outputs
                .iter()
                .chain(change)
                .map(Output::to_tx_out)
                .collect(),
            fee,
            ttl: self.validity.to,
            validity_start: self.validity.from,
            mint,
            script_data_hash: None,
            collateral: collateral.iter().map(|(out_ref, _)| *out_ref).collect(),
            required_signers: self.required_signers.clone(),
        };

        let mut redeemers = Vec::new();
        let mut languages = BTreeSet::new();
        for input in &self.inputs {
            if let Some(redeemer) = &input.redeemer {
                languages.insert(redeemer.language);
                redeemers.push(RedeemerEntry {
                    tag: RedeemerTag::Spend,
                    index: body.input_index(&input.utxo.out_ref).unwrap_or_default(),
                    data: redeemer.data.clone(),
                    ex_units: redeemer.ex_units,
                });
            }
        }
        for (index, (policy, _)) in body.mint.iter().enumerate() {
            let redeemer = self
                .mints
                .iter()
                .find(|m| &m.policy == policy)
                .and_then(|m| m.redeemer.as_ref());
            if let Some(redeemer) = redeemer {
                languages.insert(redeemer.language);
                redeemers.push(RedeemerEntry {
                    tag: RedeemerTag::Mint,
                    index: u32::try_from(index).unwrap_or(u32::MAX),
                    data: redeemer.data.clone(),
                    ex_units: redeemer.ex_units,
                });
            }
        }

        if !redeemers.is_empty() {
            body.script_data_hash = Some(script_data_hash(&redeemers, &languages, cost_models)?);
        }

        let vkeys = if placeholders {
            let signers = self
                .inputs
                .iter()
                .map(|i| &i.utxo.address)
                .chain(selected.iter().map(|u| &u.address))
                .chain(collateral.iter().map(|(_, address)| address))
                .filter_map(Address::payment_key_hash)
                .chain(self.required_signers.iter().copied())
                .collect::<BTreeSet<_>>();
            vec![VKeyWitness::placeholder(); signers.len()]
        } else {
            Vec::new()
        };

        Ok(Transaction::new(body, WitnessSet { vkeys, redeemers }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::{test_params, BuildConfig};
    use crate::types::{Language, NetworkId, TxHash};

    fn address(n: u8) -> Address {
        Address::enterprise(NetworkId::Testnet, &KeyHash::from([n; 28]))
    }

    fn utxo(n: u8, value: Value) -> Utxo {
        Utxo::new(OutRef::new(TxHash::from([n; 32]), 0), address(n), value)
    }

    fn output(value: Value) -> Output {
        Output::new(address(9), value, None, &test_params(), &BuildConfig::default()).unwrap()
    }

    fn name() -> AssetName {
        AssetName::new(b"tok".to_vec()).unwrap()
    }

    fn mint(amount: i64, redeemer: Option<Redeemer>) -> MintDescriptor {
        MintDescriptor {
            policy: PolicyId::from([4; 28]),
            assets: vec![(name(), amount)].into_iter().collect(),
            redeemer,
        }
    }

    #[test]
    fn test_duplicate_input() {
        let mut candidate = TxCandidate::new();
        let input = InputDescriptor {
            utxo: utxo(1, Value::from_base(5_000_000)),
            redeemer: None,
        };
        candidate.apply(TxDelta::input(input.clone())).unwrap();

        assert!(matches!(
            candidate.apply(TxDelta::input(input.clone())),
            Err(Error::DuplicateInput(_))
        ));

        let mut fresh = TxCandidate::new();
        let twice = TxDelta {
            inputs: vec![input.clone(), input],
            ..Default::default()
        };
        assert!(fresh.apply(twice).is_err());
        assert!(fresh.inputs().is_empty());
    }

    #[test]
    fn test_validity_narrows() {
        let mut candidate = TxCandidate::new();
        candidate
            .apply(TxDelta {
                valid_from: Some(10),
                valid_to: Some(100),
                ..Default::default()
            })
            .unwrap();
        candidate
            .apply(TxDelta {
                valid_from: Some(20),
                valid_to: Some(200),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            candidate.validity(),
            ValidityInterval {
                from: Some(20),
                to: Some(100)
            }
        );

        let err = candidate
            .apply(TxDelta {
                valid_from: Some(150),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidValidityInterval { from: 150, to: 100 }
        ));
        assert_eq!(candidate.validity().from, Some(20));

        // the upper bound is exclusive, so an interval ending where it starts is empty
        let err = candidate
            .apply(TxDelta {
                valid_from: Some(100),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidValidityInterval { from: 100, to: 100 }
        ));
        candidate
            .apply(TxDelta {
                valid_from: Some(99),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(candidate.validity().from, Some(99));
    }

    #[test]
    fn test_target_and_surplus() {
        let mut candidate = TxCandidate::new();
        let token = AssetId::native(PolicyId::from([4; 28]), name());
        candidate
            .apply(TxDelta {
                outputs: vec![output(Value::from_base(3_000_000).with(token.clone(), 5))],
                inputs: vec![InputDescriptor {
                    utxo: utxo(1, Value::from_base(1_000_000)),
                    redeemer: None,
                }],
                mints: vec![mint(8, None)],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(candidate.target(), Value::from_base(2_000_000));
        assert_eq!(candidate.surplus(), Value::new().with(token, 3));
    }

    #[test]
    fn test_burns_are_required() {
        let mut candidate = TxCandidate::new();
        candidate
            .apply(TxDelta {
                mints: vec![mint(-2, None)],
                ..Default::default()
            })
            .unwrap();

        let token = AssetId::native(PolicyId::from([4; 28]), name());
        assert_eq!(candidate.target(), Value::new().with(token, 2));
        assert!(candidate.minted().is_zero());
    }

    #[test]
    fn test_mints_are_merged() {
        let mut candidate = TxCandidate::new();
        let redeemer = Redeemer::new(vec![0xd8, 0x79, 0x80], ExUnits::new(1, 1));
        for delta in vec![mint(3, None), mint(4, Some(redeemer.clone())), mint(-7, None)] {
            candidate
                .apply(TxDelta {
                    mints: vec![delta],
                    ..Default::default()
                })
                .unwrap();
        }

        assert_eq!(candidate.mints().len(), 1);
        assert!(candidate.mints()[0].assets.is_empty());
        assert_eq!(candidate.mints()[0].redeemer, Some(redeemer));
        assert!(candidate.needs_collateral());
    }

    #[test]
    fn test_to_transaction() {
        let mut candidate = TxCandidate::new();
        let script_input = Utxo::new(
            OutRef::new(TxHash::from([7; 32]), 1),
            Address::script(NetworkId::Testnet, &PolicyId::from([7; 28])),
            Value::from_base(2_000_000),
        );
        candidate
            .apply(TxDelta {
                outputs: vec![output(Value::from_base(1_500_000))],
                inputs: vec![InputDescriptor {
                    utxo: script_input,
                    redeemer: Some(Redeemer::new(vec![0xd8, 0x79, 0x80], ExUnits::new(100, 200))),
                }],
                required_signers: vec![KeyHash::from([3; 28])],
                ..Default::default()
            })
            .unwrap();

        let selected = vec![utxo(1, Value::from_base(4_000_000))];
        let tx = candidate
            .to_transaction(&selected, None, 180_000, &[], true, &test_params().cost_models)
            .unwrap();

        assert_eq!(tx.body.inputs.len(), 2);
        assert_eq!(tx.body.fee, 180_000);
        // selected input sorts first
        assert_eq!(tx.witness_set.redeemers[0].index, 1);
        // the selected input's key and the required signer
        assert_eq!(tx.witness_set.vkeys.len(), 2);
        assert_eq!(candidate.ex_units(), ExUnits::new(100, 200));

        let unsigned = candidate
            .to_transaction(&selected, None, 180_000, &[], false, &test_params().cost_models)
            .unwrap();
        assert!(unsigned.witness_set.vkeys.is_empty());
        assert_eq!(unsigned.hash().unwrap(), tx.hash().unwrap());

        let languages = vec![Language::PlutusV2].into_iter().collect();
        assert_eq!(
            tx.body.script_data_hash,
            Some(
                script_data_hash(
                    &tx.witness_set.redeemers,
                    &languages,
                    &test_params().cost_models
                )
                .unwrap()
            )
        );
    }

    #[test]
    fn test_to_transaction_needs_cost_model() {
        let mut candidate = TxCandidate::new();
        candidate
            .apply(TxDelta {
                mints: vec![MintDescriptor {
                    policy: PolicyId::from([4; 28]),
                    assets: vec![(name(), 1)].into_iter().collect(),
                    redeemer: Some(
                        Redeemer::new(vec![0xd8, 0x79, 0x80], ExUnits::new(1, 1))
                            .with_language(Language::PlutusV3),
                    ),
                }],
                ..Default::default()
            })
            .unwrap();

        assert!(matches!(
            candidate.to_transaction(&[], None, 0, &[], true, &test_params().cost_models),
            Err(Error::MissingCostModel(Language::PlutusV3))
        ));

        let plain = TxCandidate::new()
            .to_transaction(&[], None, 0, &[], true, &CostModels::default())
            .unwrap();
        assert_eq!(plain.body.script_data_hash, None);
    }
}
