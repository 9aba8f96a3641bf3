// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Transaction builder
//!
//! A [`TxBuilder`] records a list of [`Operation`]s. Nothing is validated while recording: when
//! the builder is completed, the wallet fetches the protocol parameters and the chain tip once,
//! wraps them in a [`BuildContext`] and runs every operation in order. Each operation looks at
//! the candidate built so far and returns a [`TxDelta`], which the wallet folds into the
//! candidate before running the next one.
//!
//! ```
//! # use utxo_forge::blockchain::memory::{MemoryChain, MemoryWallet};
//! # use utxo_forge::params::{ChainTip, ProtocolParameters};
//! # use utxo_forge::*;
//! # let params = ProtocolParameters::from_json(r#"{
//! #     "min_utxo_floor": 1000000, "coins_per_utxo_byte": 4310, "tx_fee_per_byte": 44,
//! #     "tx_fee_fixed": 155381, "max_tx_size": 16384, "collateral_percentage": 150,
//! #     "max_collateral_inputs": 3,
//! #     "execution_unit_prices": {
//! #         "mem_price": { "numerator": 577, "denominator": 10000 },
//! #         "step_price": { "numerator": 721, "denominator": 10000000 }
//! #     },
//! #     "max_execution_units": { "mem": 14000000, "steps": 10000000000 }
//! # }"#)?;
//! # let ours = Address::enterprise(NetworkId::Testnet, &KeyHash::from([1; 28]));
//! # let funds = Utxo::new(OutRef::new(TxHash::from([7; 32]), 0), ours.clone(), Value::from_base(50_000_000));
//! # let chain = MemoryChain::new(NetworkId::Testnet, params, ChainTip { slot: 1_000, block_height: 10 });
//! # let wallet = Wallet::new(chain, MemoryWallet::new(NetworkId::Testnet, ours, vec![funds]));
//! # let addr1 = Address::enterprise(NetworkId::Testnet, &KeyHash::from([2; 28]));
//! # let addr2 = Address::enterprise(NetworkId::Testnet, &KeyHash::from([3; 28]));
//! // chaining
//! let completed = {
//!     let mut builder = wallet.build_tx();
//!     builder
//!         .pay_to(addr1.clone(), Value::from_base(2_000_000))
//!         .pay_to(addr2.clone(), Value::from_base(3_000_000))
//!         .valid_for(300);
//!     builder.complete()?
//! };
//!
//! assert_eq!(completed.transaction.body.ttl, Some(1_300));
//! assert_eq!(completed.transaction.body.outputs.len(), 3);
//! # Ok::<(), utxo_forge::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::blockchain::{ChainProvider, WalletProvider};
use crate::data::PlutusData;
use crate::error::Error;
use crate::params::{BuildConfig, ChainTip, ProtocolParameters};
use crate::types::{
    Address, AssetName, DatumOption, KeyHash, NetworkId, OutRef, PolicyId, Redeemer, Utxo,
};
use crate::value::Value;

use super::candidate::{InputDescriptor, MintDescriptor, TxCandidate, TxDelta};
use super::coin_selection::{CoinSelectionAlgorithm, DefaultCoinSelectionAlgorithm};
use super::fee::FeeEstimator;
use super::output::Output;
use super::{CompletedTx, Wallet};

/// Read-only state shared by the operations of one build
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Network the build targets
    pub network: NetworkId,
    /// Protocol parameters fetched for the build
    pub params: ProtocolParameters,
    /// Builder tunables
    pub config: BuildConfig,
    /// Chain tip fetched for the build
    pub tip: ChainTip,
    /// Where change goes
    pub change_address: Address,
}

impl BuildContext {
    /// Fail unless `address` belongs to the network of the build
    pub fn check_network(&self, address: &Address) -> Result<(), Error> {
        if address.network() != self.network {
            return Err(Error::InvalidNetwork {
                requested: self.network,
                found: address.network(),
            });
        }

        Ok(())
    }

    /// Size an output against the build's protocol parameters
    pub fn output(
        &self,
        address: Address,
        value: Value,
        datum: Option<DatumOption>,
    ) -> Result<Output, Error> {
        self.check_network(&address)?;
        Output::new(address, value, datum, &self.params, &self.config)
    }
}

/// One step of a build
///
/// Operations never modify the candidate: they return what they want to add and the builder
/// folds it in.
pub trait Operation: fmt::Debug {
    /// Changes to make to `candidate`
    fn apply(&self, ctx: &BuildContext, candidate: &TxCandidate) -> Result<TxDelta, Error>;
}

/// Send `value` to `address`
#[derive(Debug, Clone)]
pub struct PayTo {
    /// Recipient
    pub address: Address,
    /// Value to send, topped up to the minimum deposit if needed
    pub value: Value,
    /// Attached datum
    pub datum: Option<DatumOption>,
}

impl Operation for PayTo {
    fn apply(&self, ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        let output = ctx.output(self.address.clone(), self.value.clone(), self.datum.clone())?;
        if !output.is_covered() {
            log::debug!(
                "output to `{}` topped up by `{}`",
                self.address,
                output.deficit()
            );
        }

        Ok(TxDelta::output(output))
    }
}

/// Redeemer data must be well-formed, it is written into the witness set as is
fn check_redeemer(redeemer: Option<&Redeemer>) -> Result<(), Error> {
    if let Some(redeemer) = redeemer {
        PlutusData::from_cbor(&redeemer.data)?;
    }
    Ok(())
}

/// Spend a specific output
#[derive(Debug, Clone)]
pub struct CollectFrom {
    /// Output to spend
    pub utxo: Utxo,
    /// Redeemer for a script-locked output
    pub redeemer: Option<Redeemer>,
}

impl Operation for CollectFrom {
    fn apply(&self, ctx: &BuildContext, candidate: &TxCandidate) -> Result<TxDelta, Error> {
        ctx.check_network(&self.utxo.address)?;
        if candidate.spends(&self.utxo.out_ref) {
            return Err(Error::DuplicateInput(self.utxo.out_ref));
        }
        if self.utxo.address.is_script() && self.redeemer.is_none() {
            return Err(Error::Generic(format!(
                "Output `{}` is locked by a script and needs a redeemer",
                self.utxo.out_ref
            )));
        }
        check_redeemer(self.redeemer.as_ref())?;

        Ok(TxDelta::input(InputDescriptor {
            utxo: self.utxo.clone(),
            redeemer: self.redeemer.clone(),
        }))
    }
}

/// Mint, or burn with negative amounts, assets under a policy
#[derive(Debug, Clone)]
pub struct MintAssets {
    /// Minting policy
    pub policy: PolicyId,
    /// Amount per asset name
    pub assets: BTreeMap<AssetName, i64>,
    /// Redeemer handed to the policy
    pub redeemer: Option<Redeemer>,
}

impl Operation for MintAssets {
    fn apply(&self, _ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        if self.assets.is_empty() || self.assets.values().any(|amount| *amount == 0) {
            return Err(Error::Generic(format!(
                "Nothing to mint under policy `{}`",
                self.policy
            )));
        }
        check_redeemer(self.redeemer.as_ref())?;

        Ok(TxDelta {
            mints: vec![MintDescriptor {
                policy: self.policy,
                assets: self.assets.clone(),
                redeemer: self.redeemer.clone(),
            }],
            ..Default::default()
        })
    }
}

/// Require a signature by a key
#[derive(Debug, Clone)]
pub struct AddSigner(pub KeyHash);

impl Operation for AddSigner {
    fn apply(&self, _ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        Ok(TxDelta {
            required_signers: vec![self.0],
            ..Default::default()
        })
    }
}

/// First slot the transaction is valid in
#[derive(Debug, Clone, Copy)]
pub struct ValidFrom(pub u64);

impl Operation for ValidFrom {
    fn apply(&self, _ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        Ok(TxDelta {
            valid_from: Some(self.0),
            ..Default::default()
        })
    }
}

/// First slot the transaction is no longer valid in
#[derive(Debug, Clone, Copy)]
pub struct ValidTo(pub u64);

impl Operation for ValidTo {
    fn apply(&self, _ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        Ok(TxDelta {
            valid_to: Some(self.0),
            ..Default::default()
        })
    }
}

/// Valid for a number of slots past the current tip
#[derive(Debug, Clone, Copy)]
pub struct ValidFor(pub u64);

impl Operation for ValidFor {
    fn apply(&self, ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        Ok(TxDelta {
            valid_to: Some(ctx.tip.slot.saturating_add(self.0)),
            ..Default::default()
        })
    }
}

/// Side-channel entry returned with the completed transaction
#[derive(Debug, Clone)]
pub struct AttachMetadata {
    /// Key of the entry, a later entry with the same key replaces it
    pub key: String,
    /// Value of the entry
    pub value: serde_json::Value,
}

impl Operation for AttachMetadata {
    fn apply(&self, _ctx: &BuildContext, _candidate: &TxCandidate) -> Result<TxDelta, Error> {
        Ok(TxDelta {
            metadata: vec![(self.key.clone(), self.value.clone())],
            ..Default::default()
        })
    }
}

/// How the fee is settled once coins are selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeeMode {
    /// Redraft the whole transaction until its fee is stable
    MultiRound,
    /// Converge once and settle any shortfall from the change
    SingleShot,
}

/// The parameters for transaction creation sans coin selection algorithm.
#[derive(Debug, Default)]
pub(crate) struct TxParams {
    pub(crate) operations: Vec<Box<dyn Operation>>,
    pub(crate) unspendable: BTreeSet<OutRef>,
    pub(crate) fee_estimator: Option<Box<dyn FeeEstimator>>,
}

/// A transaction builder
///
/// A `TxBuilder` is created by calling [`build_tx`] on a wallet. Every option setting method
/// takes and returns `&mut self`, so calls can be chained or issued one at a time. Calling
/// [`complete`] or [`complete_single_shot`] consumes the builder and produces the transaction.
///
/// [`coin_selection`] is an exception to the rule as it consumes `self`, it is usually best to
/// call it on the return value of `build_tx` before assigning it.
///
/// [`build_tx`]: Wallet::build_tx
/// [`complete`]: Self::complete
/// [`complete_single_shot`]: Self::complete_single_shot
/// [`coin_selection`]: Self::coin_selection
pub struct TxBuilder<'a, C, W, Cs> {
    pub(crate) wallet: &'a Wallet<C, W>,
    pub(crate) params: TxParams,
    pub(crate) coin_selection: Cs,
}

impl<'a, C, W> TxBuilder<'a, C, W, DefaultCoinSelectionAlgorithm> {
    pub(crate) fn new(wallet: &'a Wallet<C, W>) -> Self {
        TxBuilder {
            wallet,
            params: TxParams::default(),
            coin_selection: DefaultCoinSelectionAlgorithm::default(),
        }
    }
}

impl<'a, C, W, Cs: CoinSelectionAlgorithm> TxBuilder<'a, C, W, Cs> {
    /// Append a custom operation
    pub fn add_operation<O: Operation + 'static>(&mut self, operation: O) -> &mut Self {
        self.params.operations.push(Box::new(operation));
        self
    }

    /// Send `value` to `address`
    pub fn pay_to(&mut self, address: Address, value: Value) -> &mut Self {
        self.add_operation(PayTo {
            address,
            value,
            datum: None,
        })
    }

    /// Send `value` to `address`, attaching `datum`
    pub fn pay_to_with_datum(
        &mut self,
        address: Address,
        value: Value,
        datum: DatumOption,
    ) -> &mut Self {
        self.add_operation(PayTo {
            address,
            value,
            datum: Some(datum),
        })
    }

    /// Spend `utxo`, with a redeemer if it is locked by a script
    pub fn collect_from(&mut self, utxo: Utxo, redeemer: Option<Redeemer>) -> &mut Self {
        self.add_operation(CollectFrom { utxo, redeemer })
    }

    /// Mint assets under `policy`, negative amounts burn
    pub fn mint_assets(
        &mut self,
        policy: PolicyId,
        assets: BTreeMap<AssetName, i64>,
        redeemer: Option<Redeemer>,
    ) -> &mut Self {
        self.add_operation(MintAssets {
            policy,
            assets,
            redeemer,
        })
    }

    /// Require a signature by `key_hash`
    pub fn add_signer(&mut self, key_hash: KeyHash) -> &mut Self {
        self.add_operation(AddSigner(key_hash))
    }

    /// Make the transaction invalid before `slot`
    pub fn valid_from(&mut self, slot: u64) -> &mut Self {
        self.add_operation(ValidFrom(slot))
    }

    /// Make the transaction invalid from `slot` on
    pub fn valid_to(&mut self, slot: u64) -> &mut Self {
        self.add_operation(ValidTo(slot))
    }

    /// Make the transaction invalid `slots` past the tip current at completion
    pub fn valid_for(&mut self, slots: u64) -> &mut Self {
        self.add_operation(ValidFor(slots))
    }

    /// Return `value` under `key` with the completed transaction
    pub fn attach_metadata<K: Into<String>>(
        &mut self,
        key: K,
        value: serde_json::Value,
    ) -> &mut Self {
        self.add_operation(AttachMetadata {
            key: key.into(),
            value,
        })
    }

    /// Never select `out_ref`, neither as input nor as collateral
    pub fn add_unspendable(&mut self, out_ref: OutRef) -> &mut Self {
        self.params.unspendable.insert(out_ref);
        self
    }

    /// Replace the set of outputs that must never be selected
    pub fn unspendable(&mut self, unspendable: Vec<OutRef>) -> &mut Self {
        self.params.unspendable = unspendable.into_iter().collect();
        self
    }

    /// Estimate fees during coin selection with `estimator` instead of the linear default
    pub fn fee_estimator<F: FeeEstimator + 'static>(&mut self, estimator: F) -> &mut Self {
        self.params.fee_estimator = Some(Box::new(estimator));
        self
    }

    /// Choose the coin selection algorithm
    ///
    /// Overrides the [`DefaultCoinSelectionAlgorithm`].
    ///
    /// Note that this function consumes the builder and returns it so it is usually best to put
    /// this as the first call on the builder.
    pub fn coin_selection<P: CoinSelectionAlgorithm>(
        self,
        coin_selection: P,
    ) -> TxBuilder<'a, C, W, P> {
        TxBuilder {
            wallet: self.wallet,
            params: self.params,
            coin_selection,
        }
    }
}

impl<'a, C, W, Cs> TxBuilder<'a, C, W, Cs>
where
    C: ChainProvider,
    W: WalletProvider,
    Cs: CoinSelectionAlgorithm,
{
    /// Finish building the transaction
    ///
    /// Drafts the whole transaction repeatedly until its fee matches what the ledger asks for.
    pub fn complete(self) -> Result<CompletedTx, Error> {
        self.wallet
            .create_tx(self.coin_selection, self.params, FeeMode::MultiRound)
    }

    /// Finish building the transaction with a single convergence round
    ///
    /// Cheaper than [`complete`](Self::complete) but fails with
    /// [`Error::FeeNotConverged`] when the estimated fee falls short by more than the change can
    /// absorb.
    pub fn complete_single_shot(self) -> Result<CompletedTx, Error> {
        self.wallet
            .create_tx(self.coin_selection, self.params, FeeMode::SingleShot)
    }
}
