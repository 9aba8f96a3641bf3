// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Fees
//!
//! The ledger charges a fixed amount, a price per byte of the serialized transaction and a price
//! per execution unit requested by its redeemers. [`min_fee`] computes that for a finished
//! draft. A [`FeeEstimator`] predicts it piecewise while coins are still being selected.

use std::fmt;

use crate::error::Error;
use crate::params::ProtocolParameters;
use crate::transaction::{input_size, vkey_witness_size, Transaction};
use crate::types::{ExUnits, Utxo};
use crate::wallet::candidate::TxCandidate;
use crate::wallet::output::Output;

/// Price of an execution budget, rounded up in each dimension
pub fn execution_cost(ex_units: &ExUnits, params: &ProtocolParameters) -> u64 {
    let prices = &params.execution_unit_prices;
    prices
        .mem_price
        .ceil_mul(ex_units.mem)
        .saturating_add(prices.step_price.ceil_mul(ex_units.steps))
}

/// Fee the ledger requires for `tx`
pub fn min_fee(tx: &Transaction, params: &ProtocolParameters) -> Result<u64, Error> {
    let size = tx.size()? as u64;
    Ok(params
        .tx_fee_fixed
        .saturating_add(params.tx_fee_per_byte.saturating_mul(size))
        .saturating_add(execution_cost(&tx.witness_set.ex_units(), params)))
}

/// Piecewise fee prediction used during coin selection
pub trait FeeEstimator: fmt::Debug {
    /// Fee added by spending `utxo`
    fn input_fee(&self, utxo: &Utxo) -> Result<u64, Error>;

    /// Fee added by creating `output`
    fn output_fee(&self, output: &Output) -> Result<u64, Error>;

    /// Fee of the candidate before any coin is selected
    fn base_fee(&self, candidate: &TxCandidate) -> Result<u64, Error>;
}

/// Estimator pricing every piece by its encoded size
///
/// Spending a key-locked output is assumed to add one signature, even if the same key already
/// signs for another input.
#[derive(Debug, Clone)]
pub struct LinearFeeEstimator {
    params: ProtocolParameters,
}

impl LinearFeeEstimator {
    /// Create a new [`LinearFeeEstimator`]
    pub fn new(params: ProtocolParameters) -> Self {
        LinearFeeEstimator { params }
    }

    fn bytes(&self, size: usize) -> u64 {
        self.params.tx_fee_per_byte.saturating_mul(size as u64)
    }
}

impl FeeEstimator for LinearFeeEstimator {
    fn input_fee(&self, utxo: &Utxo) -> Result<u64, Error> {
        let mut size = input_size(&utxo.out_ref)?;
        if utxo.address.payment_key_hash().is_some() {
            size += vkey_witness_size()?;
        }
        Ok(self.bytes(size))
    }

    fn output_fee(&self, output: &Output) -> Result<u64, Error> {
        Ok(self.bytes(output.to_tx_out().encoded_size()?))
    }

    fn base_fee(&self, candidate: &TxCandidate) -> Result<u64, Error> {
        let skeleton =
            candidate.to_transaction(&[], None, 0, &[], true, &self.params.cost_models)?;
        min_fee(&skeleton, &self.params)
    }
}
