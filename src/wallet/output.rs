// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Outputs to be created
//!
//! Every output must lock a minimum amount of base asset, proportional to the space it takes on
//! the ledger. An [`Output`] computes that minimum when it is built and reports whether the
//! value it was given already covers it. An uncovered output is not an error: its
//! [`deficit`](Output::deficit) tells the caller how much to top up, and
//! [`total_value`](Output::total_value) already includes it.

use std::convert::TryFrom;

use malachite::Natural;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::params::{BuildConfig, ProtocolParameters};
use crate::transaction::TxOut;
use crate::types::{Address, AssetId, DatumOption};
use crate::value::Value;

/// An output to be created, sized against the minimum deposit
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Output {
    address: Address,
    user_value: Value,
    datum: Option<DatumOption>,
    minimum_deposit: u64,
    deficit: u64,
}

impl Output {
    /// Size `value` sent to `address` against the minimum deposit
    pub fn new(
        address: Address,
        value: Value,
        datum: Option<DatumOption>,
        params: &ProtocolParameters,
        config: &BuildConfig,
    ) -> Result<Self, Error> {
        let draft = TxOut {
            address,
            value,
            datum,
        };
        let minimum_deposit = minimum_deposit(draft.encoded_size()?, params, config);

        let held = draft.value.base_amount();
        let deficit = if held >= Natural::from(minimum_deposit) {
            0
        } else {
            // held < minimum_deposit, so it fits
            minimum_deposit - u64::try_from(&held).unwrap_or_default()
        };

        Ok(Output {
            address: draft.address,
            user_value: draft.value,
            datum: draft.datum,
            minimum_deposit,
            deficit,
        })
    }

    /// Owner of the output
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Attached datum
    pub fn datum(&self) -> Option<&DatumOption> {
        self.datum.as_ref()
    }

    /// Value requested by the caller
    pub fn user_value(&self) -> &Value {
        &self.user_value
    }

    /// Minimum base asset amount the output must lock
    pub fn minimum_deposit(&self) -> u64 {
        self.minimum_deposit
    }

    /// Whether the requested value already locks the minimum deposit
    pub fn is_covered(&self) -> bool {
        self.deficit == 0
    }

    /// Base asset missing from the requested value, zero when covered
    pub fn deficit(&self) -> u64 {
        self.deficit
    }

    /// Value the output will actually lock, topped up to the minimum deposit
    pub fn total_value(&self) -> Value {
        self.user_value
            .add(&Value::new().with(AssetId::Base, self.deficit))
    }

    /// Ledger form of the output, carrying [`Output::total_value`]
    pub fn to_tx_out(&self) -> TxOut {
        TxOut {
            address: self.address.clone(),
            value: self.total_value(),
            datum: self.datum.clone(),
        }
    }
}

/// `max(floor, coins_per_byte × (size + overhead + slack))`
pub(crate) fn minimum_deposit(
    encoded_size: usize,
    params: &ProtocolParameters,
    config: &BuildConfig,
) -> u64 {
    let bytes = (encoded_size as u64)
        .saturating_add(params.utxo_entry_overhead)
        .saturating_add(config.deposit_slack_bytes);
    params
        .coins_per_utxo_byte
        .saturating_mul(bytes)
        .max(params.min_utxo_floor)
}
