// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Chain and build configuration
//!
//! [`ProtocolParameters`] are read from the chain once per build and never modified.
//! [`BuildConfig`] tunes the builder itself. Both can be loaded from JSON:
//!
//! ```
//! use utxo_forge::params::BuildConfig;
//!
//! let config = BuildConfig::from_json(r#"{ "max_rounds": 4 }"#)?;
//! assert_eq!(config.max_rounds, 4);
//! assert_eq!(config.deposit_slack_bytes, BuildConfig::default().deposit_slack_bytes);
//! # Ok::<(), utxo_forge::Error>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{ExUnits, Language};

/// Non-negative rational number
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    /// Numerator
    pub numerator: u64,
    /// Denominator, never zero
    pub denominator: u64,
}

impl Ratio {
    /// Create a new [`Ratio`]
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Ratio {
            numerator,
            denominator,
        }
    }

    /// `⌈value × self⌉`
    pub fn ceil_mul(&self, value: u64) -> u64 {
        let denominator = u128::from(self.denominator.max(1));
        let product = u128::from(value) * u128::from(self.numerator);
        let result = (product + denominator - 1) / denominator;
        if result > u128::from(u64::MAX) {
            u64::MAX
        } else {
            result as u64
        }
    }
}

/// Price of one unit of each execution dimension, in base asset
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExUnitPrices {
    /// Price per memory unit
    pub mem_price: Ratio,
    /// Price per CPU step
    pub step_price: Ratio,
}

/// Cost model parameters of each script language
///
/// Only the languages of the redeemers in a transaction need a model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CostModels {
    /// First version
    pub plutus_v1: Option<Vec<i64>>,
    /// Second version
    pub plutus_v2: Option<Vec<i64>>,
    /// Third version
    pub plutus_v3: Option<Vec<i64>>,
}

impl CostModels {
    /// Parameters of `language`, if known
    pub fn get(&self, language: Language) -> Option<&[i64]> {
        match language {
            Language::PlutusV1 => self.plutus_v1.as_deref(),
            Language::PlutusV2 => self.plutus_v2.as_deref(),
            Language::PlutusV3 => self.plutus_v3.as_deref(),
        }
    }
}

/// Ledger rules the builder has to honor
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProtocolParameters {
    /// Smallest deposit any output may carry
    pub min_utxo_floor: u64,
    /// Deposit required per byte of stored output
    pub coins_per_utxo_byte: u64,
    /// Bytes the ledger accounts for every stored output on top of its encoding
    #[serde(default = "default_utxo_entry_overhead")]
    pub utxo_entry_overhead: u64,
    /// Fee per byte of serialized transaction
    pub tx_fee_per_byte: u64,
    /// Fixed part of the fee
    pub tx_fee_fixed: u64,
    /// Maximum size of a serialized transaction
    pub max_tx_size: u64,
    /// Collateral to pledge, as a percentage of the fee
    pub collateral_percentage: u64,
    /// Maximum number of collateral inputs
    pub max_collateral_inputs: usize,
    /// Execution unit prices
    pub execution_unit_prices: ExUnitPrices,
    /// Execution budget a single transaction may use
    pub max_execution_units: ExUnits,
    /// Cost models, bound to the transaction through its script data hash
    #[serde(default)]
    pub cost_models: CostModels,
}

fn default_utxo_entry_overhead() -> u64 {
    160
}

impl ProtocolParameters {
    /// Load the parameters from their JSON representation
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Tunables of the transaction builder
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Bytes added to the draft size of an output when computing its minimum deposit
    ///
    /// The draft is sized before its deposit is known, so the coin field may still grow to its
    /// widest encoding once the deposit is written back.
    pub deposit_slack_bytes: u64,
    /// Maximum number of whole-transaction drafts before giving up on a stable fee
    pub max_rounds: usize,
    /// Maximum number of selection rounds once the change output is being normalized
    pub max_normalizing_attempts: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            deposit_slack_bytes: 8,
            max_rounds: 8,
            max_normalizing_attempts: 16,
        }
    }
}

impl BuildConfig {
    /// Load the configuration from JSON, missing fields take their default value
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Current tip of the chain
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainTip {
    /// Slot of the last block
    pub slot: u64,
    /// Height of the last block
    pub block_height: u64,
}

#[cfg(test)]
pub(crate) fn test_params() -> ProtocolParameters {
    ProtocolParameters {
        min_utxo_floor: 1_000_000,
        coins_per_utxo_byte: 4_310,
        utxo_entry_overhead: 160,
        tx_fee_per_byte: 44,
        tx_fee_fixed: 155_381,
        max_tx_size: 16_384,
        collateral_percentage: 150,
        max_collateral_inputs: 3,
        execution_unit_prices: ExUnitPrices {
            mem_price: Ratio::new(577, 10_000),
            step_price: Ratio::new(721, 10_000_000),
        },
        max_execution_units: ExUnits::new(14_000_000, 10_000_000_000),
        cost_models: CostModels {
            plutus_v2: Some(vec![205_665, 812, 1, 1, 1_000, 571, 0, 1, 1_000, 24_177]),
            ..Default::default()
        },
    }
}
