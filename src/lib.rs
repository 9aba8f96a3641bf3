// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Transaction assembly for UTXO ledgers with multi-asset values and contract data.
//!
//! The crate is split in two halves:
//!
//! * [`data`] defines a schema language for the structured data attached to outputs and
//!   converts between in-memory [`Data`](data::Data) values and their canonical binary form.
//! * [`wallet`] selects spendable outputs, sizes every produced output against the chain's
//!   minimum deposit and iterates until fee, inputs and change agree with each other.
//!
//! Everything that talks to the outside world (protocol parameters, the wallet's spendable
//! outputs, remote collateral) goes through the traits in [`blockchain`].
//!
//! ```
//! use utxo_forge::blockchain::memory::{MemoryChain, MemoryWallet};
//! use utxo_forge::{Address, KeyHash, NetworkId, Value, Wallet};
//! # use utxo_forge::params::{ChainTip, ProtocolParameters};
//! # use utxo_forge::{OutRef, TxHash, Utxo};
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
//! let ours = Address::enterprise(NetworkId::Testnet, &KeyHash::from([1; 28]));
//! let theirs = Address::enterprise(NetworkId::Testnet, &KeyHash::from([2; 28]));
//!
//! let chain = MemoryChain::new(NetworkId::Testnet, params, ChainTip::default());
//! let funds = Utxo::new(OutRef::new(TxHash::from([7; 32]), 0), ours.clone(), Value::from_base(10_000_000));
//! let wallet = Wallet::new(chain, MemoryWallet::new(NetworkId::Testnet, ours, vec![funds]));
//!
//! let mut builder = wallet.build_tx();
//! builder.pay_to(theirs, Value::from_base(2_000_000));
//! let completed = builder.complete()?;
//!
//! assert_eq!(completed.transaction.body.outputs.len(), 2);
//! # Ok::<(), utxo_forge::Error>(())
//! ```

// only enables the `doc_cfg` feature when
// the `docsrs` configuration attribute is defined
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
pub(crate) mod error;
pub mod blockchain;
pub mod data;
pub mod params;
pub mod transaction;
pub(crate) mod types;
pub mod value;
pub mod wallet;

pub use error::Error;
pub use transaction::Transaction;
pub use types::*;
pub use value::{CurrencyAmount, Value};
pub use wallet::output::Output;
pub use wallet::tx_builder::TxBuilder;
pub use wallet::Wallet;
