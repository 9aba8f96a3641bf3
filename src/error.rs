// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::fmt;

use crate::types::{AssetId, Language, NetworkId, OutRef};
use crate::wallet::coin_selection;

/// Errors that can be thrown while building a transaction with a [`Wallet`](crate::wallet::Wallet)
#[derive(Debug)]
pub enum Error {
    /// Generic error
    Generic(String),
    /// Structured data failed to serialize or deserialize against its schema
    Data(crate::data::Error),
    /// The spendable outputs are not enough to cover the requested value plus fee
    InsufficientFunds(coin_selection::InsufficientFunds),
    /// The spendable outputs cover the payment but not a change output that clears its own
    /// minimum deposit and fee
    InsufficientFundsForChange {
        /// Base asset amount the selection had to reach
        needed: u64,
        /// Base asset amount the spendable outputs hold
        available: u64,
    },
    /// The transaction needs collateral but there is nothing to pledge
    NoCollateral,
    /// Neither the local collateral pool nor the remote provider can cover the collateral
    InsufficientCollateral {
        /// Collateral required by the protocol parameters
        needed: u64,
        /// Collateral that could be gathered
        available: u64,
    },
    /// Two collaborators are configured for different networks
    InvalidNetwork {
        /// Network the build was started for
        requested: NetworkId,
        /// Network reported by the collaborator
        found: NetworkId,
    },
    /// Arithmetic between amounts of two different assets
    AssetMismatch {
        /// Asset of the left operand
        left: AssetId,
        /// Asset of the right operand
        right: AssetId,
    },
    /// The lower validity bound is past the upper one
    InvalidValidityInterval {
        /// First valid slot
        from: u64,
        /// First invalid slot
        to: u64,
    },
    /// The same output is spent twice by the same transaction
    DuplicateInput(OutRef),
    /// The serialized transaction exceeds the protocol limit
    TransactionTooLarge {
        /// Size of the serialized transaction
        size: usize,
        /// Maximum size allowed by the protocol parameters
        max: u64,
    },
    /// The redeemers ask for more execution units than a transaction may use
    ExecutionUnitsExceeded,
    /// A redeemer targets a language the protocol parameters carry no cost model for
    MissingCostModel(Language),
    /// The fee did not stabilize within the allowed number of rounds
    FeeNotConverged {
        /// Number of drafts built
        rounds: usize,
    },
    /// Binary encoding error
    Encode(String),
    /// Error serializing or deserializing JSON data
    Json(serde_json::Error),
    /// Hex decoding error
    Hex(hex::FromHexError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(err) => write!(f, "Generic error: {}", err),
            Self::Data(err) => write!(f, "Data error: {}", err),
            Self::InsufficientFunds(err) => write!(f, "{}", err),
            Self::InsufficientFundsForChange { needed, available } => write!(
                f,
                "Insufficient funds for change: {} available of {} needed",
                available, needed
            ),
            Self::NoCollateral => write!(f, "No collateral available"),
            Self::InsufficientCollateral { needed, available } => write!(
                f,
                "Insufficient collateral: {} available of {} needed",
                available, needed
            ),
            Self::InvalidNetwork { requested, found } => write!(
                f,
                "Invalid network: requested {} but found {}",
                requested, found
            ),
            Self::AssetMismatch { left, right } => {
                write!(f, "Cannot combine amounts of {} and {}", left, right)
            }
            Self::InvalidValidityInterval { from, to } => {
                write!(f, "Invalid validity interval: from slot {} to slot {}", from, to)
            }
            Self::DuplicateInput(out_ref) => write!(f, "Input spent twice: {}", out_ref),
            Self::TransactionTooLarge { size, max } => write!(
                f,
                "Transaction too large: {} bytes, at most {} allowed",
                size, max
            ),
            Self::ExecutionUnitsExceeded => write!(f, "Execution units exceed the protocol limit"),
            Self::MissingCostModel(language) => write!(f, "No cost model for {}", language),
            Self::FeeNotConverged { rounds } => {
                write!(f, "Fee did not converge after {} rounds", rounds)
            }
            Self::Encode(err) => write!(f, "Encoding error: {}", err),
            Self::Json(err) => write!(f, "Serialize/Deserialize JSON error: {}", err),
            Self::Hex(err) => write!(f, "Hex decoding error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_error {
    ( $from:ty, $to:ident ) => {
        impl_error!($from, $to, Error);
    };
    ( $from:ty, $to:ident, $impl_for:ty ) => {
        impl std::convert::From<$from> for $impl_for {
            fn from(err: $from) -> Self {
                <$impl_for>::$to(err)
            }
        }
    };
}

impl_error!(crate::data::Error, Data);
impl_error!(coin_selection::InsufficientFunds, InsufficientFunds);
impl_error!(serde_json::Error, Json);
impl_error!(hex::FromHexError, Hex);

impl<E: fmt::Display> From<minicbor::encode::Error<E>> for Error {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        Error::Encode(err.to_string())
    }
}
