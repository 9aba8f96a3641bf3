// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Collaborators
//!
//! This module defines the traits the [`Wallet`](crate::wallet::Wallet) uses to talk to the
//! outside world. The builder never fetches anything on its own: protocol parameters and the
//! chain tip come from a [`ChainProvider`], spendable outputs from a [`WalletProvider`] and,
//! optionally, collateral from a remote [`CollateralProvider`].
//!
//! The [`memory`] module contains in-memory implementations, mostly useful for testing.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::params::{ChainTip, ProtocolParameters};
use crate::transaction::{Transaction, VKeyWitness};
use crate::types::{Address, NetworkId, OutRef, Utxo};

pub mod memory;

/// Source of chain-wide state
pub trait ChainProvider {
    /// Network the chain belongs to
    fn network(&self) -> NetworkId;

    /// Current protocol parameters
    fn protocol_parameters(&self) -> Result<ProtocolParameters, Error>;

    /// Current tip, used to bound validity intervals
    fn tip(&self) -> Result<ChainTip, Error>;
}

/// Source of the outputs a wallet can spend
pub trait WalletProvider {
    /// Network the wallet is configured for
    fn network(&self) -> NetworkId;

    /// Outputs the wallet can spend
    fn utxos(&self) -> Result<Vec<Utxo>, Error>;

    /// Outputs the wallet set aside as collateral
    ///
    /// Only base-asset, key-locked outputs are ever pledged, whatever this returns.
    fn collateral(&self) -> Result<Vec<Utxo>, Error>;

    /// Address change is sent to
    fn change_address(&self) -> Result<Address, Error>;
}

/// Collateral lent by a remote service
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteCollateral {
    /// Output pledged as collateral
    pub out_ref: OutRef,
    /// Owner of the output, who will have to sign
    pub address: Address,
}

/// Remote service lending collateral when the wallet has none
pub trait CollateralProvider {
    /// Outputs the service is willing to pledge
    fn get_collaterals(&self) -> Result<Vec<RemoteCollateral>, Error>;

    /// Sign a transaction spending the service's collateral
    fn sign(&self, tx: &Transaction) -> Result<VKeyWitness, Error>;
}

impl<T: ChainProvider> ChainProvider for Arc<T> {
    fn network(&self) -> NetworkId {
        self.deref().network()
    }

    fn protocol_parameters(&self) -> Result<ProtocolParameters, Error> {
        self.deref().protocol_parameters()
    }

    fn tip(&self) -> Result<ChainTip, Error> {
        self.deref().tip()
    }
}

impl<T: WalletProvider> WalletProvider for Arc<T> {
    fn network(&self) -> NetworkId {
        self.deref().network()
    }

    fn utxos(&self) -> Result<Vec<Utxo>, Error> {
        self.deref().utxos()
    }

    fn collateral(&self) -> Result<Vec<Utxo>, Error> {
        self.deref().collateral()
    }

    fn change_address(&self) -> Result<Address, Error> {
        self.deref().change_address()
    }
}

impl<T: CollateralProvider + ?Sized> CollateralProvider for Arc<T> {
    fn get_collaterals(&self) -> Result<Vec<RemoteCollateral>, Error> {
        self.deref().get_collaterals()
    }

    fn sign(&self, tx: &Transaction) -> Result<VKeyWitness, Error> {
        self.deref().sign(tx)
    }
}
