// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! In-memory collaborators
//!
//! Everything is kept in plain collections and handed out by clone. The remote collateral
//! stand-in counts the signatures it produced so tests can check it was involved.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::blockchain::{ChainProvider, CollateralProvider, RemoteCollateral, WalletProvider};
use crate::error::Error;
use crate::params::{ChainTip, ProtocolParameters};
use crate::transaction::{Transaction, VKeyWitness};
use crate::types::{Address, NetworkId, OutRef, Utxo};

/// Chain state held in memory
#[derive(Debug, Clone)]
pub struct MemoryChain {
    network: NetworkId,
    params: ProtocolParameters,
    tip: ChainTip,
}

impl MemoryChain {
    /// Create a new [`MemoryChain`]
    pub fn new(network: NetworkId, params: ProtocolParameters, tip: ChainTip) -> Self {
        MemoryChain {
            network,
            params,
            tip,
        }
    }

    /// Move the tip
    pub fn set_tip(&mut self, tip: ChainTip) {
        self.tip = tip;
    }

    /// Replace the protocol parameters
    pub fn set_protocol_parameters(&mut self, params: ProtocolParameters) {
        self.params = params;
    }
}

impl ChainProvider for MemoryChain {
    fn network(&self) -> NetworkId {
        self.network
    }

    fn protocol_parameters(&self) -> Result<ProtocolParameters, Error> {
        Ok(self.params.clone())
    }

    fn tip(&self) -> Result<ChainTip, Error> {
        Ok(self.tip)
    }
}

/// Wallet whose outputs are held in memory
#[derive(Debug, Clone)]
pub struct MemoryWallet {
    network: NetworkId,
    change_address: Address,
    utxos: Vec<Utxo>,
    collateral: Vec<Utxo>,
}

impl MemoryWallet {
    /// Create a new [`MemoryWallet`] without collateral
    pub fn new(network: NetworkId, change_address: Address, utxos: Vec<Utxo>) -> Self {
        MemoryWallet {
            network,
            change_address,
            utxos,
            collateral: Vec::new(),
        }
    }

    /// Add a spendable output
    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.utxos.push(utxo);
    }

    /// Flag an output as spent, returning whether it was known
    pub fn mark_spent(&mut self, out_ref: &OutRef) -> bool {
        match self.utxos.iter_mut().find(|u| &u.out_ref == out_ref) {
            Some(utxo) => {
                utxo.spent = true;
                true
            }
            None => false,
        }
    }

    /// Set aside outputs as collateral
    pub fn set_collateral(&mut self, collateral: Vec<Utxo>) {
        self.collateral = collateral;
    }
}

impl WalletProvider for MemoryWallet {
    fn network(&self) -> NetworkId {
        self.network
    }

    fn utxos(&self) -> Result<Vec<Utxo>, Error> {
        Ok(self.utxos.clone())
    }

    fn collateral(&self) -> Result<Vec<Utxo>, Error> {
        Ok(self.collateral.clone())
    }

    fn change_address(&self) -> Result<Address, Error> {
        Ok(self.change_address.clone())
    }
}

/// Remote collateral service returning fixed outputs and a fixed witness
#[derive(Debug)]
pub struct StaticCollateralProvider {
    collaterals: Vec<RemoteCollateral>,
    witness: VKeyWitness,
    signed: AtomicUsize,
}

impl StaticCollateralProvider {
    /// Create a new [`StaticCollateralProvider`]
    pub fn new(collaterals: Vec<RemoteCollateral>, witness: VKeyWitness) -> Self {
        StaticCollateralProvider {
            collaterals,
            witness,
            signed: AtomicUsize::new(0),
        }
    }

    /// Number of transactions signed so far
    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

impl CollateralProvider for StaticCollateralProvider {
    fn get_collaterals(&self) -> Result<Vec<RemoteCollateral>, Error> {
        Ok(self.collaterals.clone())
    }

    fn sign(&self, _tx: &Transaction) -> Result<VKeyWitness, Error> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(self.witness.clone())
    }
}
