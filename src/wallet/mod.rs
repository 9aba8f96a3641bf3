// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wallet
//!
//! This module defines the [`Wallet`]: a chain provider and a wallet provider composed into a
//! single value that exposes both method sets and builds transactions spending the wallet's
//! outputs.
//!
//! Building happens in two nested loops. The inner one, [`convergence::FeeConvergence`], selects
//! coins until inputs, estimated fee and change agree. The outer one drafts the whole
//! transaction, measures the fee the ledger actually asks for and feeds the difference back as
//! the new starting fee, until two consecutive drafts agree.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

pub mod candidate;
pub mod coin_selection;
pub mod collateral;
pub mod convergence;
pub mod fee;
pub mod output;
pub mod tx_builder;
pub mod utils;

use crate::blockchain::{ChainProvider, CollateralProvider, WalletProvider};
use crate::error::Error;
use crate::params::{BuildConfig, ChainTip, ProtocolParameters};
use crate::transaction::Transaction;
use crate::types::*;
use crate::value::Value;

use candidate::TxCandidate;
use coin_selection::{CoinSelectionAlgorithm, DefaultCoinSelectionAlgorithm};
use collateral::{select_collateral, Collateral};
use convergence::{Convergence, FeeConvergence};
use fee::{min_fee, FeeEstimator, LinearFeeEstimator};
use tx_builder::{BuildContext, FeeMode, TxBuilder, TxParams};

/// A balanced transaction, ready to be signed
#[derive(Debug, Clone)]
pub struct CompletedTx {
    /// The transaction, carrying the remote collateral witness if remote collateral was used
    pub transaction: Transaction,
    /// Fee paid
    pub fee: u64,
    /// Outputs picked by coin selection, on top of the explicitly collected ones
    pub selected: Vec<Utxo>,
    /// Side-channel entries attached by the operations
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Number of drafts built
    pub rounds: usize,
}

/// A chain and a wallet, seen as one
///
/// The [`Wallet`] implements both [`ChainProvider`] and [`WalletProvider`] by forwarding to the
/// collaborators it was built from.
pub struct Wallet<C, W> {
    chain: C,
    wallet: W,
    config: BuildConfig,
    collateral_provider: Option<Arc<dyn CollateralProvider>>,
}

impl<C, W> Wallet<C, W> {
    /// Compose `chain` and `wallet` with the default [`BuildConfig`]
    pub fn new(chain: C, wallet: W) -> Self {
        Wallet {
            chain,
            wallet,
            config: BuildConfig::default(),
            collateral_provider: None,
        }
    }

    /// Replace the builder tunables
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Fall back to `provider` when the wallet has no usable collateral
    pub fn with_collateral_provider(mut self, provider: Arc<dyn CollateralProvider>) -> Self {
        self.collateral_provider = Some(provider);
        self
    }

    /// Builder tunables
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The chain collaborator
    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// The wallet collaborator
    pub fn wallet_provider(&self) -> &W {
        &self.wallet
    }

    /// Start building a transaction
    ///
    /// See the [`TxBuilder`] docs for an example.
    pub fn build_tx(&self) -> TxBuilder<'_, C, W, DefaultCoinSelectionAlgorithm> {
        TxBuilder::new(self)
    }
}

impl<C, W: WalletProvider> Wallet<C, W> {
    /// Return the list of unspent outputs of this wallet
    pub fn list_unspent(&self) -> Result<Vec<Utxo>, Error> {
        Ok(self
            .wallet
            .utxos()?
            .into_iter()
            .filter(|u| !u.spent)
            .collect())
    }

    /// Return the value held by the unspent outputs of this wallet
    pub fn get_balance(&self) -> Result<Value, Error> {
        Ok(Value::sum(self.list_unspent()?.iter().map(|u| &u.value)))
    }
}

impl<C: ChainProvider, W: WalletProvider> Wallet<C, W> {
    fn build_context(&self) -> Result<BuildContext, Error> {
        let network = self.wallet.network();
        if self.chain.network() != network {
            return Err(Error::InvalidNetwork {
                requested: network,
                found: self.chain.network(),
            });
        }
        let change_address = self.wallet.change_address()?;
        if change_address.network() != network {
            return Err(Error::InvalidNetwork {
                requested: network,
                found: change_address.network(),
            });
        }

        Ok(BuildContext {
            network,
            params: self.chain.protocol_parameters()?,
            config: self.config.clone(),
            tip: self.chain.tip()?,
            change_address,
        })
    }

    pub(crate) fn create_tx<Cs: CoinSelectionAlgorithm>(
        &self,
        coin_selection: Cs,
        params: TxParams,
        mode: FeeMode,
    ) -> Result<CompletedTx, Error> {
        let ctx = self.build_context()?;

        let mut candidate = TxCandidate::new();
        for operation in &params.operations {
            trace!("applying {:?}", operation);
            let delta = operation.apply(&ctx, &candidate)?;
            candidate.apply(delta)?;
        }

        if !candidate
            .ex_units()
            .fits(&ctx.params.max_execution_units)
        {
            return Err(Error::ExecutionUnitsExceeded);
        }

        let pool = self
            .wallet
            .utxos()?
            .into_iter()
            .filter(|u| {
                !u.spent
                    && !u.address.is_script()
                    && !params.unspendable.contains(&u.out_ref)
                    && !candidate.spends(&u.out_ref)
            })
            .collect::<Vec<_>>();
        let collateral_pool = if candidate.needs_collateral() {
            self.wallet.collateral()?
        } else {
            Vec::new()
        };
        debug!(
            "building with {} spendable outputs, {} collateral outputs",
            pool.len(),
            collateral_pool.len()
        );

        let linear;
        let estimator: &dyn FeeEstimator = match &params.fee_estimator {
            Some(estimator) => estimator.as_ref(),
            None => {
                linear = LinearFeeEstimator::new(ctx.params.clone());
                &linear
            }
        };

        let target = candidate.target();
        let surplus = candidate.surplus();
        let build = Build {
            ctx: &ctx,
            candidate: &candidate,
            convergence: FeeConvergence {
                coin_selection: &coin_selection,
                estimator,
                pool: &pool,
                target: &target,
                surplus: &surplus,
                change_address: &ctx.change_address,
                params: &ctx.params,
                config: &ctx.config,
            },
            collateral_pool: &collateral_pool,
            remote: self.collateral_provider.as_deref(),
            unspendable: &params.unspendable,
        };

        let base_fee = estimator.base_fee(&candidate)?;
        let (draft, rounds) = match mode {
            FeeMode::MultiRound => build.multi_round(base_fee)?,
            FeeMode::SingleShot => (build.single_shot(base_fee)?, 1),
        };

        build.finish(draft, rounds)
    }
}

impl<C: ChainProvider, W> ChainProvider for Wallet<C, W> {
    fn network(&self) -> NetworkId {
        self.chain.network()
    }

    fn protocol_parameters(&self) -> Result<ProtocolParameters, Error> {
        self.chain.protocol_parameters()
    }

    fn tip(&self) -> Result<ChainTip, Error> {
        self.chain.tip()
    }
}

impl<C, W: WalletProvider> WalletProvider for Wallet<C, W> {
    fn network(&self) -> NetworkId {
        self.wallet.network()
    }

    fn utxos(&self) -> Result<Vec<Utxo>, Error> {
        self.wallet.utxos()
    }

    fn collateral(&self) -> Result<Vec<Utxo>, Error> {
        self.wallet.collateral()
    }

    fn change_address(&self) -> Result<Address, Error> {
        self.wallet.change_address()
    }
}

/// A whole transaction drafted with placeholder witnesses
#[derive(Debug)]
struct Draft {
    convergence: Convergence,
    collateral: Option<Collateral>,
    tx: Transaction,
    required: u64,
}

impl Draft {
    fn fee(&self) -> u64 {
        self.convergence.fee
    }

    fn pays_own_fee(&self) -> bool {
        self.fee() >= self.required
    }
}

/// Starting fee of the next round, moved by the difference between measured and paid fee
fn adjust_base_fee(base_fee: u64, fee: u64, required: u64) -> u64 {
    let next = i128::from(base_fee) + i128::from(required) - i128::from(fee);
    u64::try_from(next.max(0)).unwrap_or(u64::MAX)
}

struct Build<'a, Cs: CoinSelectionAlgorithm> {
    ctx: &'a BuildContext,
    candidate: &'a TxCandidate,
    convergence: FeeConvergence<'a, Cs, dyn FeeEstimator + 'a>,
    collateral_pool: &'a [Utxo],
    remote: Option<&'a dyn CollateralProvider>,
    unspendable: &'a BTreeSet<OutRef>,
}

impl<'a, Cs: CoinSelectionAlgorithm> Build<'a, Cs> {
    fn assemble(
        &self,
        convergence: &Convergence,
        collateral: Option<&Collateral>,
        placeholders: bool,
    ) -> Result<Transaction, Error> {
        let collateral = collateral.map(Collateral::inputs).unwrap_or_default();
        self.candidate.to_transaction(
            &convergence.selected,
            Some(&convergence.change),
            convergence.fee,
            &collateral,
            placeholders,
            &self.ctx.params.cost_models,
        )
    }

    fn draft_with(&self, convergence: Convergence) -> Result<Draft, Error> {
        let collateral = if self.candidate.needs_collateral() {
            Some(select_collateral(
                self.collateral_pool,
                self.remote,
                self.unspendable,
                convergence.fee,
                &self.ctx.params,
            )?)
        } else {
            None
        };

        let tx = self.assemble(&convergence, collateral.as_ref(), true)?;
        let required = min_fee(&tx, &self.ctx.params)?;

        Ok(Draft {
            convergence,
            collateral,
            tx,
            required,
        })
    }

    fn draft(&self, base_fee: u64) -> Result<Draft, Error> {
        let convergence = self.convergence.run(base_fee)?;
        self.draft_with(convergence)
    }

    fn multi_round(&self, mut base_fee: u64) -> Result<(Draft, usize), Error> {
        let max_rounds = self.ctx.config.max_rounds.max(1);
        let mut previous: Option<Draft> = None;
        let mut older: Option<Draft> = None;

        for round in 1..=max_rounds {
            let draft = self.draft(base_fee)?;
            debug!(
                "round {}: base fee = `{}`, fee = `{}`, required = `{}`, {} inputs",
                round,
                base_fee,
                draft.fee(),
                draft.required,
                draft.convergence.selected.len()
            );

            if let Some(previous) = &previous {
                if previous.fee() == draft.fee() && draft.pays_own_fee() {
                    return Ok((draft, round));
                }
            }

            base_fee = adjust_base_fee(base_fee, draft.fee(), draft.required);
            older = previous.replace(draft);
        }

        match older
            .into_iter()
            .chain(previous)
            .filter(Draft::pays_own_fee)
            .min_by_key(Draft::fee)
        {
            Some(draft) => {
                warn!(
                    "fee did not settle after {} rounds, using the cheaper draft paying `{}`",
                    max_rounds,
                    draft.fee()
                );
                Ok((draft, max_rounds))
            }
            None => Err(Error::FeeNotConverged { rounds: max_rounds }),
        }
    }

    fn single_shot(&self, base_fee: u64) -> Result<Draft, Error> {
        let draft = self.draft(base_fee)?;
        if draft.pays_own_fee() {
            return Ok(draft);
        }

        let shortfall = draft.required - draft.fee();
        debug!("settling a shortfall of `{}` from the change", shortfall);

        let Convergence {
            selected,
            fee,
            change,
            steps,
        } = draft.convergence;
        let reduced = change
            .user_value()
            .checked_sub(&Value::from_base(shortfall))
            .ok_or(Error::FeeNotConverged { rounds: 1 })?;
        let change = self
            .ctx
            .output(change.address().clone(), reduced, None)?;
        if !change.is_covered() {
            return Err(Error::FeeNotConverged { rounds: 1 });
        }

        let settled = self.draft_with(Convergence {
            selected,
            fee: fee.saturating_add(shortfall),
            change,
            steps,
        })?;
        if !settled.pays_own_fee() {
            return Err(Error::FeeNotConverged { rounds: 1 });
        }

        Ok(settled)
    }

    fn finish(&self, draft: Draft, rounds: usize) -> Result<CompletedTx, Error> {
        let size = draft.tx.size()?;
        if size as u64 > self.ctx.params.max_tx_size {
            return Err(Error::TransactionTooLarge {
                size,
                max: self.ctx.params.max_tx_size,
            });
        }

        let mut transaction = self.assemble(&draft.convergence, draft.collateral.as_ref(), false)?;
        if let (Some(Collateral::Remote(_)), Some(remote)) = (&draft.collateral, self.remote) {
            let witness = remote.sign(&transaction)?;
            transaction.witness_set.vkeys.push(witness);
        }

        info!(
            "built transaction `{}`: fee `{}`, {} inputs, {} outputs, {} rounds",
            transaction.hash()?,
            draft.fee(),
            transaction.body.inputs.len(),
            transaction.body.outputs.len(),
            rounds
        );

        Ok(CompletedTx {
            transaction,
            fee: draft.fee(),
            selected: draft.convergence.selected,
            metadata: self.candidate.metadata().clone(),
            rounds,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::memory::{MemoryChain, MemoryWallet};
    use crate::params::test_params;
    use crate::transaction::VKeyWitness;

    fn address(network: NetworkId) -> Address {
        Address::enterprise(network, &KeyHash::from([1; 28]))
    }

    fn utxo(n: u8, value: Value) -> Utxo {
        Utxo::new(
            OutRef::new(TxHash::from([n; 32]), 0),
            address(NetworkId::Testnet),
            value,
        )
    }

    fn get_funded_wallet(utxos: Vec<Utxo>) -> Wallet<MemoryChain, MemoryWallet> {
        let _ = env_logger::try_init();
        Wallet::new(
            MemoryChain::new(NetworkId::Testnet, test_params(), ChainTip::default()),
            MemoryWallet::new(NetworkId::Testnet, address(NetworkId::Testnet), utxos),
        )
    }

    fn recipient() -> Address {
        Address::enterprise(NetworkId::Testnet, &KeyHash::from([2; 28]))
    }

    #[test]
    fn test_adjust_base_fee() {
        assert_eq!(adjust_base_fee(100, 150, 170), 120);
        assert_eq!(adjust_base_fee(100, 170, 150), 80);
        assert_eq!(adjust_base_fee(10, 170, 150), 0);
    }

    #[test]
    fn test_forwarding() {
        let wallet = get_funded_wallet(vec![utxo(1, Value::from_base(1))]);

        assert_eq!(ChainProvider::network(&wallet), NetworkId::Testnet);
        assert_eq!(WalletProvider::network(&wallet), NetworkId::Testnet);
        assert_eq!(wallet.protocol_parameters().unwrap(), test_params());
        assert_eq!(wallet.utxos().unwrap().len(), 1);
        assert_eq!(wallet.change_address().unwrap(), address(NetworkId::Testnet));
    }

    #[test]
    fn test_list_unspent_skips_spent() {
        let mut spent = utxo(2, Value::from_base(7_000_000));
        spent.spent = true;
        let wallet = get_funded_wallet(vec![utxo(1, Value::from_base(5_000_000)), spent]);

        assert_eq!(wallet.list_unspent().unwrap().len(), 1);
        assert_eq!(wallet.get_balance().unwrap(), Value::from_base(5_000_000));
    }

    #[test]
    fn test_chain_network_mismatch() {
        let wallet = Wallet::new(
            MemoryChain::new(NetworkId::Mainnet, test_params(), ChainTip::default()),
            MemoryWallet::new(
                NetworkId::Testnet,
                address(NetworkId::Testnet),
                vec![utxo(1, Value::from_base(10_000_000))],
            ),
        );

        let mut builder = wallet.build_tx();
        builder.pay_to(recipient(), Value::from_base(2_000_000));
        assert!(matches!(
            builder.complete(),
            Err(Error::InvalidNetwork {
                requested: NetworkId::Testnet,
                found: NetworkId::Mainnet
            })
        ));
    }

    #[test]
    fn test_change_address_network_mismatch() {
        let wallet = Wallet::new(
            MemoryChain::new(NetworkId::Testnet, test_params(), ChainTip::default()),
            MemoryWallet::new(
                NetworkId::Testnet,
                address(NetworkId::Mainnet),
                vec![utxo(1, Value::from_base(10_000_000))],
            ),
        );

        let mut builder = wallet.build_tx();
        builder.pay_to(recipient(), Value::from_base(2_000_000));
        assert!(matches!(
            builder.complete(),
            Err(Error::InvalidNetwork {
                found: NetworkId::Mainnet,
                ..
            })
        ));
    }

    #[test]
    fn test_multi_round_pays_measured_fee() {
        let wallet = get_funded_wallet(vec![
            utxo(1, Value::from_base(3_000_000)),
            utxo(2, Value::from_base(4_000_000)),
        ]);

        let mut builder = wallet.build_tx();
        builder.pay_to(recipient(), Value::from_base(5_000_000));
        let completed = builder.complete().unwrap();

        // both inputs share one key, so one signature
        let mut signed = completed.transaction.clone();
        signed.witness_set.vkeys.push(VKeyWitness::placeholder());
        let required = min_fee(&signed, &test_params()).unwrap();

        assert_eq!(completed.transaction.body.fee, completed.fee);
        assert!(completed.fee >= required);
        assert!(completed.fee <= required + 1_000);
        assert!(completed.rounds >= 2);
        assert_eq!(completed.selected.len(), 2);
    }

    #[test]
    fn test_single_shot_overpays_at_most_one_round() {
        let wallet = get_funded_wallet(vec![utxo(1, Value::from_base(10_000_000))]);

        let mut builder = wallet.build_tx();
        builder.pay_to(recipient(), Value::from_base(2_000_000));
        let completed = builder.complete_single_shot().unwrap();

        let mut signed = completed.transaction.clone();
        signed.witness_set.vkeys.push(VKeyWitness::placeholder());

        assert_eq!(completed.rounds, 1);
        assert!(completed.fee >= min_fee(&signed, &test_params()).unwrap());
    }

    #[test]
    fn test_value_is_preserved() {
        let wallet = get_funded_wallet(vec![
            utxo(1, Value::from_base(3_000_000)),
            utxo(2, Value::from_base(9_000_000)),
        ]);

        let mut builder = wallet.build_tx();
        builder.pay_to(recipient(), Value::from_base(4_000_000));
        let completed = builder.complete().unwrap();

        let spent = Value::sum(completed.selected.iter().map(|u| &u.value));
        let created = Value::sum(completed.transaction.body.outputs.iter().map(|o| &o.value));
        assert_eq!(spent, created.add(&Value::from_base(completed.fee)));
    }
}
