// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Fee convergence
//!
//! Selecting an input makes the transaction bigger, which raises the fee, which may require
//! another input. Creating the change output costs fee too, and the change has to lock its own
//! minimum deposit. [`FeeConvergence`] iterates selection until inputs, fee and change agree.
//!
//! The loop starts in [`Phase::Exploring`], where running out of coins is a plain
//! [`Error::InsufficientFunds`]. As soon as the change output itself forces the selection to
//! grow, the loop moves to [`Phase::Normalizing`]: from then on running out of coins means the
//! payment could be covered but not a valid change output, reported as
//! [`Error::InsufficientFundsForChange`], and the number of extra rounds is bounded by
//! [`BuildConfig::max_normalizing_attempts`].
//!
//! Every round either selects at least one more output, or strictly raises the value to select.
//! The pool is finite and the normalizing rounds are bounded, so the loop terminates.

use crate::error::Error;
use crate::params::{BuildConfig, ProtocolParameters};
use crate::types::{Address, AssetId, Utxo};
use crate::value::Value;
use crate::wallet::coin_selection::CoinSelectionAlgorithm;
use crate::wallet::fee::FeeEstimator;
use crate::wallet::output::Output;

/// Phase of the convergence loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Looking for enough coins to cover target and fee
    Exploring,
    /// Growing the selection so that the change output becomes valid
    Normalizing {
        /// Rounds spent normalizing so far
        attempts: usize,
    },
}

/// Outcome of a converged selection
#[derive(Debug, Clone)]
pub struct Convergence {
    /// Outputs selected from the pool, in selection order
    pub selected: Vec<Utxo>,
    /// Fee paid by the transaction, change output included
    pub fee: u64,
    /// Change output, always covering its minimum deposit
    pub change: Output,
    /// Number of rounds the loop took
    pub steps: usize,
}

/// Single-shot fee convergence over a pool of spendable outputs
#[derive(Debug)]
pub struct FeeConvergence<'a, Cs: CoinSelectionAlgorithm, F: FeeEstimator + ?Sized> {
    /// Selection algorithm
    pub coin_selection: &'a Cs,
    /// Fee estimator
    pub estimator: &'a F,
    /// Outputs that may be selected
    pub pool: &'a [Utxo],
    /// Value to cover, fees excluded
    pub target: &'a Value,
    /// Value already provided beyond the target, returned as change
    pub surplus: &'a Value,
    /// Where change goes
    pub change_address: &'a Address,
    /// Ledger rules
    pub params: &'a ProtocolParameters,
    /// Builder tunables
    pub config: &'a BuildConfig,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    fee: u64,
    reserved_change_fee: u64,
    /// Minimum deposit the change must hold on top of target and fee
    deposit_topup: u64,
    selected: Vec<Utxo>,
    steps: usize,
}

impl State {
    fn normalize(&mut self, max_attempts: usize, needed: u64, available: u64) -> Result<(), Error> {
        self.phase = match self.phase {
            Phase::Exploring => Phase::Normalizing { attempts: 1 },
            Phase::Normalizing { attempts } if attempts < max_attempts => Phase::Normalizing {
                attempts: attempts + 1,
            },
            Phase::Normalizing { .. } => {
                return Err(Error::InsufficientFundsForChange { needed, available })
            }
        };

        Ok(())
    }
}

fn base(amount: u64) -> Value {
    Value::new().with(AssetId::Base, amount)
}

fn base_u64(value: &Value) -> u64 {
    value.base_amount_u64().unwrap_or(u64::MAX)
}

impl<'a, Cs: CoinSelectionAlgorithm, F: FeeEstimator + ?Sized> FeeConvergence<'a, Cs, F> {
    /// Run the loop, starting from a fee of `base_fee`
    pub fn run(&self, base_fee: u64) -> Result<Convergence, Error> {
        let mut state = State {
            phase: Phase::Exploring,
            fee: base_fee,
            reserved_change_fee: 0,
            deposit_topup: 0,
            selected: Vec::new(),
            steps: 0,
        };
        let pool_base = base_u64(&Value::sum(self.pool.iter().map(|u| &u.value)))
            .saturating_add(base_u64(self.surplus));

        loop {
            state.steps += 1;

            // target + fee + top-up, minus what the surplus already brings
            let required = self
                .target
                .add(&base(state.fee.saturating_add(state.deposit_topup)));
            let value_to_select = required.saturating_sub(self.surplus);
            let needed = base_u64(&required);

            log::debug!(
                "step {} {:?}: fee = `{}`, topup = `{}`, to select = `{}`",
                state.steps,
                state.phase,
                state.fee,
                state.deposit_topup,
                value_to_select
            );

            let new = match self
                .coin_selection
                .coin_select(&state.selected, self.pool, &value_to_select)
            {
                Ok(result) => result.selected,
                Err(Error::InsufficientFunds(missing)) => {
                    return Err(match state.phase {
                        Phase::Exploring => Error::InsufficientFunds(missing),
                        Phase::Normalizing { .. } => Error::InsufficientFundsForChange {
                            needed,
                            available: pool_base,
                        },
                    })
                }
                Err(e) => return Err(e),
            };

            let mut input_fee = 0u64;
            for utxo in &new {
                input_fee = input_fee.saturating_add(self.estimator.input_fee(utxo)?);
            }
            state.fee = state.fee.saturating_add(input_fee);
            state.selected.extend(new);

            let held = Value::sum(state.selected.iter().map(|u| &u.value)).add(self.surplus);
            let with_fee = self.target.add(&base(state.fee));
            if !held.covers(&with_fee.add(&base(state.deposit_topup))) {
                log::debug!("new inputs cost `{}`, selecting again", input_fee);
                continue;
            }

            let mut change = self.change_output(held.saturating_sub(&with_fee))?;
            let change_fee = self.estimator.output_fee(&change)?;
            if change_fee > state.reserved_change_fee {
                let delta = change_fee - state.reserved_change_fee;
                state.reserved_change_fee = change_fee;
                state.fee = state.fee.saturating_add(delta);

                let with_fee = self.target.add(&base(state.fee));
                if !held.covers(&with_fee) {
                    log::debug!("change output costs `{}`, normalizing", delta);
                    state.normalize(self.config.max_normalizing_attempts, needed, pool_base)?;
                    continue;
                }
                change = self.change_output(held.saturating_sub(&with_fee))?;
            }

            if !change.is_covered() {
                log::debug!(
                    "change `{}` short of its deposit by `{}`, normalizing",
                    change.user_value(),
                    change.deficit()
                );
                // the next selection has to leave the whole deposit as change
                state.deposit_topup = state.deposit_topup.max(change.minimum_deposit());
                state.normalize(self.config.max_normalizing_attempts, needed, pool_base)?;
                continue;
            }

            log::debug!(
                "converged after {} steps: {} inputs, fee = `{}`, change = `{}`",
                state.steps,
                state.selected.len(),
                state.fee,
                change.user_value()
            );

            return Ok(Convergence {
                selected: state.selected,
                fee: state.fee,
                change,
                steps: state.steps,
            });
        }
    }

    fn change_output(&self, value: Value) -> Result<Output, Error> {
        Output::new(
            self.change_address.clone(),
            value,
            None,
            self.params,
            self.config,
        )
    }
}
