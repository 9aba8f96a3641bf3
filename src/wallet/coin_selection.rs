// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Coin selection
//!
//! This module provides the trait [`CoinSelectionAlgorithm`] that can be implemented to
//! define custom coin selection algorithms.
//!
//! The coin selection algorithm is not globally part of a [`Wallet`](super::Wallet), instead it
//! is chosen for every build through [`TxBuilder::coin_selection`].
//!
//! The [`DefaultCoinSelectionAlgorithm`] selects the default coin selection algorithm that
//! [`TxBuilder`] uses, if it's not explicitly overridden.
//!
//! Selection is incremental: the fee convergence loop calls the algorithm again with a larger
//! target and everything it already picked, and only expects the *additional* outputs back.
//! Algorithms must be deterministic, so that the same pool and target always produce the same
//! transaction.
//!
//! [`TxBuilder`]: super::tx_builder::TxBuilder
//! [`TxBuilder::coin_selection`]: super::tx_builder::TxBuilder::coin_selection
//!
//! ## Example
//!
//! ```
//! # use utxo_forge::wallet::coin_selection::*;
//! # use utxo_forge::*;
//! #[derive(Debug)]
//! struct AlwaysSpendEverything;
//!
//! impl CoinSelectionAlgorithm for AlwaysSpendEverything {
//!     fn coin_select(
//!         &self,
//!         already_selected: &[Utxo],
//!         candidates: &[Utxo],
//!         target: &Value,
//!     ) -> Result<CoinSelectionResult, Error> {
//!         let selected = candidates
//!             .iter()
//!             .filter(|c| already_selected.iter().all(|s| s.out_ref != c.out_ref))
//!             .cloned()
//!             .collect::<Vec<_>>();
//!
//!         let held = Value::sum(already_selected.iter().chain(&selected).map(|u| &u.value));
//!         if let Some(missing) = InsufficientFunds::check(&held, target) {
//!             return Err(missing.into());
//!         }
//!
//!         Ok(CoinSelectionResult { selected })
//!     }
//! }
//! ```

use malachite::Natural;
use std::fmt;

use crate::error::Error;
use crate::types::{AssetId, Utxo};
use crate::value::Value;

/// Default coin selection algorithm used by [`TxBuilder`](super::tx_builder::TxBuilder) if not
/// overridden
pub type DefaultCoinSelectionAlgorithm = LargestFirstCoinSelection;

/// The pool cannot cover the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientFunds {
    /// First asset that could not be covered
    pub asset: AssetId,
    /// Amount of it the target asks for
    pub needed: Natural,
    /// Amount of it the whole pool holds
    pub available: Natural,
}

impl InsufficientFunds {
    /// First asset of `target` that `held` does not cover, if any
    pub fn check(held: &Value, target: &Value) -> Option<InsufficientFunds> {
        target.iter().find_map(|(asset, needed)| {
            let available = held.amount(asset);
            if &available < needed {
                Some(InsufficientFunds {
                    asset: asset.clone(),
                    needed: needed.clone(),
                    available,
                })
            } else {
                None
            }
        })
    }
}

impl fmt::Display for InsufficientFunds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Insufficient funds: {} available of {} needed ({})",
            self.available, self.needed, self.asset
        )
    }
}

impl std::error::Error for InsufficientFunds {}

/// Result of a successful coin selection
#[derive(Debug, Clone, Default)]
pub struct CoinSelectionResult {
    /// Outputs selected on top of the already selected ones
    pub selected: Vec<Utxo>,
}

impl CoinSelectionResult {
    /// Sum of the newly selected outputs' value
    pub fn selected_value(&self) -> Value {
        Value::sum(self.selected.iter().map(|utxo| &utxo.value))
    }
}

/// Trait for generalized coin selection algorithms
///
/// This trait can be implemented to make the [`Wallet`](super::Wallet) use a customized coin
/// selection algorithm when it creates transactions.
///
/// For an example see [this module](crate::wallet::coin_selection)'s documentation.
pub trait CoinSelectionAlgorithm: std::fmt::Debug {
    /// Perform the coin selection
    ///
    /// - `already_selected`: outputs picked by previous calls, they count towards `target` and
    ///                       must never be returned again
    /// - `candidates`: outputs that may be spent to cover what is missing
    /// - `target`: value the already selected plus the newly selected outputs must cover
    ///
    /// Fails with [`Error::InsufficientFunds`] if `candidates` cannot cover the target, returns an
    /// empty selection if nothing is missing.
    fn coin_select(
        &self,
        already_selected: &[Utxo],
        candidates: &[Utxo],
        target: &Value,
    ) -> Result<CoinSelectionResult, Error>;
}

fn remaining<'a>(already_selected: &'a [Utxo], candidates: &'a [Utxo]) -> Vec<&'a Utxo> {
    candidates
        .iter()
        .filter(|c| already_selected.iter().all(|s| s.out_ref != c.out_ref))
        .collect()
}

/// Picks the largest holders of every missing asset first
///
/// Native assets are covered before the base asset, since the outputs picked for them usually
/// carry some base asset too. Ties are broken by output reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestFirstCoinSelection;

impl CoinSelectionAlgorithm for LargestFirstCoinSelection {
    fn coin_select(
        &self,
        already_selected: &[Utxo],
        candidates: &[Utxo],
        target: &Value,
    ) -> Result<CoinSelectionResult, Error> {
        let mut held = Value::sum(already_selected.iter().map(|utxo| &utxo.value));
        let mut pool = remaining(already_selected, candidates);
        let mut selected = Vec::new();

        log::debug!("target = `{}`, already held = `{}`", target, held);

        let assets = target
            .native_assets()
            .chain(target.iter().filter(|(asset, _)| asset.is_base()));
        for (asset, needed) in assets {
            if &held.amount(asset) >= needed {
                continue;
            }

            // largest holders last, so they can be popped
            pool.sort_by(|a, b| {
                a.value
                    .amount(asset)
                    .cmp(&b.value.amount(asset))
                    .then_with(|| b.out_ref.cmp(&a.out_ref))
            });

            while &held.amount(asset) < needed {
                match pool.pop() {
                    Some(utxo) if utxo.value.amount(asset) > Natural::from(0u32) => {
                        log::trace!("Selected {} for {}", utxo.out_ref, asset);
                        held = held.add(&utxo.value);
                        selected.push(utxo.clone());
                    }
                    _ => {
                        let missing = InsufficientFunds {
                            asset: asset.clone(),
                            needed: needed.clone(),
                            available: held.amount(asset),
                        };
                        log::debug!("{}", missing);
                        return Err(missing.into());
                    }
                }
            }
        }

        Ok(CoinSelectionResult { selected })
    }
}

/// Picks outputs in the order they are given
///
/// Outputs holding none of the missing assets are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListOrderCoinSelection;

impl CoinSelectionAlgorithm for ListOrderCoinSelection {
    fn coin_select(
        &self,
        already_selected: &[Utxo],
        candidates: &[Utxo],
        target: &Value,
    ) -> Result<CoinSelectionResult, Error> {
        let mut held = Value::sum(already_selected.iter().map(|utxo| &utxo.value));
        let mut selected = Vec::new();

        for utxo in remaining(already_selected, candidates) {
            let missing = target.saturating_sub(&held);
            if missing.is_zero() {
                break;
            }
            if missing.iter().any(|(asset, _)| utxo.value.amount(asset) > Natural::from(0u32)) {
                log::trace!("Selected {}", utxo.out_ref);
                held = held.add(&utxo.value);
                selected.push(utxo.clone());
            }
        }

        if let Some(missing) = InsufficientFunds::check(&held, target) {
            return Err(missing.into());
        }

        Ok(CoinSelectionResult { selected })
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::types::{Address, AssetName, KeyHash, NetworkId, OutRef, PolicyId, TxHash};

    fn token() -> AssetId {
        AssetId::native(PolicyId::from([5; 28]), AssetName::new(b"tok".to_vec()).unwrap())
    }

    fn utxo(n: u8, value: Value) -> Utxo {
        Utxo::new(
            OutRef::new(TxHash::from([n; 32]), 0),
            Address::enterprise(NetworkId::Testnet, &KeyHash::from([1; 28])),
            value,
        )
    }

    fn get_test_utxos() -> Vec<Utxo> {
        vec![
            utxo(1, Value::from_base(100_000)),
            utxo(2, Value::from_base(200_000)),
            utxo(3, Value::from_base(50_000).with(token(), 10)),
        ]
    }

    #[test]
    fn test_largest_first_success() {
        let result = LargestFirstCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::from_base(250_000))
            .unwrap();

        assert_eq!(result.selected.len(), 2);
        assert_eq!(result.selected_value(), Value::from_base(300_000));
    }

    #[test]
    fn test_largest_first_use_only_necessary() {
        let result = LargestFirstCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::from_base(20_000))
            .unwrap();

        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected_value(), Value::from_base(200_000));
    }

    #[test]
    fn test_largest_first_native_assets_first() {
        let target = Value::from_base(60_000).with(token(), 5);
        let result = LargestFirstCoinSelection
            .coin_select(&[], &get_test_utxos(), &target)
            .unwrap();

        assert_eq!(result.selected[0].out_ref.tx_hash, TxHash::from([3; 32]));
        assert_eq!(result.selected.len(), 2);
        assert!(result.selected_value().covers(&target));
    }

    #[test]
    fn test_nothing_missing() {
        let utxos = get_test_utxos();
        let result = LargestFirstCoinSelection
            .coin_select(&utxos[..1], &utxos, &Value::from_base(100_000))
            .unwrap();

        assert!(result.selected.is_empty());
    }

    #[test]
    #[should_panic(expected = "InsufficientFunds")]
    fn test_largest_first_insufficient_funds() {
        LargestFirstCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::from_base(500_000))
            .unwrap();
    }

    #[test]
    #[should_panic(expected = "InsufficientFunds")]
    fn test_largest_first_missing_asset() {
        LargestFirstCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::new().with(token(), 11))
            .unwrap();
    }

    #[test]
    fn test_insufficient_funds_details() {
        let err = LargestFirstCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::from_base(500_000))
            .unwrap_err();

        match err {
            Error::InsufficientFunds(missing) => {
                assert_eq!(missing.asset, AssetId::Base);
                assert_eq!(missing.needed, Natural::from(500_000u32));
                assert_eq!(missing.available, Natural::from(350_000u32));
                assert_eq!(
                    missing.to_string(),
                    "Insufficient funds: 350000 available of 500000 needed (base)"
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_list_order() {
        let result = ListOrderCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::from_base(120_000))
            .unwrap();

        assert_eq!(result.selected.len(), 2);
        assert_eq!(result.selected[0].out_ref.tx_hash, TxHash::from([1; 32]));

        let result = ListOrderCoinSelection
            .coin_select(&[], &get_test_utxos(), &Value::new().with(token(), 1))
            .unwrap();
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].out_ref.tx_hash, TxHash::from([3; 32]));
    }

    fn random_pool(rng: &mut StdRng) -> Vec<Utxo> {
        (0..rng.gen_range(1, 30))
            .map(|n| {
                let mut value = Value::from_base(rng.gen_range(1_000_000, 50_000_000));
                if rng.gen_bool(0.3) {
                    value = value.with(token(), rng.gen_range(1, 100));
                }
                utxo(n as u8, value)
            })
            .collect()
    }

    #[test]
    fn test_monotonic_growth() {
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let pool = random_pool(&mut rng);
            let total = Value::sum(pool.iter().map(|u| &u.value));
            let first_target = Value::from_base(rng.gen_range(0, 20_000_000));
            let second_target = first_target.add(&Value::from_base(rng.gen_range(0, 40_000_000)));

            let first = match LargestFirstCoinSelection.coin_select(&[], &pool, &first_target) {
                Ok(result) => result.selected,
                Err(_) => {
                    assert!(!total.covers(&first_target));
                    continue;
                }
            };
            match LargestFirstCoinSelection.coin_select(&first, &pool, &second_target) {
                Ok(more) => {
                    assert!(more
                        .selected
                        .iter()
                        .all(|u| first.iter().all(|f| f.out_ref != u.out_ref)));
                    let held = Value::sum(first.iter().chain(&more.selected).map(|u| &u.value));
                    assert!(held.covers(&second_target));
                }
                Err(_) => assert!(!total.covers(&second_target)),
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..50 {
            let pool = random_pool(&mut rng);
            let mut shuffled = pool.clone();
            shuffled.reverse();
            let target = Value::from_base(rng.gen_range(0, 30_000_000));

            let a = LargestFirstCoinSelection.coin_select(&[], &pool, &target);
            let b = LargestFirstCoinSelection.coin_select(&[], &shuffled, &target);
            match (a, b) {
                (Ok(a), Ok(b)) => assert_eq!(a.selected, b.selected),
                (Err(_), Err(_)) => {}
                _ => panic!("selection depends on pool order"),
            }
        }
    }
}
