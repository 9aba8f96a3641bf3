// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Collateral
//!
//! A transaction running scripts pledges base asset that the ledger collects if one of its
//! scripts fails. Collateral is drawn from a pool separate from the spendable outputs: the
//! outputs the wallet set aside, restricted to key-locked outputs holding nothing but the base
//! asset. When that pool is empty or too small, a remote [`CollateralProvider`] may lend its own
//! outputs instead.

use std::collections::BTreeSet;

use crate::blockchain::{CollateralProvider, RemoteCollateral};
use crate::error::Error;
use crate::params::ProtocolParameters;
use crate::types::{Address, OutRef, Utxo};
use crate::wallet::utils::ceil_div;

/// Collateral the ledger asks for a transaction paying `fee`
pub fn required_collateral(fee: u64, params: &ProtocolParameters) -> u64 {
    ceil_div(fee.saturating_mul(params.collateral_percentage), 100)
}

/// Outputs pledged as collateral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collateral {
    /// Outputs owned by the wallet
    Local(Vec<Utxo>),
    /// Outputs lent by a remote provider, which has to sign the final transaction
    Remote(Vec<RemoteCollateral>),
}

impl Collateral {
    /// References and owners of the pledged outputs
    pub fn inputs(&self) -> Vec<(OutRef, Address)> {
        match self {
            Collateral::Local(utxos) => utxos
                .iter()
                .map(|u| (u.out_ref, u.address.clone()))
                .collect(),
            Collateral::Remote(lent) => lent
                .iter()
                .map(|c| (c.out_ref, c.address.clone()))
                .collect(),
        }
    }

    /// Whether the collateral was lent by a remote provider
    pub fn is_remote(&self) -> bool {
        matches!(self, Collateral::Remote(_))
    }
}

fn base(utxo: &Utxo) -> u64 {
    utxo.value.base_amount_u64().unwrap_or(u64::MAX)
}

/// Whether `utxo` may be pledged as collateral
pub fn is_eligible(utxo: &Utxo, unspendable: &BTreeSet<OutRef>) -> bool {
    !utxo.spent
        && !utxo.value.has_native_assets()
        && utxo.address.payment_key_hash().is_some()
        && !unspendable.contains(&utxo.out_ref)
}

/// Pick at most `max_inputs` eligible outputs from `pool`, largest first, until they hold
/// `required`
///
/// At least one output is always picked, even when nothing is required.
pub fn select_local(
    pool: &[Utxo],
    unspendable: &BTreeSet<OutRef>,
    required: u64,
    max_inputs: usize,
) -> Result<Vec<Utxo>, Error> {
    let mut eligible = pool
        .iter()
        .filter(|u| is_eligible(u, unspendable))
        .collect::<Vec<_>>();
    if eligible.is_empty() || max_inputs == 0 {
        return Err(Error::NoCollateral);
    }
    eligible.sort_by(|a, b| base(b).cmp(&base(a)).then(a.out_ref.cmp(&b.out_ref)));

    let mut selected = Vec::new();
    let mut held = 0u64;
    for utxo in eligible.into_iter().take(max_inputs) {
        if held >= required && !selected.is_empty() {
            break;
        }
        log::trace!("pledging `{}` holding `{}`", utxo.out_ref, base(utxo));
        held = held.saturating_add(base(utxo));
        selected.push(utxo.clone());
    }

    if held < required {
        return Err(Error::InsufficientCollateral {
            needed: required,
            available: held,
        });
    }

    Ok(selected)
}

/// Collateral for a transaction paying `fee`
///
/// The wallet's own pool is tried first. If it is empty or too small and a `remote` provider is
/// configured, the provider's outputs are used instead, otherwise the local error is returned.
/// Remote outputs carry no amount, the provider is trusted to lend enough.
pub fn select_collateral(
    pool: &[Utxo],
    remote: Option<&dyn CollateralProvider>,
    unspendable: &BTreeSet<OutRef>,
    fee: u64,
    params: &ProtocolParameters,
) -> Result<Collateral, Error> {
    let required = required_collateral(fee, params);

    let local_error = match select_local(pool, unspendable, required, params.max_collateral_inputs)
    {
        Ok(selected) => return Ok(Collateral::Local(selected)),
        Err(e @ Error::NoCollateral) | Err(e @ Error::InsufficientCollateral { .. }) => e,
        Err(e) => return Err(e),
    };

    let provider = match remote {
        Some(provider) => provider,
        None => return Err(local_error),
    };
    log::debug!(
        "local collateral unusable ({}), asking the remote provider",
        local_error
    );

    let lent = provider
        .get_collaterals()?
        .into_iter()
        .filter(|c| !unspendable.contains(&c.out_ref))
        .take(params.max_collateral_inputs)
        .collect::<Vec<_>>();
    if lent.is_empty() {
        return Err(Error::InsufficientCollateral {
            needed: required,
            available: 0,
        });
    }

    Ok(Collateral::Remote(lent))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::memory::StaticCollateralProvider;
    use crate::params::test_params;
    use crate::transaction::VKeyWitness;
    use crate::types::{AssetId, AssetName, KeyHash, NetworkId, PolicyId, TxHash};
    use crate::value::Value;

    fn address() -> Address {
        Address::enterprise(NetworkId::Testnet, &KeyHash::from([1; 28]))
    }

    fn utxo(n: u8, value: Value) -> Utxo {
        Utxo::new(OutRef::new(TxHash::from([n; 32]), 0), address(), value)
    }

    fn remote(n: u8) -> RemoteCollateral {
        RemoteCollateral {
            out_ref: OutRef::new(TxHash::from([n; 32]), 1),
            address: Address::enterprise(NetworkId::Testnet, &KeyHash::from([n; 28])),
        }
    }

    fn provider(lent: Vec<RemoteCollateral>) -> StaticCollateralProvider {
        StaticCollateralProvider::new(lent, VKeyWitness::placeholder())
    }

    #[test]
    fn test_required_collateral() {
        let params = test_params();
        assert_eq!(required_collateral(200_000, &params), 300_000);
        assert_eq!(required_collateral(200_001, &params), 300_002);
        assert_eq!(required_collateral(0, &params), 0);
    }

    #[test]
    fn test_eligibility() {
        let token = AssetId::native(PolicyId::from([3; 28]), AssetName::default());
        let script = Address::script(NetworkId::Testnet, &PolicyId::from([4; 28]));
        let mut spent = utxo(4, Value::from_base(5_000_000));
        spent.spent = true;
        let excluded = utxo(5, Value::from_base(5_000_000));
        let unspendable = vec![excluded.out_ref].into_iter().collect();

        assert!(is_eligible(&utxo(1, Value::from_base(5_000_000)), &unspendable));
        assert!(!is_eligible(
            &utxo(2, Value::from_base(5_000_000).with(token, 1)),
            &unspendable
        ));
        assert!(!is_eligible(
            &Utxo::new(OutRef::new(TxHash::from([3; 32]), 0), script, Value::from_base(5_000_000)),
            &unspendable
        ));
        assert!(!is_eligible(&spent, &unspendable));
        assert!(!is_eligible(&excluded, &unspendable));
    }

    #[test]
    fn test_local_largest_first() {
        let pool = vec![
            utxo(1, Value::from_base(1_000_000)),
            utxo(2, Value::from_base(5_000_000)),
            utxo(3, Value::from_base(3_000_000)),
        ];

        let selected = select_local(&pool, &BTreeSet::new(), 6_000_000, 3).unwrap();
        assert_eq!(
            selected.iter().map(|u| u.out_ref.tx_hash).collect::<Vec<_>>(),
            vec![TxHash::from([2; 32]), TxHash::from([3; 32])]
        );
    }

    #[test]
    fn test_local_always_picks_one() {
        let pool = vec![utxo(1, Value::from_base(1_000_000))];
        assert_eq!(select_local(&pool, &BTreeSet::new(), 0, 3).unwrap().len(), 1);
    }

    #[test]
    fn test_local_respects_max_inputs() {
        let pool = vec![
            utxo(1, Value::from_base(1_000_000)),
            utxo(2, Value::from_base(1_000_000)),
            utxo(3, Value::from_base(1_000_000)),
        ];

        match select_local(&pool, &BTreeSet::new(), 2_500_000, 2) {
            Err(Error::InsufficientCollateral { needed, available }) => {
                assert_eq!(needed, 2_500_000);
                assert_eq!(available, 2_000_000);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_local_empty_pool() {
        assert!(matches!(
            select_local(&[], &BTreeSet::new(), 1, 3),
            Err(Error::NoCollateral)
        ));
    }

    #[test]
    fn test_local_pool_preferred() {
        let pool = vec![utxo(1, Value::from_base(5_000_000))];
        let provider = provider(vec![remote(9)]);

        let collateral =
            select_collateral(&pool, Some(&provider), &BTreeSet::new(), 200_000, &test_params())
                .unwrap();
        assert!(!collateral.is_remote());
        assert_eq!(collateral.inputs(), vec![(pool[0].out_ref, address())]);
    }

    #[test]
    fn test_remote_fallback_on_empty_pool() {
        let provider = provider(vec![remote(7), remote(8), remote(9), remote(10)]);

        let collateral =
            select_collateral(&[], Some(&provider), &BTreeSet::new(), 200_000, &test_params())
                .unwrap();
        assert!(collateral.is_remote());
        assert_eq!(collateral.inputs().len(), test_params().max_collateral_inputs);
    }

    #[test]
    fn test_remote_fallback_on_small_pool() {
        let pool = vec![utxo(1, Value::from_base(100_000))];
        let provider = provider(vec![remote(7)]);

        let collateral =
            select_collateral(&pool, Some(&provider), &BTreeSet::new(), 200_000, &test_params())
                .unwrap();
        assert_eq!(collateral, Collateral::Remote(vec![remote(7)]));
    }

    #[test]
    fn test_remote_exclusions() {
        let provider = provider(vec![remote(7)]);
        let unspendable = vec![remote(7).out_ref].into_iter().collect();

        assert!(matches!(
            select_collateral(&[], Some(&provider), &unspendable, 200_000, &test_params()),
            Err(Error::InsufficientCollateral { available: 0, .. })
        ));
    }

    #[test]
    fn test_no_provider_returns_local_error() {
        assert!(matches!(
            select_collateral(&[], None, &BTreeSet::new(), 200_000, &test_params()),
            Err(Error::NoCollateral)
        ));

        let pool = vec![utxo(1, Value::from_base(100_000))];
        assert!(matches!(
            select_collateral(&pool, None, &BTreeSet::new(), 200_000, &test_params()),
            Err(Error::InsufficientCollateral {
                needed: 300_000,
                available: 100_000
            })
        ));
    }
}
