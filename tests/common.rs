#![allow(unused)]
use std::collections::BTreeMap;

use utxo_forge::blockchain::memory::{MemoryChain, MemoryWallet};
use utxo_forge::params::{ChainTip, CostModels, ExUnitPrices, ProtocolParameters, Ratio};
use utxo_forge::{
    Address, AssetId, AssetName, ExUnits, KeyHash, NetworkId, OutRef, PolicyId, TxHash, Utxo,
    Value, Wallet,
};

/// Parameters close to the ones of a real chain
pub fn get_test_params() -> ProtocolParameters {
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

pub fn get_test_tip() -> ChainTip {
    ChainTip {
        slot: 10_000,
        block_height: 500,
    }
}

/// Address of the funded wallet
pub fn get_wallet_address() -> Address {
    Address::enterprise(NetworkId::Testnet, &KeyHash::from([1; 28]))
}

pub fn get_recipient(n: u8) -> Address {
    Address::enterprise(NetworkId::Testnet, &KeyHash::from([n; 28]))
}

pub fn get_script_address(n: u8) -> Address {
    Address::script(NetworkId::Testnet, &PolicyId::from([n; 28]))
}

pub fn get_utxo(n: u8, value: Value) -> Utxo {
    Utxo::new(
        OutRef::new(TxHash::from([n; 32]), 0),
        get_wallet_address(),
        value,
    )
}

pub fn get_token(n: u8) -> AssetId {
    AssetId::native(
        PolicyId::from([n; 28]),
        AssetName::new(b"token".to_vec()).unwrap(),
    )
}

/// Return a wallet holding `utxos`, on a chain with the test parameters
pub fn get_funded_wallet(utxos: Vec<Utxo>) -> Wallet<MemoryChain, MemoryWallet> {
    get_funded_wallet_with_collateral(utxos, vec![])
}

/// Return a wallet holding `utxos`, with `collateral` set aside
pub fn get_funded_wallet_with_collateral(
    utxos: Vec<Utxo>,
    collateral: Vec<Utxo>,
) -> Wallet<MemoryChain, MemoryWallet> {
    let _ = env_logger::try_init();

    let chain = MemoryChain::new(NetworkId::Testnet, get_test_params(), get_test_tip());
    let mut wallet = MemoryWallet::new(NetworkId::Testnet, get_wallet_address(), utxos);
    wallet.set_collateral(collateral);

    Wallet::new(chain, wallet)
}
