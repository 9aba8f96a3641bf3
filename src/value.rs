// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Multi-asset values
//!
//! A [`Value`] maps every [`AssetId`] it holds to a non-negative, unbounded amount. Zero
//! entries are never stored, so two values holding the same amounts always compare equal.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use malachite::Natural;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::AssetId;

/// Amount of a single asset
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CurrencyAmount {
    /// The asset
    pub asset: AssetId,
    /// How much of it
    #[serde(with = "natural_string")]
    pub amount: Natural,
}

impl CurrencyAmount {
    /// Create a new [`CurrencyAmount`]
    pub fn new(asset: AssetId, amount: Natural) -> Self {
        CurrencyAmount { asset, amount }
    }

    /// Amount of the base asset
    pub fn base(amount: u64) -> Self {
        CurrencyAmount::new(AssetId::Base, Natural::from(amount))
    }

    fn check_same_asset(&self, other: &CurrencyAmount) -> Result<(), Error> {
        if self.asset != other.asset {
            return Err(Error::AssetMismatch {
                left: self.asset.clone(),
                right: other.asset.clone(),
            });
        }

        Ok(())
    }

    /// Add two amounts of the same asset
    pub fn checked_add(&self, other: &CurrencyAmount) -> Result<CurrencyAmount, Error> {
        self.check_same_asset(other)?;
        Ok(CurrencyAmount::new(
            self.asset.clone(),
            &self.amount + &other.amount,
        ))
    }

    /// Subtract two amounts of the same asset, `None` if the result would be negative
    pub fn checked_sub(&self, other: &CurrencyAmount) -> Result<Option<CurrencyAmount>, Error> {
        self.check_same_asset(other)?;
        if self.amount < other.amount {
            return Ok(None);
        }

        Ok(Some(CurrencyAmount::new(
            self.asset.clone(),
            &self.amount - &other.amount,
        )))
    }

    /// Compare two amounts of the same asset
    pub fn compare(&self, other: &CurrencyAmount) -> Result<Ordering, Error> {
        self.check_same_asset(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Multiply the amount by a scalar
    pub fn scale(&self, factor: u64) -> CurrencyAmount {
        CurrencyAmount::new(self.asset.clone(), &self.amount * Natural::from(factor))
    }
}

/// A bag of assets, a.k.a. currencies
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(from = "Vec<CurrencyAmount>", into = "Vec<CurrencyAmount>")]
pub struct Value {
    assets: BTreeMap<AssetId, Natural>,
}

impl Value {
    /// An empty value
    pub fn new() -> Self {
        Value::default()
    }

    /// A value holding only `amount` of the base asset
    pub fn from_base(amount: u64) -> Self {
        let mut value = Value::new();
        value.insert(AssetId::Base, Natural::from(amount));
        value
    }

    /// Add `amount` of `asset` to this value
    pub fn insert(&mut self, asset: AssetId, amount: Natural) {
        if amount == Natural::from(0u32) {
            return;
        }

        *self.assets.entry(asset).or_insert_with(|| Natural::from(0u32)) += amount;
    }

    /// Builder-style [`Value::insert`]
    pub fn with(mut self, asset: AssetId, amount: u64) -> Self {
        self.insert(asset, Natural::from(amount));
        self
    }

    /// Amount held of `asset`, zero if absent
    pub fn amount(&self, asset: &AssetId) -> Natural {
        self.assets
            .get(asset)
            .cloned()
            .unwrap_or_else(|| Natural::from(0u32))
    }

    /// Amount of the base asset
    pub fn base_amount(&self) -> Natural {
        self.amount(&AssetId::Base)
    }

    /// Amount of the base asset if it fits in 64 bits
    pub fn base_amount_u64(&self) -> Option<u64> {
        u64::try_from(&self.base_amount()).ok()
    }

    /// Iterate over the non-zero entries, base asset first
    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &Natural)> {
        self.assets.iter()
    }

    /// Iterate over the native assets only
    pub fn native_assets(&self) -> impl Iterator<Item = (&AssetId, &Natural)> {
        self.assets.iter().filter(|(asset, _)| !asset.is_base())
    }

    /// Whether this value holds anything but the base asset
    pub fn has_native_assets(&self) -> bool {
        self.native_assets().next().is_some()
    }

    /// Whether this value is empty
    pub fn is_zero(&self) -> bool {
        self.assets.is_empty()
    }

    /// Number of distinct assets held
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether no asset is held
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Sum of two values
    pub fn add(&self, other: &Value) -> Value {
        let mut sum = self.clone();
        for (asset, amount) in other.iter() {
            sum.insert(asset.clone(), amount.clone());
        }
        sum
    }

    /// Difference of two values, `None` if any asset of `other` exceeds the one in `self`
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        if !self.covers(other) {
            return None;
        }

        Some(self.saturating_sub(other))
    }

    /// Difference of two values, clamping every asset at zero
    pub fn saturating_sub(&self, other: &Value) -> Value {
        let mut assets = BTreeMap::new();
        for (asset, amount) in self.iter() {
            let subtrahend = other.amount(asset);
            if *amount > subtrahend {
                assets.insert(asset.clone(), amount - &subtrahend);
            }
        }
        Value { assets }
    }

    /// Whether every asset of `other` is held in at least the same amount by `self`
    pub fn covers(&self, other: &Value) -> bool {
        other
            .iter()
            .all(|(asset, amount)| self.assets.get(asset).map_or(false, |held| held >= amount))
    }

    /// Multiply every amount by a scalar
    pub fn scale(&self, factor: u64) -> Value {
        let factor = Natural::from(factor);
        let mut scaled = Value::new();
        for (asset, amount) in self.iter() {
            scaled.insert(asset.clone(), amount * &factor);
        }
        scaled
    }

    /// Sum of many values
    pub fn sum<'a, I: IntoIterator<Item = &'a Value>>(values: I) -> Value {
        values
            .into_iter()
            .fold(Value::new(), |acc, value| acc.add(value))
    }
}

impl From<CurrencyAmount> for Value {
    fn from(amount: CurrencyAmount) -> Self {
        let mut value = Value::new();
        value.insert(amount.asset, amount.amount);
        value
    }
}

impl From<Vec<CurrencyAmount>> for Value {
    fn from(amounts: Vec<CurrencyAmount>) -> Self {
        let mut value = Value::new();
        for amount in amounts {
            value.insert(amount.asset, amount.amount);
        }
        value
    }
}

impl From<Value> for Vec<CurrencyAmount> {
    fn from(value: Value) -> Self {
        value
            .assets
            .into_iter()
            .map(|(asset, amount)| CurrencyAmount::new(asset, amount))
            .collect()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .iter()
            .map(|(asset, amount)| format!("{} {}", amount, asset))
            .collect::<Vec<_>>();
        write!(f, "[{}]", entries.join(", "))
    }
}

pub(crate) mod natural_string {
    use std::str::FromStr;

    use malachite::Natural;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Natural, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Natural, D::Error> {
        let s = String::deserialize(deserializer)?;
        Natural::from_str(&s).map_err(|_| serde::de::Error::custom("invalid natural amount"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{AssetName, PolicyId};

    fn token(n: u8) -> AssetId {
        AssetId::native(PolicyId::from([n; 28]), AssetName::new(vec![n]).unwrap())
    }

    #[test]
    fn test_zero_entries_are_dropped() {
        let value = Value::new().with(AssetId::Base, 0).with(token(1), 0);
        assert!(value.is_zero());
        assert_eq!(value, Value::new());
    }

    #[test]
    fn test_add_and_sub() {
        let a = Value::from_base(10).with(token(1), 5);
        let b = Value::from_base(4).with(token(2), 1);

        let sum = a.add(&b);
        assert_eq!(sum.base_amount(), Natural::from(14u32));
        assert_eq!(sum.amount(&token(1)), Natural::from(5u32));
        assert_eq!(sum.amount(&token(2)), Natural::from(1u32));

        assert_eq!(sum.checked_sub(&b), Some(a.clone()));
        assert_eq!(a.checked_sub(&b), None);
        assert_eq!(a.saturating_sub(&b), Value::from_base(6).with(token(1), 5));
    }

    #[test]
    fn test_covers() {
        let held = Value::from_base(10).with(token(1), 5);

        assert!(held.covers(&Value::from_base(10)));
        assert!(held.covers(&Value::new()));
        assert!(!held.covers(&Value::from_base(11)));
        assert!(!held.covers(&Value::new().with(token(2), 1)));
    }

    #[test]
    fn test_sub_to_zero_normalizes() {
        let a = Value::from_base(10).with(token(1), 5);
        let diff = a.checked_sub(&Value::new().with(token(1), 5)).unwrap();
        assert_eq!(diff, Value::from_base(10));
        assert!(!diff.has_native_assets());
    }

    #[test]
    fn test_scale() {
        let value = Value::from_base(3).with(token(1), 2);
        assert_eq!(value.scale(3), Value::from_base(9).with(token(1), 6));
        assert!(value.scale(0).is_zero());
    }

    #[test]
    fn test_currency_amount_mismatch() {
        let base = CurrencyAmount::base(10);
        let other = CurrencyAmount::new(token(1), Natural::from(3u32));

        assert!(matches!(
            base.checked_add(&other),
            Err(Error::AssetMismatch { .. })
        ));
        assert!(base.compare(&other).is_err());
        assert_eq!(
            base.compare(&CurrencyAmount::base(11)).unwrap(),
            Ordering::Less
        );
        assert_eq!(base.checked_sub(&CurrencyAmount::base(11)).unwrap(), None);
    }

    #[test]
    fn test_unbounded_amounts() {
        let big = Natural::from(u64::MAX);
        let mut value = Value::new();
        value.insert(AssetId::Base, big.clone());
        value.insert(AssetId::Base, big.clone());

        assert_eq!(value.base_amount(), &big + &big);
        assert_eq!(value.base_amount_u64(), None);
    }

    #[test]
    fn test_json_round_trip() {
        let value = Value::from_base(1_500_000).with(token(4), 42);
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
