// Utxo Forge
//
// Copyright (c) 2024 Utxo Forge Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::types::OutRef;

const HASH_LEN: usize = 32;

/// Blake2b digest with a 32 bytes output
pub(crate) fn blake2b_256(data: &[u8]) -> [u8; HASH_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(HASH_LEN).hash(data);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Identifier correlating an order across its lifecycle
///
/// Derived from the output reference consumed to create the order, the index of the output
/// holding it and its datum, so that no two orders can share a beacon.
pub fn beacon(out_ref: &OutRef, output_index: u32, datum: &[u8]) -> [u8; HASH_LEN] {
    let mut preimage = Vec::with_capacity(HASH_LEN + 8 + datum.len());
    preimage.extend_from_slice(out_ref.tx_hash.as_bytes());
    preimage.extend_from_slice(&out_ref.index.to_be_bytes());
    preimage.extend_from_slice(&output_index.to_be_bytes());
    preimage.extend_from_slice(datum);
    blake2b_256(&preimage)
}

/// `⌈numerator / denominator⌉`, with a zero denominator treated as one
pub(crate) fn ceil_div(numerator: u64, denominator: u64) -> u64 {
    let denominator = denominator.max(1);
    numerator / denominator + u64::from(numerator % denominator != 0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::TxHash;

    #[test]
    fn test_blake2b_256_empty() {
        assert_eq!(
            hex::encode(blake2b_256(&[])),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_beacon_depends_on_everything() {
        let out_ref = OutRef::new(TxHash::from([1; 32]), 0);
        let base = beacon(&out_ref, 0, &[0xd8, 0x79, 0x80]);

        assert_eq!(base, beacon(&out_ref, 0, &[0xd8, 0x79, 0x80]));
        assert_ne!(base, beacon(&OutRef::new(TxHash::from([1; 32]), 1), 0, &[0xd8, 0x79, 0x80]));
        assert_ne!(base, beacon(&out_ref, 1, &[0xd8, 0x79, 0x80]));
        assert_ne!(base, beacon(&out_ref, 0, &[0xd8, 0x7a, 0x80]));
    }

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(0, 3), 0);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(10, 0), 10);
    }
}
