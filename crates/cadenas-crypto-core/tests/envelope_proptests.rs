#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property tests for the record envelope: round-trip, tamper detection,
//! and wrong-key rejection over arbitrary payloads.

use cadenas_crypto_core::envelope::{open, seal, TAG_LEN};
use cadenas_crypto_core::{CryptoError, SymmetricKey};
use proptest::prelude::*;

proptest! {
    #[test]
    fn roundtrip_arbitrary_payloads(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
        key_bytes in proptest::array::uniform32(any::<u8>()),
    ) {
        let key = SymmetricKey::new(key_bytes);
        let envelope = seal(&payload, &key).expect("seal should succeed");
        let opened = open(&envelope, &key).expect("open should succeed");
        prop_assert_eq!(opened.expose(), payload.as_slice());
    }

    #[test]
    fn any_single_bit_flip_fails_integrity(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        key_bytes in proptest::array::uniform32(any::<u8>()),
        flip_pos in any::<usize>(),
        flip_bit in 0u8..8,
    ) {
        let key = SymmetricKey::new(key_bytes);
        let mut envelope = seal(&payload, &key).expect("seal should succeed");
        let idx = flip_pos % envelope.ciphertext.len();
        envelope.ciphertext[idx] ^= 1 << flip_bit;
        let result = open(&envelope, &key);
        prop_assert!(matches!(result, Err(CryptoError::Integrity)));
    }

    #[test]
    fn any_nonce_bit_flip_fails_integrity(
        payload in proptest::collection::vec(any::<u8>(), 0..256),
        key_bytes in proptest::array::uniform32(any::<u8>()),
        flip_pos in 0usize..12,
        flip_bit in 0u8..8,
    ) {
        let key = SymmetricKey::new(key_bytes);
        let mut envelope = seal(&payload, &key).expect("seal should succeed");
        envelope.nonce[flip_pos] ^= 1 << flip_bit;
        let result = open(&envelope, &key);
        prop_assert!(matches!(result, Err(CryptoError::Integrity)));
    }

    #[test]
    fn different_keys_never_open_each_others_envelopes(
        payload in proptest::collection::vec(any::<u8>(), 0..256),
        key_a in proptest::array::uniform32(any::<u8>()),
        key_b in proptest::array::uniform32(any::<u8>()),
    ) {
        prop_assume!(key_a != key_b);
        let envelope = seal(&payload, &SymmetricKey::new(key_a)).expect("seal should succeed");
        let result = open(&envelope, &SymmetricKey::new(key_b));
        prop_assert!(matches!(result, Err(CryptoError::Integrity)));
    }

    #[test]
    fn ciphertext_length_is_plaintext_plus_tag(
        payload in proptest::collection::vec(any::<u8>(), 0..1024),
        key_bytes in proptest::array::uniform32(any::<u8>()),
    ) {
        let key = SymmetricKey::new(key_bytes);
        let envelope = seal(&payload, &key).expect("seal should succeed");
        prop_assert_eq!(envelope.ciphertext.len(), payload.len() + TAG_LEN);
    }

    #[test]
    fn wire_shape_roundtrips(
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        key_bytes in proptest::array::uniform32(any::<u8>()),
    ) {
        let key = SymmetricKey::new(key_bytes);
        let envelope = seal(&payload, &key).expect("seal should succeed");
        let json = serde_json::to_string(&envelope).expect("serialize should succeed");
        let restored: cadenas_crypto_core::Envelope =
            serde_json::from_str(&json).expect("deserialize should succeed");
        prop_assert_eq!(envelope, restored);
    }
}
