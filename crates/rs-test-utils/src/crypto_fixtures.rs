//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs that can publish themselves as a
//! JWK and sign tokens. The same seed always yields the same keypair.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

/// Ed25519 keypair with a key ID, for signing test tokens.
#[derive(Clone)]
pub struct TestKeypair {
    pub kid: String,
    pub public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a deterministic keypair.
    ///
    /// # Arguments
    /// * `seed` - Seed value for deterministic key generation (0-255)
    /// * `kid` - Key ID published in the JWK and stamped on signed headers
    ///
    /// # Panics
    /// If ring rejects the seed, which does not happen for 32-byte seeds.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = test_seed(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// EdDSA header carrying this key's `kid`.
    pub fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        header
    }

    /// Sign a claims payload with this key's `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_header(&self.header(), claims)
    }

    /// Sign a claims payload with an arbitrary header.
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as a JWKS entry.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// Expand a one-byte seed into a deterministic 32-byte Ed25519 seed.
pub fn test_seed(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// ring doesn't expose PKCS#8 export for seeded keypairs, so it is built by
/// hand (RFC 8410).
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey: OCTET STRING wrapping OCTET STRING(32) seed
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(1, "k");
        assert_eq!(a.public_key_bytes, b.public_key_bytes);
        assert_eq!(a.jwk_json(), b.jwk_json());
    }

    #[test]
    fn test_different_seeds_produce_different_keys() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(2, "k");
        assert_ne!(a.public_key_bytes, b.public_key_bytes);
    }

    #[test]
    fn test_pkcs8_is_accepted_by_ring() {
        let pkcs8 = build_pkcs8_from_seed(&test_seed(7));
        assert_eq!(pkcs8.len(), 48);
        assert!(Ed25519KeyPair::from_pkcs8_maybe_unchecked(&pkcs8).is_ok());
    }

    #[test]
    fn test_signed_token_has_kid_header() {
        let keypair = TestKeypair::new(3, "kid-3");
        let token = keypair.sign(&json!({"sub": "alice"}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("kid-3"));
        assert_eq!(header.alg, Algorithm::EdDSA);
    }
}
