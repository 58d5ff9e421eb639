//! Node identity: Dilithium5 keypairs and the peer ids derived from them.
//!
//! A node's identity is its signing keypair. Peers reference each other by
//! peer id, a domain-separated BLAKE3 digest of the public key; the key
//! itself only becomes trusted once a verack signature over a fresh
//! challenge proves possession of its secret half.
//!
//! Validation happens at the construction boundary: every way to obtain a
//! [`PublicKey`], [`SecretKey`], or [`Signature`] — generation,
//! [`from_bytes`](PublicKey::from_bytes), or deserialization — checks the
//! raw material first. Held values are therefore structurally sound, and
//! the signing/verification paths treat a re-parse failure as an internal
//! invariant violation, not an input error.

use pqcrypto_dilithium::dilithium5;
use pqcrypto_traits::sign::{
    DetachedSignature as SigTrait, PublicKey as SignPkTrait, SecretKey as SignSkTrait,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Hash;

/// Dilithium5 public key length in bytes.
pub const PUBLIC_KEY_BYTES: usize = 2592;
/// Dilithium5 detached signature length in bytes.
pub const SIGNATURE_BYTES: usize = 4627;

/// Key material that failed validation.
#[derive(Clone, Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid public key length: {0} bytes")]
    BadPublicKey(usize),
    #[error("invalid secret key length: {0} bytes")]
    BadSecretKey(usize),
    #[error("invalid signature length: {0} bytes")]
    BadSignature(usize),
}

/// The public half of a node identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Validate and wrap raw key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyError> {
        dilithium5::PublicKey::from_bytes(&bytes)
            .map_err(|_| KeyError::BadPublicKey(bytes.len()))?;
        Ok(PublicKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The peer id this key identifies as.
    pub fn peer_id(&self) -> Hash {
        crate::hash_domain(b"vesper.identity.peer-id", &self.0)
    }

    /// Verify a detached signature made by the matching secret key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let pk = dilithium5::PublicKey::from_bytes(&self.0)
            .expect("public key bytes validated at construction");
        let sig = dilithium5::DetachedSignature::from_bytes(&signature.0)
            .expect("signature bytes validated at construction");
        dilithium5::verify_detached_signature(&sig, message, &pk).is_ok()
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.0, s)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(d)?;
        PublicKey::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

/// The secret half of a node identity, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyError> {
        dilithium5::SecretKey::from_bytes(&bytes)
            .map_err(|_| KeyError::BadSecretKey(bytes.len()))?;
        Ok(SecretKey(bytes))
    }
}

/// A detached Dilithium5 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Validate and wrap raw signature bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyError> {
        dilithium5::DetachedSignature::from_bytes(&bytes)
            .map_err(|_| KeyError::BadSignature(bytes.len()))?;
        Ok(Signature(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.0, s)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(d)?;
        Signature::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

/// A full node identity.
///
/// Cloneable because the network configuration hands the same identity to
/// every per-peer agent; each clone zeroizes its own secret buffer on
/// drop.
#[derive(Clone)]
pub struct Keypair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl Keypair {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium5::keypair();
        Keypair {
            public: PublicKey(pk.as_bytes().to_vec()),
            secret: SecretKey(sk.as_bytes().to_vec()),
        }
    }

    /// Restore an identity from stored key material.
    pub fn from_bytes(public: Vec<u8>, secret: Vec<u8>) -> Result<Self, KeyError> {
        Ok(Keypair {
            public: PublicKey::from_bytes(public)?,
            secret: SecretKey::from_bytes(secret)?,
        })
    }

    /// Sign a message with this identity.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sk = dilithium5::SecretKey::from_bytes(&self.secret.0)
            .expect("secret key bytes validated at construction");
        Signature(dilithium5::detached_sign(message, &sk).as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"challenge payload");
        assert!(kp.public.verify(b"challenge payload", &sig));
        assert!(!kp.public.verify(b"different payload", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public.verify(b"message", &sig));
    }

    #[test]
    fn signatures_have_the_expected_length() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"message");
        assert_eq!(sig.as_bytes().len(), SIGNATURE_BYTES);
        assert_eq!(kp.public.as_bytes().len(), PUBLIC_KEY_BYTES);
    }

    #[test]
    fn peer_id_deterministic_and_unique() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        assert_eq!(kp1.public.peer_id(), kp1.public.peer_id());
        assert_ne!(kp1.public.peer_id(), kp2.public.peer_id());
    }

    #[test]
    fn construction_rejects_malformed_material() {
        assert!(matches!(
            PublicKey::from_bytes(vec![7u8; 10]),
            Err(KeyError::BadPublicKey(10))
        ));
        assert!(matches!(
            Signature::from_bytes(vec![0u8; SIGNATURE_BYTES - 1]),
            Err(KeyError::BadSignature(_))
        ));
        assert!(Keypair::from_bytes(vec![0u8; 10], vec![0u8; 10]).is_err());
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let bogus: Vec<u8> = vec![7u8; 10];
        let bytes = bincode::serialize(&bogus).unwrap();
        assert!(bincode::deserialize::<PublicKey>(&bytes).is_err());
        assert!(bincode::deserialize::<Signature>(&bytes).is_err());
    }

    #[test]
    fn identity_roundtrips_through_raw_bytes() {
        let kp = Keypair::generate();
        let restored = Keypair::from_bytes(
            kp.public.as_bytes().to_vec(),
            kp.secret.0.clone(),
        )
        .unwrap();
        assert_eq!(restored.public.peer_id(), kp.public.peer_id());
        let sig = restored.sign(b"payload");
        assert!(kp.public.verify(b"payload", &sig));
    }
}
