use std::ops::Deref;

use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Public key identifying the storage client towards the nodes
///
/// A thin wrapper around an Ed25519 verifying key. Nodes are configured with
/// this key and use it to check the signature on the bearer credentials the
/// client mints per operation.
///
/// # Examples
///
/// ```ignore
/// let secret_key = SecretKey::generate();
/// let public_key = secret_key.public();
///
/// // Serialize to hex for storage/transmission
/// let hex = public_key.to_hex();
/// let recovered = PublicKey::from_hex(&hex)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct PublicKey(VerifyingKey);

impl Deref for PublicKey {
    type Target = VerifyingKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        let key = VerifyingKey::from_bytes(&buff)
            .map_err(|_| anyhow::anyhow!("invalid public key bytes"))?;
        Ok(PublicKey(key))
    }
}

impl PublicKey {
    /// Parse a public key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("public key hex decode error"))?;
        PublicKey::try_from(buff.as_slice())
    }

    /// Convert public key to raw bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Convert public key to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        PublicKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Secret key for the storage client's identity
///
/// The private half of the Ed25519 keypair. Used to sign the short-lived,
/// node-scoped bearer credentials minted for every write and read operation.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print private key material
        f.debug_tuple("SecretKey").field(&self.public()).finish()
    }
}

impl From<SigningKey> for SecretKey {
    fn from(key: SigningKey) -> Self {
        SecretKey(key)
    }
}

impl SecretKey {
    /// Generate a new random secret key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        SecretKey(SigningKey::from_bytes(&buff))
    }

    /// Parse a secret key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PRIVATE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("secret key hex decode error"))?;
        Ok(SecretKey(SigningKey::from_bytes(&buff)))
    }

    /// Convert secret key to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Get the public half of the keypair
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Encode the keypair as a PKCS#8 v2 DER document
    ///
    /// This is the encoding the token signer consumes.
    ///
    /// # Errors
    ///
    /// Returns an error if DER encoding fails.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, KeyError> {
        let doc = self
            .0
            .to_pkcs8_der()
            .map_err(|e| anyhow::anyhow!("pkcs8 encode error: {}", e))?;
        Ok(doc.as_bytes().to_vec())
    }
}

impl Serialize for SecretKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        SecretKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_key_hex_roundtrip() {
        let key = SecretKey::generate();
        let hex = key.to_hex();
        let recovered = SecretKey::from_hex(&hex).unwrap();
        assert_eq!(key.public(), recovered.public());
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = SecretKey::generate().public();
        let hex = key.to_hex();
        let recovered = PublicKey::from_hex(&hex).unwrap();
        assert_eq!(key, recovered);

        let prefixed = format!("0x{}", hex);
        let recovered = PublicKey::from_hex(&prefixed).unwrap();
        assert_eq!(key, recovered);
    }

    #[test]
    fn test_public_key_size_validation() {
        let too_short = [1u8; 16];
        assert!(PublicKey::try_from(too_short.as_slice()).is_err());
    }

    #[test]
    fn test_pkcs8_der_is_nonempty() {
        let key = SecretKey::generate();
        let der = key.to_pkcs8_der().unwrap();
        assert!(!der.is_empty());
    }

    #[test]
    fn test_debug_hides_private_material() {
        let key = SecretKey::generate();
        let debug = format!("{:?}", key);
        assert!(!debug.contains(&key.to_hex()));
    }
}
