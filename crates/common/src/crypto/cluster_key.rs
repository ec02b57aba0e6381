//! The process-wide cluster key
//!
//! All splitting and reconstruction during one process lifetime is
//! parameterized by a single `ClusterKey`. The key is bound to the node count
//! it was generated for: shares produced under one topology cannot be
//! recombined under another, and there is no migration path for previously
//! split data when the node set changes.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

/// Size of the cluster key root entropy in bytes (256 bits)
pub const CLUSTER_KEY_SIZE: usize = 32;
/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;

const CIPHER_CONTEXT: &str = "splitvault cluster cipher key v1";
const MAC_CONTEXT: &str = "splitvault cluster mac key v1";

/// Errors that can occur during cluster key operations
#[derive(Debug, thiserror::Error)]
pub enum ClusterKeyError {
    #[error("cluster key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Key material parameterizing secret sharing for a fixed node topology
///
/// From 32 bytes of root entropy, two subkeys are derived with domain-separated
/// BLAKE3 key derivation:
/// - a cipher key for ChaCha20-Poly1305, used to seal field values before
///   they are split
/// - a MAC key for keyed BLAKE3, used to derive the synthetic nonce of
///   deterministic (equality-preserving) encryption
///
/// The node count is part of the key: `combine` checks every share set
/// against it.
pub struct ClusterKey {
    cipher_key: [u8; CLUSTER_KEY_SIZE],
    mac_key: [u8; CLUSTER_KEY_SIZE],
    nodes: usize,
}

impl ClusterKey {
    /// Generate a fresh cluster key for a topology of `nodes` nodes
    pub fn generate(nodes: usize) -> Self {
        let mut root = [0; CLUSTER_KEY_SIZE];
        getrandom::getrandom(&mut root).expect("failed to generate random bytes");
        Self::from_bytes(root, nodes)
    }

    /// Construct a cluster key from explicit root entropy
    pub fn from_bytes(root: [u8; CLUSTER_KEY_SIZE], nodes: usize) -> Self {
        ClusterKey {
            cipher_key: blake3::derive_key(CIPHER_CONTEXT, &root),
            mac_key: blake3::derive_key(MAC_CONTEXT, &root),
            nodes,
        }
    }

    /// The node count this key was generated for
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Seal a value under the cluster cipher key with a random nonce
    ///
    /// Output format: `nonce (12 bytes) || ciphertext || auth_tag (16 bytes)`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails (should be rare, only on system
    /// RNG failure).
    pub(crate) fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, ClusterKeyError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;
        self.encrypt_with_nonce(data, &nonce_bytes)
    }

    /// Seal a value deterministically for equality matching
    ///
    /// The nonce is the keyed BLAKE3 hash of the plaintext, truncated to nonce
    /// size, so equal plaintexts always seal to the identical ciphertext.
    pub(crate) fn encrypt_deterministic(&self, data: &[u8]) -> Result<Vec<u8>, ClusterKeyError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        let digest = blake3::keyed_hash(&self.mac_key, data);
        nonce_bytes.copy_from_slice(&digest.as_bytes()[..NONCE_SIZE]);
        self.encrypt_with_nonce(data, &nonce_bytes)
    }

    fn encrypt_with_nonce(
        &self,
        data: &[u8],
        nonce_bytes: &[u8; NONCE_SIZE],
    ) -> Result<Vec<u8>, ClusterKeyError> {
        let key = Key::from_slice(&self.cipher_key);
        let cipher = ChaCha20Poly1305::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());

        Ok(out)
    }

    /// Open a sealed value
    ///
    /// Expects input in the format: `nonce (12 bytes) || ciphertext || auth_tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Data is too short to contain a nonce
    /// - Authentication tag verification fails (data was tampered with, a
    ///   share was corrupted, or the value was sealed under a different key)
    pub(crate) fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, ClusterKeyError> {
        if data.len() < NONCE_SIZE {
            return Err(anyhow::anyhow!("data too short for nonce").into());
        }

        let key = Key::from_slice(&self.cipher_key);
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let cipher = ChaCha20Poly1305::new(key);
        let plaintext = cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| anyhow::anyhow!("decrypt error"))?;

        Ok(plaintext)
    }

    /// Open a deterministically sealed value
    ///
    /// After decryption the nonce is recomputed from the recovered plaintext
    /// and compared against the stored one, so a value sealed under the
    /// random-nonce path never opens through this one.
    pub(crate) fn decrypt_deterministic(&self, data: &[u8]) -> Result<Vec<u8>, ClusterKeyError> {
        let plaintext = self.decrypt(data)?;

        let digest = blake3::keyed_hash(&self.mac_key, &plaintext);
        if data[..NONCE_SIZE] != digest.as_bytes()[..NONCE_SIZE] {
            return Err(anyhow::anyhow!("deterministic nonce verification failed").into());
        }

        Ok(plaintext)
    }
}

impl std::fmt::Debug for ClusterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("ClusterKey")
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = ClusterKey::generate(3);
        let data = b"hello world, this is a test message for encryption";

        let sealed = key.encrypt(data).unwrap();
        let opened = key.decrypt(&sealed).unwrap();

        assert_eq!(data.as_slice(), opened.as_slice());
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let key = ClusterKey::generate(3);
        let a = key.encrypt(b"same value").unwrap();
        let b = key.encrypt(b"same value").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic_encrypt_is_stable() {
        let key = ClusterKey::from_bytes([7u8; CLUSTER_KEY_SIZE], 3);
        let a = key.encrypt_deterministic(b"same value").unwrap();
        let b = key.encrypt_deterministic(b"same value").unwrap();
        assert_eq!(a, b);

        let c = key.encrypt_deterministic(b"other value").unwrap();
        assert_ne!(a, c);

        let opened = key.decrypt_deterministic(&a).unwrap();
        assert_eq!(opened, b"same value");
    }

    #[test]
    fn test_decrypt_with_different_key_fails() {
        let key = ClusterKey::from_bytes([1u8; CLUSTER_KEY_SIZE], 3);
        let other = ClusterKey::from_bytes([2u8; CLUSTER_KEY_SIZE], 3);

        let sealed = key.encrypt(b"secret").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_decrypt_corrupted_fails() {
        let key = ClusterKey::generate(3);
        let mut sealed = key.encrypt(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(key.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_random_seal_does_not_open_deterministically() {
        let key = ClusterKey::generate(3);
        let sealed = key.encrypt(b"secret").unwrap();
        assert!(key.decrypt_deterministic(&sealed).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = ClusterKey::from_bytes([9u8; CLUSTER_KEY_SIZE], 3);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("cipher_key"));
        assert!(debug.contains("nodes: 3"));
    }
}
