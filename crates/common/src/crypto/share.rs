//! Secret splitting and reconstruction
//!
//! A protected field value is split into exactly one share per configured
//! node. A full share set reconstructs the value; any other set fails
//! deterministically. Three flavors are supported:
//!
//! - **Blind**: the value is sealed under the cluster cipher key and the
//!   ciphertext is XOR-split into N fragments (N-1 random, the last one the
//!   XOR of ciphertext and the rest). A single fragment is indistinguishable
//!   from random bytes.
//! - **Matchable**: the value is sealed deterministically, and every node
//!   receives the identical share. Node-side equality filters can match on
//!   the share without reconstruction.
//! - **Additive**: a numeric value is split additively mod 2^64. Summing two
//!   records' shares slot-wise yields shares of the sum of their values.
//!
//! Shares travel as tagged strings (`blind:<hex>`, `match:<hex>`,
//! `sum:<decimal>`) so a share set is self-describing at reconstruction time.

use std::sync::OnceLock;

use super::cluster_key::ClusterKey;

/// Errors that can occur during splitting or reconstruction
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("share error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("expected {expected} shares, got {got}")]
    WrongCount { expected: usize, got: usize },
    #[error("mixed share flavors in one share set")]
    MixedFlavors,
    #[error("matchable shares disagree across nodes")]
    MatchMismatch,
}

impl From<super::cluster_key::ClusterKeyError> for ShareError {
    fn from(e: super::cluster_key::ClusterKeyError) -> Self {
        match e {
            super::cluster_key::ClusterKeyError::Default(e) => ShareError::Default(e),
        }
    }
}

/// A protected field value, tagged with the capability its shares must keep
#[derive(Debug, Clone, PartialEq)]
pub enum SecretValue {
    /// Store/retrieve only; a share leaks nothing
    Text(String),
    /// Node-side equality filters can match without reconstruction
    Match(String),
    /// Shares can be summed without reconstruction
    Sum(u64),
}

/// A reconstructed field value
#[derive(Debug, Clone, PartialEq)]
pub enum CombinedValue {
    Text(String),
    Number(u64),
}

/// One node's fragment of a protected field value
///
/// Meaningful only when combined with every other node's share for the same
/// field of the same record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Share {
    /// XOR fragment of the sealed value
    Blind(Vec<u8>),
    /// Deterministic ciphertext, identical on every node
    Match(Vec<u8>),
    /// Additive fragment mod 2^64
    Sum(u64),
}

impl Share {
    /// Encode the share as its tagged wire string
    pub fn encode(&self) -> String {
        match self {
            Share::Blind(bytes) => format!("blind:{}", hex::encode(bytes)),
            Share::Match(bytes) => format!("match:{}", hex::encode(bytes)),
            Share::Sum(value) => format!("sum:{}", value),
        }
    }

    /// Parse a share from its tagged wire string
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown tag or a malformed payload.
    pub fn decode(s: &str) -> Result<Self, ShareError> {
        let (tag, payload) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("share missing flavor tag"))?;
        match tag {
            "blind" => Ok(Share::Blind(
                hex::decode(payload).map_err(|_| anyhow::anyhow!("share hex decode error"))?,
            )),
            "match" => Ok(Share::Match(
                hex::decode(payload).map_err(|_| anyhow::anyhow!("share hex decode error"))?,
            )),
            "sum" => Ok(Share::Sum(payload.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("share sum payload is not a u64")
            })?)),
            other => Err(anyhow::anyhow!("unknown share flavor: {}", other).into()),
        }
    }

    fn flavor(&self) -> &'static str {
        match self {
            Share::Blind(_) => "blind",
            Share::Match(_) => "match",
            Share::Sum(_) => "sum",
        }
    }
}

/// Splits values into per-node shares and recombines full share sets
///
/// The engine owns the cluster key behind a single-initialization barrier:
/// the key is constructed lazily on first use, at most once, even under
/// concurrent first calls. All split/combine calls through one engine use
/// the same key.
#[derive(Debug)]
pub struct ShareEngine {
    nodes: usize,
    key: OnceLock<ClusterKey>,
}

impl ShareEngine {
    /// Create an engine for a topology of `nodes` nodes
    ///
    /// The cluster key is not generated until the first split or combine.
    pub fn new(nodes: usize) -> Self {
        ShareEngine {
            nodes,
            key: OnceLock::new(),
        }
    }

    /// Create an engine around an explicit cluster key
    pub fn with_key(key: ClusterKey) -> Self {
        let nodes = key.nodes();
        let lock = OnceLock::new();
        let _ = lock.set(key);
        ShareEngine { nodes, key: lock }
    }

    /// The node count this engine splits for
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// The cluster key, generating it on first use
    pub fn key(&self) -> &ClusterKey {
        self.key.get_or_init(|| ClusterKey::generate(self.nodes))
    }

    /// Split a value into exactly one share per node
    pub fn split(&self, value: &SecretValue) -> Result<Vec<Share>, ShareError> {
        let n = self.nodes;
        match value {
            SecretValue::Text(text) => {
                let sealed = self.key().encrypt(text.as_bytes())?;
                let mut shares = Vec::with_capacity(n);
                let mut last = sealed;
                for _ in 0..n - 1 {
                    let mut fragment = vec![0u8; last.len()];
                    getrandom::getrandom(&mut fragment)
                        .map_err(|e| anyhow::anyhow!("failed to generate fragment: {}", e))?;
                    for (l, f) in last.iter_mut().zip(fragment.iter()) {
                        *l ^= f;
                    }
                    shares.push(Share::Blind(fragment));
                }
                shares.push(Share::Blind(last));
                Ok(shares)
            }
            SecretValue::Match(text) => {
                let sealed = self.key().encrypt_deterministic(text.as_bytes())?;
                Ok(vec![Share::Match(sealed); n])
            }
            SecretValue::Sum(value) => {
                let mut shares = Vec::with_capacity(n);
                let mut last = *value;
                for _ in 0..n - 1 {
                    let mut buff = [0u8; 8];
                    getrandom::getrandom(&mut buff)
                        .map_err(|e| anyhow::anyhow!("failed to generate fragment: {}", e))?;
                    let fragment = u64::from_le_bytes(buff);
                    last = last.wrapping_sub(fragment);
                    shares.push(Share::Sum(fragment));
                }
                shares.push(Share::Sum(last));
                Ok(shares)
            }
        }
    }

    /// Produce the deterministic share a node would hold for a matchable value
    ///
    /// Used to build node-side equality filters on matchable fields.
    pub fn matchable(&self, value: &str) -> Result<Share, ShareError> {
        let sealed = self.key().encrypt_deterministic(value.as_bytes())?;
        Ok(Share::Match(sealed))
    }

    /// Reconstruct a value from a full share set
    ///
    /// # Errors
    ///
    /// Fails deterministically (never returns a wrong value) when:
    /// - the share count is not exactly the configured node count
    /// - the set mixes flavors
    /// - matchable copies disagree across nodes
    /// - authenticated decryption fails (corrupted share, or shares produced
    ///   under a different cluster key or topology)
    pub fn combine(&self, shares: &[Share]) -> Result<CombinedValue, ShareError> {
        if shares.len() != self.nodes {
            return Err(ShareError::WrongCount {
                expected: self.nodes,
                got: shares.len(),
            });
        }
        let flavor = shares[0].flavor();
        if shares.iter().any(|s| s.flavor() != flavor) {
            return Err(ShareError::MixedFlavors);
        }

        match &shares[0] {
            Share::Blind(first) => {
                let mut sealed = first.clone();
                for share in &shares[1..] {
                    let Share::Blind(fragment) = share else {
                        unreachable!()
                    };
                    if fragment.len() != sealed.len() {
                        return Err(anyhow::anyhow!("blind share fragments differ in length").into());
                    }
                    for (l, f) in sealed.iter_mut().zip(fragment.iter()) {
                        *l ^= f;
                    }
                }
                let plaintext = self.key().decrypt(&sealed)?;
                let text = String::from_utf8(plaintext)
                    .map_err(|_| anyhow::anyhow!("reconstructed value is not valid utf-8"))?;
                Ok(CombinedValue::Text(text))
            }
            Share::Match(first) => {
                if shares[1..].iter().any(|s| s != &shares[0]) {
                    return Err(ShareError::MatchMismatch);
                }
                let plaintext = self.key().decrypt_deterministic(first)?;
                let text = String::from_utf8(plaintext)
                    .map_err(|_| anyhow::anyhow!("reconstructed value is not valid utf-8"))?;
                Ok(CombinedValue::Text(text))
            }
            Share::Sum(_) => {
                let total = shares.iter().fold(0u64, |acc, share| {
                    let Share::Sum(fragment) = share else {
                        unreachable!()
                    };
                    acc.wrapping_add(*fragment)
                });
                Ok(CombinedValue::Number(total))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::cluster_key::CLUSTER_KEY_SIZE;

    fn engine(nodes: usize) -> ShareEngine {
        ShareEngine::new(nodes)
    }

    #[test]
    fn test_blind_roundtrip() {
        for n in [2, 3, 5] {
            let engine = engine(n);
            let value = SecretValue::Text("All customer data anonymized.".to_string());
            let shares = engine.split(&value).unwrap();
            assert_eq!(shares.len(), n);
            let combined = engine.combine(&shares).unwrap();
            assert_eq!(
                combined,
                CombinedValue::Text("All customer data anonymized.".to_string())
            );
        }
    }

    #[test]
    fn test_blind_roundtrip_empty_and_unicode() {
        let engine = engine(3);
        for text in ["", "ünïcôdé ✓ 日本語"] {
            let shares = engine.split(&SecretValue::Text(text.to_string())).unwrap();
            let combined = engine.combine(&shares).unwrap();
            assert_eq!(combined, CombinedValue::Text(text.to_string()));
        }
    }

    #[test]
    fn test_match_roundtrip() {
        let engine = engine(3);
        let shares = engine
            .split(&SecretValue::Match("EU DPO".to_string()))
            .unwrap();
        let combined = engine.combine(&shares).unwrap();
        assert_eq!(combined, CombinedValue::Text("EU DPO".to_string()));
    }

    #[test]
    fn test_sum_roundtrip() {
        for n in [2, 3, 5] {
            let engine = engine(n);
            for value in [0u64, 42, u64::MAX] {
                let shares = engine.split(&SecretValue::Sum(value)).unwrap();
                let combined = engine.combine(&shares).unwrap();
                assert_eq!(combined, CombinedValue::Number(value));
            }
        }
    }

    #[test]
    fn test_threshold_enforced() {
        for n in [2, 3, 5] {
            let engine = engine(n);
            let shares = engine
                .split(&SecretValue::Text("secret".to_string()))
                .unwrap();

            let short = &shares[..n - 1];
            assert!(matches!(
                engine.combine(short),
                Err(ShareError::WrongCount { expected, got }) if expected == n && got == n - 1
            ));

            let mut long = shares.clone();
            long.push(shares[0].clone());
            assert!(matches!(
                engine.combine(&long),
                Err(ShareError::WrongCount { .. })
            ));

            assert!(matches!(
                engine.combine(&[]),
                Err(ShareError::WrongCount { got: 0, .. })
            ));
        }
    }

    #[test]
    fn test_mixed_flavors_rejected() {
        let engine = engine(2);
        let mut shares = engine
            .split(&SecretValue::Text("secret".to_string()))
            .unwrap();
        shares[1] = Share::Sum(7);
        assert!(matches!(
            engine.combine(&shares),
            Err(ShareError::MixedFlavors)
        ));
    }

    #[test]
    fn test_match_shares_identical_and_deterministic() {
        let engine = engine(3);
        let first = engine
            .split(&SecretValue::Match("alice@example.com".to_string()))
            .unwrap();
        let second = engine
            .split(&SecretValue::Match("alice@example.com".to_string()))
            .unwrap();

        // every node holds the same share, and a re-split reproduces it
        assert!(first.iter().all(|s| s == &first[0]));
        assert_eq!(first[0], second[0]);

        let other = engine
            .split(&SecretValue::Match("bob@example.com".to_string()))
            .unwrap();
        assert_ne!(first[0], other[0]);
    }

    #[test]
    fn test_match_mismatch_rejected() {
        let engine = engine(3);
        let mut shares = engine
            .split(&SecretValue::Match("value".to_string()))
            .unwrap();
        let tampered = engine
            .split(&SecretValue::Match("other".to_string()))
            .unwrap();
        shares[2] = tampered[0].clone();
        assert!(matches!(
            engine.combine(&shares),
            Err(ShareError::MatchMismatch)
        ));
    }

    #[test]
    fn test_corrupted_blind_share_fails() {
        let engine = engine(3);
        let mut shares = engine
            .split(&SecretValue::Text("secret".to_string()))
            .unwrap();
        if let Share::Blind(bytes) = &mut shares[1] {
            bytes[0] ^= 0xFF;
        }
        assert!(engine.combine(&shares).is_err());
    }

    #[test]
    fn test_combine_under_different_key_fails() {
        let split_engine =
            ShareEngine::with_key(ClusterKey::from_bytes([1u8; CLUSTER_KEY_SIZE], 3));
        let other_engine =
            ShareEngine::with_key(ClusterKey::from_bytes([2u8; CLUSTER_KEY_SIZE], 3));

        let shares = split_engine
            .split(&SecretValue::Text("secret".to_string()))
            .unwrap();
        assert!(other_engine.combine(&shares).is_err());
    }

    #[test]
    fn test_sum_homomorphism() {
        let engine = engine(3);
        let a = engine.split(&SecretValue::Sum(1_000)).unwrap();
        let b = engine.split(&SecretValue::Sum(234)).unwrap();

        // slot-wise sum of two share sets is a share set of the summed values
        let summed: Vec<Share> = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| match (x, y) {
                (Share::Sum(x), Share::Sum(y)) => Share::Sum(x.wrapping_add(*y)),
                _ => unreachable!(),
            })
            .collect();

        assert_eq!(
            engine.combine(&summed).unwrap(),
            CombinedValue::Number(1_234)
        );
    }

    #[test]
    fn test_wire_encoding_roundtrip() {
        let engine = engine(2);
        for value in [
            SecretValue::Text("text".to_string()),
            SecretValue::Match("match".to_string()),
            SecretValue::Sum(99),
        ] {
            let shares = engine.split(&value).unwrap();
            let decoded: Vec<Share> = shares
                .iter()
                .map(|s| Share::decode(&s.encode()).unwrap())
                .collect();
            assert_eq!(shares, decoded);
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Share::decode("no tag here").is_err());
        assert!(Share::decode("unknown:abcd").is_err());
        assert!(Share::decode("blind:not-hex").is_err());
        assert!(Share::decode("sum:not-a-number").is_err());
        assert!(Share::decode("sum:-5").is_err());
    }

    #[test]
    fn test_key_initialized_once_across_threads() {
        let engine = std::sync::Arc::new(ShareEngine::new(3));

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                engine
                    .split(&SecretValue::Text(format!("value-{}", i)))
                    .unwrap()
            }));
        }

        // shares split on any thread reconstruct on the main thread, so all
        // threads observed the same lazily-created key
        for handle in handles {
            let shares = handle.join().unwrap();
            assert!(engine.combine(&shares).is_ok());
        }
    }
}
