//! Cryptographic primitives for SplitVault
//!
//! This module provides the cryptographic foundation for SplitVault's storage
//! model:
//!
//! - **Caller Identity**: Ed25519 keypairs used to sign node-scoped credentials
//! - **Cluster Key**: process-wide key material parameterizing secret sharing
//!   for a fixed node topology
//! - **Secret Sharing**: splitting a field value into one share per node and
//!   recombining a full share set back into the value
//!
//! # Security Model
//!
//! ## Caller Identity
//! The client holds an Ed25519 keypair (`SecretKey`/`PublicKey`). Nodes know
//! the public half and verify the bearer credentials minted for each operation.
//!
//! ## Share Flavors
//! A protected field value is split into exactly N shares, one per configured
//! node. Three flavors cover different downstream capabilities:
//! - *blind*: ciphertext is XOR-split, a single share is a one-time-pad
//!   fragment and leaks nothing
//! - *matchable*: deterministic encryption, every node holds the identical
//!   share so node-side equality filters work without reconstruction
//! - *additive*: numeric sharing mod 2^64, share-wise sums reconstruct to the
//!   sum of the values
//!
//! ## Reconstruction Threshold
//! Reconstruction requires the shares of all N nodes. `combine` fails
//! deterministically on any other count; there is no sub-threshold recovery.

mod cluster_key;
mod keys;
mod share;

pub use cluster_key::{ClusterKey, ClusterKeyError, CLUSTER_KEY_SIZE};
pub use keys::{KeyError, PublicKey, SecretKey};
pub use share::{CombinedValue, SecretValue, Share, ShareEngine, ShareError};
