/**
 * Cryptographic types and operations.
 *  - Signing key implementations for caller identity
 *  - The process-wide cluster key
 *  - Secret splitting and reconstruction
 */
pub mod crypto;
/**
 * Common types that describe logical records,
 *  the per-node partial records derived from them,
 *  and the wire shape both travel in.
 */
pub mod record;

pub mod prelude {
    pub use crate::crypto::{
        ClusterKey, CombinedValue, PublicKey, SecretKey, SecretValue, Share, ShareEngine,
    };
    pub use crate::record::{FieldValue, Filter, PartialRecord, Record};
}
