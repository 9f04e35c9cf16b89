//! v2g-pki - certificate chains, trust anchors, and PnC signatures
//!
//! Holds the process-scoped [`TrustStore`] (per-role anchor sets, the
//! local identities, and the revocation set), leaf-first chain
//! validation, and the ECDSA detached-signature primitives the PnC
//! flow uses over canonical EXI fragments.

pub mod arena;
pub mod chain;
pub mod error;
pub mod sign;
pub mod store;

pub use arena::{CertArena, CertId, ChainRef};
pub use chain::{normalized_serial, subject_common_name, validate_chain};
pub use error::PkiError;
pub use sign::{fragment_digest, verify_detached, SigningKey};
pub use store::{AnchorRole, IdentityMaterial, TrustStore};
