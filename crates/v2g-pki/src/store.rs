//! On-disk PKI material and the process-scoped trust store
//!
//! Loaded once at startup from `PKI_PATH`, refreshed only on explicit
//! [`TrustStore::reload`]. Shared read-mostly between sessions. All
//! DER blobs live in the arena; anchor sets and identity chains are
//! kept as arena indices and materialized at the API boundary, where
//! wire chains and the TLS layer need owned bytes.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::arena::{CertArena, CertId, ChainRef};
use crate::chain::validate_chain;
use crate::error::PkiError;

/// The four ISO 15118 anchor sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorRole {
    V2g,
    Mo,
    Oem,
    Contract,
}

impl AnchorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorRole::V2g => "v2g",
            AnchorRole::Mo => "mo",
            AnchorRole::Oem => "oem",
            AnchorRole::Contract => "contract",
        }
    }

    fn index(&self) -> usize {
        match self {
            AnchorRole::V2g => 0,
            AnchorRole::Mo => 1,
            AnchorRole::Oem => 2,
            AnchorRole::Contract => 3,
        }
    }
}

/// A role identity materialized for a caller: its leaf-first chain and
/// PKCS#8 private key.
#[derive(Debug, Clone)]
pub struct IdentityMaterial {
    pub chain: Vec<Vec<u8>>,
    pub key_pkcs8: Vec<u8>,
}

/// A role identity as stored: chain as arena indices plus the key.
struct IdentityRef {
    chain: ChainRef,
    key_pkcs8: Vec<u8>,
}

impl IdentityRef {
    fn materialize(&self, arena: &CertArena) -> IdentityMaterial {
        IdentityMaterial {
            chain: self.chain.to_ders(arena),
            key_pkcs8: self.key_pkcs8.clone(),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    arena: CertArena,
    anchors: [Vec<CertId>; 4],
    secc: Option<IdentityRef>,
    contract: Option<IdentityRef>,
    oem: Option<IdentityRef>,
    revoked: HashSet<String>,
}

/// Process-scoped certificate trust store.
pub struct TrustStore {
    path: PathBuf,
    inner: RwLock<StoreInner>,
}

impl TrustStore {
    /// Load all material under `pki_path` (`certs/` and `private_keys/`).
    pub fn load(pki_path: impl Into<PathBuf>) -> Result<Self, PkiError> {
        let path = pki_path.into();
        let inner = read_material(&path)?;
        info!(
            path = %path.display(),
            certificates = inner.arena.len(),
            revoked = inner.revoked.len(),
            "trust store loaded"
        );
        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    /// Re-read everything from disk, replacing the current material.
    pub fn reload(&self) -> Result<(), PkiError> {
        let fresh = read_material(&self.path)?;
        *self.inner.write() = fresh;
        info!(path = %self.path.display(), "trust store reloaded");
        Ok(())
    }

    /// DER anchors for one role.
    pub fn anchors(&self, role: AnchorRole) -> Vec<Vec<u8>> {
        let inner = self.inner.read();
        inner.arena.to_ders(&inner.anchors[role.index()])
    }

    /// Validate a leaf-first DER chain against the given role's anchors,
    /// applying the local revocation set.
    pub fn validate(
        &self,
        chain: &[Vec<u8>],
        role: AnchorRole,
        now_ts: i64,
    ) -> Result<(), PkiError> {
        let inner = self.inner.read();
        let anchors = inner.arena.to_ders(&inner.anchors[role.index()]);
        validate_chain(chain, &anchors, role.as_str(), now_ts, &inner.revoked)
    }

    pub fn secc_identity(&self) -> Option<IdentityMaterial> {
        let inner = self.inner.read();
        inner.secc.as_ref().map(|r| r.materialize(&inner.arena))
    }

    pub fn contract_identity(&self) -> Option<IdentityMaterial> {
        let inner = self.inner.read();
        inner.contract.as_ref().map(|r| r.materialize(&inner.arena))
    }

    pub fn oem_identity(&self) -> Option<IdentityMaterial> {
        let inner = self.inner.read();
        inner.oem.as_ref().map(|r| r.materialize(&inner.arena))
    }

    /// Whether a normalized serial is locally revoked.
    pub fn is_revoked(&self, serial: &str) -> bool {
        self.inner.read().revoked.contains(serial)
    }
}

fn read_material(path: &Path) -> Result<StoreInner, PkiError> {
    let certs_dir = path.join("certs");
    let keys_dir = path.join("private_keys");
    if !certs_dir.is_dir() {
        return Err(PkiError::MissingMaterial(format!(
            "{} is not a directory",
            certs_dir.display()
        )));
    }

    let mut inner = StoreInner::default();

    for (role, file) in [
        (AnchorRole::V2g, "v2gRootCA.pem"),
        (AnchorRole::Mo, "moRootCA.pem"),
        (AnchorRole::Oem, "oemRootCA.pem"),
        (AnchorRole::Contract, "contractRootCA.pem"),
    ] {
        if let Some(ders) = read_pem_certs_optional(&certs_dir.join(file))? {
            inner.anchors[role.index()] = ders
                .into_iter()
                .map(|der| inner.arena.insert(der))
                .collect();
        } else {
            debug!(role = role.as_str(), file, "no anchor file");
        }
    }

    inner.secc = read_identity(
        &certs_dir,
        &keys_dir,
        &["seccLeaf.pem", "cpoSubCA2.pem", "cpoSubCA1.pem"],
        "seccLeaf.key.pem",
        &mut inner.arena,
    )?;
    inner.contract = read_identity(
        &certs_dir,
        &keys_dir,
        &["contractLeaf.pem", "moSubCA2.pem", "moSubCA1.pem"],
        "contractLeaf.key.pem",
        &mut inner.arena,
    )?;
    inner.oem = read_identity(
        &certs_dir,
        &keys_dir,
        &["oemLeaf.pem", "oemSubCA2.pem", "oemSubCA1.pem"],
        "oemLeaf.key.pem",
        &mut inner.arena,
    )?;

    inner.revoked = read_revoked(&certs_dir.join("revoked_serials.txt"))?;

    if inner.anchors.iter().all(Vec::is_empty) {
        return Err(PkiError::MissingMaterial(
            "no trust anchors found under certs/".to_string(),
        ));
    }

    Ok(inner)
}

/// An identity needs its leaf plus key; missing sub-CA files shorten
/// the chain, a missing leaf or key leaves the identity absent.
fn read_identity(
    certs_dir: &Path,
    keys_dir: &Path,
    chain_files: &[&str],
    key_file: &str,
    arena: &mut CertArena,
) -> Result<Option<IdentityRef>, PkiError> {
    let mut chain = ChainRef::default();
    for (i, file) in chain_files.iter().enumerate() {
        match read_pem_certs_optional(&certs_dir.join(file))? {
            Some(ders) => {
                chain
                    .certs
                    .extend(ders.into_iter().map(|der| arena.insert(der)));
            }
            None if i == 0 => return Ok(None),
            None => {}
        }
    }

    let key_path = keys_dir.join(key_file);
    let Some(key_pkcs8) = read_pkcs8_optional(&key_path)? else {
        warn!(leaf = chain_files[0], key = %key_path.display(), "identity chain present but key missing");
        return Ok(None);
    };

    Ok(Some(IdentityRef { chain, key_pkcs8 }))
}

fn read_pem_certs_optional(path: &Path) -> Result<Option<Vec<Vec<u8>>>, PkiError> {
    if !path.is_file() {
        return Ok(None);
    }
    let file = File::open(path).map_err(|source| PkiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let ders = rustls_pemfile::certs(&mut reader).map_err(|source| PkiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if ders.is_empty() {
        return Err(PkiError::Parse(format!(
            "{} contains no certificates",
            path.display()
        )));
    }
    Ok(Some(ders))
}

fn read_pkcs8_optional(path: &Path) -> Result<Option<Vec<u8>>, PkiError> {
    if !path.is_file() {
        return Ok(None);
    }
    let file = File::open(path).map_err(|source| PkiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader).map_err(|source| PkiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    match keys.len() {
        0 => Err(PkiError::BadKey(format!(
            "{} contains no PKCS#8 key",
            path.display()
        ))),
        _ => Ok(Some(keys.remove(0))),
    }
}

fn read_revoked(path: &Path) -> Result<HashSet<String>, PkiError> {
    let mut revoked = HashSet::new();
    if !path.is_file() {
        return Ok(revoked);
    }
    let file = File::open(path).map_err(|source| PkiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| PkiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let serial = line.trim();
        if !serial.is_empty() && !serial.starts_with('#') {
            revoked.insert(serial.replace(':', "").to_ascii_uppercase());
        }
    }
    Ok(revoked)
}
