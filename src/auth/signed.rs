//! Signed requests with monotonic replay protection.
//!
//! A client that holds a registered keypair signs the literal sequence string
//! and sends `Signature: keyid="…",algorithm="…",sequence="…",signature="…"`.
//! The sequence must be strictly greater than the last accepted one for that
//! key, so a captured header can never be replayed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::auth::{Algorithm, verify_signature};
use crate::http::request::Request;

/// Parsed fields of a Signature header.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    pub keyid: String,
    pub algorithm: String,
    pub sequence: String,
    pub signature: String,
}

/// Parses `keyid="a",algorithm="RS256",sequence="42",signature="…"`.
///
/// Field order is not significant; all four fields are required.
pub fn parse_signature_header(raw: &str) -> Option<SignatureHeader> {
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for part in raw.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        let value = value.strip_prefix('"')?.strip_suffix('"')?;
        fields.insert(key.trim(), value);
    }

    Some(SignatureHeader {
        keyid: fields.get("keyid")?.to_string(),
        algorithm: fields.get("algorithm")?.to_string(),
        sequence: fields.get("sequence")?.to_string(),
        signature: fields.get("signature")?.to_string(),
    })
}

/// A registered signing key and its replay watermark.
#[derive(Debug, Clone)]
pub struct StoredKey {
    pub keyid: String,
    /// Identity granted when a signature under this key verifies
    pub owner: String,
    pub public_key_pem: String,
    /// Highest sequence number accepted so far
    pub last_sequence: u64,
}

/// Persistence boundary for signing keys; the bot's key-value store
/// implements this in production.
pub trait KeyStore: Send + Sync {
    fn load(&self, keyid: &str) -> Option<StoredKey>;
    /// Advances the replay watermark to `sequence` if it is still strictly
    /// greater than the stored one, atomically. Returns whether it advanced.
    fn advance_sequence(&self, keyid: &str, sequence: u64) -> bool;
    fn insert(&self, key: StoredKey);
}

/// In-memory key store, also used by tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    inner: RwLock<HashMap<String, StoredKey>>,
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, keyid: &str) -> Option<StoredKey> {
        self.inner.read().expect("key store lock").get(keyid).cloned()
    }

    fn advance_sequence(&self, keyid: &str, sequence: u64) -> bool {
        let mut keys = self.inner.write().expect("key store lock");
        match keys.get_mut(keyid) {
            Some(key) if sequence > key.last_sequence => {
                key.last_sequence = sequence;
                true
            }
            _ => false,
        }
    }

    fn insert(&self, key: StoredKey) {
        self.inner
            .write()
            .expect("key store lock")
            .insert(key.keyid.clone(), key);
    }
}

/// The signed-request strategy.
pub struct SignedRequests {
    store: Arc<dyn KeyStore>,
}

impl Default for SignedRequests {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryKeyStore::default()),
        }
    }
}

impl SignedRequests {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn KeyStore {
        self.store.as_ref()
    }

    /// Registers a key in the backing store (startup/provisioning path).
    pub fn register_key(&self, key: StoredKey) {
        if self.store.load(&key.keyid).is_some() {
            tracing::warn!(keyid = %key.keyid, "signing key re-registered");
        }
        self.store.insert(key);
    }

    /// Verifies a Signature header, returning the key owner's identity.
    ///
    /// The replay check runs before any crypto: a sequence at or below the
    /// watermark is rejected regardless of signature validity. The watermark
    /// advance after verification is atomic, so of two concurrent requests
    /// carrying the same sequence at most one authenticates.
    pub fn verify(&self, req: &Request) -> Option<String> {
        let raw = req.header("signature")?;
        let header = parse_signature_header(raw)?;

        let alg = match Algorithm::from_name(&header.algorithm) {
            Some(alg) => alg,
            None => {
                tracing::debug!(algorithm = %header.algorithm, "disallowed signature algorithm");
                return None;
            }
        };

        let key = self.store.load(&header.keyid)?;
        let sequence: u64 = header.sequence.parse().ok()?;

        if sequence <= key.last_sequence {
            tracing::warn!(
                keyid = %header.keyid,
                sequence,
                watermark = key.last_sequence,
                "replayed signature sequence rejected"
            );
            return None;
        }

        let signature = STANDARD.decode(header.signature.as_bytes()).ok()?;

        match verify_signature(
            alg,
            &key.public_key_pem,
            header.sequence.as_bytes(),
            &signature,
        ) {
            Ok(true) => {
                // Re-checked under the store's write lock: a concurrent
                // request with the same sequence may have advanced it since
                // the pre-crypto check.
                if self.store.advance_sequence(&header.keyid, sequence) {
                    Some(key.owner)
                } else {
                    tracing::warn!(
                        keyid = %header.keyid,
                        sequence,
                        "sequence overtaken by concurrent request, rejected"
                    );
                    None
                }
            }
            Ok(false) => {
                tracing::debug!(keyid = %header.keyid, "signature verification failed");
                None
            }
            Err(e) => {
                tracing::debug!(keyid = %header.keyid, error = %e, "signature key unusable");
                None
            }
        }
    }
}
