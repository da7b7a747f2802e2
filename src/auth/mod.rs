//! Authentication subsystem.
//!
//! Three independent strategies are tried in a fixed order for every request:
//! signed requests, JWT (when an issuer is configured), then basic auth.
//! Resolution is passive; it only inspects credentials the request already
//! carries. The active challenge (401 or the JWT redirect) is produced
//! separately, once routing has decided the route actually needs an identity.

pub mod basic;
pub mod jwt;
pub mod signed;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey};
use openssl::sign::Verifier;
use thiserror::Error;

use crate::config::{AuthConfig, AuthStrategy};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder};

pub use basic::BasicTokens;
pub use jwt::JwtVerifier;
pub use signed::{KeyStore, MemoryKeyStore, SignedRequests, StoredKey};

/// Asymmetric signature algorithms the server accepts.
///
/// This is an allow-list: an unknown or symmetric algorithm name is a
/// rejection, never a silent skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Rs256,
    Rs384,
    Es256,
    Es384,
}

impl Algorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(Algorithm::Rs256),
            "RS384" => Some(Algorithm::Rs384),
            "ES256" => Some(Algorithm::Es256),
            "ES384" => Some(Algorithm::Es384),
            _ => None,
        }
    }

    fn digest(&self) -> MessageDigest {
        match self {
            Algorithm::Rs256 | Algorithm::Es256 => MessageDigest::sha256(),
            Algorithm::Rs384 | Algorithm::Es384 => MessageDigest::sha384(),
        }
    }

    pub fn is_ec(&self) -> bool {
        matches!(self, Algorithm::Es256 | Algorithm::Es384)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("crypto failure: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}

/// Verifies a signature over `message` with a PEM public key.
///
/// EC signatures must already be in ASN.1 DER form. A key whose family does
/// not match the declared algorithm fails verification rather than erroring.
pub fn verify_signature(
    alg: Algorithm,
    public_key_pem: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, AuthError> {
    let pkey = PKey::public_key_from_pem(public_key_pem.as_bytes())?;

    let family_matches = match pkey.id() {
        Id::EC => alg.is_ec(),
        Id::RSA => !alg.is_ec(),
        _ => false,
    };
    if !family_matches {
        return Ok(false);
    }

    let mut verifier = Verifier::new(alg.digest(), &pkey)?;
    verifier.update(message)?;
    Ok(verifier.verify(signature).unwrap_or(false))
}

/// Process-wide authentication state: the three strategies plus the
/// identity → access-level mapping supplied by the settings collaborator.
pub struct AuthContext {
    pub signed: SignedRequests,
    pub basic: BasicTokens,
    pub jwt: Option<Arc<JwtVerifier>>,
    strategy: AuthStrategy,
    default_access: u32,
    access_levels: RwLock<HashMap<String, u32>>,
}

impl AuthContext {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        let jwt = match &config.jwt {
            Some(jwt_config) => Some(Arc::new(JwtVerifier::new(jwt_config.clone())?)),
            None => None,
        };

        Ok(Self {
            signed: SignedRequests::default(),
            basic: BasicTokens::new(config.token_ttl_secs),
            jwt,
            strategy: config.strategy,
            default_access: config.default_access,
            access_levels: RwLock::new(HashMap::new()),
        })
    }

    /// Attempts to resolve an identity from whatever credentials the request
    /// carries. Strategy order: signed request, JWT, basic auth. A failed
    /// credential leaves the identity unresolved; it never falls through to
    /// a weaker strategy with the same bytes.
    pub fn resolve(&self, req: &Request) -> Option<String> {
        if req.header("signature").is_some() {
            return self.signed.verify(req);
        }

        if let Some(verifier) = &self.jwt
            && let Some(token) = JwtVerifier::token_from_request(req)
        {
            return match verifier.verify(&token) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::debug!(error = %e, "JWT rejected");
                    None
                }
            };
        }

        if let Some(authorization) = req.header("authorization")
            && authorization.starts_with("Basic ")
        {
            return self.basic.verify(authorization);
        }

        None
    }

    /// The active challenge for an unauthenticated request to a protected
    /// route: the JWT redirect when that strategy is configured and the
    /// request carried no token, otherwise a 401 with the matching
    /// WWW-Authenticate scheme.
    pub fn challenge(&self, req: &Request) -> Response {
        if self.strategy == AuthStrategy::Jwt
            && let Some(verifier) = &self.jwt
        {
            if JwtVerifier::token_from_request(req).is_none() {
                return verifier.redirect(req);
            }
            return ResponseBuilder::new(401)
                .header("WWW-Authenticate", "Bearer")
                .build();
        }

        ResponseBuilder::new(401)
            .header("WWW-Authenticate", "Basic realm=\"beacon\"")
            .build()
    }

    /// Access level of an authenticated identity.
    pub fn level_of(&self, identity: &str) -> u32 {
        self.access_levels
            .read()
            .expect("access level lock")
            .get(identity)
            .copied()
            .unwrap_or(self.default_access)
    }

    /// Overrides the access level for one identity (settings boundary).
    pub fn set_level(&self, identity: impl Into<String>, level: u32) {
        self.access_levels
            .write()
            .expect("access level lock")
            .insert(identity.into(), level);
    }
}
