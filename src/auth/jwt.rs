//! Minimal JWT verification for the OAuth-redirect login flow.
//!
//! Tokens arrive in the `_aoauth_token` query parameter or the
//! `authorization` cookie and are verified against the issuer's public key,
//! which is fetched from a configured URL and refreshed on a timer. Only a
//! fixed allow-list of asymmetric algorithms is accepted.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::{Algorithm, verify_signature};
use crate::config::JwtConfig;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder};

/// Query parameter the authorization endpoint returns the token in.
pub const TOKEN_PARAM: &str = "_aoauth_token";

const COOKIE_NAME: &str = "authorization";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("malformed token")]
    Malformed,
    #[error("algorithm {0:?} not allowed")]
    DisallowedAlgorithm(String),
    #[error("signature verification failed")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("no subject claim")]
    NoSubject,
    #[error("issuer key not available")]
    NoIssuerKey,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
}

/// Verifies JWTs against the periodically refreshed issuer key.
pub struct JwtVerifier {
    authorize_url: Url,
    key_url: String,
    refresh_secs: u64,
    leeway_secs: i64,
    issuer_key: RwLock<Option<String>>,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> anyhow::Result<Self> {
        let authorize_url = Url::parse(&config.authorize_url)?;

        Ok(Self {
            authorize_url,
            key_url: config.key_url,
            refresh_secs: config.refresh_secs,
            leeway_secs: config.leeway_secs,
            issuer_key: RwLock::new(None),
        })
    }

    /// Installs an issuer key directly (startup seeding and tests).
    pub fn set_issuer_key(&self, pem: String) {
        *self.issuer_key.write().expect("issuer key lock") = Some(pem);
    }

    /// Fetches the issuer's public key once.
    pub async fn refresh_issuer_key(&self, client: &reqwest::Client) -> anyhow::Result<()> {
        let pem = client
            .get(&self.key_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        tracing::info!(url = %self.key_url, "issuer public key refreshed");
        self.set_issuer_key(pem);
        Ok(())
    }

    /// Spawns the periodic key-refresh task.
    pub fn spawn_refresh(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let verifier = Arc::clone(self);
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut interval =
                tokio::time::interval(Duration::from_secs(verifier.refresh_secs.max(1)));
            loop {
                interval.tick().await;
                if let Err(e) = verifier.refresh_issuer_key(&client).await {
                    tracing::warn!(error = %e, "issuer key refresh failed");
                }
            }
        })
    }

    /// Extracts a token from the query parameter or the authorization cookie.
    pub fn token_from_request(req: &Request) -> Option<String> {
        if let Some(token) = req.query_value(TOKEN_PARAM) {
            return Some(token.to_string());
        }
        req.cookie(COOKIE_NAME).map(str::to_string)
    }

    /// Decodes and verifies a token, returning the subject identity.
    pub fn verify(&self, token: &str) -> Result<String, JwtError> {
        let mut segments = token.split('.');
        let (Some(h), Some(p), Some(s), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(JwtError::Malformed);
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(h.as_bytes())
            .map_err(|_| JwtError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_json).map_err(|_| JwtError::Malformed)?;

        let alg = Algorithm::from_name(&header.alg)
            .ok_or_else(|| JwtError::DisallowedAlgorithm(header.alg.clone()))?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(p.as_bytes())
            .map_err(|_| JwtError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_json).map_err(|_| JwtError::Malformed)?;

        let mut signature = URL_SAFE_NO_PAD
            .decode(s.as_bytes())
            .map_err(|_| JwtError::Malformed)?;

        // JWS encodes EC signatures as raw r||s halves; generic crypto APIs
        // want ASN.1 DER.
        if alg.is_ec() {
            signature = ecdsa_raw_to_der(&signature)?;
        }

        let pem = self
            .issuer_key
            .read()
            .expect("issuer key lock")
            .clone()
            .ok_or(JwtError::NoIssuerKey)?;

        let message = &token[..h.len() + 1 + p.len()];
        match verify_signature(alg, &pem, message.as_bytes(), &signature) {
            Ok(true) => {}
            _ => return Err(JwtError::BadSignature),
        }

        self.check_time_claims(&claims)?;

        claims.sub.ok_or(JwtError::NoSubject)
    }

    fn check_time_claims(&self, claims: &Claims) -> Result<(), JwtError> {
        let now = Utc::now().timestamp();
        let leeway = self.leeway_secs;

        if let Some(exp) = claims.exp
            && exp + leeway < now
        {
            return Err(JwtError::Expired);
        }
        if let Some(nbf) = claims.nbf
            && nbf - leeway > now
        {
            return Err(JwtError::NotYetValid);
        }
        if let Some(iat) = claims.iat
            && iat - leeway > now
        {
            return Err(JwtError::NotYetValid);
        }

        Ok(())
    }

    /// The 307 redirect sent when a protected request carries no token.
    ///
    /// `redirect_uri` points back at the original request, with any stale
    /// token parameter stripped from the query.
    pub fn redirect(&self, req: &Request) -> Response {
        let host = req.header("host").unwrap_or("localhost");
        let original = format!("http://{}{}", host, req.target_without_param(TOKEN_PARAM));

        let mut location = self.authorize_url.clone();
        location
            .query_pairs_mut()
            .append_pair("redirect_uri", &original);

        ResponseBuilder::new(307)
            .header("Location", location.to_string())
            .build()
    }
}

/// Rebuilds an ASN.1 DER `ECDSA-Sig-Value` from raw `r || s` halves.
///
/// Each half becomes a DER INTEGER: leading zero bytes trimmed, then one zero
/// byte re-added if the high bit is set, keeping the two's-complement sign
/// positive.
pub fn ecdsa_raw_to_der(raw: &[u8]) -> Result<Vec<u8>, JwtError> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(JwtError::Malformed);
    }

    let (r, s) = raw.split_at(raw.len() / 2);
    let r = der_integer(r);
    let s = der_integer(s);

    let content_len = r.len() + s.len();
    // P-256/P-384 signatures fit the short length form.
    if content_len > 127 {
        return Err(JwtError::Malformed);
    }

    let mut der = Vec::with_capacity(content_len + 2);
    der.push(0x30);
    der.push(content_len as u8);
    der.extend_from_slice(&r);
    der.extend_from_slice(&s);
    Ok(der)
}

fn der_integer(bytes: &[u8]) -> Vec<u8> {
    let mut value = bytes;
    while value.len() > 1 && value[0] == 0 {
        value = &value[1..];
    }

    let pad = value.first().is_none_or(|&b| b & 0x80 != 0);
    let mut out = Vec::with_capacity(value.len() + 3);
    out.push(0x02);
    out.push((value.len() + pad as usize) as u8);
    if pad {
        out.push(0);
    }
    out.extend_from_slice(value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_integer_trims_and_pads() {
        // Leading zeros trimmed
        assert_eq!(der_integer(&[0x00, 0x00, 0x01]), vec![0x02, 0x01, 0x01]);
        // High bit forces a sign byte
        assert_eq!(der_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        // Zero stays a single zero octet
        assert_eq!(der_integer(&[0x00]), vec![0x02, 0x01, 0x00]);
    }

    #[test]
    fn raw_signature_becomes_sequence() {
        let raw = [[0x01u8; 32], [0x7fu8; 32]].concat();
        let der = ecdsa_raw_to_der(&raw).unwrap();
        assert_eq!(der[0], 0x30);
        assert_eq!(der[1] as usize, der.len() - 2);
    }

    #[test]
    fn odd_length_raw_signature_rejected() {
        assert_eq!(ecdsa_raw_to_der(&[1, 2, 3]), Err(JwtError::Malformed));
    }
}
