//! Short-lived basic-auth login tokens.
//!
//! The bot's command layer mints a token for a user out of band (for example
//! via a chat whisper); the browser then presents it as the password in a
//! `Basic` Authorization header. Tokens live in memory only and expire by
//! wall-clock time.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};

struct IssuedToken {
    token: String,
    expires: DateTime<Utc>,
}

/// One-time token store for the basic-auth strategy.
pub struct BasicTokens {
    tokens: Mutex<HashMap<String, IssuedToken>>,
    ttl: Duration,
}

impl BasicTokens {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Issues a fresh token for a username, replacing any outstanding one.
    pub fn issue(&self, username: &str) -> String {
        let mut random = [0u8; 16];
        openssl::rand::rand_bytes(&mut random).expect("system rng");
        let token = URL_SAFE_NO_PAD.encode(random);

        let mut tokens = self.tokens.lock().expect("token lock");

        let now = Utc::now();
        tokens.retain(|_, issued| issued.expires > now);

        tokens.insert(
            username.to_string(),
            IssuedToken {
                token: token.clone(),
                expires: now + self.ttl,
            },
        );

        tracing::debug!(username, "basic-auth token issued");
        token
    }

    /// Verifies a `Basic` Authorization header value.
    ///
    /// Accepts only an exact, unexpired match for the username's issued
    /// token; returns the username as the identity.
    pub fn verify(&self, authorization: &str) -> Option<String> {
        let encoded = authorization.strip_prefix("Basic ")?.trim();
        let decoded = STANDARD.decode(encoded.as_bytes()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;
        let (username, token) = credentials.split_once(':')?;

        let tokens = self.tokens.lock().expect("token lock");
        let issued = tokens.get(username)?;

        if issued.token == token && issued.expires > Utc::now() {
            Some(username.to_string())
        } else {
            None
        }
    }

    /// Revokes a user's outstanding token, if any.
    pub fn revoke(&self, username: &str) {
        self.tokens.lock().expect("token lock").remove(username);
    }
}
