//! Server-side session store.
//!
//! Session tokens are 32 random bytes, URL-safe base64 on the wire, kept
//! server-side only as SHA-256 hashes. Sessions expire after a TTL and are
//! swept lazily when the store grows.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;

use crate::models::enums::Role;

/// Cleanup threshold — sweep expired entries once the store exceeds this.
const CLEANUP_THRESHOLD: usize = 1000;

/// Identity attached to a logged-in session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

struct SessionEntry {
    session: Session,
    expires_at: Instant,
}

pub struct SessionStore {
    entries: HashMap<[u8; 32], SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Create a session and return the opaque bearer token for the cookie.
    pub fn insert(&mut self, session: Session) -> String {
        if self.entries.len() > CLEANUP_THRESHOLD {
            self.cleanup();
        }

        let token = generate_token();
        self.entries.insert(
            hash_token(&token),
            SessionEntry {
                session,
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Resolve a token to its session, dropping it if expired.
    pub fn get(&mut self, token: &str) -> Option<Session> {
        let key = hash_token(token);
        match self.entries.get(&key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.session.clone()),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Logout: remove the session. Returns `true` if one existed.
    pub fn remove(&mut self, token: &str) -> bool {
        self.entries.remove(&hash_token(token)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }
}

/// Generate a random session token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a session token using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}
