//! Session identifiers and their cookie signatures.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{
    digest::{Key, KeyInit},
    Hmac, Mac,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const ID_BYTES: usize = 32;

/// Opaque session identifier (256 random bits, URL-safe base64).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Create a fresh identifier. Identifiers are never derived from prior ones,
    /// so a destroyed or expired id is never handed out again.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session id")?;
        Ok(Self(Base64UrlUnpadded::encode_string(&bytes)))
    }

    /// Wrap an identifier read back from storage or a verified cookie.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Only a prefix is printed so ids do not end up in logs.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionId({prefix}…)")
    }
}

/// Signs and verifies cookie values of the form `<id>.<signature>`.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    /// Key the signer once. The secret is hashed into a fixed-size HMAC key,
    /// so secrets of any length (including empty) are accepted.
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        let mut key = Key::<HmacSha256>::default();
        key[..digest.len()].copy_from_slice(digest.as_slice());
        Self {
            mac: <HmacSha256 as KeyInit>::new(&key),
        }
    }

    /// Random per-process secret. Cookies signed with it do not survive a restart.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn ephemeral_secret() -> Result<SecretString> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session secret")?;
        Ok(SecretString::from(Base64UrlUnpadded::encode_string(&bytes)))
    }

    #[must_use]
    pub fn sign(&self, id: &SessionId) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_str().as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        format!("{}.{signature}", id.as_str())
    }

    /// Returns the id when the signature matches, `None` for unsigned or tampered values.
    #[must_use]
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (id, signature) = value.rsplit_once('.')?;
        if id.is_empty() {
            return None;
        }
        let signature = Base64UrlUnpadded::decode_vec(signature).ok()?;
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(SessionId::from_raw(id))
    }
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner")
            .field("key", &"***")
            .finish()
    }
}
