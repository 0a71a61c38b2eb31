//! Unguessable access credentials for external parties.
//!
//! A credential is 128 bits from the system CSPRNG, hex encoded. Only its
//! SHA-256 digest is ever persisted; the plaintext exists once, in the link
//! handed to the party.

use std::fmt;

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CREDENTIAL_BYTES: usize = 16;
const CREDENTIAL_HEX_LEN: usize = CREDENTIAL_BYTES * 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("system random source unavailable")]
    Rng,

    #[error("malformed access credential")]
    Malformed,
}

/// Plaintext credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential(String);

impl AccessCredential {
    pub fn generate() -> Result<Self, CredentialError> {
        let mut bytes = [0u8; CREDENTIAL_BYTES];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CredentialError::Rng)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Accept a credential presented by a party. Shape is checked before
    /// any lookup so garbage never reaches the store.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let raw = raw.trim();
        let well_formed = raw.len() == CREDENTIAL_HEX_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(CredentialError::Malformed);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn digest(&self) -> CredentialDigest {
        let d = digest::digest(&digest::SHA256, self.0.as_bytes());
        CredentialDigest(hex::encode(d.as_ref()))
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessCredential(..)")
    }
}

/// Hex SHA-256 of a credential; the only form that is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialDigest(String);

impl CredentialDigest {
    /// Rehydrate a digest read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to correlate log lines.
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}
