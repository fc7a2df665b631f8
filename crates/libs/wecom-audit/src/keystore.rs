use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{EngineError, Subject};

/// The vendor wraps a 256-bit AES key per record.
pub const SESSION_KEY_LEN: usize = 32;

/// Symmetric key recovered from one envelope. Scrubbed on drop and never
/// cached across records.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Holds the RSA private key used to unwrap per-record session keys.
/// Read-only after construction, so sharing across threads needs no locking.
#[derive(Debug)]
pub struct KeyStore {
    key: RsaPrivateKey,
    version: Option<u32>,
}

impl KeyStore {
    /// Loads a PKCS#8 or PKCS#1 PEM private key from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let pem = fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("read {}: {err}", path.display())))?;
        let key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .map_err(|err| {
                EngineError::Config(format!(
                    "{} is not a valid RSA private key: {err}",
                    path.display()
                ))
            })?;
        Ok(Self { key, version: None })
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        Self { key, version: None }
    }

    /// Pins the key version envelopes are expected to declare.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Rejects an envelope whose declared key version cannot match the held
    /// key, before attempting the doomed RSA operation.
    pub fn check_version(&self, declared: u32) -> Result<(), EngineError> {
        match self.version {
            Some(expected) if declared != expected => Err(EngineError::Crypto {
                subject: Subject::Key,
                detail: format!(
                    "envelope declares key version {declared}, store holds version {expected}"
                ),
            }),
            _ => Ok(()),
        }
    }

    /// Unwraps an `encrypt_random_key` field: base64, then RSA PKCS#1 v1.5,
    /// then base64 again (the vendor transmits the random key as base64
    /// text inside the RSA plaintext).
    pub fn decrypt_key_envelope(&self, encrypted_key: &str) -> Result<SessionKey, EngineError> {
        let crypto = |detail: String| EngineError::Crypto { subject: Subject::Key, detail };

        let wrapped = BASE64
            .decode(encrypted_key.trim())
            .map_err(|err| crypto(format!("key envelope base64: {err}")))?;
        let mut plain = self
            .key
            .decrypt(Pkcs1v15Encrypt, &wrapped)
            .map_err(|_| crypto("rsa unwrap failed (wrong key or corrupted blob)".into()))?;

        let decoded = std::str::from_utf8(&plain)
            .map_err(|_| crypto("unwrapped key is not valid text".into()))
            .and_then(|text| {
                BASE64
                    .decode(text.trim())
                    .map_err(|err| crypto(format!("unwrapped key base64: {err}")))
            });
        plain.zeroize();
        let key_bytes = decoded?;

        if key_bytes.len() != SESSION_KEY_LEN {
            return Err(crypto(format!(
                "session key is {} bytes, expected {SESSION_KEY_LEN}",
                key_bytes.len()
            )));
        }
        Ok(SessionKey(key_bytes))
    }
}
