use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{EngineError, Subject};
use crate::keystore::KeyStore;
use crate::record::AuditRecord;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const AES_BLOCK_SIZE: usize = 16;

/// One encrypted record as delivered by the transport's record listing.
/// `encrypt_chat_msg` is base64 over IV-prefixed AES-256-CBC ciphertext;
/// `encrypt_random_key` is the RSA-wrapped session key for this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub seq: u64,
    #[serde(default)]
    pub msgid: String,
    #[serde(default)]
    pub publickey_ver: u32,
    pub encrypt_random_key: String,
    pub encrypt_chat_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
}

/// Turns one `RawEnvelope` into a structured `AuditRecord`.
///
/// The stages keep their error classes distinct so callers can tell a wrong
/// key (`Crypto`) from a corrupted payload (`Integrity`) from plaintext that
/// decrypted fine but is not a record (`Malformed`).
pub struct EnvelopeDecoder<'a> {
    keys: &'a KeyStore,
}

impl<'a> EnvelopeDecoder<'a> {
    pub fn new(keys: &'a KeyStore) -> Self {
        Self { keys }
    }

    pub fn decode(&self, envelope: &RawEnvelope) -> Result<AuditRecord, EngineError> {
        let subject = Subject::Sequence(envelope.seq);
        let crypto = |detail: String| EngineError::Crypto {
            subject: Subject::Sequence(envelope.seq),
            detail,
        };

        self.keys
            .check_version(envelope.publickey_ver)
            .map_err(|err| err.with_subject(subject.clone()))?;
        let session_key = self
            .keys
            .decrypt_key_envelope(&envelope.encrypt_random_key)
            .map_err(|err| err.with_subject(subject.clone()))?;

        let sealed = BASE64
            .decode(envelope.encrypt_chat_msg.trim())
            .map_err(|err| crypto(format!("payload base64: {err}")))?;
        if sealed.len() < 2 * AES_BLOCK_SIZE || sealed.len() % AES_BLOCK_SIZE != 0 {
            return Err(crypto(format!("sealed payload has bad length {}", sealed.len())));
        }

        let (iv, ciphertext) = sealed.split_at(AES_BLOCK_SIZE);
        let mut buf = ciphertext.to_vec();
        let plaintext = Aes256CbcDec::new_from_slices(session_key.as_bytes(), iv)
            .map_err(|_| crypto("bad key or iv length".into()))?
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| crypto("aes-cbc decrypt failed (corrupt payload or wrong key)".into()))?;

        if let Some(expected) = &envelope.md5sum {
            let actual = hex::encode(Md5::digest(plaintext));
            if !actual.eq_ignore_ascii_case(expected) {
                // No partial plaintext escapes on a failed check.
                buf.zeroize();
                return Err(EngineError::Integrity {
                    subject,
                    expected: expected.to_ascii_lowercase(),
                    actual,
                });
            }
        }

        let record = AuditRecord::from_plaintext(envelope.seq, &envelope.msgid, plaintext);
        buf.zeroize();
        record
    }
}
