#![allow(dead_code)]

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde_json::json;
use wecom_audit::{KeyStore, RawEnvelope};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

pub const AES_BLOCK_SIZE: usize = 16;

/// Small keypair to keep test runs quick; production keys are larger.
pub fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
    let private = RsaPrivateKey::new(&mut rand_core::OsRng, 1024).expect("generate key");
    let public = RsaPublicKey::from(&private);
    (private, public)
}

pub fn keystore(private: RsaPrivateKey) -> KeyStore {
    KeyStore::from_key(private)
}

/// Seals arbitrary plaintext the way the vendor does: fixed-length random
/// AES-256 key wrapped with RSA PKCS#1 v1.5 (as base64 text), payload as
/// base64 over IV-prefixed AES-256-CBC with PKCS#7 padding.
pub fn seal(public: &RsaPublicKey, seq: u64, msgid: &str, plaintext: &[u8]) -> RawEnvelope {
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    // Deterministic per-sequence material keeps failures reproducible.
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = (seq as u8).wrapping_add(i as u8).wrapping_mul(31);
    }
    for (i, byte) in iv.iter_mut().enumerate() {
        *byte = (seq as u8).wrapping_mul(7).wrapping_add(i as u8);
    }

    let mut buf = vec![0u8; plaintext.len() + AES_BLOCK_SIZE];
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_b2b_mut::<Pkcs7>(plaintext, &mut buf)
        .expect("aes encrypt")
        .to_vec();

    let mut sealed = iv.to_vec();
    sealed.extend_from_slice(&ciphertext);

    let wrapped = public
        .encrypt(&mut rand_core::OsRng, Pkcs1v15Encrypt, BASE64.encode(key).as_bytes())
        .expect("rsa wrap");

    RawEnvelope {
        seq,
        msgid: msgid.to_string(),
        publickey_ver: 1,
        encrypt_random_key: BASE64.encode(wrapped),
        encrypt_chat_msg: BASE64.encode(sealed),
        md5sum: None,
    }
}

/// Seals a minimal text record from `sender`.
pub fn seal_text(public: &RsaPublicKey, seq: u64, sender: &str, text: &str) -> RawEnvelope {
    let body = json!({
        "msgid": format!("msg-{seq}"),
        "action": "send",
        "from": sender,
        "tolist": ["auditor"],
        "roomid": "",
        "msgtime": 1_700_000_000_000u64 + seq,
        "msgtype": "text",
        "text": {"content": text},
    });
    seal(public, seq, &format!("msg-{seq}"), &serde_json::to_vec(&body).expect("body"))
}

/// An envelope whose session key cannot be unwrapped by the engine's store.
pub fn seal_undecryptable(seq: u64) -> RawEnvelope {
    let (_, foreign_public) = keypair();
    seal_text(&foreign_public, seq, "mallory", "sealed for someone else")
}
