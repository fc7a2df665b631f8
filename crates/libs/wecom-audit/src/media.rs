use std::fs;
use std::path::Path;

use md5::{Digest, Md5};

use crate::engine::AuditEngine;
use crate::error::{code, EngineError, Subject};
use crate::record::MediaReference;
use crate::transport::AuditTransport;

/// A fully assembled, digest-verified media blob. Owned by the caller;
/// the engine keeps nothing after returning it.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    bytes: Vec<u8>,
    digest: String,
}

impl MediaPayload {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Lowercase hex MD5 over the assembled bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Persists the payload via a temporary file and rename, so a crashed
    /// writer never leaves a half-written destination. Persistence is a
    /// caller-requested side effect layered on an already-verified fetch.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let path = path.as_ref();
        let tmp = path.with_extension("part");
        fs::write(&tmp, &self.bytes)
            .map_err(|err| EngineError::Io(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|err| EngineError::Io(format!("rename to {}: {err}", path.display())))
    }
}

impl<T: AuditTransport> AuditEngine<T> {
    /// Retrieves a media blob chunk by chunk and verifies it against the
    /// reference's declared md5sum when one is present.
    ///
    /// Stateless across calls: any failure discards the partial buffer and
    /// a retry restarts from offset zero.
    pub fn fetch_media(&self, reference: &MediaReference) -> Result<MediaPayload, EngineError> {
        let sdkfileid = reference.sdkfileid.as_str();
        let mut assembled: Vec<u8> = Vec::new();
        let mut offset = 0u64;

        loop {
            let chunk = self.transport.fetch_media_chunk(sdkfileid, offset, self.timeout)?;
            if chunk.status.errcode != 0 {
                log::warn!(
                    "media: {sdkfileid} aborted at offset {offset}: errcode {} ({})",
                    chunk.status.errcode,
                    chunk.status.errmsg
                );
                // Partial buffer dropped here; no partial-file leakage.
                return Err(EngineError::Transport {
                    code: chunk.status.errcode,
                    message: format!("{} (sdkfileid {sdkfileid})", chunk.status.errmsg),
                });
            }
            if chunk.data.is_empty() && !chunk.is_last {
                return Err(EngineError::Transport {
                    code: code::PROTOCOL,
                    message: format!("empty non-final chunk for sdkfileid {sdkfileid}"),
                });
            }

            offset += chunk.data.len() as u64;
            assembled.extend_from_slice(&chunk.data);
            if chunk.is_last {
                break;
            }
        }

        let digest = hex::encode(Md5::digest(&assembled));
        if let Some(expected) = &reference.md5sum {
            if !digest.eq_ignore_ascii_case(expected) {
                return Err(EngineError::Integrity {
                    subject: Subject::Media(sdkfileid.to_string()),
                    expected: expected.to_ascii_lowercase(),
                    actual: digest,
                });
            }
        }

        log::debug!("media: fetched {sdkfileid} ({} bytes, md5 {digest})", assembled.len());
        Ok(MediaPayload { bytes: assembled, digest })
    }
}
