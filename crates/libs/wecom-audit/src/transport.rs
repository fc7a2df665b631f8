use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::envelope::RawEnvelope;
use crate::error::{EngineError, ErrorEnvelope};

/// The narrow capability surface of the vendor's audit service. Exactly the
/// two primitives the engine consumes; everything else (TLS, RPC framing,
/// SDK bootstrapping) stays behind an implementation of this trait.
///
/// Implementations are expected to honor `timeout` and report an expired
/// deadline as a transport failure rather than blocking indefinitely.
pub trait AuditTransport {
    /// Fetches up to `limit` encrypted records with sequence above
    /// `after_seq`, plus the vendor's success/failure envelope.
    fn fetch_records(
        &self,
        after_seq: u64,
        limit: u64,
        timeout: Duration,
    ) -> Result<RecordBatchResponse, EngineError>;

    /// Fetches one chunk of a media blob starting at `offset`.
    fn fetch_media_chunk(
        &self,
        sdkfileid: &str,
        offset: u64,
        timeout: Duration,
    ) -> Result<MediaChunkResponse, EngineError>;
}

/// Wire shape of a record listing: `{errcode, errmsg, chatdata: [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBatchResponse {
    #[serde(flatten)]
    pub status: ErrorEnvelope,
    #[serde(rename = "chatdata", default)]
    pub envelopes: Vec<RawEnvelope>,
}

impl RecordBatchResponse {
    pub fn ok(envelopes: Vec<RawEnvelope>) -> Self {
        Self { status: ErrorEnvelope::ok(), envelopes }
    }

    pub fn failure(errcode: i64, errmsg: impl Into<String>) -> Self {
        Self { status: ErrorEnvelope::failure(errcode, errmsg), envelopes: Vec::new() }
    }
}

/// One chunk of a media stream. `is_last` set on the final chunk.
#[derive(Debug, Clone, Default)]
pub struct MediaChunkResponse {
    pub status: ErrorEnvelope,
    pub data: Vec<u8>,
    pub is_last: bool,
}

impl MediaChunkResponse {
    pub fn ok(data: Vec<u8>, is_last: bool) -> Self {
        Self { status: ErrorEnvelope::ok(), data, is_last }
    }

    pub fn failure(errcode: i64, errmsg: impl Into<String>) -> Self {
        Self { status: ErrorEnvelope::failure(errcode, errmsg), data: Vec::new(), is_last: false }
    }
}

/// Deterministic stand-in for the vendor service. Batches are replayed in
/// the order they were scripted; media chunks are scripted per sdkfileid.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: Mutex<StubState>,
}

#[derive(Debug, Default)]
struct StubState {
    batches: VecDeque<RecordBatchResponse>,
    media: HashMap<String, VecDeque<MediaChunkResponse>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, response: RecordBatchResponse) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.batches.push_back(response);
    }

    pub fn script_media(&self, sdkfileid: impl Into<String>, chunks: Vec<MediaChunkResponse>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.media.insert(sdkfileid.into(), chunks.into());
    }
}

impl AuditTransport for InMemoryTransport {
    fn fetch_records(
        &self,
        _after_seq: u64,
        _limit: u64,
        _timeout: Duration,
    ) -> Result<RecordBatchResponse, EngineError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // An exhausted script means the log is fully consumed.
        Ok(state.batches.pop_front().unwrap_or_else(|| RecordBatchResponse::ok(Vec::new())))
    }

    fn fetch_media_chunk(
        &self,
        sdkfileid: &str,
        _offset: u64,
        _timeout: Duration,
    ) -> Result<MediaChunkResponse, EngineError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let chunk = state
            .media
            .get_mut(sdkfileid)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MediaChunkResponse::failure(10017, "media not found"));
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_listing_deserializes_vendor_shape() {
        let wire = json!({
            "errcode": 0, "errmsg": "ok",
            "chatdata": [{
                "seq": 8, "msgid": "m-8", "publickey_ver": 1,
                "encrypt_random_key": "a2V5", "encrypt_chat_msg": "bXNn"
            }]
        });
        let response: RecordBatchResponse =
            serde_json::from_value(wire).expect("deserialize listing");
        assert_eq!(response.status.errcode, 0);
        assert_eq!(response.envelopes.len(), 1);
        assert_eq!(response.envelopes[0].seq, 8);
        assert_eq!(response.envelopes[0].publickey_ver, 1);
    }

    #[test]
    fn error_listing_deserializes_without_chatdata() {
        let wire = json!({"errcode": 10001, "errmsg": "invalid secret"});
        let response: RecordBatchResponse =
            serde_json::from_value(wire).expect("deserialize error listing");
        assert_eq!(response.status.errcode, 10001);
        assert!(response.envelopes.is_empty());
    }

    #[test]
    fn stub_replays_batches_then_reports_caught_up() {
        let transport = InMemoryTransport::new();
        transport.push_batch(RecordBatchResponse::failure(1, "boom"));

        let timeout = Duration::from_secs(1);
        let first = transport.fetch_records(0, 10, timeout).expect("scripted");
        assert_eq!(first.status.errcode, 1);

        let drained = transport.fetch_records(0, 10, timeout).expect("drained");
        assert_eq!(drained.status.errcode, 0);
        assert!(drained.envelopes.is_empty());
    }

    #[test]
    fn unscripted_media_is_a_vendor_failure() {
        let transport = InMemoryTransport::new();
        let chunk = transport
            .fetch_media_chunk("missing", 0, Duration::from_secs(1))
            .expect("stub response");
        assert_ne!(chunk.status.errcode, 0);
    }
}
