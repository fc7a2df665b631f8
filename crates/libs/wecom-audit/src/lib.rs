//! Retrieval engine for an enterprise messaging platform's compliance
//! audit log: sequence-cursor polling, per-record envelope decryption
//! (RSA session-key unwrap + AES-256-CBC), and chunked media reassembly
//! with content-addressed verification. The vendor transport is abstracted
//! behind [`AuditTransport`] so everything here runs against a
//! deterministic in-memory stub in tests.

pub mod config;
pub mod cursor;
pub mod engine;
pub mod envelope;
mod error;
pub mod keystore;
pub mod media;
pub mod record;
pub mod transport;

pub use config::EngineConfig;
pub use cursor::{Batch, CursorReader, RecordFailure};
pub use engine::AuditEngine;
pub use envelope::{EnvelopeDecoder, RawEnvelope};
pub use error::{code, EngineError, ErrorEnvelope, Subject};
pub use keystore::{KeyStore, SessionKey};
pub use media::MediaPayload;
pub use record::{
    AuditRecord, FileContent, MediaReference, MessageContent, MixedContent, MixedDetail,
    MixedItem, RevokeContent, TextContent,
};
pub use transport::{
    AuditTransport, InMemoryTransport, MediaChunkResponse, RecordBatchResponse,
};
