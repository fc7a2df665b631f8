use std::time::Duration;

use crate::config::{EngineConfig, DEFAULT_BATCH_LIMIT, DEFAULT_TIMEOUT_SECS};
use crate::cursor::CursorReader;
use crate::error::EngineError;
use crate::keystore::KeyStore;
use crate::transport::AuditTransport;

/// The audit retrieval engine: one transport, one key store, no other
/// state. All operations are synchronous and the engine itself is
/// read-only once built, so independent pollers and media fetches may
/// share one instance; serializing a given cursor is the caller's job.
#[derive(Debug)]
pub struct AuditEngine<T> {
    pub(crate) transport: T,
    pub(crate) keys: KeyStore,
    pub(crate) batch_limit: u64,
    pub(crate) timeout: Duration,
}

impl<T: AuditTransport> AuditEngine<T> {
    pub fn new(transport: T, keys: KeyStore) -> Self {
        Self {
            transport,
            keys,
            batch_limit: DEFAULT_BATCH_LIMIT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Loads key material per `config` and applies its limits.
    pub fn from_config(transport: T, config: &EngineConfig) -> Result<Self, EngineError> {
        let mut keys = KeyStore::load(&config.private_key_path)?;
        if let Some(version) = config.publickey_ver {
            keys = keys.with_version(version);
        }
        Ok(Self { transport, keys, batch_limit: config.batch_limit, timeout: config.timeout() })
    }

    pub fn with_batch_limit(mut self, batch_limit: u64) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keys
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// A lazy record stream resuming after `after_seq`.
    pub fn reader(&self, after_seq: u64) -> CursorReader<'_, T> {
        CursorReader::new(self, after_seq)
    }
}
