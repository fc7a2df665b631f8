use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-assigned transport codes for failures that never reach the vendor
/// service. Vendor codes are always positive.
pub mod code {
    pub const TIMEOUT: i64 = -1;
    pub const PROTOCOL: i64 = -2;
}

/// What a failure was about: a record position in the audit log, a media
/// blob, or the key material itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Sequence(u64),
    Media(String),
    Key,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Sequence(seq) => write!(f, "seq {seq}"),
            Subject::Media(id) => write!(f, "sdkfileid {id}"),
            Subject::Key => write!(f, "key material"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("config: {0}")]
    Config(String),
    #[error("transport error {code}: {message}")]
    Transport { code: i64, message: String },
    #[error("crypto failure on {subject}: {detail}")]
    Crypto { subject: Subject, detail: String },
    #[error("integrity mismatch on {subject}: expected {expected}, got {actual}")]
    Integrity { subject: Subject, expected: String, actual: String },
    #[error("malformed record on {subject}: {detail}")]
    Malformed { subject: Subject, detail: String },
    #[error("io: {0}")]
    Io(String),
}

impl EngineError {
    pub fn timeout(context: impl Into<String>) -> Self {
        EngineError::Transport { code: code::TIMEOUT, message: context.into() }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Transport { code: code::TIMEOUT, .. })
    }

    /// Transport failures may be retried against the same cursor or file
    /// reference. Everything else needs operator attention first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport { .. })
    }

    /// Rebinds the subject on per-record error classes. Used by the decoder
    /// to attach the envelope sequence to failures raised below it.
    pub fn with_subject(self, subject: Subject) -> Self {
        match self {
            EngineError::Crypto { detail, .. } => EngineError::Crypto { subject, detail },
            EngineError::Integrity { expected, actual, .. } => {
                EngineError::Integrity { subject, expected, actual }
            }
            EngineError::Malformed { detail, .. } => EngineError::Malformed { subject, detail },
            other => other,
        }
    }
}

/// The vendor's success/failure envelope. Present on every response; a
/// non-zero `errcode` must never pass through as data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl ErrorEnvelope {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failure(errcode: i64, errmsg: impl Into<String>) -> Self {
        Self { errcode, errmsg: errmsg.into() }
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        if self.errcode == 0 {
            Ok(())
        } else {
            Err(EngineError::Transport { code: self.errcode, message: self.errmsg })
        }
    }
}
