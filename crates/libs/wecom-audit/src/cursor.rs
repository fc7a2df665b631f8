use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::engine::AuditEngine;
use crate::envelope::EnvelopeDecoder;
use crate::error::{EngineError, Subject};
use crate::record::AuditRecord;
use crate::transport::AuditTransport;

/// The result of one poll. `cursor` is the highest sequence safe to resume
/// from: with no failures it is the batch's last sequence, otherwise it
/// stops just short of the first failing record so a re-poll re-attempts it.
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<AuditRecord>,
    pub failures: Vec<RecordFailure>,
    pub cursor: u64,
}

/// A record that arrived but could not be decoded. Reported, never skipped.
#[derive(Debug)]
pub struct RecordFailure {
    pub sequence: u64,
    pub error: EngineError,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failures.is_empty()
    }

    /// The failure currently blocking cursor advancement, if any.
    pub fn blocking_failure(&self) -> Option<&RecordFailure> {
        self.failures.first()
    }

    /// Renders the persisted report shape:
    /// `{errcode: 0, errmsg: "ok", messages: [...]}`.
    pub fn to_value(&self) -> Value {
        json!({ "errcode": 0, "errmsg": "ok", "messages": self.records })
    }
}

impl<T: AuditTransport> AuditEngine<T> {
    /// One fetch-and-decode pass over the log after `after_seq`.
    ///
    /// A non-zero vendor errcode surfaces as `Transport` and implies the
    /// cursor did not move, so the caller may re-poll the same position.
    /// Per-record decode failures land in `Batch::failures`; the batch's
    /// cursor never advances past the first of them.
    pub fn poll(&self, after_seq: u64) -> Result<Batch, EngineError> {
        let response = self.transport.fetch_records(after_seq, self.batch_limit, self.timeout)?;
        response.status.into_result()?;

        let decoder = EnvelopeDecoder::new(&self.keys);
        let mut records = Vec::with_capacity(response.envelopes.len());
        let mut failures: Vec<RecordFailure> = Vec::new();
        let mut last_seq = after_seq;
        let mut cursor = after_seq;

        for envelope in &response.envelopes {
            if envelope.seq <= last_seq {
                return Err(EngineError::Malformed {
                    subject: Subject::Sequence(envelope.seq),
                    detail: format!(
                        "sequence {} is not strictly above {last_seq}",
                        envelope.seq
                    ),
                });
            }
            last_seq = envelope.seq;

            match decoder.decode(envelope) {
                Ok(record) => {
                    if failures.is_empty() {
                        cursor = record.sequence;
                    }
                    records.push(record);
                }
                Err(error) => {
                    log::warn!("poll: record seq {} undecodable: {error}", envelope.seq);
                    failures.push(RecordFailure { sequence: envelope.seq, error });
                }
            }
        }

        log::debug!(
            "poll: after_seq={after_seq} decoded={} failed={} cursor={cursor}",
            records.len(),
            failures.len()
        );
        Ok(Batch { records, failures, cursor })
    }
}

/// Lazy iteration over the audit log. Owns one cursor and drives `poll`
/// under the hood; yields records in sequence order, surfaces the first
/// blocking failure once, then ends. `cursor()` is the resume point the
/// caller persists between runs.
pub struct CursorReader<'a, T: AuditTransport> {
    engine: &'a AuditEngine<T>,
    cursor: u64,
    buffered: VecDeque<AuditRecord>,
    pending_error: Option<EngineError>,
    stalled: bool,
}

impl<'a, T: AuditTransport> CursorReader<'a, T> {
    pub(crate) fn new(engine: &'a AuditEngine<T>, after_seq: u64) -> Self {
        Self {
            engine,
            cursor: after_seq,
            buffered: VecDeque::new(),
            pending_error: None,
            stalled: false,
        }
    }

    /// Last sequence fully consumed. Never regresses.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// True once the reader has surfaced an error. A stalled reader stays
    /// at its cursor; resume by building a fresh reader from `cursor()`.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }
}

impl<'a, T: AuditTransport> Iterator for CursorReader<'a, T> {
    type Item = Result<AuditRecord, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stalled {
                return None;
            }
            if let Some(record) = self.buffered.pop_front() {
                return Some(Ok(record));
            }
            if let Some(error) = self.pending_error.take() {
                self.stalled = true;
                return Some(Err(error));
            }

            match self.engine.poll(self.cursor) {
                Err(error) => {
                    self.stalled = true;
                    return Some(Err(error));
                }
                Ok(batch) => {
                    if batch.is_empty() {
                        // Caught up with the log.
                        return None;
                    }
                    let consumable = batch.cursor;
                    self.cursor = consumable;
                    self.pending_error =
                        batch.failures.into_iter().next().map(|failure| failure.error);
                    // Records beyond the first failure stay unconsumed; a
                    // later reader re-fetches them after the failure clears.
                    self.buffered.extend(
                        batch.records.into_iter().filter(|record| record.sequence <= consumable),
                    );
                }
            }
        }
    }
}
