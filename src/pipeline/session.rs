//! Encode session lifecycle tracking.
//!
//! One session per export. The phase sequence is linear; any phase may
//! transition to `Failed`, and a failed or finalized session accepts no
//! further work.

use serde::Serialize;

use crate::error::{ExportError, ExportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Configuring,
    Encoding,
    Flushing,
    Finalized,
    Failed,
}

#[derive(Debug)]
pub struct EncodeSession {
    phase: SessionPhase,
    frames_submitted: u64,
    bytes_flushed: u64,
}

impl Default for EncodeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            frames_submitted: 0,
            bytes_flushed: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn bytes_flushed(&self) -> u64 {
        self.bytes_flushed
    }

    pub fn begin_configuring(&mut self) -> ExportResult<()> {
        self.advance(SessionPhase::Idle, SessionPhase::Configuring)
    }

    pub fn begin_encoding(&mut self) -> ExportResult<()> {
        self.advance(SessionPhase::Configuring, SessionPhase::Encoding)
    }

    /// Count a frame handed to the encoder. Only legal while encoding.
    pub fn record_frame(&mut self) -> ExportResult<()> {
        if self.phase != SessionPhase::Encoding {
            return Err(self.misuse("submit a frame"));
        }
        self.frames_submitted += 1;
        Ok(())
    }

    /// Count encoded bytes reaching the container.
    pub fn record_bytes(&mut self, bytes: u64) -> ExportResult<()> {
        if !matches!(self.phase, SessionPhase::Encoding | SessionPhase::Flushing) {
            return Err(self.misuse("flush bytes"));
        }
        self.bytes_flushed += bytes;
        Ok(())
    }

    pub fn begin_flushing(&mut self) -> ExportResult<()> {
        self.advance(SessionPhase::Encoding, SessionPhase::Flushing)
    }

    pub fn finalize(&mut self) -> ExportResult<()> {
        self.advance(SessionPhase::Flushing, SessionPhase::Finalized)
    }

    /// Mark the session failed. Idempotent; terminal.
    pub fn fail(&mut self) {
        self.phase = SessionPhase::Failed;
    }

    fn advance(&mut self, expected: SessionPhase, next: SessionPhase) -> ExportResult<()> {
        if self.phase != expected {
            return Err(ExportError::Runtime {
                message: format!(
                    "Session in phase {:?} cannot transition to {next:?}",
                    self.phase
                ),
            });
        }
        self.phase = next;
        Ok(())
    }

    fn misuse(&self, action: &str) -> ExportError {
        ExportError::Runtime {
            message: format!("Cannot {action} in phase {:?}", self.phase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_phases() {
        let mut session = EncodeSession::new();
        assert_eq!(session.phase(), SessionPhase::Idle);
        session.begin_configuring().unwrap();
        session.begin_encoding().unwrap();
        session.record_frame().unwrap();
        session.record_frame().unwrap();
        session.record_bytes(1024).unwrap();
        session.begin_flushing().unwrap();
        session.record_bytes(256).unwrap();
        session.finalize().unwrap();
        assert_eq!(session.phase(), SessionPhase::Finalized);
        assert_eq!(session.frames_submitted(), 2);
        assert_eq!(session.bytes_flushed(), 1280);
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let mut session = EncodeSession::new();
        assert!(session.begin_encoding().is_err());
        assert!(session.record_frame().is_err());
        assert!(session.finalize().is_err());
    }

    #[test]
    fn failed_is_terminal() {
        let mut session = EncodeSession::new();
        session.begin_configuring().unwrap();
        session.fail();
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert!(session.begin_encoding().is_err());
        assert!(session.record_frame().is_err());
    }
}
