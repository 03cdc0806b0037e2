//! Runtime download state machine
//!
//! A [`DownloadProcess`] wraps the durable record of an active download with
//! live counters. Transitions are monotonic: `pending → downloading →
//! {completed, failed}`, with `cancelled` reachable from any non-terminal
//! state. Terminal states are frozen — every transition method reports
//! whether it actually applied, and callers must not emit events for
//! transitions that did not.

use crate::types::{DownloadRecord, DownloadSnapshot, Status};

/// Runtime state for one active download
#[derive(Debug)]
pub struct DownloadProcess {
    record: DownloadRecord,
    downloaded_bytes: u64,
    total_bytes: i64,
    progress: f64,
    speed_bps: u64,
    eta_secs: i64,
}

impl DownloadProcess {
    /// Build the runtime process from a freshly persisted record
    ///
    /// `total_bytes` is the provider's size estimate (-1 = unknown); the
    /// remaining counters start zeroed.
    pub fn new(record: DownloadRecord, total_bytes: i64) -> Self {
        Self {
            record,
            downloaded_bytes: 0,
            total_bytes,
            progress: if total_bytes <= 0 { -1.0 } else { 0.0 },
            speed_bps: 0,
            eta_secs: -1,
        }
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.record.status
    }

    /// Mark the transfer as confirmed running (`pending → downloading`)
    ///
    /// Returns false when the process is not pending (already running, or a
    /// cancel won the race).
    pub fn begin(&mut self) -> bool {
        if self.record.status != Status::Pending {
            return false;
        }
        self.record.status = Status::Downloading;
        true
    }

    /// Update the live counters from a provider progress sample
    ///
    /// Recomputes the progress percentage: -1 while the total is unknown,
    /// otherwise clamped into [0, 100]. Returns false (sample dropped) once
    /// the process is terminal.
    pub fn update_progress(
        &mut self,
        downloaded_bytes: u64,
        total_bytes: i64,
        speed_bps: u64,
        eta_secs: i64,
    ) -> bool {
        if self.record.status.is_terminal() {
            return false;
        }
        self.downloaded_bytes = downloaded_bytes;
        self.total_bytes = total_bytes;
        self.speed_bps = speed_bps;
        self.eta_secs = eta_secs;
        self.progress = if total_bytes <= 0 {
            -1.0
        } else {
            ((downloaded_bytes as f64 / total_bytes as f64) * 100.0).clamp(0.0, 100.0)
        };
        true
    }

    /// Terminal transition to `completed`
    pub fn complete(&mut self) -> bool {
        if self.record.status.is_terminal() {
            return false;
        }
        self.record.status = Status::Completed;
        self.progress = 100.0;
        self.speed_bps = 0;
        self.eta_secs = 0;
        true
    }

    /// Terminal transition to `failed`, capturing the error message
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.record.status.is_terminal() {
            return false;
        }
        self.record.status = Status::Failed;
        self.record.error_message = Some(error.into());
        self.speed_bps = 0;
        true
    }

    /// Terminal transition to `cancelled`
    ///
    /// Applies from any non-terminal phase. Cancellation is not an error, so
    /// no message is recorded.
    pub fn cancel(&mut self) -> bool {
        if self.record.status.is_terminal() {
            return false;
        }
        self.record.status = Status::Cancelled;
        self.speed_bps = 0;
        true
    }

    /// Snapshot the current state for status queries and event payloads
    pub fn snapshot(&self) -> DownloadSnapshot {
        DownloadSnapshot {
            id: self.record.id,
            method: self.record.method,
            url: self.record.url.clone(),
            destination: self.record.destination.clone(),
            status: self.record.status,
            created_at: self.record.created_at,
            error_message: self.record.error_message.clone(),
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            progress: self.progress,
            speed_bps: self.speed_bps,
            eta_secs: self.eta_secs,
        }
    }
}
