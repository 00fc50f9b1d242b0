//! One request/response exchange with the device.
//!
//! A [`Transaction`] starts `Pending` when its request is written and moves
//! to exactly one terminal state.  Packets that arrive while it is pending
//! but are neither a success nor an error opcode are kept, in order, as
//! intermediates: history events are the main example.

use std::time::Duration;

use boks_core::Packet;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::application::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Success,
    Error,
    Timeout,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Pending
    }
}

/// Record of a single exchange.
#[derive(Debug, Clone)]
pub struct Transaction {
    request: Packet,
    response: Option<Packet>,
    intermediates: Vec<Packet>,
    status: TransactionStatus,
    error: Option<ClientError>,
    started_at: Instant,
    finished_at: Option<Instant>,
}

impl Transaction {
    pub fn new(request: Packet) -> Self {
        Self {
            request,
            response: None,
            intermediates: Vec::new(),
            status: TransactionStatus::Pending,
            error: None,
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────────
    //
    // Only the first terminal transition is applied; later ones return false.

    /// Records the terminal success packet.
    pub fn complete(&mut self, response: Packet) -> bool {
        if !self.finish(TransactionStatus::Success) {
            return false;
        }
        self.response = Some(response);
        true
    }

    /// Marks the exchange as rejected or failed.
    pub fn fail(&mut self, error: ClientError) -> bool {
        if !self.finish(TransactionStatus::Error) {
            return false;
        }
        self.error = Some(error);
        true
    }

    /// Records a [`ClientError::Timeout`] for the request opcode.
    pub fn time_out(&mut self) -> bool {
        if !self.finish(TransactionStatus::Timeout) {
            return false;
        }
        self.error = Some(ClientError::Timeout {
            opcode: self.request.opcode(),
        });
        true
    }

    /// Appends a packet received while pending.  Ignored once terminal.
    pub fn add_intermediate(&mut self, packet: Packet) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.intermediates.push(packet);
        true
    }

    fn finish(&mut self, status: TransactionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(Instant::now());
        true
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Packet {
        &self.request
    }

    pub fn response(&self) -> Option<&Packet> {
        self.response.as_ref()
    }

    pub fn intermediates(&self) -> &[Packet] {
        &self.intermediates
    }

    /// Consumes the transaction, returning its intermediates.
    pub fn into_intermediates(self) -> Vec<Packet> {
        self.intermediates
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Elapsed time until the terminal transition, or until now if pending.
    pub fn duration(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.started_at)
    }

    /// Request, intermediates and response in wire order.
    pub fn all_packets(&self) -> Vec<&Packet> {
        std::iter::once(&self.request)
            .chain(self.intermediates.iter())
            .chain(self.response.iter())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boks_core::protocol::commands::AskDoorStatus;
    use boks_core::protocol::notifications::{AnswerDoorStatus, OperationError};
    use boks_core::Opcode;

    fn rejected() -> ClientError {
        ClientError::Rejected {
            opcode: Opcode::ErrorUnauthorized,
        }
    }

    fn pending() -> Transaction {
        Transaction::new(AskDoorStatus.into())
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let tx = pending();
        assert_eq!(tx.status(), TransactionStatus::Pending);
        assert!(tx.response().is_none());
        assert!(tx.finished_at().is_none());
        assert_eq!(tx.all_packets().len(), 1);
    }

    #[test]
    fn test_first_terminal_transition_wins() {
        // Arrange
        let mut tx = pending();
        let answer: Packet = AnswerDoorStatus { inverted: 0, raw: 1 }.into();

        // Act
        let completed = tx.complete(answer.clone());
        let failed = tx.fail(rejected());
        let timed_out = tx.time_out();

        // Assert
        assert!(completed);
        assert!(!failed);
        assert!(!timed_out);
        assert_eq!(tx.status(), TransactionStatus::Success);
        assert_eq!(tx.response(), Some(&answer));
        assert!(tx.error().is_none());
    }

    #[test]
    fn test_intermediates_are_kept_in_order_and_frozen_after_finish() {
        let mut tx = pending();
        let first: Packet = OperationError { error_code: 1 }.into();
        let second: Packet = OperationError { error_code: 2 }.into();

        assert!(tx.add_intermediate(first.clone()));
        assert!(tx.add_intermediate(second.clone()));
        assert!(tx.time_out());
        assert!(!tx.add_intermediate(first.clone()));

        assert_eq!(tx.intermediates(), &[first, second]);
        assert_eq!(tx.status(), TransactionStatus::Timeout);
        assert_eq!(
            tx.error(),
            Some(&ClientError::Timeout {
                opcode: AskDoorStatus::OPCODE
            })
        );
    }

    #[test]
    fn test_all_packets_follow_wire_order() {
        let mut tx = pending();
        let progress: Packet = OperationError { error_code: 9 }.into();
        let answer: Packet = AnswerDoorStatus { inverted: 1, raw: 0 }.into();
        tx.add_intermediate(progress.clone());
        tx.complete(answer.clone());

        let opcodes: Vec<_> = tx.all_packets().iter().map(|p| p.opcode()).collect();
        assert_eq!(
            opcodes,
            [AskDoorStatus::OPCODE, progress.opcode(), answer.opcode()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_stops_at_terminal_transition() {
        let mut tx = pending();
        tokio::time::advance(Duration::from_millis(250)).await;
        tx.fail(rejected());
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(tx.duration(), Duration::from_millis(250));
        assert_eq!(tx.status(), TransactionStatus::Error);
        assert_eq!(tx.error().map(ClientError::id), Some("REJECTED"));
    }
}
