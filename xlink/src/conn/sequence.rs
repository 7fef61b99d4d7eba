//! The sequence source: a lazy stream of 16-bit request numbers.
//!
//! The server numbers requests implicitly in arrival order; the client
//! mirrors that counter to correlate responses. Numbers start at 1 (the
//! setup exchange consumes slot 0) and wrap from `0xFFFF` to 0, not to 1.

use tokio::sync::mpsc;

use xlink_core::SequenceNumber;

/// The sequence number following `seq`.
pub(crate) fn successor(seq: SequenceNumber) -> SequenceNumber {
    if seq == SequenceNumber::MAX { 0 } else { seq + 1 }
}

/// Spawn the producer worker. The channel closes when the submitter stops
/// consuming, which ends the worker.
pub(crate) fn spawn(bound: usize) -> mpsc::Receiver<SequenceNumber> {
    let (tx, rx) = mpsc::channel(bound.max(1));
    tokio::spawn(async move {
        let mut next: SequenceNumber = 1;
        while tx.send(next).await.is_ok() {
            next = successor(next);
        }
        tracing::debug!("sequence source stopped");
    });
    rx
}
