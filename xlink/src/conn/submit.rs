//! The submitter: the single writer of the server stream.
//!
//! One worker consumes submissions in order, assigns each its sequence
//! number, appends its cookie to the pending queue, and writes its bytes.
//! Because the queue insertion happens before the write, a response can
//! never outrun its cookie.
//!
//! When the pending queue is one slot short of full, the submitter first
//! injects a self-owned GetInputFocus round trip and waits for its reply:
//! the server answers in submission order, so that reply retires every
//! cookie ahead of it and the queue drains. This keeps the matching window
//! a small fraction of the 16-bit sequence space.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use xlink_core::SequenceNumber;

use crate::cookie::{Cookie, CookieChannels, PendingCookie};
use crate::error::Error;
use crate::wire;

/// One application request on its way to the wire.
pub(crate) struct Submission {
    pub(crate) buffer: Vec<u8>,
    pub(crate) channels: CookieChannels,
}

enum Halt {
    Io(io::Error),
    Shutdown,
}

/// Worker loop. Ends on shutdown, on channel closure, or on a terminal
/// write failure (which it broadcasts as shutdown). The shutdown receiver
/// is subscribed by the caller before the worker is spawned, so a close
/// racing the spawn is never missed.
pub(crate) async fn run<W>(
    mut writer: W,
    mut requests: mpsc::Receiver<Submission>,
    mut sequences: mpsc::Receiver<SequenceNumber>,
    pending: mpsc::Sender<PendingCookie>,
    shutdown: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            submission = requests.recv() => {
                let Some(submission) = submission else { break };
                match forward(&mut writer, submission, &mut sequences, &pending).await {
                    Ok(()) => {}
                    Err(Halt::Io(error)) => {
                        tracing::error!(%error, "x protocol write failed");
                        shutdown.send_replace(true);
                        break;
                    }
                    Err(Halt::Shutdown) => break,
                }
            }
        }
    }
    tracing::debug!("submitter stopped");
}

async fn forward<W: AsyncWrite + Unpin>(
    writer: &mut W,
    submission: Submission,
    sequences: &mut mpsc::Receiver<SequenceNumber>,
    pending: &mpsc::Sender<PendingCookie>,
) -> Result<(), Halt> {
    if pending_len(pending) >= pending.max_capacity() - 1 {
        force_round_trip(writer, sequences, pending).await?;
    }
    let sequence = next_sequence(sequences).await?;
    enqueue(
        pending,
        PendingCookie {
            sequence,
            channels: submission.channels,
        },
    )
    .await?;
    writer.write_all(&submission.buffer).await.map_err(Halt::Io)
}

/// Inject a self-owned checked round trip and wait for it to pump the
/// pending queue empty. The synthetic cookie travels through the queue
/// exactly like an application cookie.
async fn force_round_trip<W: AsyncWrite + Unpin>(
    writer: &mut W,
    sequences: &mut mpsc::Receiver<SequenceNumber>,
    pending: &mpsc::Sender<PendingCookie>,
) -> Result<(), Halt> {
    tracing::debug!(
        outstanding = pending_len(pending),
        "pending queue saturated; forcing a round trip"
    );
    let (cookie, channels) = Cookie::new(true, true);
    let sequence = next_sequence(sequences).await?;
    enqueue(pending, PendingCookie { sequence, channels }).await?;
    writer
        .write_all(&wire::drain_request())
        .await
        .map_err(Halt::Io)?;
    match cookie.reply().await {
        Ok(_) => Ok(()),
        Err(Error::Closed) => Err(Halt::Shutdown),
        // Any response at all has already pumped the queue.
        Err(_) => Ok(()),
    }
}

fn pending_len(pending: &mpsc::Sender<PendingCookie>) -> usize {
    pending.max_capacity() - pending.capacity()
}

async fn next_sequence(
    sequences: &mut mpsc::Receiver<SequenceNumber>,
) -> Result<SequenceNumber, Halt> {
    sequences.recv().await.ok_or(Halt::Shutdown)
}

async fn enqueue(
    pending: &mpsc::Sender<PendingCookie>,
    cookie: PendingCookie,
) -> Result<(), Halt> {
    pending.send(cookie).await.map_err(|_| Halt::Shutdown)
}
