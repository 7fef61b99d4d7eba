//! The receiver: the single reader of the server stream.
//!
//! One worker reads fixed 32-byte frames (replies may carry extension
//! bytes announced in their header), classifies each as error, reply, or
//! event, and dispatches. Events go to the event queue and are never
//! correlated to cookies. Errors and replies walk the pending queue from
//! its head: the server answers in submission order, so every cookie
//! popped before the matching sequence can no longer receive a response
//! of its own and is retired according to its mode.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};

use xlink_core::SequenceNumber;

use crate::cookie::{CookieChannels, PendingCookie};
use crate::error::ServerError;
use crate::event::EventQueue;
use crate::registry::Registry;
use crate::wire::{self, ResponseClass};

enum Response {
    Error(Vec<u8>),
    Reply(Vec<u8>),
    Event(Vec<u8>),
}

enum Outcome {
    Reply(Vec<u8>),
    ServerError(Box<dyn ServerError>),
}

/// Worker loop. Ends on shutdown or on a terminal read failure (which it
/// broadcasts as shutdown); either way the event queue is closed so
/// consumers observe the end of the stream.
pub(crate) async fn run<R>(
    mut reader: R,
    mut pending: mpsc::Receiver<PendingCookie>,
    events: Arc<EventQueue>,
    registry: Arc<Registry>,
    shutdown: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            response = read_response(&mut reader) => match response {
                Ok(response) => dispatch(response, &mut pending, &events, &registry),
                Err(error) => {
                    if !*shutdown.borrow() {
                        tracing::error!(%error, "x protocol read failed");
                    }
                    shutdown.send_replace(true);
                    break;
                }
            }
        }
    }
    events.close();
    tracing::debug!("receiver stopped");
}

async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Response> {
    let mut frame = vec![0u8; wire::RESPONSE_HEADER_SIZE];
    reader.read_exact(&mut frame).await?;
    match wire::classify(frame[0]) {
        ResponseClass::Error => Ok(Response::Error(frame)),
        ResponseClass::Event(_) => Ok(Response::Event(frame)),
        ResponseClass::Reply => {
            let extra = wire::reply_extra_bytes(&frame);
            if extra > 0 {
                frame.resize(wire::RESPONSE_HEADER_SIZE + extra, 0);
                reader
                    .read_exact(&mut frame[wire::RESPONSE_HEADER_SIZE..])
                    .await?;
            }
            Ok(Response::Reply(frame))
        }
    }
}

fn dispatch(
    response: Response,
    pending: &mut mpsc::Receiver<PendingCookie>,
    events: &EventQueue,
    registry: &Registry,
) {
    match response {
        Response::Event(frame) => events.push(Ok(registry.decode_event(&frame))),
        Response::Error(frame) => {
            let sequence = wire::sequence_number(&frame);
            let error = registry.decode_error(&frame);
            resolve(pending, events, sequence, Outcome::ServerError(error));
        }
        Response::Reply(frame) => {
            let sequence = wire::sequence_number(&frame);
            resolve(pending, events, sequence, Outcome::Reply(frame));
        }
    }
}

fn resolve(
    pending: &mut mpsc::Receiver<PendingCookie>,
    events: &EventQueue,
    sequence: SequenceNumber,
    outcome: Outcome,
) {
    loop {
        match pending.try_recv() {
            Ok(cookie) if cookie.sequence == sequence => {
                deliver(cookie.channels, outcome, events);
                return;
            }
            Ok(skipped) => retire(skipped),
            Err(_) => {
                tracing::error!(sequence, "BUG: response without a matching pending request");
                return;
            }
        }
    }
}

fn deliver(channels: CookieChannels, outcome: Outcome, events: &EventQueue) {
    match (channels, outcome) {
        (
            CookieChannels::CheckedReply { reply, .. }
            | CookieChannels::UncheckedReply { reply, .. },
            Outcome::Reply(frame),
        ) => {
            let _ = reply.send(frame);
        }
        (
            CookieChannels::CheckedVoid { .. } | CookieChannels::UncheckedVoid,
            Outcome::Reply(_),
        ) => {
            tracing::error!("BUG: reply arrived for a request that expects none");
        }
        (
            CookieChannels::CheckedReply { error, .. } | CookieChannels::CheckedVoid { error, .. },
            Outcome::ServerError(err),
        ) => {
            let _ = error.send(err);
        }
        (CookieChannels::UncheckedReply { ping, .. }, Outcome::ServerError(err)) => {
            events.push(Err(err));
            let _ = ping.send(());
        }
        (CookieChannels::UncheckedVoid, Outcome::ServerError(err)) => {
            events.push(Err(err));
        }
    }
}

fn retire(skipped: PendingCookie) {
    let PendingCookie { sequence, channels } = skipped;
    match channels {
        CookieChannels::CheckedReply { .. } | CookieChannels::UncheckedReply { .. } => {
            // Dropping the channels wakes the waiter with a closed error
            // instead of leaving it parked forever.
            tracing::error!(sequence, "BUG: reply expected, will never arrive");
        }
        CookieChannels::CheckedVoid { ping, .. } => {
            let _ = ping.send(());
        }
        CookieChannels::UncheckedVoid => {}
    }
}
