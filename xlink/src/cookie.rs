//! Cookies: the client-side handles that requests resolve through.
//!
//! Every request is submitted with two properties — does it elicit a reply,
//! and are its errors delivered here (`checked`) or to the event stream —
//! giving four delivery modes, each with its own pair of endpoints:
//!
//! | Mode           | checked | reply | endpoints     |
//! |----------------|---------|-------|---------------|
//! | CheckedReply   | yes     | yes   | reply + error |
//! | UncheckedReply | no      | yes   | reply + ping  |
//! | CheckedVoid    | yes     | no    | error + ping  |
//! | UncheckedVoid  | no      | no    | none          |
//!
//! The ping endpoint fills in for whichever of reply/error is missing: it
//! unblocks the waiter, meaning "the error went to the event stream" when
//! paired with a reply, or "the request succeeded" when paired with an
//! error. A cookie resolves exactly once; the receiver holds the sender
//! halves ([`CookieChannels`]) until it delivers or retires them.

use tokio::sync::oneshot;

use xlink_core::SequenceNumber;

use crate::error::{Error, Result, ServerError};

/// Sender halves of a cookie's endpoints, held in the pending queue until
/// the receiver resolves them. Dropping a variant unresolved wakes the
/// waiting side with [`Error::Closed`].
pub(crate) enum CookieChannels {
    CheckedReply {
        reply: oneshot::Sender<Vec<u8>>,
        error: oneshot::Sender<Box<dyn ServerError>>,
    },
    UncheckedReply {
        reply: oneshot::Sender<Vec<u8>>,
        ping: oneshot::Sender<()>,
    },
    CheckedVoid {
        error: oneshot::Sender<Box<dyn ServerError>>,
        ping: oneshot::Sender<()>,
    },
    UncheckedVoid,
}

/// One entry of the pending queue: the sequence assigned at submission
/// plus the endpoints to resolve through.
pub(crate) struct PendingCookie {
    pub(crate) sequence: SequenceNumber,
    pub(crate) channels: CookieChannels,
}

enum WaitChannels {
    CheckedReply {
        reply: oneshot::Receiver<Vec<u8>>,
        error: oneshot::Receiver<Box<dyn ServerError>>,
    },
    UncheckedReply {
        reply: oneshot::Receiver<Vec<u8>>,
        ping: oneshot::Receiver<()>,
    },
    CheckedVoid {
        error: oneshot::Receiver<Box<dyn ServerError>>,
        ping: oneshot::Receiver<()>,
    },
    UncheckedVoid,
}

/// A handle to one in-flight request.
///
/// Observe it once with [`reply`](Cookie::reply) or
/// [`check`](Cookie::check) as its mode permits, or drop it with
/// [`discard`](Cookie::discard).
pub struct Cookie {
    channels: WaitChannels,
}

impl Cookie {
    /// Build a cookie pair for the given mode: the application-facing
    /// waiter and the receiver-facing resolver.
    pub(crate) fn new(checked: bool, has_reply: bool) -> (Cookie, CookieChannels) {
        match (checked, has_reply) {
            (true, true) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let (error_tx, error_rx) = oneshot::channel();
                (
                    Cookie {
                        channels: WaitChannels::CheckedReply {
                            reply: reply_rx,
                            error: error_rx,
                        },
                    },
                    CookieChannels::CheckedReply {
                        reply: reply_tx,
                        error: error_tx,
                    },
                )
            }
            (false, true) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let (ping_tx, ping_rx) = oneshot::channel();
                (
                    Cookie {
                        channels: WaitChannels::UncheckedReply {
                            reply: reply_rx,
                            ping: ping_rx,
                        },
                    },
                    CookieChannels::UncheckedReply {
                        reply: reply_tx,
                        ping: ping_tx,
                    },
                )
            }
            (true, false) => {
                let (error_tx, error_rx) = oneshot::channel();
                let (ping_tx, ping_rx) = oneshot::channel();
                (
                    Cookie {
                        channels: WaitChannels::CheckedVoid {
                            error: error_rx,
                            ping: ping_rx,
                        },
                    },
                    CookieChannels::CheckedVoid {
                        error: error_tx,
                        ping: ping_tx,
                    },
                )
            }
            (false, false) => (
                Cookie {
                    channels: WaitChannels::UncheckedVoid,
                },
                CookieChannels::UncheckedVoid,
            ),
        }
    }

    /// Wait for the reply to a reply-bearing request.
    ///
    /// For a checked request this returns `Ok(Some(bytes))` — the exact
    /// frame plus extension bytes — or the server's error. For an
    /// unchecked request it returns `Ok(None)` when the request failed and
    /// its error went to the event stream instead.
    ///
    /// # Errors
    ///
    /// [`Error::X`] for a checked request the server rejected,
    /// [`Error::Closed`] if the connection died first,
    /// [`Error::CookieMisuse`] if the request elicits no reply.
    pub async fn reply(self) -> Result<Option<Vec<u8>>> {
        match self.channels {
            WaitChannels::CheckedReply {
                mut reply,
                mut error,
            } => {
                // Resolution sends on one endpoint and drops the other, so
                // whichever side closes first defers to its partner.
                tokio::select! {
                    r = &mut reply => match r {
                        Ok(bytes) => Ok(Some(bytes)),
                        Err(_) => match error.await {
                            Ok(err) => Err(Error::X(err)),
                            Err(_) => Err(Error::Closed),
                        },
                    },
                    e = &mut error => match e {
                        Ok(err) => Err(Error::X(err)),
                        Err(_) => match reply.await {
                            Ok(bytes) => Ok(Some(bytes)),
                            Err(_) => Err(Error::Closed),
                        },
                    },
                }
            }
            WaitChannels::UncheckedReply {
                mut reply,
                mut ping,
            } => {
                tokio::select! {
                    r = &mut reply => match r {
                        Ok(bytes) => Ok(Some(bytes)),
                        Err(_) => match ping.await {
                            Ok(()) => Ok(None),
                            Err(_) => Err(Error::Closed),
                        },
                    },
                    p = &mut ping => match p {
                        Ok(()) => Ok(None),
                        Err(_) => match reply.await {
                            Ok(bytes) => Ok(Some(bytes)),
                            Err(_) => Err(Error::Closed),
                        },
                    },
                }
            }
            WaitChannels::CheckedVoid { .. } | WaitChannels::UncheckedVoid => Err(
                Error::CookieMisuse("this cookie is not expecting a reply; use check()"),
            ),
        }
    }

    /// Wait for the outcome of a checked void request: the server's error
    /// if it failed, `Ok(())` once a later response confirms it succeeded.
    ///
    /// # Errors
    ///
    /// [`Error::X`] if the server rejected the request,
    /// [`Error::Closed`] if the connection died first,
    /// [`Error::CookieMisuse`] for reply-bearing or unchecked-void cookies.
    pub async fn check(self) -> Result<()> {
        match self.channels {
            WaitChannels::CheckedVoid {
                mut error,
                mut ping,
            } => {
                tokio::select! {
                    e = &mut error => match e {
                        Ok(err) => Err(Error::X(err)),
                        Err(_) => match ping.await {
                            Ok(()) => Ok(()),
                            Err(_) => Err(Error::Closed),
                        },
                    },
                    p = &mut ping => match p {
                        Ok(()) => Ok(()),
                        Err(_) => match error.await {
                            Ok(err) => Err(Error::X(err)),
                            Err(_) => Err(Error::Closed),
                        },
                    },
                }
            }
            WaitChannels::CheckedReply { .. } | WaitChannels::UncheckedReply { .. } => Err(
                Error::CookieMisuse("this cookie is expecting a reply; use reply()"),
            ),
            WaitChannels::UncheckedVoid => Err(Error::CookieMisuse(
                "this cookie can observe neither a reply nor an error",
            )),
        }
    }

    /// Drop the cookie without observing its outcome.
    pub fn discard(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UnknownError;

    fn boxed_error(code: u8, sequence: u16) -> Box<dyn ServerError> {
        let mut frame = vec![0u8; 32];
        frame[1] = code;
        crate::wire::put_u16(&mut frame[2..], sequence);
        Box::new(UnknownError::from_frame(&frame))
    }

    #[tokio::test]
    async fn test_checked_reply_delivers_bytes() {
        let (cookie, channels) = Cookie::new(true, true);
        let CookieChannels::CheckedReply { reply, .. } = channels else {
            panic!("mode mismatch");
        };
        reply.send(vec![1, 2, 3]).expect("waiter alive");
        assert_eq!(cookie.reply().await.expect("reply"), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_checked_reply_delivers_error() {
        let (cookie, channels) = Cookie::new(true, true);
        let CookieChannels::CheckedReply { error, .. } = channels else {
            panic!("mode mismatch");
        };
        error.send(boxed_error(8, 6)).expect("waiter alive");
        match cookie.reply().await {
            Err(Error::X(err)) => {
                assert_eq!(err.error_code(), 8);
                assert_eq!(err.sequence(), 6);
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unchecked_reply_ping_means_no_reply() {
        let (cookie, channels) = Cookie::new(false, true);
        let CookieChannels::UncheckedReply { ping, .. } = channels else {
            panic!("mode mismatch");
        };
        ping.send(()).expect("waiter alive");
        assert_eq!(cookie.reply().await.expect("resolved"), None);
    }

    #[tokio::test]
    async fn test_checked_void_ping_means_success() {
        let (cookie, channels) = Cookie::new(true, false);
        let CookieChannels::CheckedVoid { ping, .. } = channels else {
            panic!("mode mismatch");
        };
        ping.send(()).expect("waiter alive");
        cookie.check().await.expect("confirmed");
    }

    #[tokio::test]
    async fn test_dropped_channels_mean_closed() {
        let (cookie, channels) = Cookie::new(true, true);
        drop(channels);
        assert!(matches!(cookie.reply().await, Err(Error::Closed)));

        let (cookie, channels) = Cookie::new(true, false);
        drop(channels);
        assert!(matches!(cookie.check().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_mode_misuse_is_rejected() {
        let (cookie, _channels) = Cookie::new(true, true);
        assert!(matches!(cookie.check().await, Err(Error::CookieMisuse(_))));

        let (cookie, _channels) = Cookie::new(true, false);
        assert!(matches!(cookie.reply().await, Err(Error::CookieMisuse(_))));

        let (cookie, _channels) = Cookie::new(false, false);
        assert!(matches!(cookie.check().await, Err(Error::CookieMisuse(_))));
    }
}
