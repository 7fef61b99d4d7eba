//! The connection: four background workers around one byte stream.
//!
//! [`Conn`] owns the channel ends the application talks through; the
//! submitter, receiver, sequence source, and id source run as detached
//! tasks. Shutdown — explicit [`close`](Conn::close), dropping the
//! connection, or a terminal I/O failure in either stream worker — is
//! broadcast over a watch channel; every outstanding cookie then unwinds
//! with [`Error::Closed`] and the event stream ends.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, watch};

use xlink_core::{DisplayAddress, NetworkProvider, TokioNetworkProvider, Xid};

use crate::auth;
use crate::cookie::Cookie;
use crate::error::{ConnectError, Error, Result};
use crate::event::{EventOrError, EventQueue};
use crate::registry::Registry;
use crate::setup::{self, Screen, Setup};

mod config;
mod receive;
mod sequence;
mod submit;
mod xid;

pub use config::ConnConfig;

use submit::Submission;
use xid::XidAllocator;

/// A connection to an X server.
///
/// Cheap operations take `&self`; share the connection across tasks with
/// an `Arc`. Dropping it (or calling [`close`](Conn::close)) stops the
/// background workers at their next suspension point.
pub struct Conn {
    requests: mpsc::Sender<Submission>,
    xids: Mutex<mpsc::Receiver<Result<Xid>>>,
    events: Arc<EventQueue>,
    registry: Arc<Registry>,
    setup: Setup,
    default_screen: usize,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Conn {
    /// Connect to the display named by `display` (or `$DISPLAY` when
    /// `None`), with default configuration and an empty registry.
    pub async fn connect(display: Option<&str>) -> std::result::Result<Conn, ConnectError> {
        Self::connect_with(
            &TokioNetworkProvider::new(),
            display,
            Registry::new(),
            ConnConfig::default(),
        )
        .await
    }

    /// Connect through an explicit provider, registry, and configuration.
    ///
    /// Reads the authority file for the display (degrading to an
    /// unauthenticated attempt if that fails), performs the setup
    /// exchange, and starts the workers.
    pub async fn connect_with<P: NetworkProvider>(
        provider: &P,
        display: Option<&str>,
        registry: Registry,
        config: ConnConfig,
    ) -> std::result::Result<Conn, ConnectError> {
        let display = DisplayAddress::parse(display)?;
        let mut stream = provider.connect(&display).await?;

        let (auth_name, auth_data) =
            match auth::read_authority(display.host(), &display.display().to_string()) {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(%error, "could not get authority info; trying without it");
                    (String::new(), Vec::new())
                }
            };
        if !auth_name.is_empty() && (auth_name != auth::MIT_MAGIC_COOKIE_1 || auth_data.len() != 16)
        {
            return Err(ConnectError::UnsupportedAuthProtocol(auth_name));
        }

        let setup = setup::handshake(&mut stream, &auth_name, &auth_data).await?;
        let mut screen = display.screen();
        if screen >= setup.roots.len() {
            screen = 0;
        }

        let mut conn = Self::attach(stream, setup, registry, config);
        conn.default_screen = screen;
        Ok(conn)
    }

    /// Start the workers on a stream whose setup exchange has already
    /// happened. This is the seam tests (and unusual transports) use.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach<S>(stream: S, setup: Setup, registry: Registry, config: ConnConfig) -> Conn
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        // Both workers get their shutdown receivers before they are
        // spawned; a close racing the spawn cannot be missed.
        let (shutdown, submit_shutdown) = watch::channel(false);
        let receive_shutdown = shutdown.subscribe();
        let shutdown = Arc::new(shutdown);
        let registry = Arc::new(registry);
        let events = Arc::new(EventQueue::new(config.event_buffer_bound));

        let (requests, requests_rx) = mpsc::channel(config.request_channel_bound.max(1));
        let (pending_tx, pending_rx) = mpsc::channel(config.cookie_buffer.max(2));
        let sequences = sequence::spawn(config.sequence_channel_bound);
        let xids = xid::spawn(
            XidAllocator::new(setup.resource_id_base, setup.resource_id_mask),
            config.sequence_channel_bound,
        );

        tokio::spawn(submit::run(
            writer,
            requests_rx,
            sequences,
            pending_tx,
            shutdown.clone(),
            submit_shutdown,
        ));
        tokio::spawn(receive::run(
            reader,
            pending_rx,
            events.clone(),
            registry.clone(),
            shutdown.clone(),
            receive_shutdown,
        ));

        Conn {
            requests,
            xids: Mutex::new(xids),
            events,
            registry,
            setup,
            default_screen: 0,
            shutdown,
        }
    }

    /// Submit a marshalled request buffer.
    ///
    /// `has_reply` says whether the request elicits a reply; `checked`
    /// says whether its errors are delivered to the returned cookie
    /// rather than to the event stream. Blocks only when the ingress
    /// channel is full.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] once the connection has shut down.
    pub async fn send_request(
        &self,
        buffer: Vec<u8>,
        checked: bool,
        has_reply: bool,
    ) -> Result<Cookie> {
        let (cookie, channels) = Cookie::new(checked, has_reply);
        self.requests
            .send(Submission { buffer, channels })
            .await
            .map_err(|_| Error::Closed)?;
        Ok(cookie)
    }

    /// Yield a fresh resource identifier.
    ///
    /// # Errors
    ///
    /// [`Error::IdExhausted`] once the advertised id space is used up,
    /// [`Error::Closed`] once the connection has shut down.
    pub async fn generate_id(&self) -> Result<Xid> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.xids
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Err(Error::Closed))
    }

    /// Wait for the next event or asynchronous error. `None` once the
    /// connection has shut down and the queue is drained.
    pub async fn wait_for_event(&self) -> Option<EventOrError> {
        self.events.pop().await
    }

    /// Take the next queued event or asynchronous error without waiting.
    pub fn poll_for_event(&self) -> Option<EventOrError> {
        self.events.try_pop()
    }

    /// The setup block the server sent.
    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    /// The screen selected by the display specifier.
    pub fn default_screen(&self) -> Option<&Screen> {
        self.setup.roots.get(self.default_screen)
    }

    /// The constructor registry this connection decodes with.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Promote a queried extension's constructors into the decode tables
    /// and remember its major opcode. The generated extension layer calls
    /// this with the values its QueryExtension round trip returned.
    pub fn register_extension(
        &self,
        name: &str,
        major_opcode: u8,
        first_event: u8,
        first_error: u8,
    ) {
        self.registry
            .promote_extension(name, major_opcode, first_event, first_error);
    }

    /// The major opcode a registered extension was promoted with.
    pub fn extension_opcode(&self, name: &str) -> Option<u8> {
        self.registry.extension_opcode(name)
    }

    /// Shut the connection down. Idempotent; the workers end at their
    /// next suspension point, outstanding cookies unwind with
    /// [`Error::Closed`], and the event stream ends.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether shutdown has been initiated.
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
