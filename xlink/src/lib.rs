//! # xlink
//!
//! Asynchronous X11 client transport for Tokio.
//!
//! This crate is the wire engine underneath a generated protocol binding:
//! it pipelines marshalled request buffers onto one ordered stream to the
//! server, demultiplexes the response stream into replies, errors, and
//! events, and routes each response to the cookie awaiting it. It knows
//! nothing about request or reply payloads.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │            Application / generated layer          │
//! │   send_request() → Cookie → reply()/check()       │
//! ├──────────────────────────────────────────────────┤
//! │  Submitter (worker)          Receiver (worker)    │
//! │  • assigns sequences         • 32-byte framing    │
//! │  • forces drain round trips  • matches cookies    │
//! │  • sole stream writer        • sole stream reader │
//! ├──────────────────────────────────────────────────┤
//! │  Sequence source · Xid source · Event queue       │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Conn`] | Connection handle; spawns and owns the workers |
//! | [`Cookie`] | Per-request handle with four delivery modes |
//! | [`Registry`] | Event/error constructor tables per connection |
//! | [`wire`] | Response framing constants and helpers |
//! | [`Setup`] | The server's setup block |
//!
//! ## Quick start
//!
//! ```ignore
//! use xlink::Conn;
//!
//! let conn = Conn::connect(None).await?;
//! let wid = conn.generate_id().await?;
//!
//! // `buf` comes from a request marshaller.
//! let cookie = conn.send_request(buf, true, true).await?;
//! let reply = cookie.reply().await?;
//!
//! while let Some(item) = conn.wait_for_event().await {
//!     match item {
//!         Ok(event) => println!("event {}", event.event_code()),
//!         Err(error) => println!("async error {}", error),
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod auth;
mod conn;
mod cookie;
mod error;
mod event;
mod registry;
mod setup;

pub mod wire;

pub use conn::{Conn, ConnConfig};
pub use cookie::Cookie;
pub use error::{ConnectError, Error, Result, ServerError};
pub use event::{EventOrError, ServerEvent};
pub use registry::{ErrorCtor, EventCtor, Registry, UnknownError, UnknownEvent};
pub use setup::{Depth, Format, Screen, Setup, VisualType};

// The environment seams live in xlink-core; re-exported so one dependency
// suffices for typical users.
pub use xlink_core::{
    ConnectTarget, DisplayAddress, DisplayParseError, NetworkProvider, SequenceNumber,
    ServerStream, TokioNetworkProvider, Xid,
};
