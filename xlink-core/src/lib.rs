//! # xlink-core
//!
//! Environment abstractions for the xlink X11 client transport.
//!
//! The transport engine in the `xlink` crate depends on these seams rather
//! than on concrete I/O, so the same engine runs over real sockets in
//! production and over in-memory pipes in tests.
//!
//! ## Contents
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`DisplayAddress`] | Parsed display specifier (`:1`, `host:2.1`, ...) |
//! | [`NetworkProvider`] | Display → byte-stream seam |
//! | [`TokioNetworkProvider`] | Production provider (unix socket / TCP) |
//! | [`Xid`], [`SequenceNumber`] | Shared identifier types |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod display;
mod network;
mod types;

pub use display::{ConnectTarget, DisplayAddress, DisplayParseError};
pub use network::{NetworkProvider, ServerStream, TokioNetworkProvider};
pub use types::{SequenceNumber, Xid};
