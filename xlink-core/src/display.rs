//! Display specifiers: where to find the X server.
//!
//! A display string names a server and optionally a protocol and a default
//! screen. The accepted forms match the ones X clients have always accepted:
//!
//! ```text
//! :1                       unix socket /tmp/.X11-unix/X1
//! /tmp/launch-123/:0       explicit unix socket path
//! hostname:2.1             tcp to hostname, port 6002, screen 1
//! tcp/hostname:1.0         explicit protocol, port 6001, screen 0
//! ```
//!
//! An empty specifier falls back to the `DISPLAY` environment variable.

use std::env;
use std::fmt;

/// Errors produced while parsing a display specifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisplayParseError {
    /// Neither the argument nor `$DISPLAY` named a server.
    #[error("empty display string")]
    Empty,

    /// The specifier has no `:display` part.
    #[error("bad display string: {0}")]
    MissingDisplay(String),

    /// The display number is missing or not a number.
    #[error("bad display number in: {0}")]
    BadDisplayNumber(String),

    /// The screen suffix is not a number.
    #[error("bad screen number in: {0}")]
    BadScreenNumber(String),
}

/// The concrete endpoint a display specifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A unix domain socket at the given path.
    Unix(String),
    /// A TCP endpoint. The port is already offset by the display number.
    Tcp {
        /// Remote host name or address.
        host: String,
        /// Remote port (6000 + display number).
        port: u16,
    },
}

/// A parsed display specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayAddress {
    host: String,
    protocol: String,
    display: u16,
    screen: usize,
    target: ConnectTarget,
}

impl DisplayAddress {
    /// Parse a display specifier. `None` or an empty string reads `$DISPLAY`.
    pub fn parse(spec: Option<&str>) -> Result<Self, DisplayParseError> {
        let from_env;
        let mut spec = match spec {
            Some(s) if !s.is_empty() => s,
            _ => {
                from_env = env::var("DISPLAY").unwrap_or_default();
                &from_env
            }
        };
        if spec.is_empty() {
            return Err(DisplayParseError::Empty);
        }
        let original = spec.to_owned();

        let colon = spec
            .rfind(':')
            .ok_or_else(|| DisplayParseError::MissingDisplay(original.clone()))?;

        let mut host = String::new();
        let mut protocol = String::new();
        let mut socket = String::new();
        if spec.starts_with('/') {
            socket = spec[..colon].to_owned();
        } else {
            match spec[..colon].rfind('/') {
                Some(slash) => {
                    protocol = spec[..slash].to_owned();
                    host = spec[slash + 1..colon].to_owned();
                }
                None => host = spec[..colon].to_owned(),
            }
        }

        spec = &spec[colon + 1..];
        if spec.is_empty() {
            return Err(DisplayParseError::BadDisplayNumber(original));
        }

        let (display_part, screen_part) = match spec.rfind('.') {
            Some(dot) => (&spec[..dot], Some(&spec[dot + 1..])),
            None => (spec, None),
        };

        let display: u16 = display_part
            .parse()
            .map_err(|_| DisplayParseError::BadDisplayNumber(original.clone()))?;

        let screen = match screen_part {
            Some(s) => s
                .parse()
                .map_err(|_| DisplayParseError::BadScreenNumber(original.clone()))?,
            None => 0,
        };

        let target = if !socket.is_empty() {
            // Launchd-style sockets embed the display in the path itself.
            ConnectTarget::Unix(format!("{socket}:{display}"))
        } else if !host.is_empty() {
            let port = 6000u16
                .checked_add(display)
                .ok_or_else(|| DisplayParseError::BadDisplayNumber(original.clone()))?;
            ConnectTarget::Tcp {
                host: host.clone(),
                port,
            }
        } else {
            ConnectTarget::Unix(format!("/tmp/.X11-unix/X{display}"))
        };

        Ok(DisplayAddress {
            host,
            protocol,
            display,
            screen,
            target,
        })
    }

    /// The host part of the specifier; empty for local connections.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The protocol prefix, if the specifier carried one (`tcp/host:0`).
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The display number.
    pub fn display(&self) -> u16 {
        self.display
    }

    /// The screen number requested by the specifier (0 when absent).
    pub fn screen(&self) -> usize {
        self.screen
    }

    /// Where to actually connect.
    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }
}

impl fmt::Display for DisplayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.protocol.is_empty() {
            write!(f, "{}/", self.protocol)?;
        }
        write!(f, "{}:{}.{}", self.host, self.display, self.screen)
    }
}
