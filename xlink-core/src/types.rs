//! Shared primitive types for the X11 client transport.

use std::fmt;

/// Sequence numbers correlate server responses with the requests that
/// produced them. The server counts requests with a 16-bit counter that
/// wraps, so matching must tolerate the wrap.
pub type SequenceNumber = u16;

/// An X resource identifier (window, pixmap, graphics context, ...).
///
/// Xids are allocated client-side out of the id space the server advertises
/// during setup (a base value plus a contiguous mask of free bits), then
/// named in requests such as CreateWindow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Xid(u32);

impl Xid {
    /// The reserved "no resource" id.
    pub const NONE: Xid = Xid(0);

    /// Wrap a raw identifier value.
    pub const fn new(raw: u32) -> Self {
        Xid(raw)
    }

    /// The raw 32-bit value, as it appears on the wire.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<Xid> for u32 {
    fn from(id: Xid) -> u32 {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xid_value_roundtrip() {
        let id = Xid::new(0x0040_0003);
        assert_eq!(id.value(), 0x0040_0003);
        assert_eq!(u32::from(id), 0x0040_0003);
    }

    #[test]
    fn test_xid_none_is_zero() {
        assert_eq!(Xid::NONE.value(), 0);
    }

    #[test]
    fn test_xid_display_is_hex() {
        assert_eq!(Xid::new(0x2a).to_string(), "0x0000002a");
    }
}
