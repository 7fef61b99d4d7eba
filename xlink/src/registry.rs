//! Constructor registries: how raw frames become decoded events and errors.
//!
//! The transport is payload-agnostic; the generated protocol layer teaches
//! it how to decode by registering constructor functions here. Core
//! constructors are keyed directly by number. Extension constructors are
//! registered under the extension's name with numbers relative to the
//! extension's base, then promoted into the primary tables once the
//! extension's actual base numbers are known at registration time.
//!
//! A registry is threaded through the connection at construction rather
//! than living in process globals, so two connections can decode with
//! different extension sets.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use xlink_core::SequenceNumber;

use crate::error::ServerError;
use crate::event::ServerEvent;
use crate::wire;

/// Parses a 32-byte event frame into a decoded event.
pub type EventCtor = fn(&[u8]) -> Box<dyn ServerEvent>;

/// Parses a 32-byte error frame into a decoded error.
pub type ErrorCtor = fn(&[u8]) -> Box<dyn ServerError>;

#[derive(Default)]
struct Tables {
    events: HashMap<u8, EventCtor>,
    errors: HashMap<u8, ErrorCtor>,
    ext_events: HashMap<String, HashMap<u8, EventCtor>>,
    ext_errors: HashMap<String, HashMap<u8, ErrorCtor>>,
    opcodes: HashMap<String, u8>,
}

/// Event and error constructor tables for one connection.
///
/// Write-mostly at startup, read on every incoming response thereafter.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a core event constructor for a 7-bit event kind.
    pub fn register_event(&self, code: u8, ctor: EventCtor) {
        self.write().events.insert(code & wire::EVENT_CODE_MASK, ctor);
    }

    /// Register a core error constructor for an error code.
    pub fn register_error(&self, code: u8, ctor: ErrorCtor) {
        self.write().errors.insert(code, ctor);
    }

    /// Register an extension event constructor under the extension's name,
    /// keyed by the event number relative to the extension's base.
    pub fn register_extension_event(&self, extension: &str, number: u8, ctor: EventCtor) {
        self.write()
            .ext_events
            .entry(extension.to_owned())
            .or_default()
            .insert(number, ctor);
    }

    /// Register an extension error constructor under the extension's name,
    /// keyed by the error number relative to the extension's base.
    pub fn register_extension_error(&self, extension: &str, number: u8, ctor: ErrorCtor) {
        self.write()
            .ext_errors
            .entry(extension.to_owned())
            .or_default()
            .insert(number, ctor);
    }

    /// Promote an extension's constructors into the primary tables.
    ///
    /// `first_event` and `first_error` are the base numbers the server
    /// assigned the extension; relative constructor numbers are offset by
    /// them. The extension's major opcode is remembered for
    /// [`extension_opcode`](Self::extension_opcode).
    pub fn promote_extension(
        &self,
        extension: &str,
        major_opcode: u8,
        first_event: u8,
        first_error: u8,
    ) {
        let mut tables = self.write();
        tables.opcodes.insert(extension.to_owned(), major_opcode);
        if let Some(events) = tables.ext_events.remove(extension) {
            for (number, ctor) in events {
                tables
                    .events
                    .insert(first_event.wrapping_add(number) & wire::EVENT_CODE_MASK, ctor);
            }
        }
        if let Some(errors) = tables.ext_errors.remove(extension) {
            for (number, ctor) in errors {
                tables.errors.insert(first_error.wrapping_add(number), ctor);
            }
        }
    }

    /// The major opcode a registered extension was promoted with.
    pub fn extension_opcode(&self, extension: &str) -> Option<u8> {
        self.read().opcodes.get(extension).copied()
    }

    /// Decode an event frame, falling back to [`UnknownEvent`].
    pub(crate) fn decode_event(&self, frame: &[u8]) -> Box<dyn ServerEvent> {
        let code = frame[0] & wire::EVENT_CODE_MASK;
        match self.read().events.get(&code) {
            Some(ctor) => ctor(frame),
            None => {
                tracing::debug!(code, "no constructor for event; decoding generically");
                Box::new(UnknownEvent::from_frame(frame))
            }
        }
    }

    /// Decode an error frame, falling back to [`UnknownError`].
    pub(crate) fn decode_error(&self, frame: &[u8]) -> Box<dyn ServerError> {
        let code = frame[1];
        match self.read().errors.get(&code) {
            Some(ctor) => ctor(frame),
            None => {
                tracing::debug!(code, "no constructor for error; decoding generically");
                Box::new(UnknownError::from_frame(frame))
            }
        }
    }
}

/// Generic decoding of an event with no registered constructor: the kind
/// plus the raw frame.
#[derive(Debug, Clone)]
pub struct UnknownEvent {
    code: u8,
    raw: Vec<u8>,
}

impl UnknownEvent {
    /// Decode from a raw 32-byte frame.
    pub fn from_frame(frame: &[u8]) -> Self {
        Self {
            code: frame[0] & wire::EVENT_CODE_MASK,
            raw: frame.to_vec(),
        }
    }

    /// The raw frame bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

impl ServerEvent for UnknownEvent {
    fn event_code(&self) -> u8 {
        self.code
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Generic decoding of an error with no registered constructor: code,
/// sequence, and the raw frame.
#[derive(Debug, Clone)]
pub struct UnknownError {
    code: u8,
    sequence: SequenceNumber,
    raw: Vec<u8>,
}

impl UnknownError {
    /// Decode from a raw 32-byte frame.
    pub fn from_frame(frame: &[u8]) -> Self {
        Self {
            code: frame[1],
            sequence: wire::sequence_number(frame),
            raw: frame.to_vec(),
        }
    }

    /// The raw frame bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Display for UnknownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server error code {} (sequence {})",
            self.code, self.sequence
        )
    }
}

impl ServerError for UnknownError {
    fn error_code(&self) -> u8 {
        self.code
    }

    fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_frame(code: u8) -> Vec<u8> {
        let mut frame = vec![0u8; wire::RESPONSE_HEADER_SIZE];
        frame[0] = code;
        frame
    }

    fn error_frame(code: u8, sequence: u16) -> Vec<u8> {
        let mut frame = vec![0u8; wire::RESPONSE_HEADER_SIZE];
        frame[1] = code;
        wire::put_u16(&mut frame[2..], sequence);
        frame
    }

    #[derive(Debug)]
    struct MappedEvent;

    impl ServerEvent for MappedEvent {
        fn event_code(&self) -> u8 {
            33
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn mapped_event(_frame: &[u8]) -> Box<dyn ServerEvent> {
        Box::new(MappedEvent)
    }

    #[test]
    fn test_registered_event_ctor_wins() {
        let registry = Registry::new();
        registry.register_event(33, mapped_event);

        let event = registry.decode_event(&event_frame(33));
        assert!(event.as_any().is::<MappedEvent>());
    }

    #[test]
    fn test_unregistered_event_falls_back() {
        let registry = Registry::new();
        let event = registry.decode_event(&event_frame(21));
        let unknown = event
            .as_any()
            .downcast_ref::<UnknownEvent>()
            .expect("generic fallback");
        assert_eq!(unknown.event_code(), 21);
    }

    #[test]
    fn test_send_event_bit_ignored_for_lookup() {
        let registry = Registry::new();
        registry.register_event(33, mapped_event);
        let event = registry.decode_event(&event_frame(0x80 | 33));
        assert!(event.as_any().is::<MappedEvent>());
    }

    #[test]
    fn test_unregistered_error_carries_code_and_sequence() {
        let registry = Registry::new();
        let error = registry.decode_error(&error_frame(8, 6));
        assert_eq!(error.error_code(), 8);
        assert_eq!(error.sequence(), 6);
    }

    #[test]
    fn test_extension_promotion_offsets_numbers() {
        let registry = Registry::new();
        registry.register_extension_event("FAKE-EXT", 0, mapped_event);
        assert_eq!(registry.extension_opcode("FAKE-EXT"), None);

        registry.promote_extension("FAKE-EXT", 131, 77, 140);
        assert_eq!(registry.extension_opcode("FAKE-EXT"), Some(131));

        let event = registry.decode_event(&event_frame(77));
        assert!(event.as_any().is::<MappedEvent>());
    }
}
