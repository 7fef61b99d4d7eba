//! Tunable constants of the transport engine.

/// Configuration for a [`Conn`](crate::Conn).
///
/// The defaults are the values the protocol's pipelining model was sized
/// around; they only need adjusting in tests or unusual deployments.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Bound on outstanding requests awaiting responses. Reaching
    /// `cookie_buffer - 1` forces a synthetic round trip that drains the
    /// queue, keeping the 16-bit sequence matching window unambiguous.
    pub cookie_buffer: usize,

    /// Bound on the request-ingress channel; submission backpressures the
    /// application beyond this.
    pub request_channel_bound: usize,

    /// Soft bound on the event queue. Crossing it logs a slow-consumer
    /// warning; delivery stays unbounded to keep the receiver from ever
    /// blocking.
    pub event_buffer_bound: usize,

    /// Bound on the sequence and id producer channels. Immaterial to
    /// correctness; small keeps the producers close to their consumers.
    pub sequence_channel_bound: usize,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            cookie_buffer: 1000,
            request_channel_bound: 100,
            event_buffer_bound: 500,
            sequence_channel_bound: 8,
        }
    }
}
